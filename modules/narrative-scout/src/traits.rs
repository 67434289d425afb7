// Trait seams between the scan pipeline and the outside world.
//
// SignalStore wraps the PostgREST gateway with its asymmetric policy: writes
// report an UpsertOutcome, reads raise. The three source traits wrap the
// upstream clients, and Reasoner wraps the chat-completion provider chain.
//
// Mocks for all five live in `testing.rs`.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use ai_client::ProviderChain;
use narrative_sources::defillama::{ChainTvlPoint, ProtocolDetail, ProtocolSummary};
use narrative_sources::github::{Repository, SearchSort};
use narrative_sources::{BirdCli, DefiLlamaClient, GithubClient};
use narrative_store::{Collection, Query, StoreClient, UpsertOutcome};

// ---------------------------------------------------------------------------
// SignalStore
// ---------------------------------------------------------------------------

#[async_trait]
pub trait SignalStore: Send + Sync {
    /// Merge-upsert on the collection's natural key. Never raises.
    async fn try_upsert(&self, collection: Collection, record: &Value) -> UpsertOutcome;

    /// Partial update by primary key. Never raises.
    async fn try_update(&self, collection: Collection, id: &str, patch: &Value) -> UpsertOutcome;

    async fn must_get(&self, query: &Query) -> Result<Vec<Value>>;
}

#[async_trait]
impl SignalStore for StoreClient {
    async fn try_upsert(&self, collection: Collection, record: &Value) -> UpsertOutcome {
        StoreClient::try_upsert(self, collection, record).await
    }

    async fn try_update(&self, collection: Collection, id: &str, patch: &Value) -> UpsertOutcome {
        StoreClient::try_update(self, collection, id, patch).await
    }

    async fn must_get(&self, query: &Query) -> Result<Vec<Value>> {
        Ok(StoreClient::must_get(self, query).await?)
    }
}

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

#[async_trait]
pub trait PostSource: Send + Sync {
    /// Raw text of the handle's recent posts, for a `PostParser`.
    async fn recent_posts(&self, handle: &str) -> Result<String>;
}

#[async_trait]
impl PostSource for BirdCli {
    async fn recent_posts(&self, handle: &str) -> Result<String> {
        Ok(self.search_from(handle).await?)
    }
}

#[async_trait]
pub trait RepoSource: Send + Sync {
    async fn repository(&self, full_name: &str) -> Result<Repository>;

    async fn search(&self, query: &str, sort: SearchSort, per_page: u32)
        -> Result<Vec<Repository>>;
}

#[async_trait]
impl RepoSource for GithubClient {
    async fn repository(&self, full_name: &str) -> Result<Repository> {
        Ok(self.get_repo(full_name).await?)
    }

    async fn search(
        &self,
        query: &str,
        sort: SearchSort,
        per_page: u32,
    ) -> Result<Vec<Repository>> {
        Ok(self.search_repositories(query, sort, per_page).await?)
    }
}

#[async_trait]
pub trait MetricSource: Send + Sync {
    async fn chain_tvl_history(&self, chain: &str) -> Result<Vec<ChainTvlPoint>>;

    async fn protocol(&self, slug: &str) -> Result<ProtocolDetail>;

    async fn protocols(&self) -> Result<Vec<ProtocolSummary>>;
}

#[async_trait]
impl MetricSource for DefiLlamaClient {
    async fn chain_tvl_history(&self, chain: &str) -> Result<Vec<ChainTvlPoint>> {
        Ok(DefiLlamaClient::chain_tvl_history(self, chain).await?)
    }

    async fn protocol(&self, slug: &str) -> Result<ProtocolDetail> {
        Ok(DefiLlamaClient::protocol(self, slug).await?)
    }

    async fn protocols(&self) -> Result<Vec<ProtocolSummary>> {
        Ok(DefiLlamaClient::protocols(self).await?)
    }
}

// ---------------------------------------------------------------------------
// Reasoner
// ---------------------------------------------------------------------------

#[async_trait]
pub trait Reasoner: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> Result<String>;
}

#[async_trait]
impl Reasoner for ProviderChain {
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        Ok(self.chat_completion(system, user).await?)
    }
}

/// Whether `err` wraps an upstream error that should abort the whole phase.
pub fn is_fatal(err: &anyhow::Error) -> bool {
    err.downcast_ref::<narrative_common::FetchError>()
        .is_some_and(|e| e.is_fatal())
}
