use reqwest::header::CONTENT_RANGE;
use reqwest::RequestBuilder;
use serde_json::Value;
use tracing::{debug, warn};

use narrative_common::{send_with_retry, RetryPolicy};

use crate::collection::Collection;
use crate::error::StoreError;
use crate::query::Query;

const USER_AGENT: &str = "narrative-tracker";

/// Result of a best-effort write.
#[derive(Debug, Clone, PartialEq)]
pub enum UpsertOutcome {
    /// The row as the store returned it.
    Stored(Value),
    Skipped { reason: String },
}

impl UpsertOutcome {
    pub fn is_stored(&self) -> bool {
        matches!(self, UpsertOutcome::Stored(_))
    }
}

/// PostgREST gateway. Writes are best-effort and never raise; reads raise.
#[derive(Clone)]
pub struct StoreClient {
    http: reqwest::Client,
    base_url: String,
    key: String,
    policy: RetryPolicy,
}

impl StoreClient {
    pub fn new(
        base_url: impl Into<String>,
        key: impl Into<String>,
        policy: RetryPolicy,
    ) -> Result<Self, StoreError> {
        Ok(Self {
            http: policy.http_client(USER_AGENT)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            key: key.into(),
            policy,
        })
    }

    fn rest_url(&self, path: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, path)
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        req.header("apikey", &self.key).bearer_auth(&self.key)
    }

    /// Insert `record`, merging on the collection's natural key when it has one.
    ///
    /// Insert-only collections get a single attempt: a retry after a timeout
    /// the server already committed would append the row twice.
    pub async fn try_upsert(&self, collection: Collection, record: &Value) -> UpsertOutcome {
        let (url, prefer, policy) = match collection.conflict_key() {
            Some(key) => (
                format!("{}?on_conflict={key}", self.rest_url(collection.name())),
                "return=representation,resolution=merge-duplicates",
                self.policy,
            ),
            None => (
                self.rest_url(collection.name()),
                "return=representation",
                RetryPolicy {
                    max_attempts: 1,
                    ..self.policy
                },
            ),
        };

        let result = send_with_retry(&policy, collection.name(), || {
            self.authed(self.http.post(&url))
                .header("Prefer", prefer)
                .json(record)
        })
        .await;

        match result {
            Ok(resp) => {
                let stored = resp
                    .json::<Vec<Value>>()
                    .await
                    .ok()
                    .and_then(|rows| rows.into_iter().next())
                    .unwrap_or_else(|| record.clone());
                debug!(collection = %collection, "Stored row");
                UpsertOutcome::Stored(stored)
            }
            Err(e) => {
                warn!(collection = %collection, error = %e, "Store write skipped");
                UpsertOutcome::Skipped {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Best-effort partial update of the row with primary key `id`.
    pub async fn try_update(&self, collection: Collection, id: &str, patch: &Value) -> UpsertOutcome {
        let url = format!(
            "{}?id=eq.{}",
            self.rest_url(collection.name()),
            urlencoding::encode(id)
        );

        let result = send_with_retry(&self.policy, collection.name(), || {
            self.authed(self.http.patch(&url))
                .header("Prefer", "return=representation")
                .json(patch)
        })
        .await;

        match result {
            Ok(resp) => match resp.json::<Vec<Value>>().await {
                Ok(rows) if rows.is_empty() => UpsertOutcome::Skipped {
                    reason: format!("no {collection} row with id {id}"),
                },
                Ok(mut rows) => UpsertOutcome::Stored(rows.swap_remove(0)),
                Err(_) => UpsertOutcome::Stored(patch.clone()),
            },
            Err(e) => {
                warn!(collection = %collection, id, error = %e, "Store update skipped");
                UpsertOutcome::Skipped {
                    reason: e.to_string(),
                }
            }
        }
    }

    pub async fn must_get(&self, query: &Query) -> Result<Vec<Value>, StoreError> {
        let url = self.rest_url(&query.to_path());
        let resp = send_with_retry(&self.policy, query.collection().name(), || {
            self.authed(self.http.get(&url))
        })
        .await?;

        resp.json::<Vec<Value>>()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))
    }

    /// Exact row count, read from `Content-Range` (`0-0/123` or `*/0`).
    pub async fn count(&self, collection: Collection) -> Result<u64, StoreError> {
        let url = self.rest_url(&format!("{}?select=id&limit=1", collection.name()));
        let resp = send_with_retry(&self.policy, collection.name(), || {
            self.authed(self.http.get(&url)).header("Prefer", "count=exact")
        })
        .await?;

        let range = resp
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        parse_content_range_total(&range).ok_or(StoreError::Count(range))
    }
}

fn parse_content_range_total(range: &str) -> Option<u64> {
    range.rsplit_once('/')?.1.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_range_totals() {
        assert_eq!(parse_content_range_total("0-0/123"), Some(123));
        assert_eq!(parse_content_range_total("*/0"), Some(0));
        assert_eq!(parse_content_range_total("0-0/*"), None);
        assert_eq!(parse_content_range_total(""), None);
    }
}
