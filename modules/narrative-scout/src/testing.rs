// Test mocks for the scan pipeline.
//
// One mock per trait boundary:
// - MockStore (SignalStore): in-memory collections that honour natural keys
// - MockPostSource (PostSource): handle -> raw CLI output
// - MockRepoSource (RepoSource): full name -> repository, sort -> search results
// - MockMetricSource (MetricSource): chain history, protocol details, ranking
// - MockReasoner (Reasoner): canned response, records prompts
//
// Unregistered keys return a non-fatal error, like a flaky upstream would.
// `.unavailable(..)` makes every call fail with a fatal error.
//
// Plus builders for repositories and signals.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use uuid::Uuid;

use narrative_common::{
    Category, Engagement, FetchError, FinancialSignal, RepoSignal, RepoSignalKind, SocialSignal,
};
use narrative_sources::defillama::{ChainTvlPoint, ProtocolDetail, ProtocolSummary};
use narrative_sources::github::{Repository, SearchSort};
use narrative_store::{Collection, Filter, Query, UpsertOutcome};

use crate::traits::{MetricSource, PostSource, Reasoner, RepoSource, SignalStore};

// ---------------------------------------------------------------------------
// MockStore
// ---------------------------------------------------------------------------

/// In-memory store. Upserts merge on the collection's natural key, updates
/// patch the row whose `id` matches, and rows get `id`/`created_at` when
/// they arrive without them.
#[derive(Default)]
pub struct MockStore {
    rows: Mutex<HashMap<Collection, Vec<Value>>>,
    writes: Mutex<HashMap<Collection, u32>>,
    failing_writes: HashSet<Collection>,
    failing_reads: HashSet<Collection>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every write to `collection` is skipped, as if the store were down.
    pub fn fail_writes_to(mut self, collection: Collection) -> Self {
        self.failing_writes.insert(collection);
        self
    }

    /// Every read of `collection` errors.
    pub fn fail_reads_of(mut self, collection: Collection) -> Self {
        self.failing_reads.insert(collection);
        self
    }

    /// Seed a row without counting it as a write.
    pub fn with_row(self, collection: Collection, row: Value) -> Self {
        self.seed(collection, row);
        self
    }

    pub fn seed(&self, collection: Collection, row: Value) {
        let row = stamp(row);
        self.rows
            .lock()
            .unwrap()
            .entry(collection)
            .or_default()
            .push(row);
    }

    /// Snapshot of a collection, in insertion order.
    pub fn rows(&self, collection: Collection) -> Vec<Value> {
        self.rows
            .lock()
            .unwrap()
            .get(&collection)
            .cloned()
            .unwrap_or_default()
    }

    /// Accepted writes (upserts and updates) to a collection.
    pub fn write_count(&self, collection: Collection) -> u32 {
        self.writes
            .lock()
            .unwrap()
            .get(&collection)
            .copied()
            .unwrap_or(0)
    }

    fn count_write(&self, collection: Collection) {
        *self.writes.lock().unwrap().entry(collection).or_insert(0) += 1;
    }
}

fn stamp(mut row: Value) -> Value {
    if let Some(obj) = row.as_object_mut() {
        obj.entry("id")
            .or_insert_with(|| Value::String(Uuid::new_v4().to_string()));
        obj.entry("created_at").or_insert_with(|| {
            Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true))
        });
    }
    row
}

fn merge(target: &mut Value, patch: &Value) {
    if let (Some(target), Some(patch)) = (target.as_object_mut(), patch.as_object()) {
        for (k, v) in patch {
            target.insert(k.clone(), v.clone());
        }
    }
}

fn same_key(a: &Value, b: &Value, columns: &[&str]) -> bool {
    !columns.is_empty() && columns.iter().all(|c| a.get(*c) == b.get(*c))
}

fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn matches_filter(row: &Value, filter: &Filter) -> bool {
    let Some(actual) = row.get(filter.column()) else {
        return false;
    };
    match filter {
        Filter::Gte(_, bound) => match (actual.as_f64(), bound.parse::<f64>()) {
            (Some(a), Ok(b)) => a >= b,
            _ => as_text(actual).as_str() >= bound.as_str(),
        },
    }
}

fn compare_desc(a: &Value, b: &Value) -> std::cmp::Ordering {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        _ => as_text(b).cmp(&as_text(a)),
    }
}

#[async_trait]
impl SignalStore for MockStore {
    async fn try_upsert(&self, collection: Collection, record: &Value) -> UpsertOutcome {
        if self.failing_writes.contains(&collection) {
            return UpsertOutcome::Skipped {
                reason: format!("MockStore: writes to {collection} are failing"),
            };
        }

        let columns = collection.key_columns();
        let stored = {
            let mut rows = self.rows.lock().unwrap();
            let table = rows.entry(collection).or_default();
            match table.iter_mut().find(|row| same_key(row, record, &columns)) {
                Some(existing) => {
                    merge(existing, record);
                    existing.clone()
                }
                None => {
                    let row = stamp(record.clone());
                    table.push(row.clone());
                    row
                }
            }
        };
        self.count_write(collection);
        UpsertOutcome::Stored(stored)
    }

    async fn try_update(&self, collection: Collection, id: &str, patch: &Value) -> UpsertOutcome {
        if self.failing_writes.contains(&collection) {
            return UpsertOutcome::Skipped {
                reason: format!("MockStore: writes to {collection} are failing"),
            };
        }

        let updated = {
            let mut rows = self.rows.lock().unwrap();
            rows.get_mut(&collection)
                .and_then(|table| {
                    table
                        .iter_mut()
                        .find(|row| row.get("id").map(as_text).as_deref() == Some(id))
                })
                .map(|row| {
                    merge(row, patch);
                    row.clone()
                })
        };
        match updated {
            Some(row) => {
                self.count_write(collection);
                UpsertOutcome::Stored(row)
            }
            None => UpsertOutcome::Skipped {
                reason: format!("MockStore: no {collection} row with id {id}"),
            },
        }
    }

    async fn must_get(&self, query: &Query) -> Result<Vec<Value>> {
        let collection = query.collection();
        if self.failing_reads.contains(&collection) {
            bail!("MockStore: reads of {collection} are failing");
        }

        let mut rows: Vec<Value> = self
            .rows(collection)
            .into_iter()
            .filter(|row| query.filters().iter().all(|f| matches_filter(row, f)))
            .collect();
        if let Some(column) = query.order_column() {
            rows.sort_by(|a, b| {
                compare_desc(
                    a.get(column).unwrap_or(&Value::Null),
                    b.get(column).unwrap_or(&Value::Null),
                )
            });
        }
        if let Some(limit) = query.limit_value() {
            rows.truncate(limit as usize);
        }
        Ok(rows)
    }
}

// ---------------------------------------------------------------------------
// MockPostSource
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MockPostSource {
    outputs: HashMap<String, String>,
    failing: HashSet<String>,
    unavailable: Option<String>,
}

impl MockPostSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_handle(mut self, handle: &str, raw: &str) -> Self {
        self.outputs.insert(handle.to_string(), raw.to_string());
        self
    }

    /// This handle's command exits non-zero.
    pub fn failing(mut self, handle: &str) -> Self {
        self.failing.insert(handle.to_string());
        self
    }

    pub fn unavailable(mut self, reason: &str) -> Self {
        self.unavailable = Some(reason.to_string());
        self
    }
}

#[async_trait]
impl PostSource for MockPostSource {
    async fn recent_posts(&self, handle: &str) -> Result<String> {
        if let Some(reason) = &self.unavailable {
            return Err(FetchError::Unavailable(reason.clone()).into());
        }
        if self.failing.contains(handle) {
            return Err(FetchError::Command(format!("bird exited with 1 for @{handle}")).into());
        }
        self.outputs
            .get(handle)
            .cloned()
            .ok_or_else(|| anyhow!("MockPostSource: no output registered for @{handle}"))
    }
}

// ---------------------------------------------------------------------------
// MockRepoSource
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MockRepoSource {
    repos: HashMap<String, Repository>,
    searches: Vec<(SearchSort, Vec<Repository>)>,
    unavailable: Option<String>,
}

impl MockRepoSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_repo(mut self, repo: Repository) -> Self {
        self.repos.insert(repo.full_name.to_lowercase(), repo);
        self
    }

    /// Results for every search with this sort order.
    pub fn on_search(mut self, sort: SearchSort, results: Vec<Repository>) -> Self {
        self.searches.push((sort, results));
        self
    }

    /// Every call fails as if the token were rejected.
    pub fn unavailable(mut self, reason: &str) -> Self {
        self.unavailable = Some(reason.to_string());
        self
    }

    fn check_available(&self) -> Result<()> {
        match &self.unavailable {
            Some(reason) => Err(FetchError::Upstream {
                status: 401,
                body: reason.clone(),
            }
            .into()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RepoSource for MockRepoSource {
    async fn repository(&self, full_name: &str) -> Result<Repository> {
        self.check_available()?;
        self.repos.get(&full_name.to_lowercase()).cloned().ok_or_else(|| {
            FetchError::Upstream {
                status: 404,
                body: format!("MockRepoSource: no repository {full_name}"),
            }
            .into()
        })
    }

    async fn search(
        &self,
        query: &str,
        sort: SearchSort,
        _per_page: u32,
    ) -> Result<Vec<Repository>> {
        self.check_available()?;
        self.searches
            .iter()
            .find(|(s, _)| *s == sort)
            .map(|(_, results)| results.clone())
            .ok_or_else(|| anyhow!("MockRepoSource: no search registered for {query}"))
    }
}

// ---------------------------------------------------------------------------
// MockMetricSource
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MockMetricSource {
    chain_history: Option<Vec<ChainTvlPoint>>,
    protocols: HashMap<String, ProtocolDetail>,
    ranking: Option<Vec<ProtocolSummary>>,
    unavailable: Option<String>,
}

impl MockMetricSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chain_history(mut self, points: Vec<ChainTvlPoint>) -> Self {
        self.chain_history = Some(points);
        self
    }

    /// Registered under the detail's slug.
    pub fn on_protocol(mut self, detail: ProtocolDetail) -> Self {
        let slug = detail.slug.clone().unwrap_or_else(|| detail.name.clone());
        self.protocols.insert(slug, detail);
        self
    }

    pub fn with_ranking(mut self, ranking: Vec<ProtocolSummary>) -> Self {
        self.ranking = Some(ranking);
        self
    }

    pub fn unavailable(mut self, reason: &str) -> Self {
        self.unavailable = Some(reason.to_string());
        self
    }

    fn check_available(&self) -> Result<()> {
        match &self.unavailable {
            Some(reason) => Err(FetchError::Unavailable(reason.clone()).into()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl MetricSource for MockMetricSource {
    async fn chain_tvl_history(&self, chain: &str) -> Result<Vec<ChainTvlPoint>> {
        self.check_available()?;
        self.chain_history
            .clone()
            .ok_or_else(|| anyhow!("MockMetricSource: no history registered for {chain}"))
    }

    async fn protocol(&self, slug: &str) -> Result<ProtocolDetail> {
        self.check_available()?;
        self.protocols
            .get(slug)
            .cloned()
            .ok_or_else(|| anyhow!("MockMetricSource: no protocol registered for {slug}"))
    }

    async fn protocols(&self) -> Result<Vec<ProtocolSummary>> {
        self.check_available()?;
        self.ranking
            .clone()
            .ok_or_else(|| anyhow!("MockMetricSource: no ranking registered"))
    }
}

// ---------------------------------------------------------------------------
// MockReasoner
// ---------------------------------------------------------------------------

/// Returns a canned response (or error) and records every prompt it sees.
pub struct MockReasoner {
    response: std::result::Result<String, String>,
    prompts: Mutex<Vec<(String, String)>>,
}

impl MockReasoner {
    pub fn replying(response: &str) -> Self {
        Self {
            response: Ok(response.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(error: &str) -> Self {
        Self {
            response: Err(error.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn last_user_prompt(&self) -> Option<String> {
        self.prompts
            .lock()
            .unwrap()
            .last()
            .map(|(_, user)| user.clone())
    }
}

#[async_trait]
impl Reasoner for MockReasoner {
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        self.prompts
            .lock()
            .unwrap()
            .push((system.to_string(), user.to_string()));
        match &self.response {
            Ok(text) => Ok(text.clone()),
            Err(e) => bail!("MockReasoner: {e}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

pub fn repository(full_name: &str, stars: u64) -> Repository {
    Repository {
        full_name: full_name.to_string(),
        html_url: format!("https://github.com/{full_name}"),
        stargazers_count: stars,
        forks_count: 0,
        open_issues_count: 0,
        language: Some("Rust".to_string()),
        description: None,
        topics: Vec::new(),
        pushed_at: None,
        created_at: None,
    }
}

pub fn social_signal(handle: &str, tweet_id: &str, text: &str, strength: f64) -> SocialSignal {
    SocialSignal {
        source: "x_kol".to_string(),
        handle: handle.to_string(),
        tweet_id: tweet_id.to_string(),
        tweet_text: text.to_string(),
        tweet_url: format!("https://x.com/{handle}/status/{tweet_id}"),
        posted_at: Utc::now(),
        engagement: Engagement::default(),
        keywords_matched: narrative_common::matched_keywords(text),
        category: narrative_common::classify(text),
        signal_strength: strength,
        created_at: None,
    }
}

pub fn repo_signal(full_name: &str, stars: u64, kind: RepoSignalKind) -> RepoSignal {
    RepoSignal {
        repo_full_name: full_name.to_string(),
        repo_url: format!("https://github.com/{full_name}"),
        stars,
        stars_delta: 0,
        forks: 0,
        open_issues: 0,
        recent_commits: 0,
        language: Some("Rust".to_string()),
        description: None,
        topics: Vec::new(),
        last_push_at: None,
        signal_type: kind,
        category: Category::Other,
        captured_on: Utc::now().date_naive(),
        created_at: None,
    }
}

pub fn financial_signal(program_name: &str, value: f64, delta: f64) -> FinancialSignal {
    FinancialSignal {
        signal_type: "tvl_change".to_string(),
        program_name: program_name.to_string(),
        metric_name: "protocol_tvl".to_string(),
        metric_value: value,
        metric_delta: delta,
        source: "defillama".to_string(),
        metadata: Value::Null,
        category: Category::Defi,
        captured_on: Utc::now().date_naive(),
        created_at: None,
    }
}
