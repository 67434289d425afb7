use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{Duration as ChronoDuration, NaiveDate};
use tracing::{info, warn};

use narrative_common::{classify, truncate_chars, Period, RepoSignal, RepoSignalKind};
use narrative_sources::github::{created_since_query, pushed_since_query, Repository, SearchSort};
use narrative_store::Collection;

use super::{pace, store_signal};
use crate::traits::{is_fatal, RepoSource, SignalStore};

pub const MAX_DESCRIPTION_CHARS: usize = 500;

/// One discovery search: which repositories it finds and how they are labelled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryQuery {
    pub query: String,
    pub sort: SearchSort,
    pub per_page: u32,
    pub kind: RepoSignalKind,
}

/// New repositories created inside the window, then recently active ones.
pub fn discovery_queries(topic: &str, period: &Period) -> Vec<DiscoveryQuery> {
    let active_since = period.end() - ChronoDuration::days(7);
    vec![
        DiscoveryQuery {
            query: created_since_query(topic, period.start(), 5),
            sort: SearchSort::Stars,
            per_page: 20,
            kind: RepoSignalKind::NewRepo,
        },
        DiscoveryQuery {
            query: pushed_since_query(topic, active_since, 50),
            sort: SearchSort::Updated,
            per_page: 30,
            kind: RepoSignalKind::ActivitySpike,
        },
    ]
}

pub fn build_signal(repo: Repository, kind: RepoSignalKind, captured_on: NaiveDate) -> RepoSignal {
    let classified_text = format!(
        "{} {} {}",
        repo.full_name,
        repo.description.as_deref().unwrap_or_default(),
        repo.topics.join(" ")
    );

    RepoSignal {
        category: classify(&classified_text),
        description: repo
            .description
            .as_deref()
            .map(|d| truncate_chars(d, MAX_DESCRIPTION_CHARS).to_string()),
        repo_full_name: repo.full_name,
        repo_url: repo.html_url,
        stars: repo.stargazers_count,
        stars_delta: 0,
        forks: repo.forks_count,
        open_issues: repo.open_issues_count,
        recent_commits: 0,
        language: repo.language,
        topics: repo.topics,
        last_push_at: repo.pushed_at,
        signal_type: kind,
        captured_on,
        created_at: None,
    }
}

pub struct RepoScanner {
    source: Arc<dyn RepoSource>,
    store: Arc<dyn SignalStore>,
    tracked: Vec<String>,
    topic: String,
    delay: Duration,
}

impl RepoScanner {
    pub fn new(
        source: Arc<dyn RepoSource>,
        store: Arc<dyn SignalStore>,
        tracked: Vec<String>,
        topic: impl Into<String>,
        delay: Duration,
    ) -> Self {
        Self {
            source,
            store,
            tracked,
            topic: topic.into(),
            delay,
        }
    }

    pub async fn run(&self, period: &Period) -> Result<u32> {
        info!(tracked = self.tracked.len(), topic = self.topic.as_str(), "Starting GitHub scan");
        let captured_on = period.end();
        let mut seen: HashSet<String> = HashSet::new();
        let mut stored = 0u32;

        for (i, full_name) in self.tracked.iter().enumerate() {
            if i > 0 {
                pace(self.delay).await;
            }
            let repo = match self.source.repository(full_name).await {
                Ok(repo) => repo,
                Err(e) if is_fatal(&e) => return Err(e.context("GitHub unavailable")),
                Err(e) => {
                    warn!(repo = full_name.as_str(), error = %e, "Repository fetch failed, skipping");
                    continue;
                }
            };
            seen.insert(repo.full_name.to_lowercase());
            let signal = build_signal(repo, RepoSignalKind::Tracked, captured_on);
            if store_signal(self.store.as_ref(), Collection::GithubSignals, &signal).await {
                stored += 1;
            }
        }

        for discovery in discovery_queries(&self.topic, period) {
            let found = match self
                .source
                .search(&discovery.query, discovery.sort, discovery.per_page)
                .await
            {
                Ok(found) => found,
                Err(e) if is_fatal(&e) => return Err(e.context("GitHub unavailable")),
                Err(e) => {
                    warn!(query = discovery.query.as_str(), error = %e, "Repository search failed");
                    continue;
                }
            };

            let mut added = 0u32;
            for repo in found {
                if !seen.insert(repo.full_name.to_lowercase()) {
                    continue;
                }
                let signal = build_signal(repo, discovery.kind, captured_on);
                if store_signal(self.store.as_ref(), Collection::GithubSignals, &signal).await {
                    added += 1;
                }
            }
            info!(kind = %discovery.kind, added, "Discovery search complete");
            stored += added;
        }

        info!(stored, "GitHub scan complete");
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{repository, MockRepoSource, MockStore};
    use chrono::{TimeZone, Utc};
    use narrative_common::Category;

    fn period() -> Period {
        Period::rolling(Utc.with_ymd_and_hms(2025, 10, 18, 9, 0, 0).unwrap())
    }

    #[test]
    fn discovery_windows() {
        let queries = discovery_queries("solana", &period());
        assert_eq!(queries[0].query, "solana created:>2025-10-04 stars:>5");
        assert_eq!(queries[0].per_page, 20);
        assert_eq!(queries[1].query, "solana pushed:>2025-10-11 stars:>50");
        assert_eq!(queries[1].sort, SearchSort::Updated);
        assert_eq!(queries[1].kind, RepoSignalKind::ActivitySpike);
    }

    #[test]
    fn description_is_bounded_and_classified() {
        let mut repo = repository("acme/perp-dex", 80);
        repo.description = Some(format!("A perp dex {}", "x".repeat(900)));
        let signal = build_signal(repo, RepoSignalKind::NewRepo, period().end());
        assert_eq!(
            signal.description.unwrap().chars().count(),
            MAX_DESCRIPTION_CHARS
        );
        assert_eq!(signal.category, Category::Defi);
        assert_eq!(signal.captured_on, period().end());
    }

    #[tokio::test]
    async fn tracked_then_discovery_without_duplicates() {
        let store = Arc::new(MockStore::new());
        let source = MockRepoSource::new()
            .on_repo(repository("coral-xyz/anchor", 3900))
            .on_search(
                SearchSort::Stars,
                vec![repository("new/agent-kit", 40), repository("coral-xyz/anchor", 3900)],
            )
            .on_search(
                SearchSort::Updated,
                vec![repository("new/agent-kit", 40), repository("busy/validator", 900)],
            );
        let scanner = RepoScanner::new(
            Arc::new(source),
            store.clone(),
            vec!["coral-xyz/anchor".into(), "gone/repo".into()],
            "solana",
            Duration::ZERO,
        );

        let stored = scanner.run(&period()).await.unwrap();
        assert_eq!(stored, 3);

        let rows = store.rows(Collection::GithubSignals);
        let kinds: Vec<(&str, &str)> = rows
            .iter()
            .map(|r| {
                (
                    r["repo_full_name"].as_str().unwrap(),
                    r["signal_type"].as_str().unwrap(),
                )
            })
            .collect();
        assert_eq!(
            kinds,
            vec![
                ("coral-xyz/anchor", "tracked"),
                ("new/agent-kit", "new_repo"),
                ("busy/validator", "activity_spike"),
            ]
        );
    }

    #[tokio::test]
    async fn unavailable_source_fails_the_phase() {
        let scanner = RepoScanner::new(
            Arc::new(MockRepoSource::new().unavailable("bad credentials")),
            Arc::new(MockStore::new()),
            vec!["coral-xyz/anchor".into()],
            "solana",
            Duration::ZERO,
        );
        assert!(scanner.run(&period()).await.is_err());
    }
}
