use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use reqwest::header::ACCEPT;
use reqwest::Response;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use narrative_common::{send_with_retry, FetchError, RetryPolicy};

use crate::Result;

const GITHUB_API: &str = "https://api.github.com";
const USER_AGENT: &str = "narrative-tracker";

/// Repository metadata as returned by `/repos/{owner}/{name}` and search.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Repository {
    pub full_name: String,
    pub html_url: String,
    #[serde(default)]
    pub stargazers_count: u64,
    #[serde(default)]
    pub forks_count: u64,
    #[serde(default)]
    pub open_issues_count: u64,
    pub language: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    pub pushed_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<Repository>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchSort {
    Stars,
    Updated,
}

impl SearchSort {
    fn as_str(&self) -> &'static str {
        match self {
            SearchSort::Stars => "stars",
            SearchSort::Updated => "updated",
        }
    }
}

/// `<topic> created:>YYYY-MM-DD stars:>N`
pub fn created_since_query(topic: &str, since: NaiveDate, min_stars: u32) -> String {
    format!("{topic} created:>{since} stars:>{min_stars}")
}

/// `<topic> pushed:>YYYY-MM-DD stars:>N`
pub fn pushed_since_query(topic: &str, since: NaiveDate, min_stars: u32) -> String {
    format!("{topic} pushed:>{since} stars:>{min_stars}")
}

pub struct GithubClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
    policy: RetryPolicy,
    rate_limit_wait: Duration,
}

impl GithubClient {
    pub fn new(token: Option<String>, policy: RetryPolicy) -> Result<Self> {
        Ok(Self {
            http: policy.http_client(USER_AGENT)?,
            base_url: GITHUB_API.to_string(),
            token,
            policy,
            rate_limit_wait: Duration::from_secs(60),
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_rate_limit_wait(mut self, wait: Duration) -> Self {
        self.rate_limit_wait = wait;
        self
    }

    async fn send(&self, url: &str) -> Result<Response> {
        send_with_retry(&self.policy, "github", || {
            let req = self
                .http
                .get(url)
                .header(ACCEPT, "application/vnd.github.v3+json");
            match &self.token {
                Some(token) => req.bearer_auth(token),
                None => req,
            }
        })
        .await
    }

    /// GET with GitHub's rate-limit quirk: a 403 means "slow down", so wait
    /// once and retry exactly once.
    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!(path, "GitHub request");

        let resp = match self.send(&url).await {
            Err(FetchError::Upstream { status: 403, .. }) => {
                warn!(
                    path,
                    wait_secs = self.rate_limit_wait.as_secs(),
                    "GitHub rate limit hit, waiting before retry"
                );
                tokio::time::sleep(self.rate_limit_wait).await;
                self.send(&url).await?
            }
            other => other?,
        };

        Ok(resp.json::<T>().await?)
    }

    pub async fn get_repo(&self, full_name: &str) -> Result<Repository> {
        self.get_json(&format!("/repos/{full_name}")).await
    }

    pub async fn search_repositories(
        &self,
        query: &str,
        sort: SearchSort,
        per_page: u32,
    ) -> Result<Vec<Repository>> {
        let path = format!(
            "/search/repositories?q={}&sort={}&order=desc&per_page={}",
            urlencoding::encode(query),
            sort.as_str(),
            per_page
        );
        let resp: SearchResponse = self.get_json(&path).await?;
        Ok(resp.items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovery_queries() {
        let since = NaiveDate::from_ymd_opt(2025, 10, 4).unwrap();
        assert_eq!(
            created_since_query("solana", since, 5),
            "solana created:>2025-10-04 stars:>5"
        );
        assert_eq!(
            pushed_since_query("solana", since, 50),
            "solana pushed:>2025-10-04 stars:>50"
        );
    }

    #[test]
    fn repository_tolerates_missing_optional_fields() {
        let repo: Repository = serde_json::from_value(serde_json::json!({
            "full_name": "coral-xyz/anchor",
            "html_url": "https://github.com/coral-xyz/anchor",
            "stargazers_count": 3900,
            "language": null,
            "description": null,
            "pushed_at": "2025-10-17T08:00:00Z",
            "created_at": null
        }))
        .unwrap();
        assert_eq!(repo.stargazers_count, 3900);
        assert!(repo.topics.is_empty());
        assert_eq!(repo.forks_count, 0);
    }
}
