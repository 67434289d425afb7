//! HTTP-level tests for the GitHub and DeFi Llama clients against a local
//! mock server.

use std::time::Duration;

use narrative_common::RetryPolicy;
use narrative_sources::{DefiLlamaClient, FetchError, GithubClient, SearchSort};
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn anchor_repo() -> serde_json::Value {
    json!({
        "full_name": "coral-xyz/anchor",
        "html_url": "https://github.com/coral-xyz/anchor",
        "stargazers_count": 3900,
        "forks_count": 1300,
        "open_issues_count": 250,
        "language": "Rust",
        "description": "Solana Sealevel Framework",
        "topics": ["solana", "rust"],
        "pushed_at": "2025-10-17T08:00:00Z",
        "created_at": "2021-01-04T00:00:00Z"
    })
}

fn github(server: &MockServer) -> GithubClient {
    GithubClient::new(Some("ghp_test".into()), RetryPolicy::immediate(1))
        .unwrap()
        .with_base_url(server.uri())
        .with_rate_limit_wait(Duration::ZERO)
}

// ---------------------------------------------------------------------------
// GitHub
// ---------------------------------------------------------------------------

#[tokio::test]
async fn github_sends_auth_and_accept_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/coral-xyz/anchor"))
        .and(header("authorization", "Bearer ghp_test"))
        .and(header("accept", "application/vnd.github.v3+json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(anchor_repo()))
        .expect(1)
        .mount(&server)
        .await;

    let repo = github(&server).get_repo("coral-xyz/anchor").await.unwrap();
    assert_eq!(repo.stargazers_count, 3900);
    assert_eq!(repo.language.as_deref(), Some("Rust"));
    assert_eq!(repo.topics, vec!["solana", "rust"]);
}

#[tokio::test]
async fn github_403_waits_then_retries_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/coral-xyz/anchor"))
        .respond_with(ResponseTemplate::new(403).set_body_string("rate limited"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/coral-xyz/anchor"))
        .respond_with(ResponseTemplate::new(200).set_body_json(anchor_repo()))
        .mount(&server)
        .await;

    let repo = github(&server).get_repo("coral-xyz/anchor").await.unwrap();
    assert_eq!(repo.full_name, "coral-xyz/anchor");
}

#[tokio::test]
async fn github_second_403_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(403))
        .expect(2)
        .mount(&server)
        .await;

    let err = github(&server).get_repo("a/b").await.unwrap_err();
    assert_eq!(err.status(), Some(403));
}

#[tokio::test]
async fn github_404_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let err = github(&server).get_repo("gone/repo").await.unwrap_err();
    assert!(matches!(err, FetchError::Upstream { status: 404, .. }));
}

#[tokio::test]
async fn github_search_encodes_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search/repositories"))
        .and(query_param("q", "solana created:>2025-10-04 stars:>5"))
        .and(query_param("sort", "stars"))
        .and(query_param("per_page", "20"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"total_count": 1, "items": [anchor_repo()]})),
        )
        .mount(&server)
        .await;

    let items = github(&server)
        .search_repositories("solana created:>2025-10-04 stars:>5", SearchSort::Stars, 20)
        .await
        .unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].forks_count, 1300);
}

// ---------------------------------------------------------------------------
// DeFi Llama
// ---------------------------------------------------------------------------

fn llama(server: &MockServer) -> DefiLlamaClient {
    DefiLlamaClient::new(RetryPolicy::immediate(2))
        .unwrap()
        .with_base_url(server.uri())
}

#[tokio::test]
async fn llama_chain_history() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/historicalChainTvl/Solana"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"date": 1759276800, "tvl": 9.1e9},
            {"date": 1759363200, "tvl": 9.4e9}
        ])))
        .mount(&server)
        .await;

    let points = llama(&server).chain_tvl_history("Solana").await.unwrap();
    assert_eq!(points.len(), 2);
    assert_eq!(points[1].tvl, 9.4e9);
}

#[tokio::test]
async fn llama_protocol_detail_and_ranking() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/protocol/kamino"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "Kamino",
            "category": "Lending",
            "url": "https://kamino.finance",
            "currentChainTvls": {"Solana": 2.0e9},
            "chainTvls": {"Solana": {"tvl": [
                {"date": 1, "totalLiquidityUSD": 1.5e9},
                {"date": 2, "totalLiquidityUSD": 2.0e9}
            ]}},
            "tvl": []
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/protocols"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"name": "Jito", "slug": "jito", "chains": ["Solana"], "tvl": 3.0e9, "change_7d": 12.5, "category": "Liquid Staking"},
            {"name": "Lido", "slug": "lido", "chains": ["Ethereum"], "tvl": 3.0e10, "change_7d": null}
        ])))
        .mount(&server)
        .await;

    let client = llama(&server);
    let kamino = client.protocol("kamino").await.unwrap();
    assert_eq!(kamino.current_tvl("Solana"), 2.0e9);
    assert_eq!(kamino.tvl_history("Solana"), vec![1.5e9, 2.0e9]);

    let ranking = client.protocols().await.unwrap();
    assert_eq!(ranking.len(), 2);
    assert_eq!(ranking[0].change_7d, Some(12.5));
    assert_eq!(ranking[1].change_7d, None);
}

#[tokio::test]
async fn llama_retries_server_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/protocols"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/protocols"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    assert!(llama(&server).protocols().await.unwrap().is_empty());
}
