//! PostgREST wire behaviour of the store gateway.

use narrative_common::RetryPolicy;
use narrative_store::{Collection, DashboardSnapshot, Query, StoreClient, StoreError, UpsertOutcome};
use serde_json::json;
use wiremock::matchers::{body_json, header, header_regex, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn store(server: &MockServer) -> StoreClient {
    StoreClient::new(server.uri(), "service-key", RetryPolicy::immediate(2)).unwrap()
}

#[tokio::test]
async fn upsert_merges_on_natural_key() {
    let server = MockServer::start().await;
    let row = json!({"report_period": "2025-10-04_2025-10-18", "narrative_slug": "restaking", "confidence": 0.8});
    Mock::given(method("POST"))
        .and(path("/rest/v1/narratives"))
        .and(query_param("on_conflict", "report_period,narrative_slug"))
        .and(header("apikey", "service-key"))
        .and(header("authorization", "Bearer service-key"))
        .and(header_regex("prefer", "resolution=merge-duplicates"))
        .and(body_json(&row))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([row.clone()])))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = store(&server).try_upsert(Collection::Narratives, &row).await;
    assert_eq!(outcome, UpsertOutcome::Stored(row));
}

#[tokio::test]
async fn reports_are_inserted_without_conflict_target() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/reports"))
        .and(header("prefer", "return=representation"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([{"id": 7}])))
        .mount(&server)
        .await;

    let outcome = store(&server)
        .try_upsert(Collection::Reports, &json!({"title": "t"}))
        .await;
    assert_eq!(outcome, UpsertOutcome::Stored(json!({"id": 7})));
    let received = server.received_requests().await.unwrap();
    assert_eq!(received[0].url.query(), None);
}

#[tokio::test]
async fn failed_write_is_skipped_not_raised() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;

    let outcome = store(&server)
        .try_upsert(Collection::SocialSignals, &json!({"tweet_id": "1"}))
        .await;
    assert!(matches!(outcome, UpsertOutcome::Skipped { .. }));
}

#[tokio::test]
async fn append_only_insert_is_attempted_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/reports"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = store(&server)
        .try_upsert(Collection::Reports, &json!({"title": "t"}))
        .await;
    assert!(matches!(outcome, UpsertOutcome::Skipped { .. }));
}

#[tokio::test]
async fn update_patches_by_id() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/scan_runs"))
        .and(query_param("id", "eq.0b1c"))
        .and(body_json(json!({"status": "completed"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": "0b1c", "status": "completed"}])))
        .mount(&server)
        .await;

    let outcome = store(&server)
        .try_update(Collection::ScanRuns, "0b1c", &json!({"status": "completed"}))
        .await;
    assert!(outcome.is_stored());
}

#[tokio::test]
async fn update_of_missing_row_is_skipped() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let outcome = store(&server)
        .try_update(Collection::ScanRuns, "missing", &json!({"status": "failed"}))
        .await;
    assert!(matches!(outcome, UpsertOutcome::Skipped { .. }));
}

#[tokio::test]
async fn reads_raise_on_client_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad column"))
        .expect(1)
        .mount(&server)
        .await;

    let err = store(&server)
        .must_get(&Query::from(Collection::SocialSignals).limit(1))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Request(_)));
}

#[tokio::test]
async fn snapshot_reads_everything_with_given_key() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/reports"))
        .and(query_param("order", "created_at.desc"))
        .and(query_param("limit", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"title": "latest"}])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/narratives"))
        .and(query_param("order", "confidence.desc"))
        .and(query_param("limit", "20"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"narrative_name": "A", "confidence": 0.9},
            {"narrative_name": "B", "confidence": 0.5}
        ])))
        .mount(&server)
        .await;
    for (table, total) in [("social_signals", "42"), ("github_signals", "7"), ("onchain_signals", "0")] {
        let range = if total == "0" { "*/0".to_string() } else { format!("0-0/{total}") };
        Mock::given(method("GET"))
            .and(path(format!("/rest/v1/{table}")))
            .and(header("prefer", "count=exact"))
            .and(header("apikey", "anon-key"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-range", range.as_str())
                    .set_body_json(json!([])),
            )
            .mount(&server)
            .await;
    }

    let anon = StoreClient::new(server.uri(), "anon-key", RetryPolicy::immediate(1)).unwrap();
    let snapshot = DashboardSnapshot::load(&anon).await.unwrap();
    assert_eq!(snapshot.latest_report, Some(json!({"title": "latest"})));
    assert_eq!(snapshot.narratives.len(), 2);
    assert_eq!(snapshot.social_signals, 42);
    assert_eq!(snapshot.github_signals, 7);
    assert_eq!(snapshot.onchain_signals, 0);
    assert_eq!(snapshot.total_signals(), 49);
}

#[tokio::test]
async fn count_without_content_range_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let err = store(&server).count(Collection::Reports).await.unwrap_err();
    assert!(matches!(err, StoreError::Count(_)));
}
