mod common;

use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue, StatusCode};
use serde_json::{json, Value};

use common::{test_server, FixedCatalog};
use trackmyseries::middleware::{REQUEST_ID_HEADER, USER_ID_HEADER};

fn user(id: &'static str) -> (HeaderName, HeaderValue) {
    (
        HeaderName::from_static(USER_ID_HEADER),
        HeaderValue::from_static(id),
    )
}

#[tokio::test]
async fn test_health_check() {
    let (server, _) = test_server(Arc::new(FixedCatalog::default())).await;

    let response = server.get("/health").await;
    response.assert_status_ok();
    response.assert_json(&json!({ "status": "healthy" }));
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let (server, _) = test_server(Arc::new(FixedCatalog::default())).await;

    let response = server
        .get("/health")
        .add_header(
            HeaderName::from_static(REQUEST_ID_HEADER),
            HeaderValue::from_static("0b7f6c55-5d5e-4d2c-9f5a-0d3c6f1f2a10"),
        )
        .await;

    assert_eq!(
        response.header(REQUEST_ID_HEADER),
        "0b7f6c55-5d5e-4d2c-9f5a-0d3c6f1f2a10"
    );
}

#[tokio::test]
async fn test_missing_identity_is_unauthorized() {
    let (server, _) = test_server(Arc::new(FixedCatalog::default())).await;

    server
        .get("/episodes")
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    server
        .post("/episodes")
        .json(&json!({ "show_id": 42, "season": 1, "episode": 1001 }))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_upsert_rejects_missing_fields() {
    let (server, state) = test_server(Arc::new(FixedCatalog::default())).await;
    let (name, value) = user("alice");

    let response = server
        .post("/episodes")
        .add_header(name, value)
        .json(&json!({ "show_id": 42, "episode": 1001 }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert!(body["error"].as_str().unwrap().contains("season"));

    assert!(state.store.records("alice", 42).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_upsert_then_read_detail_and_aggregate() {
    let catalog = Arc::new(FixedCatalog::new(&[(42, 62)]));
    let (server, state) = test_server(catalog.clone()).await;

    for episode in [1001, 1002, 1003] {
        let (name, value) = user("alice");
        let response = server
            .post("/episodes")
            .add_header(name, value)
            .json(&json!({ "show_id": 42, "season": 1, "episode": episode, "seen": 1 }))
            .await;
        response.assert_status_ok();
        response.assert_json(&json!({ "ok": true }));
    }
    state.backfill.wait_idle().await;

    let (name, value) = user("alice");
    let detail: Vec<Value> = server
        .get("/episodes")
        .add_query_param("show_id", 42)
        .add_header(name, value)
        .await
        .json();
    let episodes: Vec<u64> = detail
        .iter()
        .filter(|row| row["season"] != 0)
        .map(|row| row["episode"].as_u64().unwrap())
        .collect();
    assert_eq!(episodes.len(), 3);
    assert!(episodes.contains(&1002));

    let (name, value) = user("alice");
    let aggregate: Value = server.get("/episodes").add_header(name, value).await.json();
    assert_eq!(
        aggregate,
        json!([{ "show_id": 42, "total_episodes": 62, "seen_count": 3 }])
    );

    assert!(catalog.calls() >= 1);
}

#[tokio::test]
async fn test_unseen_episode_drops_from_count() {
    let (server, _) = test_server(Arc::new(FixedCatalog::new(&[(42, 10)]))).await;

    for (episode, seen) in [(1, true), (2, true), (1, false)] {
        let (name, value) = user("alice");
        server
            .post("/episodes")
            .add_header(name, value)
            .json(&json!({
                "show_id": 42,
                "season": 1,
                "episode": episode,
                "seen": seen,
                "total_episodes": 10
            }))
            .await
            .assert_status_ok();
    }

    let (name, value) = user("alice");
    let aggregate: Value = server.get("/episodes").add_header(name, value).await.json();
    assert_eq!(aggregate[0]["seen_count"], 1);
    assert_eq!(aggregate[0]["total_episodes"], 10);
}

#[tokio::test]
async fn test_progress_is_scoped_per_user() {
    let (server, _) = test_server(Arc::new(FixedCatalog::new(&[(42, 10)]))).await;

    let (name, value) = user("alice");
    server
        .post("/episodes")
        .add_header(name, value)
        .json(&json!({ "show_id": 42, "season": 1, "episode": 1, "total_episodes": 10 }))
        .await
        .assert_status_ok();

    let (name, value) = user("bob");
    let rows: Vec<Value> = server.get("/episodes").add_header(name, value).await.json();
    assert!(rows.is_empty());
}

#[tokio::test]
async fn test_aggregate_read_backfills_unknown_total() {
    let catalog = Arc::new(FixedCatalog::new(&[(7, 24)]));
    let (server, state) = test_server(catalog.clone()).await;

    // Written straight to the store so no upsert-triggered backfill runs
    state
        .store
        .upsert_seen(
            "alice",
            &trackmyseries::models::SeenUpdate {
                show_id: 7,
                season: 1,
                episode: 1,
                seen: true,
                total_episodes: None,
            },
        )
        .await
        .unwrap();

    let (name, value) = user("alice");
    let first: Value = server.get("/episodes").add_header(name, value).await.json();
    assert_eq!(first[0]["total_episodes"], 0);

    state.backfill.wait_idle().await;
    assert_eq!(catalog.calls(), 1);

    let (name, value) = user("alice");
    let second: Value = server.get("/episodes").add_header(name, value).await.json();
    assert_eq!(second[0]["total_episodes"], 24);
    assert_eq!(second[0]["seen_count"], 1);
}

#[tokio::test]
async fn test_delete_series_clears_progress() {
    let (server, state) = test_server(Arc::new(FixedCatalog::new(&[(42, 10)]))).await;

    let (name, value) = user("alice");
    server
        .post("/episodes")
        .add_header(name, value)
        .json(&json!({ "show_id": 42, "season": 1, "episode": 1, "total_episodes": 10 }))
        .await
        .assert_status_ok();

    let (name, value) = user("alice");
    let response = server.delete("/episodes/42").add_header(name, value).await;
    response.assert_status_ok();
    response.assert_json(&json!({ "ok": true }));

    assert!(state.store.records("alice", 42).await.unwrap().is_empty());
}
