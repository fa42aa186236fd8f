//! API Regression Tests
//!
//! In-process tests that build the Axum app via `create_app()` and exercise
//! the /api/* endpoints using `tower::ServiceExt::oneshot()` against a fresh
//! SQLite file. No binary spawn, no network port.

use gis_pd_monitor::acquisition::{IngestController, IngestSettings};
use gis_pd_monitor::api::{create_app, MonitorState};
use gis_pd_monitor::config::MonitorConfig;
use gis_pd_monitor::pipeline::{IngestQueue, SharedState};
use gis_pd_monitor::storage::CycleLog;
use gis_pd_monitor::types::Cycle;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use std::sync::Arc;
use tower::ServiceExt;

async fn create_test_state(dir: &tempfile::TempDir) -> MonitorState {
    let config = MonitorConfig::default();
    let log = CycleLog::open(dir.path().join("regression.db")).await.unwrap();
    let queue = IngestQueue::new(config.windows.queue_capacity);
    let (raw_tx, _raw_rx) = crossbeam_channel::bounded(config.storage.raw_channel_capacity);
    let (shared, _frame_tx) = SharedState::new(
        config.windows.accumulation_cycles,
        config.windows.surface_cycles,
        false,
    );
    let ingest = IngestController::new(queue.clone(), raw_tx, IngestSettings::from(&config));
    MonitorState::new(shared, log, queue, Arc::new(ingest), &config)
}

async fn get(state: &MonitorState, uri: &str) -> (StatusCode, serde_json::Value) {
    let resp = create_app(state.clone())
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}

/// Every JSON GET endpoint answers with a success envelope on an empty database.
#[tokio::test]
async fn test_get_endpoints_return_success_on_fresh_db() {
    let dir = tempfile::tempdir().unwrap();
    let state = create_test_state(&dir).await;

    let endpoints = [
        "/api/latest_cycle_data",
        "/api/latest_cycle_data?count=50",
        "/api/cycle_data_by_time?start_time=2024-01-01&end_time=2024-12-31",
        "/api/raw_data",
        "/api/db_stats",
        "/api/db_test",
        "/api/status",
        "/api/projection/surface",
        "/api/projection/surface?unit=decibel",
        "/api/projection/prpd",
        "/api/projection/prpd?unit=mv&sine=true&amplitude=0.5",
        "/api/view",
    ];

    for endpoint in &endpoints {
        let (status, body) = get(&state, endpoint).await;
        assert_eq!(status, StatusCode::OK, "GET {} returned {}", endpoint, status);
        assert_eq!(body["success"], true, "GET {} was not a success envelope", endpoint);
    }
}

#[tokio::test]
async fn test_db_stats_on_fresh_db() {
    let dir = tempfile::tempdir().unwrap();
    let state = create_test_state(&dir).await;

    let (_, body) = get(&state, "/api/db_stats").await;
    assert_eq!(body["data"]["cycle_count"], 0);
    assert_eq!(body["data"]["raw_count"], 0);
    assert!(body["data"]["latest_cycle"].is_null());
    assert!(body["data"]["earliest_cycle"].is_null());
}

#[tokio::test]
async fn test_time_range_query_is_inclusive_and_ascending() {
    let dir = tempfile::tempdir().unwrap();
    let state = create_test_state(&dir).await;

    let at = |s: &str| {
        chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
            .unwrap()
            .and_local_timezone(chrono::Local)
            .unwrap()
    };
    state.log.save_cycle_at(&at("2024-05-01 12:00:02"), 2, &[0.2]).await;
    state.log.save_cycle_at(&at("2024-05-01 12:00:00"), 1, &[0.1]).await;
    state.log.save_cycle_at(&at("2024-05-02 00:00:00"), 3, &[0.3]).await;

    let (status, body) = get(
        &state,
        "/api/cycle_data_by_time?start_time=2024-05-01%2012:00:00&end_time=2024-05-01%2023:59:59",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let numbers: Vec<i64> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["cycle_number"].as_i64().unwrap())
        .collect();
    assert_eq!(numbers, vec![1, 2]);
}

#[tokio::test]
async fn test_inverted_time_range_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let state = create_test_state(&dir).await;
    state.log.save_cycle(1, &[0.1]).await;

    let (status, body) = get(
        &state,
        "/api/cycle_data_by_time?start_time=2999-06-01&end_time=2000-05-01",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_export_csv_defaults_to_configured_count() {
    let dir = tempfile::tempdir().unwrap();
    let state = create_test_state(&dir).await;
    {
        let mut store = state.shared.store.write().await;
        for i in 1..=60 {
            store.accept(Cycle::new(i, vec![0.1, 0.2]));
        }
    }

    let resp = create_app(state.clone())
        .oneshot(
            Request::builder()
                .uri("/api/export/csv")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert_eq!(text.lines().count(), 50);
    assert!(text.lines().all(|l| l == "0.1,0.2"));
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let dir = tempfile::tempdir().unwrap();
    let state = create_test_state(&dir).await;
    let (status, _) = get(&state, "/api/does_not_exist").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
