//! API route definitions
//!
//! - /api/latest_cycle_data, /api/cycle_data_by_time, /api/cycles, /api/raw_data - persisted history
//! - /api/db_stats, /api/db_test - database diagnostics
//! - /api/status - pipeline counters and connection state
//! - /api/projection/* - PRPS surface and PRPD scatter
//! - /api/view, /api/export/csv - render options and CSV export
//! - /api/cycles/*, /api/persistence, /api/connection - runtime control
//! - /ws - live cycle channel

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{self, MonitorState};
use super::live;

/// Create all API routes
pub fn api_routes(state: MonitorState) -> Router {
    Router::new()
        // Persisted history
        .route("/latest_cycle_data", get(handlers::get_latest_cycle_data))
        .route("/cycle_data_by_time", get(handlers::get_cycle_data_by_time))
        .route(
            "/cycles",
            get(handlers::get_cycle_page).delete(handlers::clear_history),
        )
        .route("/raw_data", get(handlers::get_raw_data))
        .route("/db_stats", get(handlers::get_db_stats))
        .route("/db_test", get(handlers::get_db_test))
        // Pipeline
        .route("/status", get(handlers::get_status))
        .route("/projection/surface", get(handlers::get_surface))
        .route("/projection/prpd", get(handlers::get_prpd))
        .route("/view", get(handlers::get_view).post(handlers::set_view))
        .route("/export/csv", get(handlers::export_csv))
        // Control
        .route("/cycles/reset", post(handlers::reset_cycles))
        .route("/cycles/capacity", post(handlers::set_capacity))
        .route("/persistence", post(handlers::set_persistence))
        .route(
            "/connection",
            post(handlers::connect).delete(handlers::disconnect),
        )
        .with_state(state)
}

/// Live channel at the root level
pub fn live_routes(state: MonitorState) -> Router {
    Router::new()
        .route("/ws", get(live::ws_cycles))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::{IngestController, IngestSettings};
    use crate::config::MonitorConfig;
    use crate::pipeline::{IngestQueue, SharedState};
    use crate::storage::CycleLog;
    use crate::types::Cycle;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn create_test_state(dir: &tempfile::TempDir) -> MonitorState {
        let config = MonitorConfig::default();
        let log = CycleLog::open(dir.path().join("api.db")).await.unwrap();
        let queue = IngestQueue::new(10);
        let (raw_tx, _raw_rx) = crossbeam_channel::bounded(16);
        let (shared, _frame_tx) = SharedState::new(3, 3, false);
        let ingest = IngestController::new(queue.clone(), raw_tx, IngestSettings::from(&config));
        MonitorState::new(shared, log, queue, Arc::new(ingest), &config)
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null))
    }

    async fn post_json(app: Router, uri: &str, body: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null))
    }

    #[tokio::test]
    async fn test_latest_cycle_data_ascending() {
        let dir = tempfile::tempdir().unwrap();
        let state = create_test_state(&dir).await;
        for n in 1..=3 {
            assert!(state.log.save_cycle(n, &[n as f64]).await);
        }

        let (status, body) = get_json(api_routes(state), "/latest_cycle_data?count=2").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        let ids: Vec<i64> = body["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["id"].as_i64().unwrap())
            .collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[tokio::test]
    async fn test_latest_cycle_data_rejects_zero_count() {
        let dir = tempfile::tempdir().unwrap();
        let state = create_test_state(&dir).await;
        let (status, body) = get_json(api_routes(state), "/latest_cycle_data?count=0").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_cycle_paging_and_raw_offset() {
        let dir = tempfile::tempdir().unwrap();
        let state = create_test_state(&dir).await;
        for n in 1..=5 {
            assert!(state.log.save_cycle(n, &[]).await);
        }
        for hex in ["00", "01", "02"] {
            assert!(state.log.save_raw("broker", "pub1", hex).await);
        }

        let (status, body) = get_json(api_routes(state.clone()), "/cycles?limit=2&offset=1").await;
        assert_eq!(status, StatusCode::OK);
        let numbers: Vec<i64> = body["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["cycle_number"].as_i64().unwrap())
            .collect();
        assert_eq!(numbers, vec![4, 3]);

        let (_, body) = get_json(api_routes(state.clone()), "/raw_data?count=1&offset=1").await;
        assert_eq!(body["data"][0]["raw_data"], "01");

        let (status, _) = get_json(api_routes(state), "/cycles?offset=-1").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_clear_history_keeps_windows() {
        let dir = tempfile::tempdir().unwrap();
        let state = create_test_state(&dir).await;
        assert!(state.log.save_cycle(1, &[0.1]).await);
        state.shared.store.write().await.accept(Cycle::new(1, vec![0.1]));

        let response = api_routes(state.clone())
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/cycles")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(state.log.count_cycles().await.unwrap(), 0);
        assert_eq!(state.shared.store.read().await.accumulated(), 1);
    }

    #[tokio::test]
    async fn test_db_test_is_flat() {
        let dir = tempfile::tempdir().unwrap();
        let state = create_test_state(&dir).await;
        assert!(state.log.save_cycle(1, &[0.1, 0.2]).await);

        let (status, body) = get_json(api_routes(state), "/db_test").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["cycle_data_count"], 1);
        assert_eq!(body["raw_data_count"], 0);
        assert_eq!(body["latest_cycle"]["data_length"], 2);
        let tables = body["tables"].as_array().unwrap();
        assert!(tables.iter().any(|t| t == "cycle_data"));
        assert!(tables.iter().any(|t| t == "raw_data"));
    }

    #[tokio::test]
    async fn test_status_reports_windows() {
        let dir = tempfile::tempdir().unwrap();
        let state = create_test_state(&dir).await;
        state.shared.store.write().await.accept(Cycle::new(1, vec![0.1]));

        let (status, body) = get_json(api_routes(state), "/status").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["counter"], 2);
        assert_eq!(body["data"]["max_cycles"], 3);
        assert_eq!(body["data"]["accumulated"], 1);
        assert_eq!(body["data"]["connection"]["connected"], false);
        assert_eq!(body["data"]["persist_enabled"], false);
    }

    #[tokio::test]
    async fn test_prpd_with_params_uses_store_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let state = create_test_state(&dir).await;
        state
            .shared
            .store
            .write()
            .await
            .accept(Cycle::new(1, vec![1.0, 2.0, 3.0]));

        let (status, body) = get_json(api_routes(state), "/projection/prpd?unit=dbm&sine=false").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["points"].as_array().unwrap().len(), 3);
        assert_eq!(body["data"]["unit"], "decibel");
        assert!(body["data"]["reference"].is_null());
    }

    #[tokio::test]
    async fn test_surface_without_params_serves_rendered_frame() {
        let dir = tempfile::tempdir().unwrap();
        let state = create_test_state(&dir).await;
        state.shared.store.write().await.accept(Cycle::new(1, vec![1.0]));

        // Nothing rendered yet: the cached frame is still empty
        let (_, cached) = get_json(api_routes(state.clone()), "/projection/surface").await;
        assert!(cached["data"]["z_matrix"].as_array().unwrap().is_empty());

        let (_, fresh) = get_json(api_routes(state), "/projection/surface?unit=mv").await;
        assert_eq!(fresh["data"]["z_matrix"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_capacity_and_reset() {
        let dir = tempfile::tempdir().unwrap();
        let state = create_test_state(&dir).await;
        for i in 1..=3 {
            state.shared.store.write().await.accept(Cycle::new(i, vec![0.1]));
        }

        let (status, body) = post_json(api_routes(state.clone()), "/cycles/capacity", r#"{"capacity":2}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["max_cycles"], 2);
        assert_eq!(body["data"]["counter"], 2);
        assert_eq!(body["data"]["accumulated"], 2);

        let (status, _) = post_json(api_routes(state.clone()), "/cycles/capacity", r#"{"capacity":0}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = post_json(api_routes(state.clone()), "/cycles/reset", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["counter"], 1);
        assert_eq!(body["data"]["accumulated"], 0);
        assert!(state.shared.take_dirty());
    }

    #[tokio::test]
    async fn test_persistence_toggle() {
        let dir = tempfile::tempdir().unwrap();
        let state = create_test_state(&dir).await;
        let (status, body) = post_json(api_routes(state.clone()), "/persistence", r#"{"enabled":true}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["enabled"], true);
        assert!(state.shared.persist_enabled());
    }

    #[tokio::test]
    async fn test_view_update_marks_dirty() {
        let dir = tempfile::tempdir().unwrap();
        let state = create_test_state(&dir).await;
        let (status, body) = post_json(api_routes(state.clone()), "/view", r#"{"unit":"decibel"}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["unit"], "decibel");
        assert!(state.shared.take_dirty());

        let (status, _) = post_json(api_routes(state), "/view", r#"{"amplitude":-1.0}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_export_csv_headerless() {
        let dir = tempfile::tempdir().unwrap();
        let state = create_test_state(&dir).await;
        for i in 1..=3 {
            state
                .shared
                .store
                .write()
                .await
                .accept(Cycle::new(i, vec![i as f64, 0.5]));
        }

        let response = api_routes(state)
            .oneshot(
                Request::builder()
                    .uri("/export/csv?cycles=2")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/csv");
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec!["2.0,0.5", "3.0,0.5"]);
    }

    #[tokio::test]
    async fn test_connect_rejects_empty_topic() {
        let dir = tempfile::tempdir().unwrap();
        let state = create_test_state(&dir).await;
        let (status, body) = post_json(
            api_routes(state),
            "/connection",
            r#"{"host":"127.0.0.1","port":1883,"topic":""}"#,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_disconnect_when_idle() {
        let dir = tempfile::tempdir().unwrap();
        let state = create_test_state(&dir).await;
        let response = api_routes(state)
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/connection")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["data"]["was_running"], false);
        assert_eq!(body["data"]["connection"]["message"], "Disconnected");
    }
}
