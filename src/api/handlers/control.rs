//! Runtime status and control endpoints

use axum::extract::State;
use axum::response::Response;
use axum::Json;
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::acquisition::{BrokerTarget, TransportError};
use crate::api::envelope::{ApiErrorResponse, ApiResponse};
use crate::types::{ConnectionStatus, UnitMode};

use super::MonitorState;

// ============================================================================
// Status Endpoint
// ============================================================================

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub connection: ConnectionStatus,
    pub target: Option<BrokerTarget>,
    pub ingest_running: bool,
    /// Cycles numbered by ingestion since startup
    pub sequence: u64,
    /// Saturating cycle counter (1..=max_cycles)
    pub counter: u32,
    pub max_cycles: u32,
    pub accumulated: usize,
    pub surface_capacity: usize,
    pub total_points: usize,
    pub queue_depth: usize,
    pub queue_capacity: usize,
    pub queue_dropped: u64,
    pub persist_enabled: bool,
    pub unit: UnitMode,
    pub frame_no: u64,
    pub uptime_secs: i64,
}

/// GET /api/status - counters, capacities, queue depth and connection state
pub async fn get_status(State(state): State<MonitorState>) -> Response {
    let (counter, max_cycles, accumulated, surface_capacity, total_points) = {
        let store = state.shared.store.read().await;
        (
            store.counter(),
            store.max_cycles(),
            store.accumulated(),
            store.surface_capacity(),
            store.total_points(),
        )
    };

    ApiResponse::ok(StatusResponse {
        connection: state.ingest.status(),
        target: state.ingest.current_target(),
        ingest_running: state.ingest.is_running(),
        sequence: state.ingest.sequence(),
        counter,
        max_cycles,
        accumulated,
        surface_capacity,
        total_points,
        queue_depth: state.queue.len(),
        queue_capacity: state.queue.capacity(),
        queue_dropped: state.queue.dropped(),
        persist_enabled: state.shared.persist_enabled(),
        unit: state.shared.view.read().await.unit,
        frame_no: state.shared.latest_frame().frame_no,
        uptime_secs: (Local::now() - state.started_at).num_seconds(),
    })
}

// ============================================================================
// Window Control
// ============================================================================

#[derive(Debug, Serialize)]
pub struct WindowResponse {
    pub counter: u32,
    pub max_cycles: u32,
    pub accumulated: usize,
}

/// POST /api/cycles/reset - clear both windows, restart the counter
///
/// Persisted rows are left alone.
pub async fn reset_cycles(State(state): State<MonitorState>) -> Response {
    let resp = {
        let mut store = state.shared.store.write().await;
        store.reset();
        WindowResponse {
            counter: store.counter(),
            max_cycles: store.max_cycles(),
            accumulated: store.accumulated(),
        }
    };
    state.shared.mark_dirty();
    info!("🔄 [API] Cycle windows reset");
    ApiResponse::ok(resp)
}

#[derive(Debug, Deserialize)]
pub struct CapacityRequest {
    pub capacity: usize,
}

/// POST /api/cycles/capacity - resize the accumulation window
pub async fn set_capacity(
    State(state): State<MonitorState>,
    Json(req): Json<CapacityRequest>,
) -> Response {
    if req.capacity == 0 {
        return ApiErrorResponse::bad_request("capacity must be at least 1");
    }
    let resp = {
        let mut store = state.shared.store.write().await;
        store.resize_accumulation(req.capacity);
        WindowResponse {
            counter: store.counter(),
            max_cycles: store.max_cycles(),
            accumulated: store.accumulated(),
        }
    };
    state.shared.mark_dirty();
    info!(capacity = req.capacity, "[API] Accumulation window resized");
    ApiResponse::ok(resp)
}

// ============================================================================
// Persistence Toggle
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct PersistenceRequest {
    pub enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct PersistenceResponse {
    pub enabled: bool,
}

/// POST /api/persistence - enable or disable cycle/raw frame logging
pub async fn set_persistence(
    State(state): State<MonitorState>,
    Json(req): Json<PersistenceRequest>,
) -> Response {
    state.shared.set_persist(req.enabled);
    info!(enabled = req.enabled, "💾 [API] Persistence toggled");
    ApiResponse::ok(PersistenceResponse {
        enabled: req.enabled,
    })
}

// ============================================================================
// Broker Connection
// ============================================================================

/// POST /api/connection - (re)connect to a broker/topic
///
/// Any running session is stopped first. The call returns once the new
/// session is started; the CONNACK outcome shows up in `/api/status`.
pub async fn connect(
    State(state): State<MonitorState>,
    Json(target): Json<BrokerTarget>,
) -> Response {
    if let Err(e) = target.validate() {
        return ApiErrorResponse::bad_request(e.to_string());
    }

    let ingest = Arc::clone(&state.ingest);
    let requested = target.clone();
    let result = tokio::task::spawn_blocking(move || ingest.connect(requested)).await;

    match result {
        Ok(Ok(())) => {
            info!(broker = %target.address(), topic = %target.topic, "📡 [API] Connection requested");
            ApiResponse::ok(state.ingest.status())
        }
        Ok(Err(TransportError::InvalidTarget(msg))) => ApiErrorResponse::bad_request(msg),
        Ok(Err(e)) => {
            warn!(error = %e, "[API] Connect failed");
            ApiErrorResponse::service_unavailable(e.to_string())
        }
        Err(e) => ApiErrorResponse::internal(format!("connect task failed: {}", e)),
    }
}

#[derive(Debug, Serialize)]
pub struct DisconnectResponse {
    pub was_running: bool,
    pub connection: ConnectionStatus,
}

/// DELETE /api/connection - stop ingestion and flush the queue
pub async fn disconnect(State(state): State<MonitorState>) -> Response {
    let ingest = Arc::clone(&state.ingest);
    match tokio::task::spawn_blocking(move || ingest.disconnect()).await {
        Ok(was_running) => {
            info!(was_running, "[API] Disconnected");
            ApiResponse::ok(DisconnectResponse {
                was_running,
                connection: state.ingest.status(),
            })
        }
        Err(e) => ApiErrorResponse::internal(format!("disconnect task failed: {}", e)),
    }
}
