//! Projection endpoints: PRPS surface, PRPD scatter, view options, CSV export

use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use crate::api::envelope::{ApiErrorResponse, ApiResponse};
use crate::processing::{project_prpd, resample, PrpdOptions};
use crate::storage::{cycles_to_csv, export};
use crate::types::UnitMode;

use super::MonitorState;

// ============================================================================
// Projections
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct SurfaceQuery {
    pub unit: Option<UnitMode>,
}

/// GET /api/projection/surface?unit= - PRPS grid over the surface window
///
/// Without a unit the last rendered frame is served as-is.
pub async fn get_surface(
    State(state): State<MonitorState>,
    Query(query): Query<SurfaceQuery>,
) -> Response {
    match query.unit {
        None => ApiResponse::ok(state.shared.latest_frame().surface.clone()),
        Some(unit) => {
            let window = state.shared.store.read().await.surface_window();
            ApiResponse::ok(resample(&window, unit))
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PrpdQuery {
    pub unit: Option<UnitMode>,
    pub sine: Option<bool>,
    pub amplitude: Option<f64>,
}

impl PrpdQuery {
    fn is_empty(&self) -> bool {
        self.unit.is_none() && self.sine.is_none() && self.amplitude.is_none()
    }

    /// Overlay query parameters on the current view options.
    fn apply(&self, mut opts: PrpdOptions) -> PrpdOptions {
        if let Some(unit) = self.unit {
            opts.unit = unit;
        }
        if let Some(sine) = self.sine {
            opts.show_sine = sine;
        }
        if let Some(amplitude) = self.amplitude {
            opts.sine_amplitude = amplitude;
        }
        opts
    }
}

fn check_amplitude(amplitude: f64) -> Result<(), Response> {
    if amplitude.is_finite() && amplitude >= 0.0 {
        Ok(())
    } else {
        Err(ApiErrorResponse::bad_request(
            "amplitude must be a non-negative number",
        ))
    }
}

/// GET /api/projection/prpd?unit=&sine=&amplitude= - PRPD scatter over the
/// accumulation window
pub async fn get_prpd(State(state): State<MonitorState>, Query(query): Query<PrpdQuery>) -> Response {
    if query.is_empty() {
        return ApiResponse::ok(state.shared.latest_frame().prpd.clone());
    }
    let opts = query.apply(*state.shared.view.read().await);
    if let Err(resp) = check_amplitude(opts.sine_amplitude) {
        return resp;
    }

    let (window, max_cycles) = {
        let store = state.shared.store.read().await;
        (store.accumulation_window(), store.max_cycles() as usize)
    };
    ApiResponse::ok(project_prpd(&window, max_cycles, opts))
}

// ============================================================================
// View Options
// ============================================================================

/// GET /api/view - options used by the periodic render
pub async fn get_view(State(state): State<MonitorState>) -> Response {
    ApiResponse::ok(*state.shared.view.read().await)
}

/// POST /api/view - change unit / reference sine for subsequent renders
pub async fn set_view(State(state): State<MonitorState>, Json(update): Json<PrpdQuery>) -> Response {
    let current = *state.shared.view.read().await;
    let next = update.apply(current);
    if let Err(resp) = check_amplitude(next.sine_amplitude) {
        return resp;
    }

    *state.shared.view.write().await = next;
    if next != current {
        tracing::info!(unit = %next.unit, sine = next.show_sine, "[API] View options changed");
        state.shared.mark_dirty();
    }
    ApiResponse::ok(next)
}

// ============================================================================
// CSV Export
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    pub cycles: Option<usize>,
}

/// GET /api/export/csv?cycles=50 - headerless CSV of the most recent cycles
pub async fn export_csv(
    State(state): State<MonitorState>,
    Query(query): Query<ExportQuery>,
) -> Response {
    let k = query.cycles.unwrap_or(state.export_cycles);
    if k == 0 {
        return ApiErrorResponse::bad_request("cycles must be positive");
    }

    let cycles = state.shared.store.read().await.latest(k);
    match cycles_to_csv(&cycles, k) {
        Ok(body) => {
            let disposition = format!("attachment; filename=\"{}\"", export::default_filename());
            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, "text/csv".to_string()),
                    (header::CONTENT_DISPOSITION, disposition),
                ],
                body,
            )
                .into_response()
        }
        Err(e) => {
            tracing::warn!(error = %e, "[API] CSV export failed");
            ApiErrorResponse::internal(e.to_string())
        }
    }
}
