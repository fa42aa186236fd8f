//! REST + WebSocket API using Axum
//!
//! Serves persisted cycle history, projections, runtime control and the
//! live cycle channel for the monitoring dashboard:
//! - `/api/*` JSON endpoints with a `{success, data}` envelope
//! - `/ws` live channel pushing newly persisted cycles

pub mod envelope;
pub mod handlers;
pub mod live;
mod routes;

pub use handlers::{LiveSettings, MonitorState};
pub use live::{CycleFeed, LiveBroadcaster, LivePayload};

use axum::http::{header, Method};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Comma-separated list of origins allowed to call the API cross-origin.
pub const CORS_ENV_VAR: &str = "PD_MONITOR_CORS_ORIGINS";

/// Build a CORS layer that is restrictive by default (same-origin only).
///
/// Set `PD_MONITOR_CORS_ORIGINS` to allow a separately hosted dashboard.
fn build_cors_layer() -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE]);

    match std::env::var(CORS_ENV_VAR) {
        Ok(origins) => {
            let allowed: Vec<_> = origins
                .split(',')
                .filter_map(|o| o.trim().parse().ok())
                .collect();
            tracing::info!(origins = %origins, "CORS: allowing configured origins");
            base.allow_origin(allowed)
        }
        Err(_) => base,
    }
}

/// Create the complete application router.
pub fn create_app(state: MonitorState) -> Router {
    Router::new()
        .nest("/api", routes::api_routes(state.clone()))
        .merge(routes::live_routes(state))
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer())
}
