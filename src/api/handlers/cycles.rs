//! Persisted cycle queries and database diagnostics

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::envelope::{ApiErrorResponse, ApiResponse};
use crate::config::defaults::LATEST_QUERY_COUNT;
use crate::storage::StorageError;

use super::MonitorState;

// ============================================================================
// Cycle History
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct LatestQuery {
    pub count: Option<i64>,
}

fn positive_count(count: Option<i64>) -> Result<i64, Response> {
    match count {
        None => Ok(LATEST_QUERY_COUNT),
        Some(n) if n > 0 => Ok(n),
        Some(n) => Err(ApiErrorResponse::bad_request(format!(
            "count must be positive, got {}",
            n
        ))),
    }
}

/// GET /api/latest_cycle_data?count=10 - most recent cycles, oldest first
pub async fn get_latest_cycle_data(
    State(state): State<MonitorState>,
    Query(query): Query<LatestQuery>,
) -> Response {
    let count = match positive_count(query.count) {
        Ok(n) => n,
        Err(resp) => return resp,
    };
    match state.log.latest_cycles_ascending(count).await {
        Ok(records) => ApiResponse::ok(records),
        Err(e) => ApiErrorResponse::storage(&e),
    }
}

#[derive(Debug, Deserialize)]
pub struct TimeRangeQuery {
    pub start_time: String,
    pub end_time: String,
}

/// GET /api/cycle_data_by_time?start_time=&end_time= - inclusive range, oldest first
///
/// Bounds compare lexically against stored `YYYY-MM-DD HH:MM:SS.ffffff`
/// timestamps, so a date-only bound like `2024-05-01` works as expected.
/// An inverted range simply matches nothing.
pub async fn get_cycle_data_by_time(
    State(state): State<MonitorState>,
    Query(query): Query<TimeRangeQuery>,
) -> Response {
    match state
        .log
        .query_cycles_by_time(&query.start_time, &query.end_time)
        .await
    {
        Ok(records) => ApiResponse::ok(records),
        Err(e) => ApiErrorResponse::storage(&e),
    }
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: i64,
}

impl PageQuery {
    fn bounds(&self) -> Result<(i64, i64), Response> {
        let limit = positive_count(self.limit)?;
        if self.offset < 0 {
            return Err(ApiErrorResponse::bad_request(format!(
                "offset must not be negative, got {}",
                self.offset
            )));
        }
        Ok((limit, self.offset))
    }
}

/// GET /api/cycles?limit=10&offset=0 - paged history, newest first
pub async fn get_cycle_page(
    State(state): State<MonitorState>,
    Query(query): Query<PageQuery>,
) -> Response {
    let (limit, offset) = match query.bounds() {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    match state.log.query_cycles_page(limit, offset).await {
        Ok(records) => ApiResponse::ok(records),
        Err(e) => ApiErrorResponse::storage(&e),
    }
}

/// DELETE /api/cycles - purge persisted cycles and raw frames
///
/// The in-memory windows are untouched; use `/api/cycles/reset` for those.
pub async fn clear_history(State(state): State<MonitorState>) -> Response {
    match state.log.clear().await {
        Ok(()) => {
            tracing::warn!("🗑️ [API] Persisted history cleared");
            ApiResponse::ok(serde_json::json!({ "cleared": true }))
        }
        Err(e) => ApiErrorResponse::storage(&e),
    }
}

/// Raw frame paging; `count` is accepted as an alias for `limit`.
#[derive(Debug, Deserialize)]
pub struct RawQuery {
    pub count: Option<i64>,
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: i64,
}

/// GET /api/raw_data?limit=10&offset=0 - raw frames, newest first
pub async fn get_raw_data(
    State(state): State<MonitorState>,
    Query(query): Query<RawQuery>,
) -> Response {
    let page = PageQuery {
        limit: query.limit.or(query.count),
        offset: query.offset,
    };
    let (limit, offset) = match page.bounds() {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    match state.log.query_raw_page(limit, offset).await {
        Ok(records) => ApiResponse::ok(records),
        Err(e) => ApiErrorResponse::storage(&e),
    }
}

// ============================================================================
// Diagnostics
// ============================================================================

/// GET /api/db_stats - row counts and timestamp span
pub async fn get_db_stats(State(state): State<MonitorState>) -> Response {
    match state.log.db_stats().await {
        Ok(stats) => ApiResponse::ok(stats),
        Err(e) => ApiErrorResponse::storage(&e),
    }
}

/// Summary of the newest cycle row.
#[derive(Debug, Serialize)]
pub struct LatestCycleSummary {
    pub id: i64,
    pub timestamp: String,
    pub cycle_number: i64,
    pub data_length: usize,
}

/// Flat diagnostic response (kept flat for existing dashboards).
#[derive(Debug, Serialize)]
pub struct DbTestResponse {
    pub success: bool,
    pub database_path: String,
    pub absolute_path: String,
    pub tables: Vec<String>,
    pub cycle_data_count: i64,
    pub raw_data_count: i64,
    pub latest_cycle: Option<LatestCycleSummary>,
}

#[derive(Debug, Serialize)]
struct DbTestError {
    success: bool,
    error: String,
    database_path: String,
    absolute_path: String,
}

/// GET /api/db_test - database path, tables, counts, latest cycle
pub async fn get_db_test(State(state): State<MonitorState>) -> Response {
    let path = state.log.path();
    let database_path = path.display().to_string();
    let absolute_path = std::fs::canonicalize(path)
        .unwrap_or_else(|_| path.to_path_buf())
        .display()
        .to_string();

    match db_test(&state).await {
        Ok((tables, cycle_data_count, raw_data_count, latest_cycle)) => Json(DbTestResponse {
            success: true,
            database_path,
            absolute_path,
            tables,
            cycle_data_count,
            raw_data_count,
            latest_cycle,
        })
        .into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "[API] Database diagnostic failed");
            Json(DbTestError {
                success: false,
                error: e.to_string(),
                database_path,
                absolute_path,
            })
            .into_response()
        }
    }
}

type DbTestParts = (Vec<String>, i64, i64, Option<LatestCycleSummary>);

async fn db_test(state: &MonitorState) -> Result<DbTestParts, StorageError> {
    let tables = state.log.table_names().await?;
    let cycles = state.log.count_cycles().await?;
    let raw = state.log.count_raw().await?;
    let latest = state
        .log
        .query_latest_cycles(1)
        .await?
        .into_iter()
        .next()
        .map(|r| LatestCycleSummary {
            id: r.id,
            timestamp: r.timestamp,
            cycle_number: r.cycle_number,
            data_length: r.data.len(),
        });
    Ok((tables, cycles, raw, latest))
}
