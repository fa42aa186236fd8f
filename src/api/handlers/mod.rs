//! API route handlers
//!
//! - Cycle history queries and database diagnostics
//! - Projections (PRPS surface, PRPD scatter) and CSV export
//! - Runtime control: window reset/resize, persistence, broker connection

mod control;
mod cycles;
mod projection;

pub use control::*;
pub use cycles::*;
pub use projection::*;

use chrono::{DateTime, Local};
use std::sync::Arc;
use std::time::Duration;

use crate::acquisition::IngestController;
use crate::config::{LiveConfig, MonitorConfig};
use crate::pipeline::{IngestQueue, SharedState};
use crate::storage::CycleLog;

// ============================================================================
// API State
// ============================================================================

/// Live channel parameters.
#[derive(Debug, Clone, Copy)]
pub struct LiveSettings {
    pub tick: Duration,
    pub fetch_limit: i64,
    pub snapshot_count: i64,
}

impl From<&LiveConfig> for LiveSettings {
    fn from(cfg: &LiveConfig) -> Self {
        Self {
            tick: cfg.tick(),
            fetch_limit: cfg.fetch_limit,
            snapshot_count: cfg.snapshot_count,
        }
    }
}

impl Default for LiveSettings {
    fn default() -> Self {
        Self::from(&LiveConfig::default())
    }
}

/// Shared state for API handlers
#[derive(Clone)]
pub struct MonitorState {
    /// Cycle store, view options and render frames from the pipeline
    pub shared: SharedState,
    pub log: CycleLog,
    /// Ingest queue (depth and drop counters)
    pub queue: IngestQueue,
    pub ingest: Arc<IngestController>,
    pub live: LiveSettings,
    /// Default row count for CSV export
    pub export_cycles: usize,
    pub started_at: DateTime<Local>,
}

impl MonitorState {
    pub fn new(
        shared: SharedState,
        log: CycleLog,
        queue: IngestQueue,
        ingest: Arc<IngestController>,
        config: &MonitorConfig,
    ) -> Self {
        Self {
            shared,
            log,
            queue,
            ingest,
            live: LiveSettings::from(&config.live),
            export_cycles: config.export.csv_cycles,
            started_at: Local::now(),
        }
    }
}
