//! GIS PD Monitor: partial-discharge online monitoring
//!
//! Ingests hex-encoded sensor frames from an MQTT broker, keeps rolling
//! cycle windows for PRPD / PRPS projection, logs cycles and raw frames to
//! SQLite and streams newly persisted cycles to live observers.
//!
//! ## Architecture
//!
//! - **Acquisition**: MQTT ingest thread, frame decoder, connection control
//! - **Pipeline**: bounded ingest queue, dual-window cycle store, dispatch loop
//! - **Processing**: phase-domain resampling and PRPD projection
//! - **Storage**: SQLite cycle log and CSV export
//! - **API**: HTTP endpoints and the live WebSocket channel

pub mod acquisition;
pub mod api;
pub mod config;
pub mod pipeline;
pub mod processing;
pub mod storage;
pub mod types;

// Re-export configuration
pub use config::MonitorConfig;

// Re-export commonly used types
pub use types::{
    ConnectionStatus, Cycle, CycleRecord, DbStats, PrpdProjection, RawFrame, SurfaceGrid,
    UnitMode,
};

// Re-export pipeline components
pub use acquisition::{BrokerTarget, IngestController, IngestSettings};
pub use pipeline::{CycleStore, DispatchLoop, IngestQueue, RenderFrame, SharedState};

// Re-export storage
pub use storage::{CycleLog, StorageError};
