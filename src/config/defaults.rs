//! System-wide default constants.
//!
//! Centralises the tunables of the ingest/dispatch/live pipeline. Grouped by
//! subsystem for easy discovery.

// ============================================================================
// Broker
// ============================================================================

/// Default MQTT broker host of the on-site sensor gateway.
pub const BROKER_HOST: &str = "192.168.16.135";

/// Default MQTT broker port.
pub const BROKER_PORT: u16 = 1883;

/// Default topic the PD sensor publishes on.
pub const BROKER_TOPIC: &str = "pub1";

/// MQTT keep-alive (seconds).
pub const BROKER_KEEP_ALIVE_SECS: u64 = 30;

/// Request channel capacity of the MQTT client.
pub const MQTT_REQUEST_CAPACITY: usize = 64;

// ============================================================================
// Windows & Queue
// ============================================================================

/// Accumulation (PRPD) window capacity in cycles.
pub const ACCUMULATION_CYCLES: usize = 50;

/// Surface (PRPS) window capacity in cycles. Not user-tunable at runtime.
pub const SURFACE_CYCLES: usize = 50;

/// Ingest queue capacity (decoded cycles awaiting dispatch).
pub const INGEST_QUEUE_CAPACITY: usize = 10;

/// Raw-frame handoff capacity (frames awaiting persistence).
pub const RAW_FRAME_CHANNEL_CAPACITY: usize = 256;

// ============================================================================
// Timing
// ============================================================================

/// Ingest thread poll interval (ms).
pub const INGEST_POLL_MS: u64 = 10;

/// Bounded wait for the ingest thread to exit on stop (ms).
pub const INGEST_STOP_TIMEOUT_MS: u64 = 1_000;

/// Dispatch drain tick (ms). At most one cycle is drained per tick.
pub const DISPATCH_DRAIN_MS: u64 = 50;

/// Projection refresh tick (ms). Refreshes only when new cycles arrived.
pub const RENDER_INTERVAL_MS: u64 = 200;

/// Status log tick (seconds).
pub const STATUS_INTERVAL_SECS: u64 = 1;

// ============================================================================
// Live Channel
// ============================================================================

/// Live broadcaster poll tick (ms).
pub const LIVE_TICK_MS: u64 = 1_000;

/// Maximum rows fetched per live tick.
pub const LIVE_FETCH_LIMIT: i64 = 50;

/// Rows sent to an observer on connect.
pub const LIVE_SNAPSHOT_COUNT: i64 = 50;

// ============================================================================
// Storage & Export
// ============================================================================

/// SQLite database file.
pub const DB_PATH: &str = "gis_pd_data.db";

/// Cycles written by the CSV export.
pub const CSV_EXPORT_CYCLES: usize = 50;

/// Default row count for `/api/latest_cycle_data`.
pub const LATEST_QUERY_COUNT: i64 = 10;

// ============================================================================
// Projection
// ============================================================================

/// Points in the PRPD reference sine polyline.
pub const REFERENCE_SINE_POINTS: usize = 1_000;

// ============================================================================
// Server
// ============================================================================

/// HTTP bind address.
pub const SERVER_ADDR: &str = "0.0.0.0:8000";
