//! Persistent Storage
//!
//! - `cycle_log`: SQLite log of decoded cycles and raw frames
//! - `export`: headerless CSV export of recent cycles

pub mod cycle_log;
pub mod export;

pub use cycle_log::{CycleLog, StorageError};
pub use export::{cycles_to_csv, ExportError};
