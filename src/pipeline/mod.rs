//! Ingestion → Display Pipeline
//!
//! ```text
//! ingest thread ──push──▶ IngestQueue ──drain (50 ms)──▶ CycleStore ──▶ CycleLog
//!      │                                                     │
//!      └──raw frames──▶ channel ──drain──▶ CycleLog          └─render (200 ms, if dirty)──▶ RenderFrame
//! ```
//!
//! The queue is the only structure touched by both the ingest thread and
//! the dispatch task. The cycle store is mutated only by dispatch and by
//! explicit reset/resize requests.

pub mod cycle_store;
pub mod dispatch;
pub mod queue;
mod state;

pub use cycle_store::{CycleStore, Window};
pub use dispatch::{DispatchLoop, DispatchStats, DispatchTiming};
pub use queue::{IngestQueue, PushOutcome};
pub use state::{RenderFrame, SharedState};
