//! Shared data structures for the partial-discharge monitoring pipeline
//!
//! - Ingestion: RawFrame (hex payload as received), Cycle (decoded samples)
//! - Persistence: CycleRecord, RawRecord, DbStats (rows as seen by consumers)
//! - Projection: UnitMode, SurfaceGrid (PRPS), PrpdProjection
//! - Transport: ConnectionStatus

mod cycle;
mod projection;
mod status;

pub use cycle::*;
pub use projection::*;
pub use status::*;
