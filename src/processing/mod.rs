//! Phase-domain processing: unit conversion, PRPS resampling, PRPD projection
//!
//! Everything here is a pure function of a window snapshot. Nothing in this
//! module owns state or touches the stored cycles.

pub mod prpd;
pub mod resample;
pub mod units;

pub use prpd::{project_prpd, PrpdOptions};
pub use resample::{interp, linspace, resample};
pub use units::{to_decibel, to_millivolt};

/// Full phase span of one mains cycle (degrees).
pub const PHASE_SPAN_DEG: f64 = 360.0;
