//! PRPD projection: amplitude vs. phase across the accumulation window.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use super::{linspace, PHASE_SPAN_DEG};
use crate::config::defaults::REFERENCE_SINE_POINTS;
use crate::types::{Cycle, PrpdPoint, PrpdProjection, UnitMode};

/// Options for building a PRPD projection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrpdOptions {
    pub unit: UnitMode,
    /// Overlay a reference sine scaled to the data
    pub show_sine: bool,
    /// Relative sine amplitude (1.0 = a quarter of the data range)
    pub sine_amplitude: f64,
}

impl Default for PrpdOptions {
    fn default() -> Self {
        Self {
            unit: UnitMode::Millivolt,
            show_sine: true,
            sine_amplitude: 1.0,
        }
    }
}

/// Flatten a window into phase-resolved points.
///
/// Each cycle's samples are spread evenly over 0–360°, independent of the
/// other cycles' lengths.
pub fn project_prpd(window: &[Cycle], max_cycles: usize, opts: PrpdOptions) -> PrpdProjection {
    let total: usize = window.iter().map(Cycle::len).sum();
    let mut points = Vec::with_capacity(total);

    for cycle in window {
        let phases = linspace(0.0, PHASE_SPAN_DEG, cycle.len());
        points.extend(
            phases
                .into_iter()
                .zip(&cycle.samples)
                .map(|(phase, &mv)| PrpdPoint {
                    phase,
                    amplitude: opts.unit.apply(mv),
                }),
        );
    }

    let reference = opts
        .show_sine
        .then(|| reference_sine(&points, opts.sine_amplitude));

    PrpdProjection {
        points,
        cycles: window.len(),
        max_cycles,
        reference,
        unit: opts.unit,
    }
}

/// Reference mains sine centred on the data, peak-to-peak half the data range
/// at `amplitude == 1.0`.
fn reference_sine(points: &[PrpdPoint], amplitude: f64) -> Vec<PrpdPoint> {
    let range = points.iter().map(|p| p.amplitude).fold(None, |acc, a| match acc {
        None => Some((a, a)),
        Some((lo, hi)) => Some((f64::min(lo, a), f64::max(hi, a))),
    });

    let (scale, offset) = match range {
        Some((lo, hi)) => (amplitude * (hi - lo) / 4.0, (hi + lo) / 2.0),
        None => (amplitude, 0.0),
    };

    linspace(0.0, PHASE_SPAN_DEG, REFERENCE_SINE_POINTS)
        .into_iter()
        .map(|phase| PrpdPoint {
            phase,
            amplitude: scale * (phase * 2.0 * PI / PHASE_SPAN_DEG).sin() + offset,
        })
        .collect()
}
