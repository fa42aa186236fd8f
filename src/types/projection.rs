//! Projection types consumed by PRPD / PRPS renderers

use serde::{Deserialize, Serialize};

use crate::processing::units;

/// Display unit for amplitudes. Applied at read time only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitMode {
    #[default]
    #[serde(alias = "mv")]
    Millivolt,
    #[serde(alias = "dbm", alias = "db")]
    Decibel,
}

impl UnitMode {
    /// Convert a stored mV value into this display unit.
    pub fn apply(self, mv: f64) -> f64 {
        match self {
            UnitMode::Millivolt => mv,
            UnitMode::Decibel => units::to_decibel(mv),
        }
    }

    /// Axis label used by renderers.
    pub fn label(self) -> &'static str {
        match self {
            UnitMode::Millivolt => "Amplitude (mV)",
            UnitMode::Decibel => "Amplitude (dBm)",
        }
    }
}

impl std::fmt::Display for UnitMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnitMode::Millivolt => write!(f, "mV"),
            UnitMode::Decibel => write!(f, "dBm"),
        }
    }
}

/// Uniform phase x cycle grid for the PRPS surface.
///
/// `z_matrix` has `cycle_axis.len()` rows of `phase_axis.len()` columns.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SurfaceGrid {
    pub phase_axis: Vec<f64>,
    pub cycle_axis: Vec<u32>,
    pub z_matrix: Vec<Vec<f64>>,
    pub unit: UnitMode,
}

impl SurfaceGrid {
    pub fn empty(unit: UnitMode) -> Self {
        Self {
            unit,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.z_matrix.is_empty()
    }

    /// (rows, columns)
    pub fn shape(&self) -> (usize, usize) {
        (self.cycle_axis.len(), self.phase_axis.len())
    }

    /// (min, max) over all cells, `None` for an empty grid.
    pub fn z_range(&self) -> Option<(f64, f64)> {
        self.z_matrix.iter().flatten().fold(None, |acc, &z| match acc {
            None => Some((z, z)),
            Some((lo, hi)) => Some((lo.min(z), hi.max(z))),
        })
    }
}

/// One scatter point on the PRPD chart.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PrpdPoint {
    pub phase: f64,
    pub amplitude: f64,
}

/// Phase-resolved scatter over the accumulation window.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PrpdProjection {
    pub points: Vec<PrpdPoint>,
    /// Cycles contributing to `points`
    pub cycles: usize,
    /// Accumulation capacity at the time of projection
    pub max_cycles: usize,
    /// Reference sine polyline scaled to the data range
    pub reference: Option<Vec<PrpdPoint>>,
    pub unit: UnitMode,
}
