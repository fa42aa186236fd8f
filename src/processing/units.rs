//! mV <-> dBm conversion for the PD sensor's output stage.
//!
//! The pair is a fixed affine map, so it commutes with linear interpolation.
//! Callers still convert after interpolation so results are reproducible.

/// Slope of the sensor's mV -> dBm characteristic.
pub const DBM_PER_MV: f64 = 54.545;

/// dBm reading at 0 mV.
pub const DBM_OFFSET: f64 = -81.818;

/// Convert millivolts to dBm.
pub fn to_decibel(mv: f64) -> f64 {
    mv * DBM_PER_MV + DBM_OFFSET
}

/// Convert dBm back to millivolts.
pub fn to_millivolt(dbm: f64) -> f64 {
    (dbm - DBM_OFFSET) / DBM_PER_MV
}
