//! PRPS resampling
//!
//! Cycles arriving from the transport do not all carry the same number of
//! samples (frame truncation shifts lengths by a sample or so). The surface
//! view needs a rectangular grid, so every cycle is mapped onto one shared
//! phase axis sized by the longest cycle in the window:
//!
//! ```text
//! phase_axis = linspace(0, 360, max_points)
//! row_i      = samples_i                                  if len_i == max_points
//!            = interp(phase_axis, linspace(0, 360, len_i), samples_i)  otherwise
//! ```
//!
//! Interpolation is piecewise-linear and clamped at both ends. Unit
//! conversion happens on the finished grid.

use super::PHASE_SPAN_DEG;
use crate::types::{Cycle, SurfaceGrid, UnitMode};

/// `n` evenly spaced values over `[start, end]`, both ends included.
///
/// `n == 1` yields `[start]`; `n == 0` yields an empty vector.
pub fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let span = end - start;
            let steps = (n - 1) as f64;
            let mut out: Vec<f64> = (0..n)
                .map(|i| start + span * (i as f64) / steps)
                .collect();
            out[n - 1] = end;
            out
        }
    }
}

/// Linear interpolation of `(xp, fp)` at `x`, clamped to the end values.
///
/// `xp` must be non-decreasing and the same length as `fp`. An empty table
/// yields `0.0`; a single-entry table yields that entry everywhere.
pub fn interp(x: f64, xp: &[f64], fp: &[f64]) -> f64 {
    let n = xp.len().min(fp.len());
    if n == 0 {
        return 0.0;
    }
    if n == 1 || x <= xp[0] {
        return fp[0];
    }
    if x >= xp[n - 1] {
        return fp[n - 1];
    }

    // First index with xp[i] > x; guaranteed in 1..n by the checks above.
    let hi = xp[..n].partition_point(|&v| v <= x);
    let lo = hi - 1;
    let dx = xp[hi] - xp[lo];
    if dx == 0.0 {
        return fp[hi];
    }
    let t = (x - xp[lo]) / dx;
    fp[lo] + t * (fp[hi] - fp[lo])
}

/// Resample one cycle onto `phase_axis`.
fn resample_row(samples: &[f64], phase_axis: &[f64]) -> Vec<f64> {
    if samples.len() == phase_axis.len() {
        return samples.to_vec();
    }
    let native = linspace(0.0, PHASE_SPAN_DEG, samples.len());
    phase_axis
        .iter()
        .map(|&phase| interp(phase, &native, samples))
        .collect()
}

/// Map a window of cycles onto a uniform phase x cycle grid.
///
/// Cycles with no samples produce no row. An empty window, or one where
/// every cycle is empty, produces an empty grid.
pub fn resample(window: &[Cycle], unit: UnitMode) -> SurfaceGrid {
    let max_points = window.iter().map(Cycle::len).max().unwrap_or(0);
    if max_points == 0 {
        return SurfaceGrid::empty(unit);
    }

    let phase_axis = linspace(0.0, PHASE_SPAN_DEG, max_points);

    let mut z_matrix: Vec<Vec<f64>> = window
        .iter()
        .filter(|cycle| !cycle.is_empty())
        .map(|cycle| resample_row(&cycle.samples, &phase_axis))
        .collect();

    if unit != UnitMode::Millivolt {
        for z in z_matrix.iter_mut().flatten() {
            *z = unit.apply(*z);
        }
    }

    let cycle_axis = (1..=z_matrix.len() as u32).collect();

    SurfaceGrid {
        phase_axis,
        cycle_axis,
        z_matrix,
        unit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::to_decibel;

    fn cycle(seq: u64, samples: &[f64]) -> Cycle {
        Cycle::new(seq, samples.to_vec())
    }

    #[test]
    fn test_linspace_endpoints() {
        assert_eq!(linspace(0.0, 360.0, 5), vec![0.0, 90.0, 180.0, 270.0, 360.0]);
        assert_eq!(linspace(0.0, 360.0, 1), vec![0.0]);
        assert!(linspace(0.0, 360.0, 0).is_empty());
        let axis = linspace(0.0, 360.0, 7);
        assert_eq!(axis[0], 0.0);
        assert_eq!(axis[6], 360.0);
    }

    #[test]
    fn test_interp_clamps_at_boundaries() {
        let xp = [0.0, 180.0, 360.0];
        let fp = [1.0, 3.0, 2.0];
        assert_eq!(interp(-10.0, &xp, &fp), 1.0);
        assert_eq!(interp(400.0, &xp, &fp), 2.0);
        assert_eq!(interp(90.0, &xp, &fp), 2.0);
        assert_eq!(interp(270.0, &xp, &fp), 2.5);
        assert_eq!(interp(180.0, &xp, &fp), 3.0);
    }

    #[test]
    fn test_empty_window_gives_empty_grid() {
        let grid = resample(&[], UnitMode::Millivolt);
        assert!(grid.is_empty());
        assert!(grid.phase_axis.is_empty());
        assert!(grid.cycle_axis.is_empty());
    }

    #[test]
    fn test_mixed_lengths_interpolate_short_rows() {
        let window = vec![
            cycle(1, &[0.0, 1.0, 0.5]),
            cycle(2, &[0.1, 0.2, 0.3, 0.4, 0.5]),
            cycle(3, &[2.0, 4.0, 6.0]),
        ];
        let grid = resample(&window, UnitMode::Millivolt);

        assert_eq!(grid.phase_axis.len(), 5);
        assert_eq!(grid.phase_axis, vec![0.0, 90.0, 180.0, 270.0, 360.0]);
        assert_eq!(grid.cycle_axis, vec![1, 2, 3]);
        assert_eq!(grid.shape(), (3, 5));

        // Full-length row is copied verbatim
        assert_eq!(grid.z_matrix[1], vec![0.1, 0.2, 0.3, 0.4, 0.5]);

        // Short rows match their own samples at 0 / 180 / 360 degrees
        assert_eq!(grid.z_matrix[0][0], 0.0);
        assert_eq!(grid.z_matrix[0][2], 1.0);
        assert_eq!(grid.z_matrix[0][4], 0.5);
        assert_eq!(grid.z_matrix[2][0], 2.0);
        assert_eq!(grid.z_matrix[2][2], 4.0);
        assert_eq!(grid.z_matrix[2][4], 6.0);

        // Midpoints are linear
        assert!((grid.z_matrix[0][1] - 0.5).abs() < 1e-12);
        assert!((grid.z_matrix[0][3] - 0.75).abs() < 1e-12);
        assert!((grid.z_matrix[2][1] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_equal_lengths_are_direct_copy() {
        let window = vec![cycle(1, &[1.0, 2.0]), cycle(2, &[3.0, 4.0])];
        let grid = resample(&window, UnitMode::Millivolt);
        assert_eq!(grid.z_matrix, vec![vec![1.0, 2.0], vec![3.0, 4.0]]);
    }

    #[test]
    fn test_single_cycle_window_is_one_row() {
        let grid = resample(&[cycle(9, &[0.4, 0.8, 1.2])], UnitMode::Millivolt);
        assert_eq!(grid.shape(), (1, 3));
        assert_eq!(grid.cycle_axis, vec![1]);
    }

    #[test]
    fn test_empty_and_single_sample_cycles() {
        let window = vec![cycle(1, &[]), cycle(2, &[0.7]), cycle(3, &[1.0, 2.0, 3.0])];
        let grid = resample(&window, UnitMode::Millivolt);
        // The empty cycle contributes no row
        assert_eq!(grid.shape(), (2, 3));
        assert_eq!(grid.z_matrix[0], vec![0.7, 0.7, 0.7]);

        let all_empty = vec![cycle(1, &[]), cycle(2, &[])];
        assert!(resample(&all_empty, UnitMode::Millivolt).is_empty());
    }

    #[test]
    fn test_decibel_applied_after_interpolation() {
        let window = vec![cycle(1, &[0.0, 2.0]), cycle(2, &[1.0, 1.0, 1.0])];
        let grid = resample(&window, UnitMode::Decibel);
        assert_eq!(grid.unit, UnitMode::Decibel);
        // Row 0 midpoint: interp(1.0) in mV then converted
        assert!((grid.z_matrix[0][1] - to_decibel(1.0)).abs() < 1e-9);
        assert!((grid.z_matrix[1][0] - to_decibel(1.0)).abs() < 1e-9);
    }

    #[test]
    fn test_grid_does_not_depend_on_previous_call() {
        let wide = vec![cycle(1, &[0.0; 8])];
        let narrow = vec![cycle(2, &[0.0; 3])];
        assert_eq!(resample(&wide, UnitMode::Millivolt).shape(), (1, 8));
        assert_eq!(resample(&narrow, UnitMode::Millivolt).shape(), (1, 3));
    }
}
