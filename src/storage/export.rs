//! Headerless CSV export of recent cycles: one row per cycle, one field per
//! sample. Rows may differ in length.

use chrono::Local;
use std::io::Write;
use thiserror::Error;

use crate::types::Cycle;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("CSV write failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("CSV I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Default export file name for the current local time (`YYYYmmddHHMMSS.csv`).
pub fn default_filename() -> String {
    Local::now().format("%Y%m%d%H%M%S.csv").to_string()
}

/// Write the last `k` cycles of `cycles` to `out`. Returns the row count.
pub fn write_cycles_csv<W: Write>(out: W, cycles: &[Cycle], k: usize) -> Result<usize, ExportError> {
    let start = cycles.len().saturating_sub(k);
    let selected = &cycles[start..];

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_writer(out);

    for cycle in selected {
        writer.write_record(cycle.samples.iter().map(|v| format!("{:?}", v)))?;
    }
    writer.flush()?;

    Ok(selected.len())
}

/// Render the last `k` cycles as a CSV string.
pub fn cycles_to_csv(cycles: &[Cycle], k: usize) -> Result<String, ExportError> {
    let mut buf = Vec::new();
    write_cycles_csv(&mut buf, cycles, k)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
