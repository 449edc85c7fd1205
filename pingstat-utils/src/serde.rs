//! Utility module for (de-)serializing the latency sample files.
//!
//! A sample file is a flat CSV file with a single column `Latency_secs`, holding one row per
//! successful probe (in the order in which the probes were issued), without an index column.

use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

/// Name of the only column in a sample file.
pub const LATENCY_COLUMN: &str = "Latency_secs";

/// A single row of a sample file.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct LatencyRecord {
    /// Measured round-trip time in seconds
    #[serde(rename = "Latency_secs")]
    pub latency_secs: f64,
}

/// Filename of the sample file for the given target host, e.g. `ping-google.com.csv`.
pub fn output_filename(host: impl AsRef<str>) -> String {
    format!("ping-{}.csv", host.as_ref())
}

/// Write the latencies (in seconds) to `path`, overwriting an existing file.
///
/// The header row is always written, so an empty slice produces a header-only file.
pub fn write_latencies(path: impl AsRef<Path>, latencies: &[f64]) -> Result<(), csv::Error> {
    let mut csv = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path.as_ref())?;
    csv.write_record([LATENCY_COLUMN])?;
    for &latency_secs in latencies {
        csv.serialize(LatencyRecord { latency_secs })?;
    }
    csv.flush()?;
    log::trace!(
        "wrote {} latencies to {:?}",
        latencies.len(),
        path.as_ref()
    );
    Ok(())
}

/// Read all latencies (in seconds) from the sample file at `path`, preserving their order.
pub fn read_latencies(path: impl AsRef<Path>) -> Result<Vec<f64>, csv::Error> {
    let file = fs::File::open(path.as_ref())?;
    let mut csv = csv::Reader::from_reader(file);
    csv.deserialize::<LatencyRecord>()
        .map(|record| record.map(|r| r.latency_secs))
        .collect()
}
