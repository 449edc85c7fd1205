// PINGSTAT: Fixed-Interval Latency Sampling and Latency Distribution Plots
// Copyright (C) 2024-2025 Roland Schmid <roschmi@ethz.ch> and Tibor Schneider <sctibor@ethz.ch>
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//! Statistics over latency samples, delegating the actual computations to `statrs` and
//! `hdrhistogram`.
//!
//! All functions in this module operate on latencies in milliseconds.

use hdrhistogram::Histogram;
use itertools::{Itertools, MinMaxResult};
use statrs::{
    distribution::{ContinuousCDF, Empirical},
    statistics::{Data, OrderStatistics, Statistics},
};

pub const MSECS_PER_SEC: f64 = 1000.0;

/// Number of evaluation points of the ECDF curve.
pub const ECDF_POINTS: usize = 50;

/// Lowest and highest trackable value (in milliseconds) and significant figures of the HDR
/// histogram.
pub const HDR_LOWEST: u64 = 1;
pub const HDR_HIGHEST: u64 = 1000;
pub const HDR_SIGFIG: u8 = 4;

/// Percentiles shown in the percentile distribution.
pub const HDR_PERCENTILES: [f64; 6] = [25.0, 50.0, 90.0, 99.0, 99.9, 99.99];

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("There are no latency samples to work with.")]
    NoSamples,
    #[error("Cannot create the HDR histogram: {0}")]
    Histogram(#[from] hdrhistogram::CreationError),
}

/// Convert latencies from seconds to milliseconds.
pub fn to_millis(latencies_secs: &[f64]) -> Vec<f64> {
    latencies_secs.iter().map(|s| s * MSECS_PER_SEC).collect()
}

/// `num` evenly spaced values from `start` to `end` (both inclusive).
pub fn linspace(start: f64, end: f64, num: usize) -> Vec<f64> {
    match num {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (num - 1) as f64;
            (0..num)
                .map(|i| if i == num - 1 { end } else { start + step * i as f64 })
                .collect()
        }
    }
}

fn min_max(values: &[f64]) -> Option<(f64, f64)> {
    match values.iter().copied().minmax_by(f64::total_cmp) {
        MinMaxResult::NoElements => None,
        MinMaxResult::OneElement(x) => Some((x, x)),
        MinMaxResult::MinMax(min, max) => Some((min, max)),
    }
}

/// The empirical CDF of `values`, evaluated at `num` evenly spaced points between the smallest
/// and the largest value. Returns `(x, y)`.
pub fn ecdf_curve(values: &[f64], num: usize) -> Result<(Vec<f64>, Vec<f64>), Error> {
    let (min, max) = min_max(values).ok_or(Error::NoSamples)?;
    let ecdf = Empirical::from_vec(values.to_vec());
    let x = linspace(min, max, num);
    let y = x.iter().map(|x| ecdf.cdf(*x)).collect();
    Ok((x, y))
}

/// A single point of the percentile distribution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PercentilePoint {
    /// Percentile in `[0, 100]`
    pub percentile: f64,
    /// Latency at that percentile in milliseconds
    pub value: u64,
}

/// Record all values (rounded to whole milliseconds) in an HDR histogram tracking 1 ms to 1 s,
/// and extract the value at each of the [`HDR_PERCENTILES`]. Values outside the trackable range
/// are skipped.
pub fn percentile_distribution(values: &[f64]) -> Result<Vec<PercentilePoint>, Error> {
    let mut histogram = Histogram::<u64>::new_with_bounds(HDR_LOWEST, HDR_HIGHEST, HDR_SIGFIG)?;
    for value in values {
        let rounded = value.round();
        // the top bucket reaches beyond `high()`, so `record` alone does not enforce the range
        if rounded < 0.0
            || rounded > histogram.high() as f64
            || histogram.record(rounded as u64).is_err()
        {
            log::warn!("Latency {value:.3} ms is outside of the histogram range, skipping it");
        }
    }
    if histogram.len() == 0 {
        return Err(Error::NoSamples);
    }

    Ok(HDR_PERCENTILES
        .iter()
        .map(|&percentile| PercentilePoint {
            percentile,
            value: histogram.value_at_percentile(percentile),
        })
        .collect())
}

/// Equally sized histogram bins covering `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Binning {
    pub start: f64,
    pub end: f64,
    pub width: f64,
}

impl Binning {
    /// Choose the smaller bin width of the Sturges and the Freedman-Diaconis estimators. The
    /// Freedman-Diaconis estimator is ignored if the interquartile range is zero. Constant data
    /// gets a single bin of width 1 centered on the value.
    pub fn auto(values: &[f64]) -> Option<Self> {
        let (min, max) = min_max(values)?;
        let range = max - min;
        if range <= 0.0 {
            return Some(Self {
                start: min - 0.5,
                end: max + 0.5,
                width: 1.0,
            });
        }

        let n = values.len() as f64;
        let sturges = range / (n.log2() + 1.0);
        let iqr = Data::new(values.to_vec()).interquartile_range();
        let freedman_diaconis = 2.0 * iqr / n.cbrt();

        let width = if freedman_diaconis > 0.0 {
            sturges.min(freedman_diaconis)
        } else {
            sturges
        };
        let count = (range / width).ceil().max(1.0);
        Some(Self {
            start: min,
            end: min + count * width,
            width,
        })
    }

    pub fn count(&self) -> usize {
        ((self.end - self.start) / self.width).round() as usize
    }
}

/// Number of histogram bins chosen by [`Binning::auto`], at least one.
pub fn histogram_bins(values: &[f64]) -> usize {
    Binning::auto(values).map(|b| b.count()).unwrap_or(1)
}

/// Summary statistics of a run, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    pub count: usize,
    pub min: f64,
    pub mean: f64,
    pub median: f64,
    pub p90: f64,
    pub p99: f64,
    pub max: f64,
}

impl Summary {
    pub fn new(values: &[f64]) -> Option<Self> {
        let (min, max) = min_max(values)?;
        let mut data = Data::new(values.to_vec());
        Some(Self {
            count: values.len(),
            min,
            mean: values.iter().mean(),
            median: data.quantile(0.5),
            p90: data.quantile(0.9),
            p99: data.quantile(0.99),
            max,
        })
    }
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "min {:.3} ms, mean {:.3} ms, median {:.3} ms, p90 {:.3} ms, p99 {:.3} ms, max {:.3} ms",
            self.min, self.mean, self.median, self.p90, self.p99, self.max
        )
    }
}
