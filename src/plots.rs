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
//! Plots of the latency distribution of a sample file.
//!
//! Three plots are available: the empirical CDF, the latency by percentile distribution (based on
//! an HDR histogram), and a frequency histogram. Each one is written as a standalone HTML file.

use std::{
    fs,
    path::{Path, PathBuf},
};

use clap::ValueEnum;
use plotly::{
    common::Mode, histogram::Bins, layout::Axis, Histogram, Layout, Plot, Scatter,
};

use pingstat_utils::serde::read_latencies;

use crate::stats::{self, ECDF_POINTS};

pub const ECDF_OUTPUT: &str = "ecdf.html";
pub const HDR_HISTOGRAM_OUTPUT: &str = "histogram-hdr.html";
pub const HISTOGRAM_OUTPUT: &str = "histogram.html";

const LATENCY_AXIS_TITLE: &str = "Latency (in milliseconds)";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Cannot read the samples from {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("Cannot write the plot to {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Stats(#[from] stats::Error),
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PlotKind {
    /// Produces all plots.
    #[default]
    All,
    /// Empirical cumulative distribution function of the latency.
    Ecdf,
    /// Latency by percentile distribution, focusing on the tail latency.
    HdrHistogram,
    /// Frequency histogram of the latency.
    Histogram,
}

impl PlotKind {
    /// The individual plots selected by this kind.
    pub fn plots(self) -> &'static [PlotKind] {
        match self {
            PlotKind::All => &[PlotKind::Ecdf, PlotKind::HdrHistogram, PlotKind::Histogram],
            PlotKind::Ecdf => &[PlotKind::Ecdf],
            PlotKind::HdrHistogram => &[PlotKind::HdrHistogram],
            PlotKind::Histogram => &[PlotKind::Histogram],
        }
    }

    /// Name of the file to which this plot is written. `None` for [`PlotKind::All`].
    pub fn output_filename(self) -> Option<&'static str> {
        match self {
            PlotKind::All => None,
            PlotKind::Ecdf => Some(ECDF_OUTPUT),
            PlotKind::HdrHistogram => Some(HDR_HISTOGRAM_OUTPUT),
            PlotKind::Histogram => Some(HISTOGRAM_OUTPUT),
        }
    }
}

/// Load a sample file and convert the latencies to milliseconds.
pub fn load_millis(path: impl AsRef<Path>) -> Result<Vec<f64>, Error> {
    let path = path.as_ref();
    let latencies = read_latencies(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(stats::to_millis(&latencies))
}

/// Empirical CDF of the latencies (in milliseconds).
pub fn ecdf_plot(latencies: &[f64]) -> Result<Plot, Error> {
    let (x, y) = stats::ecdf_curve(latencies, ECDF_POINTS)?;
    let range = vec![x[0], x[x.len() - 1]];

    let mut plot = Plot::new();
    plot.add_trace(Scatter::new(x, y).mode(Mode::Lines).name("ECDF"));
    plot.set_layout(
        Layout::new()
            .show_legend(false)
            .x_axis(
                Axis::new()
                    .title(LATENCY_AXIS_TITLE.to_string())
                    .range(range)
                    .show_grid(true),
            )
            .y_axis(
                Axis::new()
                    .title("Cumulative density".to_string())
                    .dtick(0.1)
                    .show_grid(true),
            ),
    );
    Ok(plot)
}

/// Latency (in milliseconds) by percentile.
pub fn percentile_plot(latencies: &[f64]) -> Result<Plot, Error> {
    let points = stats::percentile_distribution(latencies)?;
    // equidistant categories instead of a logit scale to emphasize the tail
    let labels = points
        .iter()
        .map(|p| format!("{}%", p.percentile))
        .collect::<Vec<_>>();
    let values = points.iter().map(|p| p.value).collect::<Vec<_>>();

    let mut plot = Plot::new();
    plot.add_trace(
        Scatter::new(labels, values)
            .mode(Mode::LinesMarkers)
            .name("Latency"),
    );
    plot.set_layout(
        Layout::new()
            .title("Latency by Percentile Distribution".to_string())
            .show_legend(false)
            .x_axis(
                Axis::new()
                    .title("Percentile (%)".to_string())
                    .show_grid(true),
            )
            .y_axis(
                Axis::new()
                    .title("Latency (milliseconds)".to_string())
                    .show_grid(true),
            ),
    );
    Ok(plot)
}

/// Frequency histogram of the latencies (in milliseconds).
pub fn histogram_plot(latencies: &[f64]) -> Result<Plot, Error> {
    let binning = stats::Binning::auto(latencies).ok_or(stats::Error::NoSamples)?;

    let mut plot = Plot::new();
    plot.add_trace(
        Histogram::new(latencies.to_vec())
            .x_bins(Bins::new(binning.start, binning.end, binning.width))
            .name("Latency"),
    );
    plot.set_layout(
        Layout::new()
            .show_legend(false)
            .x_axis(Axis::new().title(LATENCY_AXIS_TITLE.to_string()))
            .y_axis(Axis::new().title(format!("Frequency (N = {})", latencies.len()))),
    );
    Ok(plot)
}

/// Build the plot of the given kind. [`PlotKind::All`] is not a single plot and is rejected by
/// returning `None`.
pub fn build(kind: PlotKind, latencies: &[f64]) -> Option<Result<Plot, Error>> {
    match kind {
        PlotKind::All => None,
        PlotKind::Ecdf => Some(ecdf_plot(latencies)),
        PlotKind::HdrHistogram => Some(percentile_plot(latencies)),
        PlotKind::Histogram => Some(histogram_plot(latencies)),
    }
}

/// Write `plot` as a standalone HTML file, overwriting an existing file.
pub fn write_plot(plot: &Plot, path: impl AsRef<Path>) -> Result<(), Error> {
    let path = path.as_ref();
    fs::write(path, plot.to_html()).map_err(|source| Error::Write {
        path: path.to_path_buf(),
        source,
    })?;
    log::info!("Written plot to: {}", path.to_string_lossy());
    Ok(())
}

/// Render all plots selected by `kind` into `output_dir`, returning the written files.
pub fn render(
    kind: PlotKind,
    latencies: &[f64],
    output_dir: impl AsRef<Path>,
) -> Result<Vec<PathBuf>, Error> {
    let mut written = Vec::new();
    for &plot_kind in kind.plots() {
        let (Some(plot), Some(filename)) = (build(plot_kind, latencies), plot_kind.output_filename())
        else {
            continue;
        };
        let path = output_dir.as_ref().join(filename);
        write_plot(&plot?, &path)?;
        written.push(path);
    }
    Ok(written)
}
