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
use std::{fs, path::PathBuf, process};

use anyhow::{Context, Result};
use clap::Parser;

use pingstat::{plots, prelude::PlotKind, util};

#[derive(Parser, Debug)]
#[command(about, long_about = None)]
struct Args {
    /// Sample file written by `ping`.
    #[arg(short, long, default_value = "ping-google.com.csv")]
    input: PathBuf,
    /// Overwrite the output path for plots.
    #[arg(short, long, default_value = "./")]
    output_path: PathBuf,
    /// Type of plot to generate.
    #[arg(short, long, value_enum, default_value_t = PlotKind::All)]
    plot_type: PlotKind,
}

fn main() -> Result<()> {
    util::init_logging();

    // parse plot parameters
    let args = Args::parse();
    fs::create_dir_all(&args.output_path)?;

    // ensure that the sample file exists
    if !args.input.exists() {
        log::error!("Could not read samples in {:?}!", args.input);
        process::exit(1)
    }

    let latencies = plots::load_millis(&args.input)?;
    log::info!(
        "Loaded {} samples from {}",
        latencies.len(),
        args.input.to_string_lossy()
    );

    let written = plots::render(args.plot_type, &latencies, &args.output_path)
        .with_context(|| format!("Cannot plot {:?}", args.plot_type))?;
    log::debug!("{} plots written", written.len());

    Ok(())
}
