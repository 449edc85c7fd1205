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
use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;

use pingstat::{
    prelude::*,
    sampler::{self, parse_interval, parse_sample_count},
    stats, util,
};

/// Sample the round-trip latency towards a host with one ICMP echo request per interval, and write
/// the measured latencies to `ping-<HOST>.csv`.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Hostname or IPv4 address to probe.
    host: String,
    /// Number of probes to send.
    #[arg(value_parser = parse_sample_count)]
    samples: usize,
    /// Interval between two probes in seconds, also used as timeout of each probe.
    #[arg(short, long, value_parser = parse_interval, default_value = "1")]
    interval: Duration,
    /// Directory in which the sample file is written.
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,
}

fn main() -> Result<()> {
    util::init_logging();
    let args = Args::parse();

    let prober = IcmpProber::new()
        .map_err(sampler::Error::ProbeSetup)
        .context("Raw sockets require root or the CAP_NET_RAW capability")?;
    let mut sampler = Sampler::new(prober, args.interval);

    log::info!(
        "Probing {} {} times, once every {:?}",
        args.host,
        args.samples,
        sampler.interval()
    );

    let (run, path) = sampler
        .run_and_persist(&args.host, args.samples, &args.output_dir)
        .with_context(|| format!("Cannot store the latencies of {}", args.host))?;

    log::info!(
        "Collected {}/{} samples ({} missed), written to {}",
        run.samples.len(),
        run.requested,
        run.missed,
        path.to_string_lossy()
    );
    if let Some(summary) = Summary::new(&stats::to_millis(&run.samples.as_secs())) {
        log::info!("{summary}");
    }

    Ok(())
}
