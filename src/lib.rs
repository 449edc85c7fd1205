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
//! Library for sampling the round-trip latency towards a host at a fixed interval, and for
//! plotting the resulting latency distribution.

pub mod plots;
pub mod prober;
pub mod sampler;
pub mod stats;
pub mod util;

pub mod prelude {
    pub use super::{
        plots::PlotKind,
        prober::{IcmpProber, ProbeError, Prober},
        sampler::{Pacer, SampleSequence, Sampler, SamplingRun, ThreadPacer},
        stats::Summary,
    };
}
