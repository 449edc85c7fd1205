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
//! Fixed-interval latency sampler.
//!
//! The sampler issues one probe per tick and paces itself such that consecutive probes start
//! exactly one interval apart: after a probe that took `e`, it pauses for `interval - e`. A probe
//! that does not complete within the interval is reported as a warning and skipped, without any
//! additional pause and without a placeholder in the resulting [`SampleSequence`].

use std::{
    io,
    path::{Path, PathBuf},
    thread,
    time::Duration,
};

use pingstat_utils::serde::{output_filename, write_latencies};

use crate::prober::{ProbeError, Prober, TIMEOUT_RESOLUTION};

/// Default interval between two probes, which is also the timeout of each probe.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

/// Warning emitted for every probe that did not produce a measurement.
pub const MISSED_PROBE_WARNING: &str = "ping timed out, latency outlier not measured";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid {arg} {value:?}: {reason}")]
    Parse {
        arg: &'static str,
        value: String,
        reason: String,
    },
    #[error("cannot open the ICMP channel: {0}")]
    ProbeSetup(#[source] io::Error),
    #[error("cannot write the samples: {0}")]
    Persistence(#[from] csv::Error),
}

/// Parse the number of samples to take. Zero is accepted and results in an empty run.
pub fn parse_sample_count(value: &str) -> Result<usize, Error> {
    value.trim().parse().map_err(|e| Error::Parse {
        arg: "sample count",
        value: value.to_string(),
        reason: format!("{e}"),
    })
}

/// Parse the sampling interval in (fractional) seconds. The interval must be finite and at least
/// one microsecond, the resolution of the probe timeout.
pub fn parse_interval(value: &str) -> Result<Duration, Error> {
    let parse_error = |reason: String| Error::Parse {
        arg: "interval",
        value: value.to_string(),
        reason,
    };
    let secs: f64 = value.trim().parse().map_err(|e| parse_error(format!("{e}")))?;
    if !secs.is_finite() || secs <= 0.0 {
        return Err(parse_error("must be a positive number of seconds".to_string()));
    }
    if secs < TIMEOUT_RESOLUTION.as_secs_f64() {
        return Err(parse_error(format!(
            "must be at least {TIMEOUT_RESOLUTION:?}"
        )));
    }
    // `0.000001` may convert to 999ns
    let interval = Duration::try_from_secs_f64(secs)
        .map_err(|e| parse_error(format!("{e}")))?
        .max(TIMEOUT_RESOLUTION);
    Ok(interval)
}

/// Suspends the sampler between two probes.
pub trait Pacer {
    fn pause(&mut self, duration: Duration);
}

/// Pacer blocking the current thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadPacer;

impl Pacer for ThreadPacer {
    fn pause(&mut self, duration: Duration) {
        thread::sleep(duration)
    }
}

/// Ordered sequence of the latencies measured in one run, in the order the probes were issued.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SampleSequence {
    latencies: Vec<Duration>,
}

impl SampleSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, latency: Duration) {
        self.latencies.push(latency)
    }

    pub fn len(&self) -> usize {
        self.latencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.latencies.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Duration> {
        self.latencies.iter()
    }

    /// All latencies in seconds.
    pub fn as_secs(&self) -> Vec<f64> {
        self.latencies.iter().map(Duration::as_secs_f64).collect()
    }

    /// Write the sequence to `path` in the sample file format, overwriting an existing file.
    pub fn persist(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        write_latencies(path, &self.as_secs())?;
        Ok(())
    }
}

/// Outcome of a single sampling run.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingRun {
    /// The successful measurements.
    pub samples: SampleSequence,
    /// Number of probes that were requested.
    pub requested: usize,
    /// Number of probes that did not produce a measurement.
    pub missed: usize,
}

/// Latency sampler issuing one probe per interval towards a single host.
pub struct Sampler<P, C = ThreadPacer> {
    prober: P,
    pacer: C,
    interval: Duration,
}

impl<P: Prober> Sampler<P> {
    pub fn new(prober: P, interval: Duration) -> Self {
        Self::with_pacer(prober, ThreadPacer, interval)
    }
}

impl<P: Prober, C: Pacer> Sampler<P, C> {
    pub fn with_pacer(prober: P, pacer: C, interval: Duration) -> Self {
        Self {
            prober,
            pacer,
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Take `samples` probes towards `host`, one per interval.
    pub fn run(&mut self, host: &str, samples: usize) -> SamplingRun {
        let mut sequence = SampleSequence::new();
        let mut missed = 0;

        for i in 0..samples {
            let latency = match self.prober.probe(host, self.interval) {
                Ok(latency) if latency <= self.interval => latency,
                Ok(latency) => {
                    log::debug!("probe {}/{samples} took {latency:?}", i + 1);
                    log::warn!("{MISSED_PROBE_WARNING}");
                    missed += 1;
                    continue;
                }
                Err(e) => {
                    if !matches!(e, ProbeError::Timeout(_)) {
                        log::debug!("probe {}/{samples} towards {host} failed: {e}", i + 1);
                    }
                    log::warn!("{MISSED_PROBE_WARNING}");
                    missed += 1;
                    continue;
                }
            };
            log::debug!(
                "probe {}/{samples}: {:.3} ms",
                i + 1,
                latency.as_secs_f64() * 1000.0
            );
            sequence.push(latency);
            self.pacer.pause(self.interval.saturating_sub(latency));
        }

        SamplingRun {
            samples: sequence,
            requested: samples,
            missed,
        }
    }

    /// Take `samples` probes towards `host` and write them to `ping-<host>.csv` in `output_dir`.
    /// Returns the run together with the path of the written file.
    pub fn run_and_persist(
        &mut self,
        host: &str,
        samples: usize,
        output_dir: impl AsRef<Path>,
    ) -> Result<(SamplingRun, PathBuf), Error> {
        let run = self.run(host, samples);
        let path = output_dir.as_ref().join(output_filename(host));
        run.samples.persist(&path)?;
        Ok((run, path))
    }
}

#[cfg(test)]
mod test {
    use std::{cell::RefCell, collections::VecDeque, fs};

    use log::{Level, LevelFilter, Log, Metadata, Record};

    use super::*;

    thread_local! {
        static CAPTURED: RefCell<Vec<(Level, String)>> = const { RefCell::new(Vec::new()) };
    }

    /// Logger keeping the messages of each test thread apart.
    struct CaptureLogger;

    impl Log for CaptureLogger {
        fn enabled(&self, _: &Metadata) -> bool {
            true
        }

        fn log(&self, record: &Record) {
            CAPTURED.with(|c| c.borrow_mut().push((record.level(), record.args().to_string())));
        }

        fn flush(&self) {}
    }

    static LOGGER: CaptureLogger = CaptureLogger;

    /// Run `f` and return its result together with the warnings it logged.
    fn with_warnings<T>(f: impl FnOnce() -> T) -> (T, Vec<String>) {
        let _ = log::set_logger(&LOGGER);
        log::set_max_level(LevelFilter::Trace);
        CAPTURED.with(|c| c.borrow_mut().clear());
        let result = f();
        let warnings = CAPTURED.with(|c| {
            c.borrow_mut()
                .drain(..)
                .filter(|(level, _)| *level == Level::Warn)
                .map(|(_, msg)| msg)
                .collect()
        });
        (result, warnings)
    }

    /// Prober replaying a fixed script of outcomes and recording the probed hosts.
    struct ScriptedProber {
        script: VecDeque<Result<Duration, ProbeError>>,
        probed: Vec<(String, Duration)>,
    }

    impl ScriptedProber {
        fn new(script: impl IntoIterator<Item = Result<Duration, ProbeError>>) -> Self {
            Self {
                script: script.into_iter().collect(),
                probed: Vec::new(),
            }
        }
    }

    impl Prober for &mut ScriptedProber {
        fn probe(&mut self, host: &str, timeout: Duration) -> Result<Duration, ProbeError> {
            self.probed.push((host.to_string(), timeout));
            self.script
                .pop_front()
                .expect("sampler issued more probes than scripted")
        }
    }

    #[derive(Default)]
    struct RecordingPacer(Vec<Duration>);

    impl Pacer for &mut RecordingPacer {
        fn pause(&mut self, duration: Duration) {
            self.0.push(duration)
        }
    }

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    fn timeout() -> Result<Duration, ProbeError> {
        Err(ProbeError::Timeout(DEFAULT_INTERVAL))
    }

    #[test]
    fn paces_each_tick_to_the_interval() {
        let mut prober = ScriptedProber::new([Ok(ms(20)), Ok(ms(50)), Ok(ms(30))]);
        let mut pacer = RecordingPacer::default();

        let run = Sampler::with_pacer(&mut prober, &mut pacer, DEFAULT_INTERVAL)
            .run("example.test", 3);

        assert_eq!(run.samples.len(), 3);
        assert_eq!(run.missed, 0);
        assert_eq!(pacer.0, vec![ms(980), ms(950), ms(970)]);
        for (latency, pause) in run.samples.iter().zip(&pacer.0) {
            assert_eq!(*latency + *pause, DEFAULT_INTERVAL);
        }
    }

    #[test]
    fn every_probe_uses_the_interval_as_timeout() {
        let interval = ms(250);
        let mut prober = ScriptedProber::new([Ok(ms(1)), timeout()]);
        let mut pacer = RecordingPacer::default();

        Sampler::with_pacer(&mut prober, &mut pacer, interval).run("10.0.0.1", 2);

        assert_eq!(
            prober.probed,
            vec![("10.0.0.1".to_string(), interval); 2]
        );
    }

    #[test]
    fn timeout_is_skipped_without_pause() {
        let mut prober = ScriptedProber::new([Ok(ms(20)), timeout(), Ok(ms(30))]);
        let mut pacer = RecordingPacer::default();

        let run = Sampler::with_pacer(&mut prober, &mut pacer, DEFAULT_INTERVAL)
            .run("example.test", 3);

        assert_eq!(run.samples.as_secs(), vec![0.02, 0.03]);
        assert_eq!(run.missed, 1);
        assert_eq!(run.requested, 3);
        assert_eq!(pacer.0, vec![ms(980), ms(970)]);
    }

    #[test]
    fn other_probe_failures_are_skipped_like_timeouts() {
        let mut prober = ScriptedProber::new([
            Err(ProbeError::Unresolvable("example.invalid".to_string())),
            Err(ProbeError::Io(io::Error::new(io::ErrorKind::Other, "send failed"))),
            Ok(ms(5)),
        ]);
        let mut pacer = RecordingPacer::default();

        let run = Sampler::with_pacer(&mut prober, &mut pacer, DEFAULT_INTERVAL)
            .run("example.invalid", 3);

        assert_eq!(run.samples.len(), 1);
        assert_eq!(run.missed, 2);
        assert_eq!(pacer.0, vec![ms(995)]);
    }

    #[test]
    fn unreachable_host_yields_empty_sequence() {
        let mut prober = ScriptedProber::new((0..5).map(|_| timeout()));
        let mut pacer = RecordingPacer::default();

        let run = Sampler::with_pacer(&mut prober, &mut pacer, DEFAULT_INTERVAL)
            .run("example.test", 5);

        assert!(run.samples.is_empty());
        assert_eq!(run.missed, 5);
        assert!(pacer.0.is_empty());
    }

    #[test]
    fn latency_equal_to_interval_pauses_for_zero() {
        let mut prober = ScriptedProber::new([Ok(DEFAULT_INTERVAL)]);
        let mut pacer = RecordingPacer::default();

        let run = Sampler::with_pacer(&mut prober, &mut pacer, DEFAULT_INTERVAL)
            .run("example.test", 1);

        assert_eq!(run.samples.len(), 1);
        assert_eq!(pacer.0, vec![Duration::ZERO]);
    }

    #[test]
    fn latency_beyond_interval_counts_as_timeout() {
        let mut prober = ScriptedProber::new([Ok(ms(1001)), Ok(ms(10))]);
        let mut pacer = RecordingPacer::default();

        let run = Sampler::with_pacer(&mut prober, &mut pacer, DEFAULT_INTERVAL)
            .run("example.test", 2);

        assert_eq!(run.samples.as_secs(), vec![0.01]);
        assert_eq!(run.missed, 1);
        assert_eq!(pacer.0, vec![ms(990)]);
    }

    #[test]
    fn zero_samples_issue_no_probe() {
        let dir = tempfile::tempdir().unwrap();
        let mut prober = ScriptedProber::new(Vec::<Result<Duration, ProbeError>>::new());
        let mut pacer = RecordingPacer::default();

        let (run, path) = Sampler::with_pacer(&mut prober, &mut pacer, DEFAULT_INTERVAL)
            .run_and_persist("example.test", 0, dir.path())
            .unwrap();

        assert!(run.samples.is_empty());
        assert!(prober.probed.is_empty());
        assert_eq!(fs::read_to_string(path).unwrap(), "Latency_secs\n");
    }

    #[test]
    fn successful_run_is_written_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut prober = ScriptedProber::new([Ok(ms(20)), Ok(ms(50)), Ok(ms(30))]);
        let mut pacer = RecordingPacer::default();

        let (_, path) = Sampler::with_pacer(&mut prober, &mut pacer, DEFAULT_INTERVAL)
            .run_and_persist("example.test", 3, dir.path())
            .unwrap();

        assert_eq!(path, dir.path().join("ping-example.test.csv"));
        assert_eq!(
            fs::read_to_string(path).unwrap(),
            "Latency_secs\n0.02\n0.05\n0.03\n"
        );
    }

    #[test]
    fn timed_out_probe_leaves_no_row() {
        let dir = tempfile::tempdir().unwrap();
        let mut prober = ScriptedProber::new([Ok(ms(20)), timeout(), Ok(ms(30))]);
        let mut pacer = RecordingPacer::default();

        let ((run, path), warnings) = with_warnings(|| {
            Sampler::with_pacer(&mut prober, &mut pacer, DEFAULT_INTERVAL)
                .run_and_persist("example.test", 3, dir.path())
                .unwrap()
        });

        assert_eq!(run.missed, 1);
        assert_eq!(warnings, vec![MISSED_PROBE_WARNING.to_string()]);
        assert_eq!(
            fs::read_to_string(path).unwrap(),
            "Latency_secs\n0.02\n0.03\n"
        );
    }

    #[test]
    fn successful_run_logs_no_warning() {
        let mut prober = ScriptedProber::new([Ok(ms(20)), Ok(ms(50)), Ok(ms(30))]);
        let mut pacer = RecordingPacer::default();

        let (run, warnings) = with_warnings(|| {
            Sampler::with_pacer(&mut prober, &mut pacer, DEFAULT_INTERVAL).run("example.test", 3)
        });

        assert_eq!(run.samples.len(), 3);
        assert!(warnings.is_empty());
    }

    #[test]
    fn unwritable_output_is_a_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut prober = ScriptedProber::new([Ok(ms(20))]);
        let mut pacer = RecordingPacer::default();

        let result = Sampler::with_pacer(&mut prober, &mut pacer, DEFAULT_INTERVAL)
            .run_and_persist("example.test", 1, dir.path().join("does-not-exist"));

        assert!(matches!(result, Err(Error::Persistence(_))));
    }

    #[test]
    fn sample_count_parsing() {
        assert_eq!(parse_sample_count("100").unwrap(), 100);
        assert_eq!(parse_sample_count("0").unwrap(), 0);
        assert!(matches!(
            parse_sample_count("-3"),
            Err(Error::Parse { arg: "sample count", .. })
        ));
        assert!(parse_sample_count("ten").is_err());
        assert!(parse_sample_count("1.5").is_err());
    }

    #[test]
    fn interval_parsing() {
        assert_eq!(parse_interval("1").unwrap(), DEFAULT_INTERVAL);
        assert_eq!(parse_interval("0.25").unwrap(), ms(250));
        assert!(parse_interval("0").is_err());
        assert!(parse_interval("-1").is_err());
        assert!(parse_interval("inf").is_err());
        assert!(parse_interval("NaN").is_err());
        assert!(parse_interval("soon").is_err());
        assert_eq!(parse_interval("0.000001").unwrap(), Duration::from_micros(1));
        assert!(matches!(
            parse_interval("0.0000005"),
            Err(Error::Parse { arg: "interval", .. })
        ));
    }
}
