//! The benchmark harness.
//!
//! A [`Harness`] moves through four states, each entered once:
//!
//! ```text
//! Initializing ──run()──▶ RunningMatrix ──▶ Draining ──▶ Done
//! ```
//!
//! - **Initializing**: the configuration is validated and the strategy set is built:
//!   the serial scanner, one parallel scanner per worker-count rung, and the GPU
//!   scanner if one can be opened.
//! - **RunningMatrix**: for every source, every sample fraction and every strategy,
//!   in that nesting order, the `search` call alone is timed and one
//!   [`ResultRecord`] is appended. Failed searches are recorded, never fatal.
//! - **Draining**: every strategy is released exactly once. A failed release is
//!   logged and the remaining strategies are still released.
//! - **Done**: the records are final.
//!
//! The matrix runs on the calling thread, one `search` at a time, so that every
//! measurement has the machine to itself.
use std::borrow::Borrow;
use std::fmt;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::BenchConfig;
use crate::errors::{BenchError, BenchResult};
use crate::metrics::RunMetrics;
use crate::results::ResultRecord;
use crate::search::{DeviceScanner, ParallelScanner, SearchStrategy, SerialScanner};
use crate::source::InputSource;

/// Lifecycle state of a [`Harness`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarnessState {
    Initializing,
    RunningMatrix,
    Draining,
    Done,
}

impl fmt::Display for HarnessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HarnessState::Initializing => "initializing",
            HarnessState::RunningMatrix => "running the matrix",
            HarnessState::Draining => "draining",
            HarnessState::Done => "done",
        };
        f.write_str(name)
    }
}

/// Worker counts to benchmark for `hardware_threads` cores.
///
/// Always starts at 1 and doubles while the count fits; if the core count is not
/// itself a power of two it is appended, so 6 cores give `[1, 2, 4, 6]` and
/// 8 cores give `[1, 2, 4, 8]`.
pub fn worker_rungs(hardware_threads: usize) -> Vec<NonZeroUsize> {
    let max = hardware_threads.max(1);
    let mut rungs = Vec::new();
    let mut k: usize = 1;
    while k <= max {
        rungs.push(k);
        match k.checked_mul(2) {
            Some(next) => k = next,
            None => break,
        }
    }
    if !max.is_power_of_two() {
        rungs.push(max);
    }
    rungs.into_iter().filter_map(NonZeroUsize::new).collect()
}

/// Builds the strategy set in enumeration order: serial, parallel rungs, device.
///
/// A GPU that cannot be opened is logged and left out.
pub fn build_strategies(config: &BenchConfig) -> BenchResult<Vec<Box<dyn SearchStrategy>>> {
    let mut strategies: Vec<Box<dyn SearchStrategy>> = vec![Box::new(SerialScanner::new())];

    let rungs = match &config.thread_rungs {
        Some(rungs) => rungs.clone(),
        None => worker_rungs(config.hardware_threads()),
    };
    for workers in rungs {
        strategies.push(Box::new(ParallelScanner::new(workers)?));
    }

    if config.device {
        match DeviceScanner::new() {
            Ok(device) => strategies.push(Box::new(device)),
            Err(e) => {
                warn!("GPU not available ({}), continuing with CPU strategies only", e);
            }
        }
    } else {
        info!("Device offload disabled by configuration");
    }

    Ok(strategies)
}

/// Drives every strategy over every sample and collects the timings
pub struct Harness {
    config: BenchConfig,
    strategies: Vec<Box<dyn SearchStrategy>>,
    state: HarnessState,
    records: Vec<ResultRecord>,
    metrics: RunMetrics,
}

impl Harness {
    /// Validates `config` and builds the default strategy set
    pub fn new(config: BenchConfig) -> BenchResult<Self> {
        config.validate()?;
        let strategies = build_strategies(&config)?;
        Self::assemble(config, strategies)
    }

    /// Validates `config` and uses the given strategies, in the given order
    pub fn with_strategies(
        config: BenchConfig,
        strategies: Vec<Box<dyn SearchStrategy>>,
    ) -> BenchResult<Self> {
        config.validate()?;
        Self::assemble(config, strategies)
    }

    /// Takes an already validated configuration
    fn assemble(
        config: BenchConfig,
        strategies: Vec<Box<dyn SearchStrategy>>,
    ) -> BenchResult<Self> {
        if strategies.is_empty() {
            return Err(BenchError::config_error("no search strategies to run"));
        }

        info!(
            "Benchmark ready: {} strategies ({}), pattern {:?}, fractions {:?}",
            strategies.len(),
            strategies
                .iter()
                .map(|s| s.name())
                .collect::<Vec<_>>()
                .join(", "),
            config.pattern,
            config.sample_fractions
        );

        Ok(Self {
            config,
            strategies,
            state: HarnessState::Initializing,
            records: Vec::new(),
            metrics: RunMetrics::new(),
        })
    }

    pub fn state(&self) -> HarnessState {
        self.state
    }

    pub fn config(&self) -> &BenchConfig {
        &self.config
    }

    pub fn strategies(&self) -> &[Box<dyn SearchStrategy>] {
        &self.strategies
    }

    pub fn metrics(&self) -> &RunMetrics {
        &self.metrics
    }

    /// Records collected so far, in enumeration order
    pub fn records(&self) -> &[ResultRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<ResultRecord> {
        self.records
    }

    /// Number of measurements one source contributes
    pub fn measurements_per_source(&self) -> usize {
        self.config.sample_fractions.len() * self.strategies.len()
    }

    /// Runs the matrix over in-memory sources, then drains
    pub fn run_sources(&mut self, sources: &[InputSource]) -> BenchResult<&[ResultRecord]> {
        self.run(sources.iter().map(Ok), |_| {})
    }

    /// Loads each file lazily, skipping the ones that cannot be read, then drains
    pub fn run_files<F>(&mut self, paths: &[PathBuf], on_record: F) -> BenchResult<&[ResultRecord]>
    where
        F: FnMut(&ResultRecord),
    {
        self.run(paths.iter().map(|path| InputSource::load(path)), on_record)
    }

    /// Runs the whole matrix and drains every strategy.
    ///
    /// `sources` yields each input or the error that prevented loading it; errored
    /// sources are skipped with a warning. `on_record` sees every record as soon as
    /// it is measured. Fails only when called twice or when releasing a strategy
    /// fails; the records stay available through [`Harness::records`] either way.
    pub fn run<I, S, F>(&mut self, sources: I, mut on_record: F) -> BenchResult<&[ResultRecord]>
    where
        I: IntoIterator<Item = BenchResult<S>>,
        S: Borrow<InputSource>,
        F: FnMut(&ResultRecord),
    {
        if self.state != HarnessState::Initializing {
            return Err(BenchError::invalid_state("run", self.state));
        }

        self.state = HarnessState::RunningMatrix;
        info!("Starting benchmark matrix");

        for source in sources {
            match source {
                Ok(source) => {
                    self.metrics.record_source(true);
                    self.measure_source(source.borrow(), &mut on_record);
                }
                Err(e) => {
                    self.metrics.record_source(false);
                    warn!("Skipping source: {}", e);
                }
            }
        }

        self.drain()?;
        Ok(&self.records)
    }

    fn measure_source<F>(&mut self, source: &InputSource, on_record: &mut F)
    where
        F: FnMut(&ResultRecord),
    {
        let Self {
            config,
            strategies,
            records,
            metrics,
            ..
        } = self;
        let pattern = config.pattern_bytes();
        let settle = Duration::from_millis(config.settle_ms);

        info!("Processing {} ({} bytes)", source.label(), source.len());

        for sample in source.samples(&config.sample_fractions) {
            info!("  > Sample {}% ({} bytes)", sample.percent(), sample.len());
            let first = records.len();

            for strategy in strategies.iter() {
                if !settle.is_zero() {
                    thread::sleep(settle);
                }

                let started = Instant::now();
                let outcome = strategy.search(sample.bytes, pattern);
                let elapsed = started.elapsed();

                if let Err(e) = &outcome {
                    warn!(
                        "{} failed on {} ({} bytes): {}",
                        strategy.name(),
                        source.label(),
                        sample.len(),
                        e
                    );
                }

                let record = ResultRecord::new(
                    source.label(),
                    sample.len(),
                    &**strategy,
                    &outcome,
                    elapsed,
                )
                .with_sample_percent(sample.percent());
                debug!(
                    "    {:<22}: {:>5} ms | {} found",
                    record.strategy_name, record.duration_ms, record.occurrence_count
                );
                metrics.record_measurement(sample.len() as u64, outcome.is_err());
                on_record(&record);
                records.push(record);
            }

            check_agreement(&records[first..]);
        }
    }

    fn drain(&mut self) -> BenchResult<()> {
        self.state = HarnessState::Draining;
        info!("Releasing {} strategies", self.strategies.len());

        let mut failures = Vec::new();
        for strategy in self.strategies.iter_mut() {
            match strategy.release() {
                Ok(()) => {
                    self.metrics.record_release(true);
                    debug!("Released {}", strategy.name());
                }
                Err(e) => {
                    self.metrics.record_release(false);
                    warn!("Failed to release {}: {}", strategy.name(), e);
                    failures.push(format!("{}: {}", strategy.name(), e));
                }
            }
        }

        self.state = HarnessState::Done;
        self.metrics.log_stats();
        info!("Benchmark complete: {} records", self.records.len());

        if failures.is_empty() {
            Ok(())
        } else {
            Err(BenchError::ReleaseFailed { failures })
        }
    }
}

impl fmt::Debug for Harness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Harness")
            .field("state", &self.state)
            .field(
                "strategies",
                &self.strategies.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .field("records", &self.records.len())
            .finish()
    }
}

/// Warns when error-free strategies disagree on one sample's count
fn check_agreement(sample_records: &[ResultRecord]) {
    let mut counts = sample_records
        .iter()
        .filter(|r| r.is_ok())
        .map(|r| (r.strategy_name.as_str(), r.occurrence_count));
    if let Some((reference_name, reference)) = counts.next() {
        for (name, count) in counts {
            if count != reference {
                warn!(
                    "{} counted {} but {} counted {}",
                    name, count, reference_name, reference
                );
            }
        }
    }
}
