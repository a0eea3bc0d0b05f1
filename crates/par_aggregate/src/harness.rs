//! src/harness.rs
//!
//! Repeated timing of benchmark runs and speedup/efficiency bookkeeping.
//!
//! Speedup is the single-worker time for the same workload, input size and
//! variant divided by the measured time. Efficiency is speedup divided by the
//! worker count. A single-worker run is its own baseline, so both values are
//! exactly 1.0 there by definition rather than by division.

use anyhow::{ensure, Context, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::{Duration, Instant};

use crate::combiner::RunOutcome;
use crate::pipeline::PipelineOutcome;
use crate::reduce::Element;

/// Smallest time used as a speedup denominator.
const MIN_MEASURED: Duration = Duration::from_nanos(1);

/// Average time of repeated calls plus the value of the last call.
#[derive(Debug, Clone)]
pub struct Measurement<T> {
    pub average: Duration,
    pub repetitions: usize,
    pub last: T,
}

/// Calls `f` `repetitions` times and averages the wall-clock time.
pub fn measure<T, F>(repetitions: usize, mut f: F) -> Result<Measurement<T>>
where
    F: FnMut() -> Result<T>,
{
    ensure!(
        repetitions > 0,
        "repetitions must be a positive integer, but got repetitions={}",
        repetitions
    );
    let divisor = u32::try_from(repetitions)
        .with_context(|| format!("repetitions={} exceeds {}", repetitions, u32::MAX))?;
    let mut total = Duration::ZERO;
    let mut last = None;
    for _ in 0..repetitions {
        let start = Instant::now();
        let value = f()?;
        total += start.elapsed();
        last = Some(value);
    }
    let last = last.context("No measurement was taken")?;
    Ok(Measurement {
        average: total / divisor,
        repetitions,
        last,
    })
}

/// `(speedup, efficiency)` of a run relative to its single-worker baseline.
pub fn speedup_and_efficiency(
    baseline: Duration,
    measured: Duration,
    num_workers: usize,
) -> (f64, f64) {
    if num_workers <= 1 {
        return (1.0, 1.0);
    }
    let speedup = baseline.as_secs_f64() / measured.max(MIN_MEASURED).as_secs_f64();
    (speedup, speedup / num_workers as f64)
}

/// What a benchmark run hands back to the harness: its scalar result and how
/// many of the requested items it actually processed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSample {
    pub result: f64,
    pub items_requested: usize,
    pub items_processed: usize,
}

impl RunSample {
    pub fn complete(result: f64, items: usize) -> Self {
        Self {
            result,
            items_requested: items,
            items_processed: items,
        }
    }

    pub fn is_truncated(&self) -> bool {
        self.items_processed < self.items_requested
    }
}

impl<T: Element> From<RunOutcome<T>> for RunSample {
    fn from(outcome: RunOutcome<T>) -> Self {
        RunSample::complete(outcome.value.to_f64(), outcome.items_processed)
    }
}

impl From<PipelineOutcome> for RunSample {
    fn from(outcome: PipelineOutcome) -> Self {
        Self {
            result: outcome.total,
            items_requested: outcome.items_requested,
            items_processed: outcome.items_processed,
        }
    }
}

/// One timed configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkRecord {
    pub workload: String,
    /// Discipline, schedule, matrix kind or any other label that separates
    /// configurations with different baselines.
    pub variant: String,
    pub size: usize,
    pub num_workers: usize,
    pub repetitions: usize,
    pub avg_time_ms: f64,
    pub speedup: f64,
    /// Fraction in `(0, ..)`; printed as a percentage.
    pub efficiency: f64,
    /// Scalar produced by the last repetition.
    pub result: f64,
    pub items_requested: usize,
    /// Items the last repetition actually processed. Lower than
    /// `items_requested` when the input ended early.
    pub items_processed: usize,
    pub truncated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    pub command: String,
    pub seed: Option<u64>,
    pub platform: String,
    pub cpu_count: usize,
}

impl Metadata {
    pub fn new(command: impl Into<String>, seed: Option<u64>) -> Self {
        Self {
            command: command.into(),
            seed,
            platform: format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH),
            cpu_count: std::thread::available_parallelism().map_or(1, |n| n.get()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkReport {
    pub metadata: Metadata,
    pub records: Vec<BenchmarkRecord>,
}

impl BenchmarkReport {
    pub fn new(metadata: Metadata) -> Self {
        Self {
            metadata,
            records: Vec::new(),
        }
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report: {}", path.display()))?;
        info!("Results saved to {}", path.display());
        Ok(())
    }

    /// Prints one comparison table per workload.
    pub fn print_table(&self) {
        let mut workloads: Vec<&str> = Vec::new();
        for record in &self.records {
            if !workloads.contains(&record.workload.as_str()) {
                workloads.push(&record.workload);
            }
        }

        for workload in workloads {
            println!("\n{}", "=".repeat(100));
            println!("{}", workload.to_uppercase());
            println!("{}", "=".repeat(100));
            println!(
                "{:<24} {:>12} {:>8} {:>12} {:>9} {:>10} {:>12} {:>8}",
                "Variant", "Size", "Threads", "Time(ms)", "Speedup", "Eff(%)", "Processed", "Result"
            );
            println!("{}", "-".repeat(100));
            for r in self.records.iter().filter(|r| r.workload == workload) {
                println!(
                    "{:<24} {:>12} {:>8} {:>12.3} {:>9.2} {:>10.1} {:>12} {:>8}",
                    r.variant,
                    r.size,
                    r.num_workers,
                    r.avg_time_ms,
                    r.speedup,
                    r.efficiency * 100.0,
                    format_processed(r),
                    format_result(r.result)
                );
            }
        }
    }
}

/// Processed count, with the requested count appended when they differ.
fn format_processed(record: &BenchmarkRecord) -> String {
    if record.truncated {
        format!("{}/{}*", record.items_processed, record.items_requested)
    } else {
        record.items_processed.to_string()
    }
}

fn format_result(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value:.4}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BaselineKey {
    workload: String,
    size: usize,
    variant: String,
}

/// Runs configurations, keeps single-worker baselines and collects records.
///
/// ```ignore
/// let mut harness = Harness::new(metadata, 5)?;
/// for &threads in &[1, 2, 4, 8] {
///     harness.record_run("sum", "atomic", data.len(), threads, |workers| {
///         let config = AggregateConfig::with_workers(workers);
///         Ok(reduce_slice(&data, ReduceOp::Sum, &config)?)
///     })?;
/// }
/// harness.report().print_table();
/// ```
pub struct Harness {
    repetitions: usize,
    baselines: HashMap<BaselineKey, Duration>,
    report: BenchmarkReport,
}

impl Harness {
    pub fn new(metadata: Metadata, repetitions: usize) -> Result<Self> {
        ensure!(
            repetitions > 0,
            "repetitions must be a positive integer, but got repetitions={}",
            repetitions
        );
        Ok(Self {
            repetitions,
            baselines: HashMap::new(),
            report: BenchmarkReport::new(metadata),
        })
    }

    pub fn repetitions(&self) -> usize {
        self.repetitions
    }

    pub fn baseline(&self, workload: &str, size: usize, variant: &str) -> Option<Duration> {
        self.baselines
            .get(&BaselineKey {
                workload: workload.to_string(),
                size,
                variant: variant.to_string(),
            })
            .copied()
    }

    /// Times `run(num_workers)` and appends a record.
    ///
    /// When no single-worker time exists yet for this workload, size and
    /// variant, `run(1)` is measured first and kept as the baseline. The
    /// record carries the result and item counts of the last repetition.
    pub fn record_run<F, S>(
        &mut self,
        workload: &str,
        variant: &str,
        size: usize,
        num_workers: usize,
        mut run: F,
    ) -> Result<&BenchmarkRecord>
    where
        F: FnMut(usize) -> Result<S>,
        S: Into<RunSample>,
    {
        ensure!(
            num_workers > 0,
            "num_workers must be a positive integer, but got num_workers={}",
            num_workers
        );
        let key = BaselineKey {
            workload: workload.to_string(),
            size,
            variant: variant.to_string(),
        };

        if num_workers > 1 && !self.baselines.contains_key(&key) {
            debug!("Measuring single-worker baseline for {workload}/{variant} size={size}");
            let baseline = measure(self.repetitions, || run(1))?;
            self.baselines.insert(key.clone(), baseline.average);
        }

        let measured = measure(self.repetitions, || run(num_workers))?;
        if num_workers == 1 {
            self.baselines.insert(key.clone(), measured.average);
        }
        let baseline = self.baselines.get(&key).copied().unwrap_or(measured.average);
        let (speedup, efficiency) =
            speedup_and_efficiency(baseline, measured.average, num_workers);
        let sample: RunSample = measured.last.into();
        if sample.is_truncated() {
            warn!(
                "{workload} {variant} size={size} threads={num_workers}: processed {} of {} items",
                sample.items_processed, sample.items_requested
            );
        }

        self.report.records.push(BenchmarkRecord {
            workload: workload.to_string(),
            variant: variant.to_string(),
            size,
            num_workers,
            repetitions: measured.repetitions,
            avg_time_ms: measured.average.as_secs_f64() * 1000.0,
            speedup,
            efficiency,
            result: sample.result,
            items_requested: sample.items_requested,
            items_processed: sample.items_processed,
            truncated: sample.is_truncated(),
        });
        let record = &self.report.records[self.report.records.len() - 1];
        info!(
            "{workload} {variant} size={size} threads={num_workers}: \
             {:.3} ms, speedup {:.2}, efficiency {:.1}%",
            record.avg_time_ms,
            record.speedup,
            record.efficiency * 100.0
        );
        Ok(record)
    }

    /// `record_run` for every worker count in `threads`, in order.
    pub fn sweep<F, S>(
        &mut self,
        workload: &str,
        variant: &str,
        size: usize,
        threads: &[usize],
        mut run: F,
    ) -> Result<()>
    where
        F: FnMut(usize) -> Result<S>,
        S: Into<RunSample>,
    {
        for &num_workers in threads {
            self.record_run(workload, variant, size, num_workers, &mut run)?;
        }
        Ok(())
    }

    pub fn report(&self) -> &BenchmarkReport {
        &self.report
    }

    pub fn into_report(self) -> BenchmarkReport {
        self.report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn harness(repetitions: usize) -> Harness {
        Harness::new(Metadata::new("test", Some(1)), repetitions).unwrap()
    }

    #[test]
    fn single_worker_is_exactly_one() {
        assert_eq!(
            speedup_and_efficiency(Duration::from_millis(10), Duration::from_millis(3), 1),
            (1.0, 1.0)
        );
        assert_eq!(
            speedup_and_efficiency(Duration::ZERO, Duration::ZERO, 1),
            (1.0, 1.0)
        );
    }

    #[test]
    fn speedup_is_baseline_over_measured() {
        let (speedup, efficiency) =
            speedup_and_efficiency(Duration::from_millis(80), Duration::from_millis(20), 4);
        assert!((speedup - 4.0).abs() < 1e-12);
        assert!((efficiency - 1.0).abs() < 1e-12);
    }

    #[test]
    fn zero_measured_time_stays_finite() {
        let (speedup, efficiency) =
            speedup_and_efficiency(Duration::from_millis(1), Duration::ZERO, 2);
        assert!(speedup.is_finite());
        assert!(efficiency.is_finite());
    }

    #[test]
    fn measure_runs_requested_repetitions() -> Result<()> {
        let calls = Cell::new(0);
        let m = measure(3, || {
            calls.set(calls.get() + 1);
            Ok(calls.get())
        })?;
        assert_eq!(calls.get(), 3);
        assert_eq!(m.last, 3);
        assert!(measure(0, || Ok(())).is_err());
        Ok(())
    }

    #[test]
    fn repetitions_beyond_u32_are_rejected_before_running() {
        let calls = Cell::new(0);
        let result = measure(u32::MAX as usize + 1, || {
            calls.set(calls.get() + 1);
            Ok(())
        });
        assert!(result.is_err());
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn missing_baseline_is_measured_first() -> Result<()> {
        let mut harness = harness(1);
        let mut seen = Vec::new();
        harness.record_run("sum", "atomic", 100, 4, |w| {
            seen.push(w);
            Ok(RunSample::complete(0.0, 100))
        })?;
        assert_eq!(seen, vec![1, 4]);
        assert!(harness.baseline("sum", 100, "atomic").is_some());
        assert!(harness.baseline("sum", 100, "lock").is_none());
        Ok(())
    }

    #[test]
    fn sweep_from_one_worker_reuses_baseline() -> Result<()> {
        let mut harness = harness(2);
        let mut calls = Vec::new();
        harness.sweep("dot", "static", 10, &[1, 2], |w| {
            calls.push(w);
            Ok(RunSample::complete(42.0, 10))
        })?;
        assert_eq!(calls, vec![1, 1, 2, 2]);
        let records = &harness.report().records;
        assert_eq!(records.len(), 2);
        assert_eq!((records[0].speedup, records[0].efficiency), (1.0, 1.0));
        assert_eq!(records[1].result, 42.0);
        Ok(())
    }

    #[test]
    fn short_run_is_recorded_as_truncated() -> Result<()> {
        let mut harness = harness(1);
        let record = harness.record_run("pipeline", "atomic", 10, 1, |_| {
            Ok(RunSample {
                result: 3.5,
                items_requested: 10,
                items_processed: 4,
            })
        })?;
        assert!(record.truncated);
        assert_eq!((record.items_processed, record.items_requested), (4, 10));
        assert_eq!(format_processed(record), "4/10*");
        Ok(())
    }

    #[test]
    fn report_serializes_to_json() -> Result<()> {
        let mut harness = harness(1);
        harness.record_run("minmax", "reduction", 8, 1, |_| Ok(RunSample::complete(9.0, 8)))?;
        let json = serde_json::to_string(harness.report())?;
        let parsed: BenchmarkReport = serde_json::from_str(&json)?;
        assert_eq!(parsed.records, harness.report().records);
        Ok(())
    }
}
