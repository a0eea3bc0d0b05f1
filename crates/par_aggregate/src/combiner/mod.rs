//! src/combiner/mod.rs
//!
//! Partial-sum combiner.
//!
//! Each worker folds the indices it is handed into a private partial, then
//! merges that partial into a run-owned accumulator using one of four
//! interchangeable disciplines:
//!
//! | Discipline | Shared state                         | Blocking              |
//! |------------|--------------------------------------|-----------------------|
//! | `Atomic`   | one `AtomicU64` (CAS loop)           | never                 |
//! | `Critical` | process-wide lock keyed by a name    | while another merges  |
//! | `Lock`     | lock object owned by the run         | while another merges  |
//! | `Builtin`  | none; rayon combines the partials    | never                 |
//!
//! The accumulator is read only after every worker has joined. A worker that
//! fails or panics returns before its merge, so it never contributes a
//! partial value.

mod accumulator;
mod builtin;

pub use accumulator::{
    critical_section, Accumulator, AtomicAccumulator, CriticalAccumulator, LockAccumulator,
    MergeLock,
};

use anyhow::Result;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use crate::config::AggregateConfig;
use crate::reduce::{Element, ReduceOp};
use crate::schedule::{Schedule, StaticSchedule};
use crate::workers::WorkerGroup;

/// How per-worker partials are merged into the shared result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeDiscipline {
    #[default]
    Atomic,
    Critical,
    Lock,
    Builtin,
}

impl MergeDiscipline {
    pub const ALL: [MergeDiscipline; 4] = [
        MergeDiscipline::Atomic,
        MergeDiscipline::Critical,
        MergeDiscipline::Lock,
        MergeDiscipline::Builtin,
    ];

    /// Creates the shared accumulator for one run.
    ///
    /// Returns `None` for `Builtin`, which has no shared accumulator: its
    /// partials are combined by the runtime after the workers finish.
    pub fn accumulator<T: Element>(
        self,
        op: ReduceOp,
        section_name: &str,
    ) -> Option<Box<dyn Accumulator<T>>> {
        match self {
            MergeDiscipline::Atomic => Some(Box::new(AtomicAccumulator::new(op))),
            MergeDiscipline::Critical => Some(Box::new(CriticalAccumulator::new(op, section_name))),
            MergeDiscipline::Lock => Some(Box::new(LockAccumulator::new(op))),
            MergeDiscipline::Builtin => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MergeDiscipline::Atomic => "atomic",
            MergeDiscipline::Critical => "critical",
            MergeDiscipline::Lock => "lock",
            MergeDiscipline::Builtin => "builtin",
        }
    }
}

impl fmt::Display for MergeDiscipline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MergeDiscipline {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "atomic" => Ok(MergeDiscipline::Atomic),
            "critical" | "mutual-exclusion" => Ok(MergeDiscipline::Critical),
            "lock" | "explicit-lock" => Ok(MergeDiscipline::Lock),
            "builtin" | "reduction" => Ok(MergeDiscipline::Builtin),
            other => anyhow::bail!(
                "Unknown merge discipline '{}', expected one of: atomic, critical, lock, builtin",
                other
            ),
        }
    }
}

/// Result of one timed aggregation run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunOutcome<T> {
    /// Merged value, or the reduction identity for empty input.
    pub value: T,
    /// Wall-clock time of the parallel region, including thread start-up.
    pub elapsed: Duration,
    /// Number of indices evaluated.
    pub items_processed: usize,
}

/// Reduces `f(i)` for every `i` in `[0, len)` with `op`.
///
/// The range is split by `config.schedule` across `config.num_workers` workers
/// and the partials are merged with `config.discipline`. Configuration errors
/// are returned before any thread is spawned.
///
/// ```ignore
/// let config = AggregateConfig::builder()
///     .num_workers(4)
///     .discipline(MergeDiscipline::Critical)
///     .build();
/// let outcome = reduce_indexed(data.len(), ReduceOp::Max, &config, |i| data[i])?;
/// ```
pub fn reduce_indexed<T, F>(
    len: usize,
    op: ReduceOp,
    config: &AggregateConfig,
    f: F,
) -> Result<RunOutcome<T>>
where
    T: Element,
    F: Fn(usize) -> T + Sync,
{
    config.validate()?;
    let start = Instant::now();

    let value = match config.discipline.accumulator::<T>(op, &config.critical_section) {
        None => builtin::reduce(len, op, config, &f)?,
        Some(accumulator) => {
            let schedule =
                config
                    .schedule
                    .build(len, config.num_workers, config.chunk_size)?;
            let group = WorkerGroup::new(
                format!("{}-{}", config.discipline, config.schedule),
                config.num_workers,
            )?;

            let schedule = schedule.as_ref();
            let shared = accumulator.as_ref();
            group.run(|worker_id| {
                let mut local = op.identity::<T>();
                for range in schedule.ranges(worker_id) {
                    for i in range.indices() {
                        local = op.combine(local, f(i));
                    }
                }
                shared.merge(local);
                Ok(())
            })?;

            debug_assert_eq!(accumulator.merge_count(), config.num_workers);
            accumulator.into_value()
        }
    };

    let elapsed = start.elapsed();
    debug!(
        "{} over {} items: {} workers, {} merge, {} schedule, {:?}",
        op, len, config.num_workers, config.discipline, config.schedule, elapsed
    );
    Ok(RunOutcome {
        value,
        elapsed,
        items_processed: len,
    })
}

/// Reduces an in-memory buffer. Equivalent to `reduce_indexed` with
/// `f(i) = data[i]`.
pub fn reduce_slice<T: Element>(
    data: &[T],
    op: ReduceOp,
    config: &AggregateConfig,
) -> Result<RunOutcome<T>> {
    reduce_indexed(data.len(), op, config, |i| data[i])
}

/// Reduces `data` with an explicit contiguous split and no shared state.
///
/// Each worker returns its partial and the partials are combined after the
/// join, in worker order. This is the hand-written baseline the merge
/// disciplines are compared against.
pub fn manual_split<T: Element>(
    data: &[T],
    op: ReduceOp,
    num_workers: usize,
) -> Result<RunOutcome<T>> {
    let group = WorkerGroup::new("manual-split", num_workers)?;
    let start = Instant::now();

    let schedule = StaticSchedule::new(data.len(), group.num_workers(), None);
    let partials = group.run(|worker_id| {
        Ok(schedule
            .ranges(worker_id)
            .flat_map(|range| data[range.indices()].iter().copied())
            .fold(op.identity::<T>(), |acc, v| op.combine(acc, v)))
    })?;

    Ok(RunOutcome {
        value: op.fold(partials),
        elapsed: start.elapsed(),
        items_processed: data.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::SchedulePolicy;

    const SAMPLE: [i64; 8] = [3, -1, 4, 1, 5, 9, 2, 6];

    fn config(workers: usize, discipline: MergeDiscipline) -> AggregateConfig {
        AggregateConfig::builder()
            .num_workers(workers)
            .discipline(discipline)
            .build()
    }

    #[test]
    fn all_disciplines_agree_on_sample() -> Result<()> {
        for discipline in MergeDiscipline::ALL {
            let config = config(4, discipline);
            assert_eq!(reduce_slice(&SAMPLE, ReduceOp::Sum, &config)?.value, 29);
            assert_eq!(reduce_slice(&SAMPLE, ReduceOp::Min, &config)?.value, -1);
            assert_eq!(reduce_slice(&SAMPLE, ReduceOp::Max, &config)?.value, 9);
        }
        Ok(())
    }

    #[test]
    fn every_schedule_gives_same_integer_result() -> Result<()> {
        let data: Vec<i64> = (0..5_000).map(|i| (i * 31) % 977 - 400).collect();
        for policy in SchedulePolicy::ALL {
            for discipline in MergeDiscipline::ALL {
                let config = AggregateConfig::builder()
                    .num_workers(3)
                    .schedule(policy)
                    .chunk_size(7)
                    .discipline(discipline)
                    .build();
                for op in ReduceOp::ALL {
                    let outcome = reduce_slice(&data, op, &config)?;
                    assert_eq!(outcome.value, op.fold(data.iter().copied()));
                    assert_eq!(outcome.items_processed, data.len());
                }
            }
        }
        Ok(())
    }

    #[test]
    fn empty_input_yields_identity() -> Result<()> {
        let empty: [f64; 0] = [];
        for discipline in MergeDiscipline::ALL {
            let config = config(4, discipline);
            assert_eq!(reduce_slice(&empty, ReduceOp::Sum, &config)?.value, 0.0);
            assert_eq!(
                reduce_slice(&empty, ReduceOp::Min, &config)?.value,
                f64::INFINITY
            );
            assert_eq!(
                reduce_slice(&empty, ReduceOp::Max, &config)?.value,
                f64::NEG_INFINITY
            );
            assert_eq!(reduce_slice(&empty, ReduceOp::Sum, &config)?.items_processed, 0);
        }
        Ok(())
    }

    #[test]
    fn single_worker_matches_sequential_fold() -> Result<()> {
        let data: Vec<f64> = (0..1_000).map(|i| (i % 97) as f64 * 0.1).collect();
        let expected = ReduceOp::Sum.fold(data.iter().copied());
        for discipline in MergeDiscipline::ALL {
            let outcome = reduce_slice(&data, ReduceOp::Sum, &config(1, discipline))?;
            assert_eq!(outcome.value, expected, "{discipline}");
        }
        Ok(())
    }

    #[test]
    fn invalid_config_fails_before_work() {
        let called = std::sync::atomic::AtomicBool::new(false);
        let result = reduce_indexed(10, ReduceOp::Sum, &config(0, MergeDiscipline::Atomic), |i| {
            called.store(true, std::sync::atomic::Ordering::SeqCst);
            i as i64
        });
        assert!(result.is_err());
        assert!(!called.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[test]
    fn manual_split_matches_fold() -> Result<()> {
        for workers in [1, 3, 8, 20] {
            assert_eq!(manual_split(&SAMPLE, ReduceOp::Sum, workers)?.value, 29);
            assert_eq!(manual_split(&SAMPLE, ReduceOp::Min, workers)?.value, -1);
        }
        assert!(manual_split(&SAMPLE, ReduceOp::Max, 0).is_err());
        Ok(())
    }

    #[test]
    fn parses_discipline_aliases() {
        assert_eq!(
            "mutual-exclusion".parse::<MergeDiscipline>().unwrap(),
            MergeDiscipline::Critical
        );
        assert_eq!(
            "explicit-lock".parse::<MergeDiscipline>().unwrap(),
            MergeDiscipline::Lock
        );
        assert_eq!(
            "reduction".parse::<MergeDiscipline>().unwrap(),
            MergeDiscipline::Builtin
        );
        assert!("spin".parse::<MergeDiscipline>().is_err());
    }
}
