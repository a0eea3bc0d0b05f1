//! Work distribution across a fixed number of workers.
//!
//! A `Schedule` maps the index range `[0, len)` onto `num_workers` workers.
//! Every policy produces a complete, non-overlapping partition of the range;
//! the policy only decides *when* and *to whom* each piece is handed out:
//!
//! - `Static`: contiguous pieces assigned up front, round-robin by worker id.
//! - `Dynamic`: workers repeatedly claim the next fixed-size chunk from a
//!   shared cursor until the range is exhausted.
//! - `Guided`: like dynamic, but each claim takes a share of the *remaining*
//!   work, so chunks start large and shrink toward the minimum chunk size.
//!
//! Schedules hold per-run claim state, so build a fresh one for every run.

mod dynamic_schedule;
mod guided_schedule;
mod static_schedule;

pub use dynamic_schedule::DynamicSchedule;
pub use guided_schedule::GuidedSchedule;
pub use static_schedule::StaticSchedule;

use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use std::str::FromStr;

use crate::config::AggregateConfig;
use crate::workers::WorkerGroup;

/// A half-open index range `[start, end)` handed to exactly one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkRange {
    pub start: usize,
    pub end: usize,
}

impl WorkRange {
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end, "WorkRange start {start} exceeds end {end}");
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn indices(&self) -> Range<usize> {
        self.start..self.end
    }
}

impl From<Range<usize>> for WorkRange {
    fn from(range: Range<usize>) -> Self {
        WorkRange::new(range.start, range.end)
    }
}

/// Strategy for handing out pieces of an index range to workers.
///
/// Implementations must be `Send + Sync` so a single instance can be shared
/// by every worker of a run.
pub trait Schedule: Send + Sync {
    /// Length of the scheduled range.
    fn len(&self) -> usize;

    /// Number of workers the range is split across.
    fn num_workers(&self) -> usize;

    /// Ranges for `worker_id`, produced lazily. Dynamic policies claim a new
    /// range from shared state on every `next()`.
    fn ranges(&self, worker_id: usize) -> Box<dyn Iterator<Item = WorkRange> + Send + '_>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Scheduling policy selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulePolicy {
    #[default]
    Static,
    Dynamic,
    Guided,
}

impl SchedulePolicy {
    pub const ALL: [SchedulePolicy; 3] = [
        SchedulePolicy::Static,
        SchedulePolicy::Dynamic,
        SchedulePolicy::Guided,
    ];

    /// Builds a single-use schedule for `len` indices over `num_workers`.
    ///
    /// `chunk_size` is the piece size for static and dynamic, and the minimum
    /// piece size for guided. `None` selects the policy default.
    pub fn build(
        self,
        len: usize,
        num_workers: usize,
        chunk_size: Option<usize>,
    ) -> Result<Box<dyn Schedule>> {
        ensure!(
            num_workers > 0,
            "Number of workers must be > 0, but got {}",
            num_workers
        );
        if let Some(chunk) = chunk_size {
            ensure!(chunk > 0, "chunk_size must be > 0, but got {}", chunk);
        }
        Ok(match self {
            SchedulePolicy::Static => Box::new(StaticSchedule::new(len, num_workers, chunk_size)),
            SchedulePolicy::Dynamic => Box::new(DynamicSchedule::new(
                len,
                num_workers,
                chunk_size.unwrap_or(1),
            )),
            SchedulePolicy::Guided => Box::new(GuidedSchedule::new(
                len,
                num_workers,
                chunk_size.unwrap_or(1),
            )),
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SchedulePolicy::Static => "static",
            SchedulePolicy::Dynamic => "dynamic",
            SchedulePolicy::Guided => "guided",
        }
    }
}

impl fmt::Display for SchedulePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SchedulePolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "static" => Ok(SchedulePolicy::Static),
            "dynamic" => Ok(SchedulePolicy::Dynamic),
            "guided" => Ok(SchedulePolicy::Guided),
            other => anyhow::bail!(
                "Unknown schedule '{}', expected one of: static, dynamic, guided",
                other
            ),
        }
    }
}

/// Splits `[0, len)` across the configured workers and returns the ranges
/// each worker actually claimed, indexed by worker id.
///
/// Worker threads are really spawned, so for dynamic and guided policies the
/// per-worker assignment varies between calls while the union never does.
pub fn distribute(len: usize, config: &AggregateConfig) -> Result<Vec<Vec<WorkRange>>> {
    config.validate()?;
    let schedule = config
        .schedule
        .build(len, config.num_workers, config.chunk_size)?;
    let group = WorkerGroup::new(format!("distribute-{}", config.schedule), config.num_workers)?;
    let schedule = schedule.as_ref();
    group.run(|worker_id| Ok(schedule.ranges(worker_id).collect()))
}
