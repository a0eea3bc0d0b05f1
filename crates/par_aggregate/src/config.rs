//! src/config.rs
//!
//! Configuration for a single parallel aggregation run.
//!
//! The `AggregateConfig` struct stores the parameters that control how an
//! index range is split across workers and how per-worker partials are merged.
//!
//! Example:
//! ```ignore
//! let config = AggregateConfig::builder()
//!     .num_workers(4)
//!     .schedule(SchedulePolicy::Dynamic)
//!     .chunk_size(10)
//!     .discipline(MergeDiscipline::Atomic)
//!     .build();
//! config.validate()?;
//! ```
//!
//! # Performance considerations:
//! - `num_workers`: Each run spawns its own group of this many threads.
//! - `chunk_size`: Small chunks balance uneven work but cost one claim each.
//! - `wait_strategy`: `Notify` parks idle compute workers, `Poll` sleeps for
//!                    a bounded interval between queue checks.

use anyhow::{ensure, Result};
use std::time::Duration;

use crate::combiner::MergeDiscipline;
use crate::schedule::SchedulePolicy;

/// Name of the critical section used when none is configured.
pub const DEFAULT_CRITICAL_SECTION: &str = "par_aggregate.merge";

/// Default polling interval for `WaitStrategy::Poll`.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// How a compute worker waits on an empty pipeline queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitStrategy {
    /// Block on a condition variable signalled by the loader on every push.
    #[default]
    Notify,
    /// Re-check the queue after sleeping for the given interval.
    Poll(Duration),
}

/// Configuration for one aggregation run
#[derive(Debug, Clone)]
pub struct AggregateConfig {
    /// Number of parallel workers (must be > 0)
    pub num_workers: usize,
    /// How the index range is split across workers
    pub schedule: SchedulePolicy,
    /// Chunk size for the schedule. `None` selects the policy default:
    /// one contiguous block per worker for static, 1 for dynamic and guided.
    pub chunk_size: Option<usize>,
    /// How per-worker partials are merged into the shared accumulator
    pub discipline: MergeDiscipline,
    /// How the pipeline compute role waits for new items
    pub wait_strategy: WaitStrategy,
    /// Name of the critical section used by `MergeDiscipline::Critical`.
    /// Runs that share a name are serialized against each other.
    pub critical_section: String,
}

impl Default for AggregateConfig {
    fn default() -> Self {
        Self {
            num_workers: 1,
            schedule: SchedulePolicy::Static,
            chunk_size: None,
            discipline: MergeDiscipline::Atomic,
            wait_strategy: WaitStrategy::Notify,
            critical_section: DEFAULT_CRITICAL_SECTION.to_string(),
        }
    }
}

impl AggregateConfig {
    pub fn builder() -> AggregateConfigBuilder {
        AggregateConfigBuilder::default()
    }

    /// Shorthand for a default configuration with `num_workers` workers.
    pub fn with_workers(num_workers: usize) -> Self {
        Self::builder().num_workers(num_workers).build()
    }

    /// Checks the configuration before any worker is spawned.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.num_workers > 0,
            "num_workers must be a positive integer, but got num_workers={}",
            self.num_workers
        );
        if let Some(chunk) = self.chunk_size {
            ensure!(
                chunk > 0,
                "chunk_size must be a positive integer, but got chunk_size={}",
                chunk
            );
        }
        if let WaitStrategy::Poll(interval) = self.wait_strategy {
            ensure!(
                !interval.is_zero(),
                "Poll interval must be non-zero to avoid an unbounded spin"
            );
        }
        ensure!(
            !self.critical_section.is_empty(),
            "critical_section name must not be empty"
        );
        Ok(())
    }
}

/// Builder for AggregateConfig with method chaining
#[derive(Default)]
pub struct AggregateConfigBuilder {
    config: AggregateConfig,
}

impl AggregateConfigBuilder {
    /// Set the number of workers
    pub fn num_workers(mut self, workers: usize) -> Self {
        self.config.num_workers = workers;
        self
    }

    /// Set the scheduling policy
    pub fn schedule(mut self, schedule: SchedulePolicy) -> Self {
        self.config.schedule = schedule;
        self
    }

    /// Set the chunk size (must be > 0)
    pub fn chunk_size(mut self, chunk: usize) -> Self {
        self.config.chunk_size = Some(chunk);
        self
    }

    /// Set the merge discipline
    pub fn discipline(mut self, discipline: MergeDiscipline) -> Self {
        self.config.discipline = discipline;
        self
    }

    /// Set how idle compute workers wait for the loader.
    ///
    /// - `Notify`: no wasted cycles, woken on every push.
    /// - `Poll`: simpler, but adds up to one interval of latency per wait.
    pub fn wait_strategy(mut self, strategy: WaitStrategy) -> Self {
        self.config.wait_strategy = strategy;
        self
    }

    /// Set the critical section name used by `MergeDiscipline::Critical`.
    pub fn critical_section(mut self, name: impl Into<String>) -> Self {
        self.config.critical_section = name.into();
        self
    }

    /// Build the final configuration.
    pub fn build(self) -> AggregateConfig {
        self.config
    }
}
