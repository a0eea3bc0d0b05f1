//! Built-in reduction on a rayon thread pool.
//!
//! Every worker folds into a private partial and rayon combines the partials
//! with the same operation once the parallel iterator completes. No shared
//! accumulator exists while the region runs.

use anyhow::{Context, Result};
use rayon::prelude::*;

use crate::config::AggregateConfig;
use crate::reduce::{Element, ReduceOp};
use crate::schedule::SchedulePolicy;

/// Reduces `f(0) .. f(len - 1)` on a pool of `config.num_workers` threads.
///
/// Rayon splits work adaptively, so the schedule only bounds the piece size:
/// static keeps one block per worker (or the configured chunk), dynamic and
/// guided never split below the configured chunk.
pub(crate) fn reduce<T, F>(len: usize, op: ReduceOp, config: &AggregateConfig, f: &F) -> Result<T>
where
    T: Element,
    F: Fn(usize) -> T + Sync,
{
    let num_workers = config.num_workers;
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(num_workers)
        .thread_name(|i| format!("builtin-reduce-{i}"))
        .build()
        .with_context(|| format!("Failed to build reduction pool with {num_workers} threads"))?;

    let min_len = match config.schedule {
        SchedulePolicy::Static => config
            .chunk_size
            .unwrap_or_else(|| len.div_ceil(num_workers)),
        SchedulePolicy::Dynamic | SchedulePolicy::Guided => config.chunk_size.unwrap_or(1),
    }
    .max(1);

    Ok(pool.install(|| {
        (0..len)
            .into_par_iter()
            .with_min_len(min_len)
            .fold(|| op.identity::<T>(), |acc, i| op.combine(acc, f(i)))
            .reduce(|| op.identity::<T>(), |a, b| op.combine(a, b))
    }))
}
