//! Worker group for a single parallel region.
//!
//! Every run spins up its own fixed-size group of OS threads sized by the
//! run's configuration; groups are never shared between runs. Threads are
//! scoped so they may borrow the run's input buffer and shared accumulator
//! without reference counting, and the group joins every thread before
//! returning. That join is the barrier after which a shared accumulator may
//! be read.
//!
//! # Key features
//! - Named threads (`{name}-{worker_id}`) for debuggers and panic messages
//! - Each worker returns its own value; nothing is indexed by a global
//!   "current worker" id
//! - A panicking worker is reported as an error instead of unwinding the caller

use anyhow::{anyhow, ensure, Context, Result};
use log::debug;
use std::thread;

/// Fixed-size group of workers for one parallel region.
pub(crate) struct WorkerGroup {
    name: String,
    num_workers: usize,
}

impl WorkerGroup {
    pub(crate) fn new(name: impl Into<String>, num_workers: usize) -> Result<Self> {
        ensure!(
            num_workers > 0,
            "Cannot create a worker group with 0 workers. \
             Set num_workers > 0."
        );
        Ok(Self {
            name: name.into(),
            num_workers,
        })
    }

    pub(crate) fn num_workers(&self) -> usize {
        self.num_workers
    }

    /// Runs `work(worker_id)` on every worker and returns the per-worker
    /// results in worker order once all of them have joined.
    ///
    /// All workers are joined even when one of them fails; the first error
    /// (by worker id) is returned.
    pub(crate) fn run<T, F>(&self, work: F) -> Result<Vec<T>>
    where
        T: Send,
        F: Fn(usize) -> Result<T> + Sync,
    {
        let work = &work;
        thread::scope(|scope| {
            let mut handles = Vec::with_capacity(self.num_workers);

            for worker_id in 0..self.num_workers {
                let handle = thread::Builder::new()
                    .name(format!("{}-{}", self.name, worker_id))
                    .spawn_scoped(scope, move || work(worker_id))
                    .with_context(|| {
                        format!("Failed to spawn {} worker thread {}", self.name, worker_id)
                    })?;
                handles.push(handle);
            }
            debug!("{}: spawned {} workers", self.name, handles.len());

            let joined: Vec<Result<T>> = handles
                .into_iter()
                .enumerate()
                .map(|(worker_id, handle)| {
                    handle
                        .join()
                        .map_err(|_| anyhow!("{} worker {} panicked", self.name, worker_id))?
                        .with_context(|| format!("{} worker {} failed", self.name, worker_id))
                })
                .collect();

            joined.into_iter().collect()
        })
    }
}
