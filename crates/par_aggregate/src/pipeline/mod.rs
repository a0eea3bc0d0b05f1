//! src/pipeline/mod.rs
//!
//! Streaming producer-consumer pipeline.
//!
//! One loader thread reads record pairs from a `RecordSource` in order and
//! pushes them onto a `PipelineQueue`. The remaining `num_workers - 1`
//! compute workers pop pairs, compute their dot product locally and merge it
//! into the run total with the configured discipline.
//!
//! # Run states
//! ```text
//! LOADING + COMPUTING ─close─▶ LOADING_DONE + COMPUTING ─empty─▶ DRAINED
//! ```
//! The run returns once every compute worker has seen the closed, empty
//! queue and joined. At that point the number of merged products must equal
//! the number of loaded pairs.
//!
//! A short read in the middle of a record stops the loader only. Pairs that
//! were already loaded are still processed, and the shortfall is reported
//! through `PipelineOutcome::items_processed` and `truncated`.

mod queue;

pub use queue::{PipelineQueue, QueueStats};

use anyhow::{anyhow, ensure, Context, Result};
use log::{debug, warn};
use std::thread;
use std::time::{Duration, Instant};

use crate::config::AggregateConfig;
use crate::readers::{RecordPair, RecordSource};
use crate::reduce::ReduceOp;
use crate::workers::WorkerGroup;
use queue::CloseOnDrop;

/// A loaded pair tagged with its position in the stream.
#[derive(Debug)]
pub struct WorkItem {
    pub seq: usize,
    pub pair: RecordPair,
}

/// What a pipeline run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutcome {
    /// Sum of all per-pair dot products.
    pub total: f64,
    /// Dot product of each processed pair, in stream order.
    pub products: Vec<f64>,
    /// `min(requested, declared record count)`.
    pub items_requested: usize,
    pub items_loaded: usize,
    pub items_processed: usize,
    /// Fewer pairs were loaded than requested.
    pub truncated: bool,
    /// Why the loader stopped early, if it hit a read error.
    pub load_error: Option<String>,
    pub elapsed: Duration,
}

impl PipelineOutcome {
    pub fn is_complete(&self) -> bool {
        !self.truncated && self.items_processed == self.items_requested
    }
}

/// Upper bound on up-front buffer reservation. The header count is untrusted,
/// so larger runs grow the buffer as pairs actually arrive.
const MAX_PREALLOCATED_PRODUCTS: usize = 1024;

struct LoadReport {
    loaded: usize,
    error: Option<anyhow::Error>,
}

#[derive(Default)]
struct ComputeReport {
    products: Vec<(usize, f64)>,
    local_total: f64,
}

/// Streams up to `requested_pairs` pairs from `source` through the pipeline.
///
/// With fewer than two workers there is no room for a separate loader, so
/// the pairs are read and reduced sequentially on the calling thread.
///
/// ```ignore
/// let source = RecordPairReader::open("vectors.bin")?;
/// let config = AggregateConfig::builder().num_workers(4).build();
/// let outcome = run_pipeline(source, 100, &config)?;
/// if outcome.truncated {
///     eprintln!("only {} of {} pairs", outcome.items_processed, outcome.items_requested);
/// }
/// ```
pub fn run_pipeline<S: RecordSource>(
    source: S,
    requested_pairs: usize,
    config: &AggregateConfig,
) -> Result<PipelineOutcome> {
    config.validate()?;
    let items_requested = requested_pairs.min(source.header().records);

    let outcome = if config.num_workers < 2 {
        run_sequential(source, items_requested)
    } else {
        run_concurrent(source, items_requested, config)?
    };

    if outcome.truncated {
        warn!(
            "Pipeline truncated: processed {} of {} requested pairs{}",
            outcome.items_processed,
            outcome.items_requested,
            outcome
                .load_error
                .as_deref()
                .map(|e| format!(" ({e})"))
                .unwrap_or_default()
        );
    }
    debug!(
        "Pipeline processed {} pairs with {} workers in {:?}",
        outcome.items_processed, config.num_workers, outcome.elapsed
    );
    Ok(outcome)
}

fn run_sequential<S: RecordSource>(mut source: S, items_requested: usize) -> PipelineOutcome {
    let start = Instant::now();
    let mut products = Vec::with_capacity(items_requested.min(MAX_PREALLOCATED_PRODUCTS));
    let mut load_error = None;

    while products.len() < items_requested {
        match source.read_record_pair() {
            Ok(Some(pair)) => products.push(pair.dot()),
            Ok(None) => break,
            Err(e) => {
                load_error = Some(format!("{e:#}"));
                break;
            }
        }
    }

    let total = products.iter().sum();
    PipelineOutcome {
        total,
        items_requested,
        items_loaded: products.len(),
        items_processed: products.len(),
        truncated: products.len() < items_requested,
        load_error,
        elapsed: start.elapsed(),
        products,
    }
}

fn load_records<S: RecordSource>(
    source: &mut S,
    limit: usize,
    queue: &PipelineQueue<WorkItem>,
) -> LoadReport {
    let _close = CloseOnDrop(queue);
    let mut loaded = 0;
    while loaded < limit {
        let pair = match source.read_record_pair() {
            Ok(Some(pair)) => pair,
            Ok(None) => break,
            Err(e) => {
                return LoadReport {
                    loaded,
                    error: Some(e),
                }
            }
        };
        if let Err(e) = queue.push(WorkItem { seq: loaded, pair }) {
            return LoadReport {
                loaded,
                error: Some(e),
            };
        }
        loaded += 1;
    }
    LoadReport {
        loaded,
        error: None,
    }
}

fn run_concurrent<S: RecordSource>(
    mut source: S,
    items_requested: usize,
    config: &AggregateConfig,
) -> Result<PipelineOutcome> {
    let queue = PipelineQueue::<WorkItem>::new();
    let accumulator = config
        .discipline
        .accumulator::<f64>(ReduceOp::Sum, &config.critical_section);
    let compute = WorkerGroup::new("pipeline-compute", config.num_workers - 1)?;
    let wait_strategy = config.wait_strategy;

    let start = Instant::now();
    let (load, reports) = thread::scope(|scope| -> Result<_> {
        let queue = &queue;
        let loader = thread::Builder::new()
            .name("pipeline-loader".to_string())
            .spawn_scoped(scope, move || load_records(&mut source, items_requested, queue))
            .context("Failed to spawn pipeline loader thread")?;

        let shared = accumulator.as_deref();
        let reports = compute.run(|_worker_id| {
            let mut report = ComputeReport::default();
            while let Some(item) = queue.pop_wait(wait_strategy) {
                let dot = item.pair.dot();
                match shared {
                    Some(acc) => acc.merge(dot),
                    None => report.local_total += dot,
                }
                report.products.push((item.seq, dot));
            }
            Ok(report)
        });

        let load = loader
            .join()
            .map_err(|_| anyhow!("pipeline loader panicked"))?;
        Ok((load, reports?))
    })?;
    let elapsed = start.elapsed();

    let mut indexed: Vec<(usize, f64)> = Vec::with_capacity(load.loaded);
    let mut local_total = 0.0;
    for report in reports {
        indexed.extend(report.products);
        local_total += report.local_total;
    }
    indexed.sort_unstable_by_key(|&(seq, _)| seq);

    ensure!(
        queue.is_drained(),
        "Pipeline finished with {} unconsumed items",
        queue.len()
    );
    ensure!(
        indexed.len() == load.loaded,
        "Pipeline merged {} products but loaded {} pairs",
        indexed.len(),
        load.loaded
    );

    let total = match accumulator {
        Some(acc) => acc.into_value(),
        None => local_total,
    };

    Ok(PipelineOutcome {
        total,
        products: indexed.into_iter().map(|(_, dot)| dot).collect(),
        items_requested,
        items_loaded: load.loaded,
        items_processed: load.loaded,
        truncated: load.loaded < items_requested,
        load_error: load.error.map(|e| format!("{e:#}")),
        elapsed,
    })
}
