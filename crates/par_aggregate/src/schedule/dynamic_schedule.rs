use std::sync::atomic::{AtomicUsize, Ordering};

use super::{Schedule, WorkRange};

/// Hands out fixed-size chunks from a shared cursor.
///
/// Every claim is one compare-and-swap on the cursor, so each index is claimed
/// by exactly one worker no matter how the claims interleave. The cursor never
/// moves past `len`, whatever the chunk size. Workers that finish
/// their chunk early simply claim more, which balances uneven per-index cost.
#[derive(Debug)]
pub struct DynamicSchedule {
    len: usize,
    num_workers: usize,
    chunk: usize,
    cursor: AtomicUsize,
}

impl DynamicSchedule {
    pub fn new(len: usize, num_workers: usize, chunk: usize) -> Self {
        Self {
            len,
            num_workers: num_workers.max(1),
            chunk: chunk.max(1),
            cursor: AtomicUsize::new(0),
        }
    }

    /// Claims the next chunk, or `None` once the range is exhausted.
    pub fn claim(&self) -> Option<WorkRange> {
        let len = self.len;
        let chunk = self.chunk;
        let start = self
            .cursor
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |start| {
                (start < len).then(|| start.saturating_add(chunk).min(len))
            })
            .ok()?;
        Some(WorkRange::new(start, start.saturating_add(chunk).min(len)))
    }
}

impl Schedule for DynamicSchedule {
    fn len(&self) -> usize {
        self.len
    }

    fn num_workers(&self) -> usize {
        self.num_workers
    }

    fn ranges(&self, _worker_id: usize) -> Box<dyn Iterator<Item = WorkRange> + Send + '_> {
        Box::new(std::iter::from_fn(move || self.claim()))
    }
}
