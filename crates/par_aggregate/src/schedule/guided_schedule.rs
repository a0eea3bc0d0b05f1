use std::sync::atomic::{AtomicUsize, Ordering};

use super::{Schedule, WorkRange};

/// Hands out shrinking chunks from a shared cursor.
///
/// Each claim takes `ceil(remaining / num_workers)` indices, never fewer than
/// `min_chunk` (except for the final piece). Early claims are large to keep
/// coordination low; late claims are small to even out the tail.
///
/// ```text
/// len = 100, num_workers = 4, min_chunk = 5
///   claims: 25, 19, 14, 11, 8, 6, 5, 5, 5, 2
/// ```
#[derive(Debug)]
pub struct GuidedSchedule {
    len: usize,
    num_workers: usize,
    min_chunk: usize,
    cursor: AtomicUsize,
}

impl GuidedSchedule {
    pub fn new(len: usize, num_workers: usize, min_chunk: usize) -> Self {
        Self {
            len,
            num_workers: num_workers.max(1),
            min_chunk: min_chunk.max(1),
            cursor: AtomicUsize::new(0),
        }
    }

    #[inline]
    fn chunk_for(&self, remaining: usize) -> usize {
        remaining
            .div_ceil(self.num_workers)
            .max(self.min_chunk)
            .min(remaining)
    }

    /// Claims the next chunk, or `None` once the range is exhausted.
    pub fn claim(&self) -> Option<WorkRange> {
        let mut start = self.cursor.load(Ordering::Relaxed);
        loop {
            if start >= self.len {
                return None;
            }
            let end = start + self.chunk_for(self.len - start);
            match self.cursor.compare_exchange_weak(
                start,
                end,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Some(WorkRange::new(start, end)),
                Err(current) => start = current,
            }
        }
    }
}

impl Schedule for GuidedSchedule {
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
