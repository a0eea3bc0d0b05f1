use super::{Schedule, WorkRange};

/// Assigns contiguous pieces to workers once, up front.
///
/// # Worker allocation
/// Without a chunk size every worker gets one block of `len / num_workers`
/// indices and the last worker absorbs the remainder:
/// ```text
/// len = 10, num_workers = 3
///   Worker 0: [0, 3)
///   Worker 1: [3, 6)
///   Worker 2: [6, 10)   // absorbs the extra index
/// ```
///
/// With a chunk size the range is cut into `ceil(len / chunk)` pieces that
/// are dealt round-robin; only the final piece may be short:
/// ```text
/// len = 10, num_workers = 3, chunk = 2
///   Worker 0: [0, 2), [6, 8)
///   Worker 1: [2, 4), [8, 10)
///   Worker 2: [4, 6)
/// ```
#[derive(Debug, Clone)]
pub struct StaticSchedule {
    len: usize,
    assignments: Vec<Vec<WorkRange>>,
}

impl StaticSchedule {
    pub fn new(len: usize, num_workers: usize, chunk_size: Option<usize>) -> Self {
        let num_workers = num_workers.max(1);
        let mut assignments = vec![Vec::new(); num_workers];

        match chunk_size {
            None => {
                let block = len / num_workers;
                for (worker_id, ranges) in assignments.iter_mut().enumerate() {
                    let start = worker_id * block;
                    let end = if worker_id == num_workers - 1 {
                        len
                    } else {
                        start + block
                    };
                    if start < end {
                        ranges.push(WorkRange::new(start, end));
                    }
                }
            }
            Some(chunk) => {
                let chunk = chunk.max(1);
                for (piece, start) in (0..len).step_by(chunk).enumerate() {
                    let end = start.saturating_add(chunk).min(len);
                    assignments[piece % num_workers].push(WorkRange::new(start, end));
                }
            }
        }

        Self { len, assignments }
    }
}

impl Schedule for StaticSchedule {
    fn len(&self) -> usize {
        self.len
    }

    fn num_workers(&self) -> usize {
        self.assignments.len()
    }

    fn ranges(&self, worker_id: usize) -> Box<dyn Iterator<Item = WorkRange> + Send + '_> {
        match self.assignments.get(worker_id) {
            Some(ranges) => Box::new(ranges.iter().copied()),
            None => Box::new(std::iter::empty()),
        }
    }
}
