use anyhow::{ensure, Result};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::thread;

use crate::config::WaitStrategy;

struct QueueState<T> {
    items: VecDeque<T>,
    closed: bool,
    pushed: usize,
    popped: usize,
}

/// Push/pop counters of a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueStats {
    pub pushed: usize,
    pub popped: usize,
}

/// FIFO queue between the loader and the compute workers of one pipeline run.
///
/// Every item is pushed once and popped by exactly one consumer. Once the
/// producer calls `close`, consumers drain what is left and then see `None`.
///
/// ```text
///  loader ──push──▶ [ item | item | item ] ──pop_wait──▶ compute 0
///                                        └──pop_wait──▶ compute 1
///  loader ──close──▶ consumers return None once the queue is empty
/// ```
pub struct PipelineQueue<T> {
    state: Mutex<QueueState<T>>,
    available: Condvar,
}

impl<T> Default for PipelineQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PipelineQueue<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                closed: false,
                pushed: 0,
                popped: 0,
            }),
            available: Condvar::new(),
        }
    }

    /// Appends an item and wakes one waiting consumer.
    pub fn push(&self, item: T) -> Result<()> {
        let mut state = self.state.lock();
        ensure!(!state.closed, "Cannot push to a closed pipeline queue");
        state.items.push_back(item);
        state.pushed += 1;
        drop(state);
        self.available.notify_one();
        Ok(())
    }

    /// Marks the producer as finished and wakes every waiting consumer.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.available.notify_all();
    }

    /// Pops the front item without waiting.
    pub fn try_pop(&self) -> Option<T> {
        let mut state = self.state.lock();
        let item = state.items.pop_front();
        if item.is_some() {
            state.popped += 1;
        }
        item
    }

    /// Pops the front item, waiting while the queue is empty and still open.
    ///
    /// Returns `None` only when the queue is closed and empty.
    pub fn pop_wait(&self, strategy: WaitStrategy) -> Option<T> {
        match strategy {
            WaitStrategy::Notify => {
                let mut state = self.state.lock();
                loop {
                    if let Some(item) = state.items.pop_front() {
                        state.popped += 1;
                        return Some(item);
                    }
                    if state.closed {
                        return None;
                    }
                    self.available.wait(&mut state);
                }
            }
            WaitStrategy::Poll(interval) => loop {
                {
                    let mut state = self.state.lock();
                    if let Some(item) = state.items.pop_front() {
                        state.popped += 1;
                        return Some(item);
                    }
                    if state.closed {
                        return None;
                    }
                }
                thread::sleep(interval);
            },
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Closed, empty, and every pushed item was popped.
    pub fn is_drained(&self) -> bool {
        let state = self.state.lock();
        state.closed && state.items.is_empty() && state.pushed == state.popped
    }

    pub fn stats(&self) -> QueueStats {
        let state = self.state.lock();
        QueueStats {
            pushed: state.pushed,
            popped: state.popped,
        }
    }
}

/// Closes the queue when dropped, so consumers are released even if the
/// producer returns early or panics.
pub(crate) struct CloseOnDrop<'a, T>(pub(crate) &'a PipelineQueue<T>);

impl<T> Drop for CloseOnDrop<'_, T> {
    fn drop(&mut self) {
        self.0.close();
    }
}
