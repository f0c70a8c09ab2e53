use std::sync::{Condvar, Mutex};

use crate::core::abort::{ABORT_POLL_INTERVAL, AbortFlag};
use crate::core::reorder::ReorderBuffer;
use crate::core::{lock_unpoisoned, wait_unpoisoned};
use crate::{ParzError, Result};

/// Bounded queue between the worker pool and the writer that always yields
/// items in strictly ascending sequence order, whatever order they arrive in.
#[derive(Debug)]
pub struct ReorderQueue<T> {
    state: Mutex<ReorderState<T>>,
    next_ready: Condvar,
    space: Condvar,
    abort: AbortFlag,
}

#[derive(Debug)]
struct ReorderState<T> {
    buffer: ReorderBuffer<T>,
    closed: bool,
}

impl<T> ReorderQueue<T> {
    pub fn new(capacity: usize, abort: AbortFlag) -> Self {
        Self {
            state: Mutex::new(ReorderState {
                buffer: ReorderBuffer::with_limit(capacity),
                closed: false,
            }),
            next_ready: Condvar::new(),
            space: Condvar::new(),
            abort,
        }
    }

    /// Enqueues the item carrying sequence number `seq`.
    ///
    /// Blocks while the queue is full, except for the next expected sequence
    /// number, which is always admitted.
    ///
    /// # Errors
    /// Returns [`ParzError::Cancelled`] once the abort flag is raised, or a
    /// format error for stale/duplicate sequence numbers.
    pub fn push(&self, seq: u64, item: T) -> Result<()> {
        let mut state = lock_unpoisoned(&self.state);
        loop {
            self.abort.check()?;
            if state.closed {
                return Err(ParzError::InvalidFormat("push into a closed reorder queue"));
            }
            if state.buffer.admits(seq) {
                state.buffer.insert(seq, item)?;
                let wake_writer = state.buffer.has_next();
                drop(state);
                if wake_writer {
                    self.next_ready.notify_one();
                }
                return Ok(());
            }
            state = wait_unpoisoned(&self.space, state, ABORT_POLL_INTERVAL);
        }
    }

    /// Dequeues the next expected item, blocking until it arrives.
    ///
    /// Returns `Ok(None)` once producers closed the queue and it is drained.
    ///
    /// # Errors
    /// Returns [`ParzError::Cancelled`] once the abort flag is raised, and
    /// [`ParzError::InvalidBlockId`] if producers closed the queue while the
    /// next expected item is still missing.
    pub fn pop(&self) -> Result<Option<T>> {
        let mut state = lock_unpoisoned(&self.state);
        loop {
            self.abort.check()?;
            if let Some(item) = state.buffer.pop_next() {
                drop(state);
                // Any blocked producer may now hold the next expected item.
                self.space.notify_all();
                return Ok(Some(item));
            }
            if state.closed {
                if state.buffer.is_empty() {
                    return Ok(None);
                }
                return Err(ParzError::InvalidBlockId {
                    expected: state.buffer.next_expected(),
                    actual: state.buffer.next_expected() + state.buffer.pending_len() as u64,
                });
            }
            state = wait_unpoisoned(&self.next_ready, state, ABORT_POLL_INTERVAL);
        }
    }

    /// Signals that no producer will push again and wakes every waiter.
    pub fn close(&self) {
        lock_unpoisoned(&self.state).closed = true;
        self.next_ready.notify_all();
        self.space.notify_all();
    }

    pub fn len(&self) -> usize {
        lock_unpoisoned(&self.state).buffer.pending_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn next_expected(&self) -> u64 {
        lock_unpoisoned(&self.state).buffer.next_expected()
    }

    pub fn capacity(&self) -> usize {
        lock_unpoisoned(&self.state).buffer.max_pending()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yields_ascending_order_from_shuffled_pushes() {
        let queue = ReorderQueue::new(8, AbortFlag::new());
        for seq in [3u64, 1, 4, 0, 2] {
            queue.push(seq, seq).expect("push");
        }
        queue.close();

        let mut drained = Vec::new();
        while let Some(value) = queue.pop().expect("pop") {
            drained.push(value);
        }
        assert_eq!(drained, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn closing_with_a_gap_is_an_error() {
        let queue = ReorderQueue::new(4, AbortFlag::new());
        queue.push(1, ()).expect("push");
        queue.close();
        assert!(matches!(
            queue.pop(),
            Err(ParzError::InvalidBlockId { expected: 0, .. })
        ));
    }
}
