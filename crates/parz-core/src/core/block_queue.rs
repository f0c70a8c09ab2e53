use crossbeam_channel::{Receiver, RecvTimeoutError, SendTimeoutError, Sender, bounded};

use crate::core::abort::{ABORT_POLL_INTERVAL, AbortFlag};
use crate::{ParzError, Result};

/// Creates the bounded FIFO between the reader and the worker pool.
///
/// Insertion order is preserved; which worker consumes which item is not.
/// Dropping the [`BlockSender`] closes the queue: receivers drain what is
/// left and then see end of stream.
pub fn block_queue<T>(capacity: usize, abort: AbortFlag) -> (BlockSender<T>, BlockReceiver<T>) {
    let capacity = capacity.max(1);
    let (sender, receiver) = bounded(capacity);
    (
        BlockSender {
            sender,
            abort: abort.clone(),
        },
        BlockReceiver {
            receiver,
            capacity,
            abort,
        },
    )
}

/// Producer end of a block queue.
#[derive(Debug)]
pub struct BlockSender<T> {
    sender: Sender<T>,
    abort: AbortFlag,
}

impl<T> BlockSender<T> {
    /// Enqueues an item, blocking while the queue is full.
    ///
    /// # Errors
    /// Returns [`ParzError::Cancelled`] once the abort flag is raised or
    /// every receiver is gone.
    pub fn push(&self, item: T) -> Result<()> {
        let mut item = item;
        loop {
            self.abort.check()?;
            match self.sender.send_timeout(item, ABORT_POLL_INTERVAL) {
                Ok(()) => return Ok(()),
                Err(SendTimeoutError::Timeout(returned)) => item = returned,
                Err(SendTimeoutError::Disconnected(_)) => return Err(ParzError::Cancelled),
            }
        }
    }

    pub fn len(&self) -> usize {
        self.sender.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sender.is_empty()
    }
}

/// Consumer end of a block queue; shared by reference between workers.
#[derive(Debug)]
pub struct BlockReceiver<T> {
    receiver: Receiver<T>,
    capacity: usize,
    abort: AbortFlag,
}

impl<T> BlockReceiver<T> {
    /// Dequeues the oldest item, blocking while the queue is empty.
    ///
    /// Returns `Ok(None)` once the sender was dropped and every item has
    /// been handed out.
    ///
    /// # Errors
    /// Returns [`ParzError::Cancelled`] once the abort flag is raised.
    pub fn pop(&self) -> Result<Option<T>> {
        loop {
            self.abort.check()?;
            match self.receiver.recv_timeout(ABORT_POLL_INTERVAL) {
                Ok(item) => return Ok(Some(item)),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return Ok(None),
            }
        }
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
