use std::collections::BTreeMap;

use crate::{ParzError, Result};

/// A buffer that accepts items out of order and releases them strictly by
/// ascending sequence number.
///
/// Items wait in a `BTreeMap` until their sequence number becomes the next
/// expected one.
#[derive(Debug)]
pub struct ReorderBuffer<T> {
    next_seq: u64,
    pending: BTreeMap<u64, T>,
    max_pending: usize,
}

impl<T> ReorderBuffer<T> {
    /// Creates a reorder buffer holding at most `max_pending` items.
    pub fn with_limit(max_pending: usize) -> Self {
        Self {
            next_seq: 0,
            pending: BTreeMap::new(),
            max_pending: max_pending.max(1),
        }
    }

    /// Returns true if `seq` can be inserted right now.
    ///
    /// The next expected sequence number is always admitted, even when the
    /// buffer is full. Otherwise a full buffer holding only out-of-order items
    /// would never release anything.
    pub fn admits(&self, seq: u64) -> bool {
        seq == self.next_seq || self.pending.len() < self.max_pending
    }

    /// Inserts an item.
    ///
    /// # Errors
    /// Returns an error if `seq` was already released, is already pending,
    /// or is not admissible under the capacity rule.
    pub fn insert(&mut self, seq: u64, item: T) -> Result<()> {
        if seq < self.next_seq {
            return Err(ParzError::InvalidBlockId {
                expected: self.next_seq,
                actual: seq,
            });
        }

        if self.pending.contains_key(&seq) {
            return Err(ParzError::InvalidFormat(
                "duplicate block sequence number in reorder buffer",
            ));
        }

        if !self.admits(seq) {
            return Err(ParzError::InvalidFormat(
                "reorder buffer capacity exceeded",
            ));
        }

        self.pending.insert(seq, item);
        Ok(())
    }

    /// Removes and returns the next expected item if it is present.
    pub fn pop_next(&mut self) -> Option<T> {
        let item = self.pending.remove(&self.next_seq)?;
        self.next_seq += 1;
        Some(item)
    }

    /// Returns true if the next expected item is waiting.
    pub fn has_next(&self) -> bool {
        self.pending.contains_key(&self.next_seq)
    }

    /// Returns the next expected sequence number.
    pub fn next_expected(&self) -> u64 {
        self.next_seq
    }

    /// Returns the number of items currently pending.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Returns the maximum number of pending items allowed.
    pub fn max_pending(&self) -> usize {
        self.max_pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn releases_in_sequence_order() {
        let mut buffer = ReorderBuffer::with_limit(8);
        buffer.insert(2, "c").expect("insert 2");
        buffer.insert(0, "a").expect("insert 0");
        buffer.insert(1, "b").expect("insert 1");

        assert_eq!(buffer.pop_next(), Some("a"));
        assert_eq!(buffer.pop_next(), Some("b"));
        assert_eq!(buffer.pop_next(), Some("c"));
        assert_eq!(buffer.pop_next(), None);
        assert_eq!(buffer.next_expected(), 3);
    }

    #[test]
    fn full_buffer_still_admits_next_expected() {
        let mut buffer = ReorderBuffer::with_limit(2);
        buffer.insert(1, 1).expect("insert 1");
        buffer.insert(2, 2).expect("insert 2");

        assert!(!buffer.admits(3));
        assert!(buffer.insert(3, 3).is_err());
        assert!(buffer.admits(0));
        buffer.insert(0, 0).expect("next expected always fits");
        assert_eq!(buffer.pending_len(), 3);
    }

    #[test]
    fn rejects_stale_and_duplicate_ids() {
        let mut buffer = ReorderBuffer::with_limit(4);
        buffer.insert(0, ()).expect("insert 0");
        assert!(buffer.pop_next().is_some());

        assert!(matches!(
            buffer.insert(0, ()),
            Err(ParzError::InvalidBlockId {
                expected: 1,
                actual: 0
            })
        ));
        buffer.insert(3, ()).expect("insert 3");
        assert!(buffer.insert(3, ()).is_err());
    }
}
