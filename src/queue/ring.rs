// SPDX-License-Identifier: GPL-3.0-only

//! Hardware output slot ring
//!
//! The capture path programs buffers into a small fixed set of hardware
//! output address slots which the hardware fills in order. [`SlotRing`] keeps
//! the buffers currently owned by the hardware together with the slot each
//! one was programmed into, and the cursor pointing at the next slot to use.

use std::collections::VecDeque;

/// Bounded FIFO of slot-tagged items with a wrapping slot cursor
#[derive(Debug, Clone)]
pub struct SlotRing<T> {
    capacity: usize,
    cursor: usize,
    entries: VecDeque<(usize, T)>,
}

impl<T> SlotRing<T> {
    /// Create a ring with `capacity` slots (at least 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            cursor: 0,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    /// Slot the next pushed item will be assigned
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Append `item` at the cursor slot and advance the cursor
    ///
    /// Returns the slot used, or the item back if every slot is occupied.
    pub fn push(&mut self, item: T) -> Result<usize, T> {
        if self.is_full() {
            return Err(item);
        }
        let slot = self.cursor;
        self.entries.push_back((slot, item));
        self.skip();
        Ok(slot)
    }

    /// Remove the oldest item
    pub fn pop(&mut self) -> Option<(usize, T)> {
        self.entries.pop_front()
    }

    /// Oldest item without removing it
    pub fn peek(&self) -> Option<&(usize, T)> {
        self.entries.front()
    }

    /// Advance the cursor without occupying a slot
    pub fn skip(&mut self) {
        self.cursor = (self.cursor + 1) % self.capacity;
    }

    /// Iterate from oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &(usize, T)> {
        self.entries.iter()
    }

    /// Remove everything and rewind the cursor to slot 0
    pub fn reset(&mut self) -> Vec<(usize, T)> {
        self.cursor = 0;
        self.entries.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_assigns_slots_in_order_and_wraps() {
        let mut ring = SlotRing::new(3);
        assert_eq!(ring.push('a'), Ok(0));
        assert_eq!(ring.push('b'), Ok(1));
        assert_eq!(ring.pop(), Some((0, 'a')));
        assert_eq!(ring.push('c'), Ok(2));
        assert_eq!(ring.push('d'), Ok(0));
        assert_eq!(ring.push('e'), Err('e'));
        assert_eq!(ring.len(), 3);
    }

    #[test]
    fn test_skip_and_reset() {
        let mut ring: SlotRing<u32> = SlotRing::new(4);
        ring.skip();
        assert_eq!(ring.push(7), Ok(1));
        assert_eq!(ring.peek(), Some(&(1, 7)));
        let drained = ring.reset();
        assert_eq!(drained, vec![(1, 7)]);
        assert_eq!(ring.cursor(), 0);
        assert!(ring.is_empty());
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let mut ring = SlotRing::new(0);
        assert_eq!(ring.capacity(), 1);
        assert_eq!(ring.push(1), Ok(0));
        assert_eq!(ring.push(2), Err(2));
    }
}
