// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Circular slot bookkeeping.

The ring hands out slot indices in `[0, capacity)`. `start` is the next slot to submit
into, `end` is the oldest slot still in flight; occupied slots are `[end, start)` modulo
capacity. One slot always stays free so that `start == end` unambiguously means empty.
*/

use crate::Error;

/// Index of one slot in the transfer arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Slot(pub(crate) usize);

impl Slot {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug)]
pub(crate) struct SlotRing {
    capacity: usize,
    start: usize,
    end: usize,
}

impl SlotRing {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity >= 2, "a slot ring needs at least two slots");
        SlotRing {
            capacity,
            start: 0,
            end: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        (self.start + self.capacity - self.end) % self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// True when the next [`Self::next_slot`] would fail.
    pub fn is_full(&self) -> bool {
        (self.start + 1) % self.capacity == self.end
    }

    /// Oldest slot still in flight.
    pub fn oldest(&self) -> Option<Slot> {
        (!self.is_empty()).then_some(Slot(self.end))
    }

    /// Claims the slot at `start` and advances it.
    ///
    /// Refuses to overrun the oldest unconsumed slot; the ring is unchanged on failure.
    pub fn next_slot(&mut self) -> Result<Slot, Error> {
        if self.is_full() {
            return Err(Error::RingFull {
                in_flight: self.len(),
                capacity: self.capacity,
            });
        }
        let slot = Slot(self.start);
        self.start = (self.start + 1) % self.capacity;
        Ok(slot)
    }

    /// Gives back the slot most recently returned by [`Self::next_slot`].
    pub fn unclaim(&mut self, slot: Slot) {
        debug_assert_eq!(
            (slot.0 + 1) % self.capacity,
            self.start,
            "only the newest slot can be unclaimed"
        );
        debug_assert!(!self.is_empty());
        self.start = slot.0;
    }

    /// Releases the oldest in-flight slot.
    pub fn free_slot(&mut self) {
        debug_assert!(!self.is_empty(), "free_slot on an empty ring");
        self.end = (self.end + 1) % self.capacity;
    }

    pub fn reset(&mut self) {
        self.start = 0;
        self.end = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn holds_capacity_minus_one() {
        let mut ring = SlotRing::new(3);
        assert!(ring.is_empty());
        assert_eq!(ring.next_slot().unwrap(), Slot(0));
        assert_eq!(ring.next_slot().unwrap(), Slot(1));
        assert!(ring.is_full());
        assert!(matches!(
            ring.next_slot(),
            Err(Error::RingFull {
                in_flight: 2,
                capacity: 3
            })
        ));
        //failure must not move the cursor
        assert_eq!(ring.len(), 2);
        assert_eq!(ring.oldest(), Some(Slot(0)));
    }

    #[test]
    fn wraps_around() {
        let mut ring = SlotRing::new(3);
        for expected in [0, 1, 2, 0, 1, 2, 0] {
            assert_eq!(ring.next_slot().unwrap().index(), expected);
            ring.free_slot();
            assert!(ring.is_empty());
        }
    }

    #[test]
    fn freeing_makes_room() {
        let mut ring = SlotRing::new(4);
        ring.next_slot().unwrap();
        ring.next_slot().unwrap();
        ring.next_slot().unwrap();
        assert!(ring.is_full());
        ring.free_slot();
        assert_eq!(ring.oldest(), Some(Slot(1)));
        assert_eq!(ring.next_slot().unwrap(), Slot(3));
        assert!(ring.is_full());
    }

    #[test]
    fn unclaim_restores_cursor() {
        let mut ring = SlotRing::new(3);
        ring.next_slot().unwrap();
        ring.free_slot();
        let slot = ring.next_slot().unwrap();
        assert_eq!(slot, Slot(1));
        ring.unclaim(slot);
        assert!(ring.is_empty());
        assert_eq!(ring.next_slot().unwrap(), Slot(1));
    }
}
