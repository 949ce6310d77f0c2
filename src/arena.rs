// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
The host-visible landing zone for captured frames.

The arena is one contiguous allocation of `capacity × frame_bytes`, made once when the
stream is built. Slots are addressed by index only; a slot's byte range never moves, so a
view handed to the consumer stays valid for as long as the borrow checker lets it live.

# Coherency

Slot memory follows the "explicit host synchronization" model: bytes for a slot are written
by the backend's `resolve` step, which runs only after that slot's fence has been observed
signaled. Nothing reads a slot between submission and resolve.
*/

use crate::Error;
use crate::slot_ring::Slot;

#[derive(Debug)]
pub(crate) struct TransferArena {
    region: Box<[u8]>,
    frame_bytes: usize,
    capacity: usize,
}

impl TransferArena {
    /// Allocates the whole region up front. Failure is fatal for the stream.
    pub fn new(frame_bytes: usize, capacity: usize) -> Result<Self, Error> {
        let bytes = frame_bytes
            .checked_mul(capacity)
            .ok_or(Error::Allocation { bytes: u64::MAX })?;
        let mut region = Vec::new();
        region
            .try_reserve_exact(bytes)
            .map_err(|_| Error::Allocation {
                bytes: bytes as u64,
            })?;
        region.resize(bytes, 0);
        logwise::info_sync!(
            "allocated transfer arena of {bytes} bytes ({capacity} slots)",
            bytes = bytes,
            capacity = capacity
        );
        Ok(TransferArena {
            region: region.into_boxed_slice(),
            frame_bytes,
            capacity,
        })
    }

    pub fn offset(&self, slot: Slot) -> usize {
        assert!(slot.index() < self.capacity, "slot out of range");
        slot.index() * self.frame_bytes
    }

    pub fn slot(&self, slot: Slot) -> &[u8] {
        let offset = self.offset(slot);
        &self.region[offset..offset + self.frame_bytes]
    }

    pub fn slot_mut(&mut self, slot: Slot) -> &mut [u8] {
        let offset = self.offset(slot);
        &mut self.region[offset..offset + self.frame_bytes]
    }

    pub fn byte_len(&self) -> usize {
        self.region.len()
    }

    /// Drops the backing allocation. Any further slot access panics.
    pub fn release(&mut self) {
        self.region = Box::default();
        self.capacity = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_are_fixed_strides() {
        let arena = TransferArena::new(16, 3).unwrap();
        assert_eq!(arena.byte_len(), 48);
        assert_eq!(arena.offset(Slot(0)), 0);
        assert_eq!(arena.offset(Slot(2)), 32);
        assert_eq!(arena.slot(Slot(1)).len(), 16);
    }

    #[test]
    fn slots_do_not_alias() {
        let mut arena = TransferArena::new(4, 3).unwrap();
        arena.slot_mut(Slot(1)).copy_from_slice(&[1, 2, 3, 4]);
        assert_eq!(arena.slot(Slot(0)), &[0, 0, 0, 0]);
        assert_eq!(arena.slot(Slot(1)), &[1, 2, 3, 4]);
        assert_eq!(arena.slot(Slot(2)), &[0, 0, 0, 0]);
    }

    #[test]
    fn oversized_allocation_fails() {
        assert!(matches!(
            TransferArena::new(usize::MAX / 2, 3),
            Err(Error::Allocation { .. })
        ));
    }

    #[test]
    #[should_panic(expected = "slot out of range")]
    fn released_arena_rejects_access() {
        let mut arena = TransferArena::new(4, 2).unwrap();
        arena.release();
        arena.slot(Slot(0));
    }
}
