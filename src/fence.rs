// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Completion fences, one per in-flight slot.

use crate::Error;
use crate::slot_ring::Slot;

/**
A device synchronization handle marking completion of previously submitted work.

Fences from one backend signal in the order they were created, because the queue they
sit on executes in order.
*/
pub trait Fence {
    /// Non-blocking status query.
    ///
    /// `Ok(false)` means still pending. Any status other than signaled/pending is an
    /// error and must not be retried.
    fn is_ready(&self) -> Result<bool, Error>;

    /// Blocks until the fence signals. There is no practical timeout.
    fn wait(&self) -> Result<(), Error>;

    /// Releases the underlying device object.
    fn release(self)
    where
        Self: Sized,
    {
    }
}

#[derive(Debug)]
pub(crate) struct FenceSet<F> {
    fences: Vec<Option<F>>,
}

impl<F: Fence> FenceSet<F> {
    pub fn new(capacity: usize) -> Self {
        FenceSet {
            fences: (0..capacity).map(|_| None).collect(),
        }
    }

    pub fn insert(&mut self, slot: Slot, fence: F) {
        let entry = &mut self.fences[slot.index()];
        debug_assert!(entry.is_none(), "slot reused before its fence was freed");
        *entry = Some(fence);
    }

    fn get(&self, slot: Slot) -> Result<&F, Error> {
        self.fences[slot.index()]
            .as_ref()
            .ok_or(Error::FenceMissing(slot.index()))
    }

    pub fn is_ready(&self, slot: Slot) -> Result<bool, Error> {
        self.get(slot)?.is_ready()
    }

    pub fn wait(&self, slot: Slot) -> Result<(), Error> {
        let wait = logwise::perfwarn_begin!("FenceSet::wait");
        let result = self.get(slot)?.wait();
        drop(wait);
        result
    }

    /// Releases the fence for `slot`. Freeing twice is [`Error::FenceMissing`].
    pub fn free(&mut self, slot: Slot) -> Result<(), Error> {
        let fence = self.fences[slot.index()]
            .take()
            .ok_or(Error::FenceMissing(slot.index()))?;
        fence.release();
        Ok(())
    }

    #[cfg(test)]
    pub fn occupied(&self) -> usize {
        self.fences.iter().filter(|f| f.is_some()).count()
    }
}
