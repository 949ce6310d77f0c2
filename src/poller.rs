// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Retires in-flight frames in submission order.

Fences on one queue signal in order, so checking only the oldest frame is enough: if it is
not ready, nothing behind it is either.
*/

use crate::Error;
use crate::arena::TransferArena;
use crate::fence::FenceSet;
use crate::frame::InFlightFrame;
use crate::imp::Backend;
use crate::slot_ring::{Slot, SlotRing};
use std::collections::VecDeque;

/// A frame whose fence has signaled and whose bytes are resolved into the arena.
#[derive(Debug)]
pub(crate) struct Retired<A> {
    pub frame_index: u64,
    pub slot: Slot,
    pub audio: Option<A>,
}

/// Borrowed pieces of the stream the poller mutates.
pub(crate) struct PollTargets<'a, B: Backend> {
    pub ring: &'a mut SlotRing,
    pub fences: &'a mut FenceSet<B::Fence>,
    pub arena: &'a mut TransferArena,
    pub backend: &'a mut B,
}

#[derive(Debug)]
pub(crate) struct FramePoller<A> {
    in_flight: VecDeque<InFlightFrame<A>>,
}

impl<A> FramePoller<A> {
    pub fn new(capacity: usize) -> Self {
        FramePoller {
            in_flight: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, frame: InFlightFrame<A>) {
        self.in_flight.push_back(frame);
    }

    pub fn len(&self) -> usize {
        self.in_flight.len()
    }

    /**
    Retires every frame that is ready, oldest first.

    If the ring is one claim away from overrunning, blocks on the oldest fence first so the
    next `download` has room. With `drain`, every outstanding frame is waited on and retired.
    */
    pub fn retire<B: Backend>(
        &mut self,
        drain: bool,
        targets: PollTargets<'_, B>,
    ) -> Result<Vec<Retired<A>>, Error> {
        let PollTargets {
            ring,
            fences,
            arena,
            backend,
        } = targets;
        debug_assert_eq!(self.in_flight.len(), ring.len());

        if ring.is_full() {
            if let Some(oldest) = self.in_flight.front() {
                logwise::warn_sync!(
                    "ring is full, blocking on frame {frame}",
                    frame = oldest.frame_index
                );
                fences.wait(oldest.slot)?;
            }
        }

        let mut retired = Vec::new();
        while let Some(oldest) = self.in_flight.front() {
            let slot = oldest.slot;
            debug_assert_eq!(ring.oldest(), Some(slot));
            if drain {
                fences.wait(slot)?;
            } else if !fences.is_ready(slot)? {
                break;
            }
            //a failed resolve leaves the frame and its fence in place
            backend.resolve(slot, arena.slot_mut(slot))?;
            fences.free(slot)?;
            ring.free_slot();
            let Some(frame) = self.in_flight.pop_front() else {
                break;
            };
            retired.push(Retired {
                frame_index: frame.frame_index,
                slot,
                audio: frame.audio,
            });
        }
        if !retired.is_empty() {
            logwise::trace_sync!(
                "retired {count} frames, {remaining} still in flight",
                count = retired.len(),
                remaining = self.in_flight.len()
            );
        }
        Ok(retired)
    }

    /**
    Frees every outstanding fence without reading any pixels.

    With `wait`, each fence is waited on first. After the first failed wait the rest are
    freed without waiting. Every frame is removed either way; the first error is returned.
    */
    pub fn discard<F: crate::fence::Fence>(
        &mut self,
        ring: &mut SlotRing,
        fences: &mut FenceSet<F>,
        mut wait: bool,
    ) -> Result<(), Error> {
        let mut first_error = None;
        while let Some(frame) = self.in_flight.pop_front() {
            if wait && let Err(err) = fences.wait(frame.slot) {
                wait = false;
                first_error.get_or_insert(err);
            }
            if let Err(err) = fences.free(frame.slot) {
                first_error.get_or_insert(err);
            }
            ring.free_slot();
        }
        first_error.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::CaptureIssuer;
    use crate::config::StreamConfig;
    use crate::imp::software::{SoftwareDevice, SoftwareTarget};

    struct Rig {
        device: SoftwareDevice,
        ring: SlotRing,
        fences: FenceSet<crate::imp::software::SoftwareFence>,
        arena: TransferArena,
        issuer: CaptureIssuer,
        poller: FramePoller<&'static str>,
    }

    impl Rig {
        fn new(capacity: usize) -> Self {
            let config = StreamConfig::new(1, 1, capacity);
            let mut device = SoftwareDevice::new();
            device.prepare(&config).unwrap();
            Rig {
                device,
                ring: SlotRing::new(capacity),
                fences: FenceSet::new(capacity),
                arena: TransferArena::new(config.frame_bytes(), capacity).unwrap(),
                issuer: CaptureIssuer::new(&config),
                poller: FramePoller::new(capacity),
            }
        }

        fn submit(&mut self, label: &'static str) {
            let slot = self.ring.next_slot().unwrap();
            let frame_index = self.issuer.next_frame_index();
            let fence = self
                .issuer
                .issue(&mut self.device, &SoftwareTarget::new(1, 1), slot)
                .unwrap();
            self.fences.insert(slot, fence);
            self.poller.push(InFlightFrame {
                frame_index,
                slot,
                audio: Some(label),
            });
        }

        fn try_retire(&mut self, drain: bool) -> Result<Vec<&'static str>, Error> {
            let retired = self.poller.retire(
                drain,
                PollTargets {
                    ring: &mut self.ring,
                    fences: &mut self.fences,
                    arena: &mut self.arena,
                    backend: &mut self.device,
                },
            )?;
            Ok(retired.into_iter().map(|r| r.audio.unwrap()).collect())
        }

        fn retire(&mut self, drain: bool) -> Vec<&'static str> {
            self.try_retire(drain).unwrap()
        }
    }

    #[test]
    fn stops_at_first_pending_frame() {
        let mut rig = Rig::new(4);
        let queue = rig.device.queue();
        rig.submit("a");
        rig.submit("b");
        assert!(rig.retire(false).is_empty());
        queue.complete_next();
        assert_eq!(rig.retire(false), vec!["a"]);
        assert_eq!(rig.poller.len(), 1);
        queue.complete_next();
        assert_eq!(rig.retire(false), vec!["b"]);
        assert!(rig.ring.is_empty());
    }

    #[test]
    fn full_ring_waits_for_oldest() {
        let mut rig = Rig::new(3);
        rig.submit("a");
        rig.submit("b");
        assert!(rig.ring.is_full());
        //the wait completes "a" but leaves "b" pending
        assert_eq!(rig.retire(false), vec!["a"]);
        assert!(!rig.ring.is_full());
        assert_eq!(rig.device.queue().pending(), 1);
    }

    #[test]
    fn drain_takes_everything() {
        let mut rig = Rig::new(5);
        for label in ["a", "b", "c"] {
            rig.submit(label);
        }
        assert_eq!(rig.retire(true), vec!["a", "b", "c"]);
        assert!(rig.ring.is_empty());
        assert_eq!(rig.fences.occupied(), 0);
    }

    #[test]
    fn discard_frees_fences() {
        let mut rig = Rig::new(4);
        let queue = rig.device.queue();
        rig.submit("a");
        rig.submit("b");
        rig.poller
            .discard(&mut rig.ring, &mut rig.fences, true)
            .unwrap();
        assert!(rig.ring.is_empty());
        assert_eq!(queue.live_fences(), 0);
    }

    #[test]
    fn failed_resolve_keeps_the_frame_and_its_fence() {
        let mut rig = Rig::new(4);
        let queue = rig.device.queue();
        rig.submit("a");
        rig.submit("b");
        queue.complete_all();
        queue.fail_next_resolve();
        assert!(matches!(rig.try_retire(false), Err(Error::Device(_))));
        assert_eq!(rig.poller.len(), 2);
        assert_eq!(rig.fences.occupied(), 2);
        assert_eq!(rig.ring.len(), 2);
        //the device recovered, so the same frames come back in order
        assert_eq!(rig.retire(false), vec!["a", "b"]);
        assert_eq!(rig.fences.occupied(), 0);
    }

    #[test]
    fn discard_on_a_lost_device_still_frees_everything() {
        let mut rig = Rig::new(4);
        let queue = rig.device.queue();
        rig.submit("a");
        rig.submit("b");
        queue.fault("lost");
        let result = rig.poller.discard(&mut rig.ring, &mut rig.fences, true);
        assert!(matches!(result, Err(Error::FenceStatus(_))));
        assert_eq!(rig.poller.len(), 0);
        assert!(rig.ring.is_empty());
        assert_eq!(rig.fences.occupied(), 0);
        assert_eq!(queue.live_fences(), 0);
    }
}
