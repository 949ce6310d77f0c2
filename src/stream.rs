// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! The public download stream.

use crate::Error;
use crate::arena::TransferArena;
use crate::capture::CaptureIssuer;
use crate::config::{CaptureStrategy, StreamConfig};
use crate::fence::FenceSet;
use crate::frame::{CompletedFrame, InFlightFrame, PixelBuffer};
use crate::imp::Backend;
use crate::pixel_layout::flip_rows;
use crate::poller::{FramePoller, PollTargets, Retired};
use crate::slot_ring::SlotRing;

/**
Streams rendered frames from device memory to the host without stalling the render thread.

Call [`download`](Self::download) once per frame, [`poll`](Self::poll) whenever convenient,
and [`close`](Self::close) at the end of the session. `A` is an opaque payload (usually an
audio buffer) that travels 1:1 with its frame.

# Blocking

* `download` never blocks.
* `poll(false)` blocks only when the ring is full, and then only until the oldest frame
  completes.
* `poll(true)` and `close` block until all outstanding work has completed. Call them at the
  end of a session, not per frame.

# Capacity

At most `max_frames_inflight - 1` frames can be outstanding. A `download` beyond that fails
with [`Error::RingFull`]; poll first.
*/
#[derive(Debug)]
pub struct DownloadStream<B: Backend, A = Vec<f32>> {
    config: StreamConfig,
    backend: B,
    arena: TransferArena,
    ring: SlotRing,
    fences: FenceSet<B::Fence>,
    issuer: CaptureIssuer,
    poller: FramePoller<A>,
    closed: bool,
}

impl<B: Backend, A> DownloadStream<B, A> {
    /// Allocates the transfer arena and the backend's device resources.
    pub fn new(mut backend: B, config: StreamConfig) -> Result<Self, Error> {
        config.validate()?;
        let capacity = config.max_frames_inflight;
        backend.prepare(&config)?;
        let arena = TransferArena::new(config.frame_bytes(), capacity)?;
        logwise::info_sync!(
            "created download stream {name} ({width}x{height}, {capacity} slots)",
            name = config.debug_name.clone(),
            width = config.width,
            height = config.height,
            capacity = capacity
        );
        Ok(DownloadStream {
            ring: SlotRing::new(capacity),
            fences: FenceSet::new(capacity),
            issuer: CaptureIssuer::new(&config),
            poller: FramePoller::new(capacity),
            arena,
            backend,
            config,
            closed: false,
        })
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn width(&self) -> u32 {
        self.config.width
    }

    pub fn height(&self) -> u32 {
        self.config.height
    }

    /// Ring capacity; one less than this many frames may be in flight.
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    /// Frames submitted and not yet returned by `poll`.
    pub fn in_flight(&self) -> usize {
        self.poller.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    fn ensure_open(&self) -> Result<(), Error> {
        if self.closed {
            Err(Error::Closed)
        } else {
            Ok(())
        }
    }

    /**
    Captures `source` and queues it for readback.

    Fails with [`Error::RingFull`] when no slot is free, and with [`Error::SizeMismatch`]
    when `source` is not the configured size. In both cases nothing is submitted.
    */
    pub fn download(&mut self, source: &B::Target, audio: Option<A>) -> Result<(), Error> {
        self.ensure_open()?;
        self.issuer.check_size(source)?;
        let slot = self.ring.next_slot()?;
        let frame_index = self.issuer.next_frame_index();
        match self.issuer.issue(&mut self.backend, source, slot) {
            Ok(fence) => {
                self.fences.insert(slot, fence);
                self.poller.push(InFlightFrame {
                    frame_index,
                    slot,
                    audio,
                });
                Ok(())
            }
            Err(e) => {
                self.ring.unclaim(slot);
                Err(e)
            }
        }
    }

    /**
    Returns the frames that have completed since the last call, in submission order.

    With `drain`, waits for every outstanding frame and returns all of them; the stream is
    empty afterwards.

    Every returned frame borrows the stream. Under [`CaptureStrategy::GpuFlip`] its pixels
    are a view into the transfer arena, and [`CompletedFrame::into_owned`] copies them out.
    Under [`CaptureStrategy::HostFlip`] the pixels are already owned and `into_owned` only
    detaches the frame. Either way, detach frames you keep past the next `download`.
    */
    pub fn poll(&mut self, drain: bool) -> Result<Vec<CompletedFrame<'_, A>>, Error> {
        self.ensure_open()?;
        let retired = self.poller.retire(
            drain,
            PollTargets {
                ring: &mut self.ring,
                fences: &mut self.fences,
                arena: &mut self.arena,
                backend: &mut self.backend,
            },
        )?;
        let this = &*self;
        Ok(retired
            .into_iter()
            .map(|retired| this.materialize(retired))
            .collect())
    }

    fn materialize(&self, retired: Retired<A>) -> CompletedFrame<'_, A> {
        let bytes = self.arena.slot(retired.slot);
        let pixels = match self.config.strategy {
            CaptureStrategy::GpuFlip => PixelBuffer::View(bytes),
            CaptureStrategy::HostFlip => {
                let mut owned: Box<[u8]> = bytes.into();
                if self.backend.row_order().needs_flip() {
                    flip_rows(&mut owned, self.config.row_bytes());
                }
                PixelBuffer::Owned(owned)
            }
        };
        CompletedFrame::new(
            retired.frame_index,
            self.config.width,
            self.config.height,
            pixels,
            retired.audio,
        )
    }

    /**
    Tears the stream down.

    Flushes all device work, waits for and frees every outstanding fence, then releases the
    backend's resources and the transfer arena. Unread frames are discarded. Calling this
    again is a no-op.
    */
    pub fn close(&mut self) -> Result<(), Error> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let close = logwise::perfwarn_begin!("DownloadStream::close");
        let discarded = self.poller.len();
        let arena_bytes = self.arena.byte_len();
        let finished = self.backend.finish();
        //fences are freed even on a lost device, but only waited on while it is healthy
        let discarded_fences = self
            .poller
            .discard(&mut self.ring, &mut self.fences, finished.is_ok());
        let flushed = finished.and(discarded_fences);
        self.backend.release();
        self.arena.release();
        self.ring.reset();
        drop(close);
        logwise::info_sync!(
            "closed download stream {name}, discarded {discarded} unread frames, released {arena_bytes} arena bytes",
            name = self.config.debug_name.clone(),
            discarded = discarded,
            arena_bytes = arena_bytes
        );
        flushed
    }
}

impl<B: Backend, A> Drop for DownloadStream<B, A> {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            logwise::error_sync!(
                "failed to close download stream: {err}",
                err = logwise::privacy::LogIt(&err)
            );
        }
    }
}
