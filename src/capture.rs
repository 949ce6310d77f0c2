// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Issues the device work that captures one frame.

use crate::Error;
use crate::config::{CaptureStrategy, StreamConfig};
use crate::imp::{Backend, CopySource, RenderTarget};
use crate::slot_ring::Slot;

#[derive(Debug)]
pub(crate) struct CaptureIssuer {
    width: u32,
    height: u32,
    strategy: CaptureStrategy,
    next_frame_index: u64,
}

impl CaptureIssuer {
    pub fn new(config: &StreamConfig) -> Self {
        CaptureIssuer {
            width: config.width,
            height: config.height,
            strategy: config.strategy,
            next_frame_index: 0,
        }
    }

    /// Index the next successfully issued frame will get.
    pub fn next_frame_index(&self) -> u64 {
        self.next_frame_index
    }

    pub fn check_size<T: RenderTarget>(&self, source: &T) -> Result<(), Error> {
        if source.width() != self.width || source.height() != self.height {
            return Err(Error::SizeMismatch {
                width: self.width,
                height: self.height,
                actual_width: source.width(),
                actual_height: source.height(),
            });
        }
        Ok(())
    }

    /**
    Runs the optional flip pass, then copies into `slot`.

    Returns the fence for the copy. On error nothing was submitted for this frame and the
    frame index is not consumed.
    */
    pub fn issue<B: Backend>(
        &mut self,
        backend: &mut B,
        source: &B::Target,
        slot: Slot,
    ) -> Result<B::Fence, Error> {
        self.check_size(source)?;
        let copy_source = match self.strategy {
            CaptureStrategy::GpuFlip if backend.requires_flip_pass(source) => {
                backend.flip_pass(source)?;
                CopySource::Flipped
            }
            CaptureStrategy::GpuFlip | CaptureStrategy::HostFlip => CopySource::Target(source),
        };
        let fence = backend.copy_to_slot(copy_source, slot)?;
        logwise::trace_sync!(
            "issued frame {frame} into slot {slot}",
            frame = self.next_frame_index,
            slot = slot.index()
        );
        self.next_frame_index += 1;
        Ok(fence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fence::Fence;
    use crate::imp::software::{SoftwareDevice, SoftwareTarget};

    fn prepared(config: &StreamConfig) -> SoftwareDevice {
        let mut device = SoftwareDevice::new();
        device.prepare(config).unwrap();
        device
    }

    #[test]
    fn gpu_flip_runs_the_pass() {
        let config = StreamConfig::new(2, 2, 3);
        let mut device = prepared(&config);
        let mut issuer = CaptureIssuer::new(&config);
        let target = SoftwareTarget::new(2, 2);
        let fence = issuer.issue(&mut device, &target, Slot(0)).unwrap();
        assert_eq!(device.flip_passes(), 1);
        assert_eq!(issuer.next_frame_index(), 1);
        fence.wait().unwrap();
    }

    #[test]
    fn host_flip_skips_the_pass() {
        let config = StreamConfig::new(2, 2, 3).with_strategy(CaptureStrategy::HostFlip);
        let mut device = prepared(&config);
        let mut issuer = CaptureIssuer::new(&config);
        let target = SoftwareTarget::new(2, 2);
        issuer.issue(&mut device, &target, Slot(0)).unwrap();
        assert_eq!(device.flip_passes(), 0);
    }

    #[test]
    fn size_mismatch_submits_nothing() {
        let config = StreamConfig::new(2, 2, 3);
        let mut device = prepared(&config);
        let queue = device.queue();
        let mut issuer = CaptureIssuer::new(&config);
        let target = SoftwareTarget::new(4, 2);
        assert!(matches!(
            issuer.issue(&mut device, &target, Slot(0)),
            Err(Error::SizeMismatch {
                actual_width: 4,
                ..
            })
        ));
        assert_eq!(queue.pending(), 0);
        assert_eq!(issuer.next_frame_index(), 0);
    }

    #[test]
    fn fence_failure_propagates() {
        let config = StreamConfig::new(1, 1, 2);
        let mut device = prepared(&config);
        device.queue().fail_next_fence();
        let mut issuer = CaptureIssuer::new(&config);
        let target = SoftwareTarget::new(1, 1);
        assert!(matches!(
            issuer.issue(&mut device, &target, Slot(0)),
            Err(Error::FenceAcquire(_))
        ));
        assert_eq!(issuer.next_frame_index(), 0);
    }
}
