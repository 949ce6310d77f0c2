// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Fences on wgpu.

wgpu has no host-visible fence object. What it does have is `map_async`: a read mapping of
the staging buffer completes only after every submission writing to it has finished, and
the callback runs from inside `Device::poll`. So a fence is the submission index plus a
status flag that the map callback sets.
*/

use crate::Error;
use crate::fence::Fence;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

const PENDING: u8 = 0;
const SIGNALED: u8 = 1;
const FAILED: u8 = 2;

/// Shared status written by a staging buffer's map callback.
#[derive(Debug, Clone, Default)]
pub(super) struct MapStatus(Arc<AtomicU8>);

impl MapStatus {
    pub(super) fn complete(&self, result: Result<(), wgpu::BufferAsyncError>) {
        let status = match result {
            Ok(()) => SIGNALED,
            Err(err) => {
                logwise::error_sync!(
                    "staging buffer map failed: {err}",
                    err = logwise::privacy::LogIt(&err)
                );
                FAILED
            }
        };
        self.0.store(status, Ordering::Release);
    }

    fn load(&self) -> u8 {
        self.0.load(Ordering::Acquire)
    }
}

/// Completion fence for one wgpu readback copy.
#[derive(Debug)]
pub struct WgpuFence {
    device: wgpu::Device,
    submission: wgpu::SubmissionIndex,
    status: MapStatus,
}

impl WgpuFence {
    pub(super) fn new(
        device: wgpu::Device,
        submission: wgpu::SubmissionIndex,
        status: MapStatus,
    ) -> Self {
        WgpuFence {
            device,
            submission,
            status,
        }
    }

    fn check(&self) -> Result<bool, Error> {
        match self.status.load() {
            SIGNALED => Ok(true),
            PENDING => Ok(false),
            _ => Err(Error::FenceStatus(
                "staging buffer could not be mapped for reading".to_string(),
            )),
        }
    }
}

impl Fence for WgpuFence {
    fn is_ready(&self) -> Result<bool, Error> {
        if self.check()? {
            return Ok(true);
        }
        //map callbacks only run from poll
        self.device.poll(wgpu::PollType::Poll)?;
        self.check()
    }

    fn wait(&self) -> Result<(), Error> {
        if self.check()? {
            return Ok(());
        }
        self.device
            .poll(wgpu::PollType::WaitForSubmissionIndex(self.submission.clone()))?;
        if self.check()? {
            return Ok(());
        }
        //the map was requested after the submission, so it may need one more round
        self.device.poll(wgpu::PollType::Wait)?;
        if self.check()? {
            Ok(())
        } else {
            Err(Error::FenceStatus(
                "device went idle without completing the readback".to_string(),
            ))
        }
    }
}
