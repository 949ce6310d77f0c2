// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*! A host-memory device that behaves like an asynchronous GL-style GPU.

The software backend exists for headless use and for testing the stream without a GPU.
It keeps the properties that make readback tricky:

* Render targets store rows bottom-up, so captures need a flip.
* The device has one global [`GraphicsState`] that the flip pass must leave untouched.
* Submitted copies do not execute until the queue runs. Fences signal strictly in
  submission order, and a slot's landing memory only changes when its copy executes.
* The queue can be faulted to imitate a lost device.

The queue is driven from outside through a [`SoftwareQueue`] handle:

```
use frames_in_flight::software::{SoftwareDevice, SoftwareTarget};
use frames_in_flight::{DownloadStream, StreamConfig};

let device = SoftwareDevice::new();
let queue = device.queue();
let mut stream: DownloadStream<_> = DownloadStream::new(device, StreamConfig::new(2, 2, 3)).unwrap();

let target = SoftwareTarget::from_top_down_rows(2, 2, &[7; 16]);
stream.download(&target, None).unwrap();
assert!(stream.poll(false).unwrap().is_empty());

queue.complete_all();
let frames = stream.poll(false).unwrap();
assert_eq!(&**frames[0].pixels(), &[7; 16][..]);
```
*/

use crate::config::StreamConfig;
use crate::fence::Fence;
use crate::imp::{Backend, CopySource, RenderTarget};
use crate::pixel_layout::{RowOrder, copy_flipped, frame_bytes, row_bytes};
use crate::slot_ring::Slot;
use crate::state::{GraphicsState, StateScope};
use crate::Error;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

/// An RGBA8 render target whose storage is bottom row first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoftwareTarget {
    width: u32,
    height: u32,
    storage: Vec<u8>,
}

impl SoftwareTarget {
    /// A transparent black target.
    pub fn new(width: u32, height: u32) -> Self {
        let len = frame_bytes(width, height).expect("target too large");
        SoftwareTarget {
            width,
            height,
            storage: vec![0; len],
        }
    }

    /// Builds a target from an image given top row first.
    pub fn from_top_down_rows(width: u32, height: u32, pixels: &[u8]) -> Self {
        let mut target = SoftwareTarget::new(width, height);
        assert_eq!(pixels.len(), target.storage.len(), "pixel data size mismatch");
        copy_flipped(pixels, &mut target.storage, row_bytes(width));
        target
    }

    /// The image, top row first.
    pub fn top_down_rows(&self) -> Vec<u8> {
        let mut out = vec![0; self.storage.len()];
        copy_flipped(&self.storage, &mut out, row_bytes(self.width));
        out
    }

    /// Raw storage, bottom row first.
    pub fn storage(&self) -> &[u8] {
        &self.storage
    }

    pub fn fill(&mut self, rgba: [u8; 4]) {
        for pixel in self.storage.chunks_exact_mut(4) {
            pixel.copy_from_slice(&rgba);
        }
    }

    /// Writes one pixel; `y` counts from the top.
    pub fn put_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        assert!(x < self.width && y < self.height, "pixel out of range");
        let storage_row = (self.height - 1 - y) as usize;
        let offset = storage_row * row_bytes(self.width) + x as usize * 4;
        self.storage[offset..offset + 4].copy_from_slice(&rgba);
    }
}

impl RenderTarget for SoftwareTarget {
    fn width(&self) -> u32 {
        self.width
    }
    fn height(&self) -> u32 {
        self.height
    }
}

#[derive(Debug)]
struct CopyJob {
    sequence: u64,
    slot: Slot,
    bytes: Vec<u8>,
}

#[derive(Debug, Default)]
struct QueueState {
    submitted: u64,
    completed: u64,
    pending: VecDeque<CopyJob>,
    //landing memory, one buffer per slot
    landing: Vec<Vec<u8>>,
    live_fences: usize,
    fault: Option<String>,
    fail_next_fence: bool,
    fail_next_flip: bool,
    fail_next_resolve: bool,
}

impl QueueState {
    fn execute_through(&mut self, sequence: u64) {
        while self
            .pending
            .front()
            .is_some_and(|job| job.sequence <= sequence)
        {
            let Some(job) = self.pending.pop_front() else {
                break;
            };
            self.landing[job.slot.index()] = job.bytes;
            self.completed = job.sequence;
        }
    }
}

/**
Handle to the software device's command queue.

Clones share the same queue. Tests use it to decide when submitted work "runs".
*/
#[derive(Debug, Clone, Default)]
pub struct SoftwareQueue {
    state: Arc<Mutex<QueueState>>,
}

impl SoftwareQueue {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap()
    }

    /// Executes the oldest pending copy. Returns false if nothing was pending.
    pub fn complete_next(&self) -> bool {
        let mut state = self.lock();
        match state.pending.front().map(|job| job.sequence) {
            Some(sequence) => {
                state.execute_through(sequence);
                true
            }
            None => false,
        }
    }

    /// Executes every pending copy.
    pub fn complete_all(&self) {
        let mut state = self.lock();
        let submitted = state.submitted;
        state.execute_through(submitted);
    }

    /// Number of submitted copies that have not executed.
    pub fn pending(&self) -> usize {
        self.lock().pending.len()
    }

    /// Fences handed out and not yet released.
    pub fn live_fences(&self) -> usize {
        self.lock().live_fences
    }

    /// Puts the device into a lost state. Every later fence query fails.
    pub fn fault(&self, reason: impl Into<String>) {
        self.lock().fault = Some(reason.into());
    }

    /// Makes the next copy submission fail to produce a fence.
    pub fn fail_next_fence(&self) {
        self.lock().fail_next_fence = true;
    }

    /// Makes the next flip pass fail partway through.
    pub fn fail_next_flip(&self) {
        self.lock().fail_next_flip = true;
    }

    /// Makes the next readback of a landed slot fail.
    pub fn fail_next_resolve(&self) {
        self.lock().fail_next_resolve = true;
    }
}

/// Completion fence for one software copy.
#[derive(Debug)]
pub struct SoftwareFence {
    sequence: u64,
    queue: SoftwareQueue,
}

impl Fence for SoftwareFence {
    fn is_ready(&self) -> Result<bool, Error> {
        let state = self.queue.lock();
        if let Some(fault) = &state.fault {
            return Err(Error::FenceStatus(fault.clone()));
        }
        Ok(state.completed >= self.sequence)
    }

    fn wait(&self) -> Result<(), Error> {
        let mut state = self.queue.lock();
        if let Some(fault) = &state.fault {
            return Err(Error::FenceStatus(fault.clone()));
        }
        //blocking on a fence lets the device run up to it
        state.execute_through(self.sequence);
        Ok(())
    }
}

impl Drop for SoftwareFence {
    fn drop(&mut self) {
        self.queue.lock().live_fences -= 1;
    }
}

/// The software [`Backend`].
#[derive(Debug)]
pub struct SoftwareDevice {
    queue: SoftwareQueue,
    state: GraphicsState,
    flip_target: Option<SoftwareTarget>,
    flip_passes: u64,
    released: bool,
}

impl SoftwareDevice {
    pub fn new() -> Self {
        SoftwareDevice {
            queue: SoftwareQueue::default(),
            state: GraphicsState::new(0, 0),
            flip_target: None,
            flip_passes: 0,
            released: false,
        }
    }

    pub fn queue(&self) -> SoftwareQueue {
        self.queue.clone()
    }

    /// The device's global render state.
    pub fn state(&self) -> &GraphicsState {
        &self.state
    }

    pub fn set_state(&mut self, state: GraphicsState) {
        self.state = state;
    }

    pub fn flip_passes(&self) -> u64 {
        self.flip_passes
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}

impl Default for SoftwareDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for SoftwareDevice {
    type Target = SoftwareTarget;
    type Fence = SoftwareFence;

    fn row_order(&self) -> RowOrder {
        RowOrder::BottomUp
    }

    fn prepare(&mut self, config: &StreamConfig) -> Result<(), Error> {
        let frame_bytes = config.frame_bytes();
        let mut state = self.queue.lock();
        state.landing = (0..config.max_frames_inflight)
            .map(|_| vec![0; frame_bytes])
            .collect();
        drop(state);
        self.flip_target = Some(SoftwareTarget::new(config.width, config.height));
        self.state = GraphicsState::new(config.width, config.height);
        Ok(())
    }

    fn flip_pass(&mut self, source: &SoftwareTarget) -> Result<(), Error> {
        let flip_target = self
            .flip_target
            .as_mut()
            .ok_or(Error::Device("flip target was released".to_string()))?;
        let scope = StateScope::enter(
            &mut self.state,
            GraphicsState::blit(source.width, source.height),
        );
        debug_assert!(!scope.blend && !scope.depth_test && !scope.cull);
        {
            let mut queue = self.queue.lock();
            if std::mem::take(&mut queue.fail_next_flip) {
                return Err(Error::Device("flip shader failed to draw".to_string()));
            }
        }
        //storage is bottom-up, so reversing it leaves the top row first
        copy_flipped(
            &source.storage,
            &mut flip_target.storage,
            row_bytes(source.width),
        );
        drop(scope);
        self.flip_passes += 1;
        Ok(())
    }

    fn copy_to_slot(
        &mut self,
        source: CopySource<'_, SoftwareTarget>,
        slot: Slot,
    ) -> Result<SoftwareFence, Error> {
        let bytes = match source {
            CopySource::Target(target) => target.storage.clone(),
            CopySource::Flipped => self
                .flip_target
                .as_ref()
                .ok_or(Error::Device("flip target was released".to_string()))?
                .storage
                .clone(),
        };
        let mut state = self.queue.lock();
        if let Some(fault) = &state.fault {
            return Err(Error::Device(fault.clone()));
        }
        if std::mem::take(&mut state.fail_next_fence) {
            return Err(Error::FenceAcquire(
                "fence creation returned a null handle".to_string(),
            ));
        }
        state.submitted += 1;
        let sequence = state.submitted;
        state.pending.push_back(CopyJob {
            sequence,
            slot,
            bytes,
        });
        state.live_fences += 1;
        drop(state);
        Ok(SoftwareFence {
            sequence,
            queue: self.queue.clone(),
        })
    }

    fn resolve(&mut self, slot: Slot, dst: &mut [u8]) -> Result<(), Error> {
        let mut state = self.queue.lock();
        if std::mem::take(&mut state.fail_next_resolve) {
            return Err(Error::Device("landing buffer could not be mapped".to_string()));
        }
        let landing = state
            .landing
            .get(slot.index())
            .ok_or(Error::Device("landing buffers were released".to_string()))?;
        dst.copy_from_slice(landing);
        Ok(())
    }

    fn finish(&mut self) -> Result<(), Error> {
        let mut state = self.queue.lock();
        if let Some(fault) = &state.fault {
            return Err(Error::Device(fault.clone()));
        }
        let submitted = state.submitted;
        state.execute_through(submitted);
        Ok(())
    }

    fn release(&mut self) {
        let mut state = self.queue.lock();
        state.landing = Vec::new();
        state.pending.clear();
        drop(state);
        self.flip_target = None;
        self.released = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prepared(width: u32, height: u32, capacity: usize) -> SoftwareDevice {
        let mut device = SoftwareDevice::new();
        device
            .prepare(&StreamConfig::new(width, height, capacity))
            .unwrap();
        device
    }

    #[test]
    fn target_rows_are_stored_bottom_up() {
        let top_down: Vec<u8> = (0..16).collect();
        let target = SoftwareTarget::from_top_down_rows(2, 2, &top_down);
        assert_eq!(&target.storage()[..8], &top_down[8..]);
        assert_eq!(target.top_down_rows(), top_down);

        let mut target = SoftwareTarget::new(2, 2);
        target.put_pixel(1, 0, [1, 2, 3, 4]);
        assert_eq!(&target.top_down_rows()[4..8], &[1, 2, 3, 4]);
    }

    #[test]
    fn copies_land_only_when_executed() {
        let mut device = prepared(1, 1, 2);
        let queue = device.queue();
        let mut target = SoftwareTarget::new(1, 1);
        target.fill([5, 6, 7, 8]);

        let fence = device
            .copy_to_slot(CopySource::Target(&target), Slot(0))
            .unwrap();
        assert!(!fence.is_ready().unwrap());
        let mut dst = [0; 4];
        device.resolve(Slot(0), &mut dst).unwrap();
        assert_eq!(dst, [0; 4]);

        assert!(queue.complete_next());
        assert!(fence.is_ready().unwrap());
        device.resolve(Slot(0), &mut dst).unwrap();
        assert_eq!(dst, [5, 6, 7, 8]);
        assert!(!queue.complete_next());
    }

    #[test]
    fn wait_runs_earlier_work_too() {
        let mut device = prepared(1, 1, 3);
        let queue = device.queue();
        let target = SoftwareTarget::new(1, 1);
        let first = device
            .copy_to_slot(CopySource::Target(&target), Slot(0))
            .unwrap();
        let second = device
            .copy_to_slot(CopySource::Target(&target), Slot(1))
            .unwrap();
        second.wait().unwrap();
        assert!(first.is_ready().unwrap());
        assert_eq!(queue.pending(), 0);
        assert_eq!(queue.live_fences(), 2);
        drop(first);
        drop(second);
        assert_eq!(queue.live_fences(), 0);
    }

    #[test]
    fn fault_poisons_fences() {
        let mut device = prepared(1, 1, 2);
        let queue = device.queue();
        let target = SoftwareTarget::new(1, 1);
        let fence = device
            .copy_to_slot(CopySource::Target(&target), Slot(0))
            .unwrap();
        queue.fault("device removed");
        assert!(matches!(fence.is_ready(), Err(Error::FenceStatus(_))));
        assert!(matches!(fence.wait(), Err(Error::FenceStatus(_))));
        assert!(matches!(
            device.copy_to_slot(CopySource::Target(&target), Slot(1)),
            Err(Error::Device(_))
        ));
    }

    #[test]
    fn flip_pass_restores_state_even_when_it_fails() {
        let mut device = prepared(2, 2, 2);
        let custom = GraphicsState::new(1024, 768);
        device.set_state(custom);
        let target = SoftwareTarget::from_top_down_rows(2, 2, &[3; 16]);

        device.flip_pass(&target).unwrap();
        assert_eq!(device.state(), &custom);

        device.queue().fail_next_flip();
        assert!(matches!(device.flip_pass(&target), Err(Error::Device(_))));
        assert_eq!(device.state(), &custom);
        assert_eq!(device.flip_passes(), 1);
    }
}
