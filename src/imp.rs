// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Device backends.

A backend owns the device side of the pipeline: the landing buffers the copies write into,
the intermediate target of the flip pass, and the fences. The stream drives it through
[`Backend`] and never touches device objects directly.

The software backend is always available. The wgpu backend is behind `backend_wgpu`.
*/

use crate::config::StreamConfig;
use crate::fence::Fence;
use crate::pixel_layout::RowOrder;
use crate::slot_ring::Slot;
use crate::Error;

pub mod software;

#[cfg(feature = "backend_wgpu")]
pub mod wgpu;

/// Something a frame can be captured from.
pub trait RenderTarget {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
}

/// Where the copy into a slot reads from.
#[derive(Debug)]
pub enum CopySource<'a, T> {
    /// The caller's render target, as stored on the device.
    Target(&'a T),
    /// The intermediate target written by the last [`Backend::flip_pass`].
    Flipped,
}

pub trait Backend {
    type Target: RenderTarget;
    type Fence: Fence;

    /// Row order of the device's render targets.
    fn row_order(&self) -> RowOrder;

    /// Whether a `GpuFlip` capture of `source` has to run the flip pass.
    ///
    /// By default the pass runs only to correct bottom-up row order.
    fn requires_flip_pass(&self, _source: &Self::Target) -> bool {
        self.row_order().needs_flip()
    }

    /// Allocates the landing buffers and the flip target for `config`.
    ///
    /// Called once, before any other method. Failure aborts stream construction.
    fn prepare(&mut self, config: &StreamConfig) -> Result<(), Error>;

    /// Renders `source`'s color into the intermediate target, top row first.
    ///
    /// Any global render state the pass changes must be restored before returning,
    /// on success and on failure.
    fn flip_pass(&mut self, source: &Self::Target) -> Result<(), Error>;

    /// Submits an asynchronous copy of `source` into `slot` and returns the fence that
    /// signals when the copy has landed.
    fn copy_to_slot(
        &mut self,
        source: CopySource<'_, Self::Target>,
        slot: Slot,
    ) -> Result<Self::Fence, Error>;

    /// Makes `slot`'s bytes visible to the host by writing them into `dst`.
    ///
    /// Only called after `slot`'s fence has been observed signaled.
    fn resolve(&mut self, slot: Slot, dst: &mut [u8]) -> Result<(), Error>;

    /// Blocks until all submitted work is complete.
    fn finish(&mut self) -> Result<(), Error>;

    /// Frees every device object made by `prepare`.
    fn release(&mut self);
}
