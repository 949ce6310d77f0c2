// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! The fixed pixel layout of captured frames.
//!
//! Every frame that leaves a [`DownloadStream`](crate::DownloadStream) is 8-bit RGBA,
//! row-major, with the top row first. Nothing else is supported; converting to other
//! layouts is the consumer's business.

/// Bytes in one RGBA8 pixel.
pub const BYTES_PER_PIXEL: usize = 4;

/**
The order in which a device stores the rows of a render target.

GL-style devices put the origin in the lower-left corner, so the first row in memory is the
*bottom* row of the image. Image files expect the top row first. When a backend reports
[`RowOrder::BottomUp`], the stream corrects the order either with a GPU flip pass or by
reversing rows on the host, depending on the [`CaptureStrategy`](crate::CaptureStrategy).
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RowOrder {
    TopDown,
    BottomUp,
}

impl RowOrder {
    pub fn needs_flip(self) -> bool {
        matches!(self, RowOrder::BottomUp)
    }
}

/// Unpadded bytes in one row of a `width`-pixel frame.
pub const fn row_bytes(width: u32) -> usize {
    width as usize * BYTES_PER_PIXEL
}

/// Bytes in one `width × height` frame, or `None` on overflow.
pub fn frame_bytes(width: u32, height: u32) -> Option<usize> {
    (width as usize)
        .checked_mul(height as usize)?
        .checked_mul(BYTES_PER_PIXEL)
}

/// Rounds `unpadded` up to the next multiple of `alignment`.
///
/// `alignment` must be a power of two.
#[cfg(feature = "backend_wgpu")]
pub(crate) const fn align_up(unpadded: u32, alignment: u32) -> u32 {
    (unpadded + alignment - 1) & !(alignment - 1)
}

/// Reverses the row order of `pixels` in place.
pub fn flip_rows(pixels: &mut [u8], row_bytes: usize) {
    if row_bytes == 0 {
        return;
    }
    debug_assert_eq!(pixels.len() % row_bytes, 0, "partial row");
    let rows = pixels.len() / row_bytes;
    for top in 0..rows / 2 {
        let bottom = rows - 1 - top;
        let (head, tail) = pixels.split_at_mut(bottom * row_bytes);
        head[top * row_bytes..(top + 1) * row_bytes].swap_with_slice(&mut tail[..row_bytes]);
    }
}

/// Copies `src` into `dst`, reversing row order on the way.
pub fn copy_flipped(src: &[u8], dst: &mut [u8], row_bytes: usize) {
    assert_eq!(src.len(), dst.len(), "flip copy length mismatch");
    if row_bytes == 0 {
        return;
    }
    for (dst_row, src_row) in dst
        .chunks_exact_mut(row_bytes)
        .zip(src.chunks_exact(row_bytes).rev())
    {
        dst_row.copy_from_slice(src_row);
    }
}
