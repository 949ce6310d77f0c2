// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Frames as they travel through the stream.

use crate::Error;
use crate::pixel_layout::row_bytes;
use crate::slot_ring::Slot;
use std::ops::Deref;

/// A frame submitted to the device and not yet returned to the caller.
#[derive(Debug)]
pub(crate) struct InFlightFrame<A> {
    pub frame_index: u64,
    pub slot: Slot,
    pub audio: Option<A>,
}

/**
Pixel bytes of a completed frame.

`View` borrows the stream's transfer arena and lives until the slot could be reused;
`Owned` is a private copy. Both deref to the same RGBA8, top-row-first bytes.
*/
#[derive(Debug)]
pub enum PixelBuffer<'a> {
    View(&'a [u8]),
    Owned(Box<[u8]>),
}

impl PixelBuffer<'_> {
    pub fn is_view(&self) -> bool {
        matches!(self, PixelBuffer::View(_))
    }

    pub fn into_owned(self) -> PixelBuffer<'static> {
        match self {
            PixelBuffer::View(view) => PixelBuffer::Owned(view.into()),
            PixelBuffer::Owned(owned) => PixelBuffer::Owned(owned),
        }
    }

    pub fn into_boxed_slice(self) -> Box<[u8]> {
        match self {
            PixelBuffer::View(view) => view.into(),
            PixelBuffer::Owned(owned) => owned,
        }
    }
}

impl Deref for PixelBuffer<'_> {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        match self {
            PixelBuffer::View(view) => view,
            PixelBuffer::Owned(owned) => owned,
        }
    }
}

impl AsRef<[u8]> for PixelBuffer<'_> {
    fn as_ref(&self) -> &[u8] {
        self
    }
}

/// One captured frame, with the audio payload that was submitted alongside it.
#[derive(Debug)]
pub struct CompletedFrame<'a, A> {
    frame_index: u64,
    width: u32,
    height: u32,
    pixels: PixelBuffer<'a>,
    audio: Option<A>,
}

impl<'a, A> CompletedFrame<'a, A> {
    pub(crate) fn new(
        frame_index: u64,
        width: u32,
        height: u32,
        pixels: PixelBuffer<'a>,
        audio: Option<A>,
    ) -> Self {
        CompletedFrame {
            frame_index,
            width,
            height,
            pixels,
            audio,
        }
    }

    /// Zero-based submission order of this frame within its stream.
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &PixelBuffer<'a> {
        &self.pixels
    }

    pub fn audio(&self) -> Option<&A> {
        self.audio.as_ref()
    }

    /// Row `y`, counted from the top.
    pub fn row(&self, y: u32) -> &[u8] {
        assert!(y < self.height, "row {y} out of range");
        let stride = row_bytes(self.width);
        let start = y as usize * stride;
        &self.pixels[start..start + stride]
    }

    pub fn into_parts(self) -> (PixelBuffer<'a>, Option<A>) {
        (self.pixels, self.audio)
    }

    /// Detaches the frame from the stream so it can outlive the next `download`.
    pub fn into_owned(self) -> CompletedFrame<'static, A> {
        CompletedFrame {
            frame_index: self.frame_index,
            width: self.width,
            height: self.height,
            pixels: self.pixels.into_owned(),
            audio: self.audio,
        }
    }

    /// Encodes the frame as an 8-bit RGBA PNG.
    pub fn write_png<W: std::io::Write>(&self, writer: W) -> Result<(), Error> {
        let mut encoder = png::Encoder::new(writer, self.width, self.height);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header()?;
        writer.write_image_data(&self.pixels)?;
        writer.finish()?;
        Ok(())
    }
}
