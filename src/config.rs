// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Construction parameters for a download stream.

use crate::Error;
use crate::pixel_layout;

/**
How a frame gets from the render target into host memory in top-to-bottom order.

| Strategy   | GPU work                   | Host work                  | Frame pixels             |
|------------|----------------------------|----------------------------|--------------------------|
| `GpuFlip`  | flip pass, then copy       | none                       | view into the arena      |
| `HostFlip` | copy only                  | copy out, reverse rows     | owned buffer             |

A `GpuFlip` view borrows the stream, so it has to be dropped before the next `download`.
A `HostFlip` frame owns its pixels, but `poll` still ties it to the stream's borrow; call
[`CompletedFrame::into_owned`] (no copy for owned pixels) to keep it past the next `download`.
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CaptureStrategy {
    #[default]
    GpuFlip,
    HostFlip,
}

/// Parameters fixed for the lifetime of a [`DownloadStream`](crate::DownloadStream).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    pub width: u32,
    pub height: u32,
    /// Ring capacity. At most `max_frames_inflight - 1` frames are in flight at once.
    pub max_frames_inflight: usize,
    pub strategy: CaptureStrategy,
    pub debug_name: String,
}

impl StreamConfig {
    pub fn new(width: u32, height: u32, max_frames_inflight: usize) -> Self {
        StreamConfig {
            width,
            height,
            max_frames_inflight,
            strategy: CaptureStrategy::default(),
            debug_name: "frames_in_flight".to_string(),
        }
    }

    pub fn with_strategy(mut self, strategy: CaptureStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_debug_name(mut self, debug_name: impl Into<String>) -> Self {
        self.debug_name = debug_name.into();
        self
    }

    pub fn frame_bytes(&self) -> usize {
        pixel_layout::frame_bytes(self.width, self.height).unwrap_or(usize::MAX)
    }

    pub fn row_bytes(&self) -> usize {
        pixel_layout::row_bytes(self.width)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::InvalidConfig("frame dimensions must be nonzero"));
        }
        if self.max_frames_inflight < 2 {
            return Err(Error::InvalidConfig(
                "max_frames_inflight must be at least 2",
            ));
        }
        pixel_layout::frame_bytes(self.width, self.height)
            .and_then(|frame| frame.checked_mul(self.max_frames_inflight))
            .ok_or(Error::InvalidConfig("transfer arena size overflows"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder() {
        let config = StreamConfig::new(4, 3, 3)
            .with_strategy(CaptureStrategy::HostFlip)
            .with_debug_name("export");
        assert_eq!(config.strategy, CaptureStrategy::HostFlip);
        assert_eq!(config.debug_name, "export");
        assert_eq!(config.frame_bytes(), 48);
        assert_eq!(config.row_bytes(), 16);
        config.validate().unwrap();
    }

    #[test]
    fn rejects_bad_parameters() {
        assert!(matches!(
            StreamConfig::new(0, 2, 3).validate(),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            StreamConfig::new(2, 2, 1).validate(),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            StreamConfig::new(u32::MAX, u32::MAX, usize::MAX).validate(),
            Err(Error::InvalidConfig(_))
        ));
    }
}
