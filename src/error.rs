// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Error type shared by every stream operation.

/// Errors raised by a [`DownloadStream`](crate::DownloadStream) and its backends.
///
/// Only [`Error::RingFull`] is recoverable: the caller polls and tries again.
/// Everything else means the capture session is broken and should be torn down.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// `download` was called with no free slot left in the ring.
    #[error("no downstream space available ({in_flight} of {capacity} slots in flight)")]
    RingFull { in_flight: usize, capacity: usize },

    /// The render target handed to `download` does not match the configured frame size.
    #[error(
        "render target is {actual_width}x{actual_height}, stream was configured for {width}x{height}"
    )]
    SizeMismatch {
        width: u32,
        height: u32,
        actual_width: u32,
        actual_height: u32,
    },

    #[error("invalid stream configuration: {0}")]
    InvalidConfig(&'static str),

    /// The transfer arena or a device-side landing buffer could not be allocated.
    #[error("failed to allocate {bytes} bytes of transfer memory")]
    Allocation { bytes: u64 },

    /// A fence reported something other than signaled/pending.
    #[error("fence status query failed: {0}")]
    FenceStatus(String),

    /// The device rejected or lost submitted work.
    #[error("device error: {0}")]
    Device(String),

    #[error("failed to acquire a completion fence: {0}")]
    FenceAcquire(String),

    /// A fence was queried or freed for a slot that has none (double free).
    #[error("no fence is recorded for slot {0}")]
    FenceMissing(usize),

    #[error("unsupported render target: {0}")]
    UnsupportedTarget(String),

    #[error("the download stream has been closed")]
    Closed,

    #[error("failed to encode frame: {0}")]
    Png(#[from] png::EncodingError),

    #[cfg(feature = "backend_wgpu")]
    #[error("device poll failed: {0}")]
    Poll(#[from] wgpu::PollError),
}

impl Error {
    /// Whether this error leaves the stream unusable.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::RingFull { .. })
    }
}
