/*! frames_in_flight streams rendered frames from GPU memory to the host without stalling
the thread that submits rendering work.

The use case is capture: a video exporter, a screenshot series, a live preview in another
process. Each of those wants every full-resolution frame, but reading a framebuffer back
synchronously stalls the pipeline until the GPU catches up. Instead, frames go into a
small ring of in-flight transfers:

```text
 download(frame)                      poll(drain)
       │                                   │
       ▼                                   ▼
 ┌───────────┐  copy + fence  ┌────────────────────────┐  fence signaled  ┌────────────────┐
 │ flip pass │ ─────────────▶ │ slot k of the transfer │ ───────────────▶ │ CompletedFrame │
 │ (optional)│                │ arena (host-visible)   │                  │ + audio payload│
 └───────────┘                └────────────────────────┘                  └────────────────┘
```

| Component        | Responsibility                                                        |
|------------------|-----------------------------------------------------------------------|
| transfer arena   | one `capacity × frame_bytes` host region, allocated once             |
| slot ring        | circular `[end, start)` occupancy; one slot always free              |
| fence set        | per-slot completion fence; non-blocking poll and blocking wait       |
| capture issuer   | flip pass (optional), asynchronous copy, fence                       |
| frame poller     | retires ready slots strictly in submission order                     |

# Strategies

Devices with GL-style bottom-up row order need a vertical flip. [`CaptureStrategy::GpuFlip`]
does it with a GPU pass and hands out zero-copy views into the arena.
[`CaptureStrategy::HostFlip`] copies the slot out and reverses rows on the host, so the frame
can be kept indefinitely.

# Backends

| Backend                         | Feature        | Row order              |
|---------------------------------|----------------|------------------------|
| [`software::SoftwareDevice`]    | always         | bottom-up              |
| `WgpuBackend`                   | `backend_wgpu` | top-down (configurable)|

# Example

```
use frames_in_flight::software::{SoftwareDevice, SoftwareTarget};
use frames_in_flight::{CaptureStrategy, DownloadStream, StreamConfig};

let device = SoftwareDevice::new();
let queue = device.queue();
let config = StreamConfig::new(2, 1, 4).with_strategy(CaptureStrategy::HostFlip);
let mut stream: DownloadStream<_, Vec<f32>> = DownloadStream::new(device, config).unwrap();

let frame = SoftwareTarget::from_top_down_rows(2, 1, &[1, 2, 3, 4, 5, 6, 7, 8]);
stream.download(&frame, Some(vec![0.0; 512])).unwrap();
queue.complete_all();

for completed in stream.poll(false).unwrap() {
    assert_eq!(completed.row(0), &[1, 2, 3, 4, 5, 6, 7, 8]);
    assert_eq!(completed.audio().map(Vec::len), Some(512));
}
stream.close().unwrap();
```
*/

mod arena;
mod capture;
mod config;
mod error;
mod fence;
mod frame;
mod imp;
pub mod pixel_layout;
mod poller;
mod slot_ring;
pub mod state;
mod stream;

pub use config::{CaptureStrategy, StreamConfig};
pub use error::Error;
pub use fence::Fence;
pub use frame::{CompletedFrame, PixelBuffer};
pub use imp::{Backend, CopySource, RenderTarget, software};
pub use pixel_layout::RowOrder;
pub use slot_ring::Slot;
pub use stream::DownloadStream;

#[cfg(feature = "backend_wgpu")]
pub use imp::wgpu::{WgpuBackend, WgpuFence};
