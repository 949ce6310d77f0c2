// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
wgpu backend.

Each slot gets its own `COPY_DST | MAP_READ` staging buffer, since a mapped buffer cannot be
written by the device. The copy into a slot and the read mapping of its staging buffer are
requested together; the mapping completing is the fence. On resolve, the mapped bytes are
copied into the stream's transfer arena with wgpu's row padding stripped, and the buffer is
unmapped so the slot can be reused.
*/

mod fence;
mod flip_pass;

pub use fence::WgpuFence;

use crate::Error;
use crate::config::StreamConfig;
use crate::imp::{Backend, CopySource, RenderTarget};
use crate::pixel_layout::{BYTES_PER_PIXEL, RowOrder, align_up, row_bytes};
use crate::slot_ring::Slot;
use fence::MapStatus;
use flip_pass::FlipPass;

impl RenderTarget for wgpu::Texture {
    fn width(&self) -> u32 {
        wgpu::Texture::width(self)
    }

    fn height(&self) -> u32 {
        wgpu::Texture::height(self)
    }
}

fn is_rgba8(format: wgpu::TextureFormat) -> bool {
    matches!(
        format,
        wgpu::TextureFormat::Rgba8Unorm | wgpu::TextureFormat::Rgba8UnormSrgb
    )
}

#[derive(Debug)]
struct Resources {
    width: u32,
    height: u32,
    padded_bytes_per_row: u32,
    staging: Vec<wgpu::Buffer>,
    flip_pass: FlipPass,
}

/**
Reads frames back from a wgpu device.

wgpu textures are stored top row first, so by default the flip pass only runs when the
source is not already RGBA8. Use [`with_row_order`](Self::with_row_order) for targets that a
renderer draws upside down.
*/
#[derive(Debug)]
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    row_order: RowOrder,
    resources: Option<Resources>,
    //flip pass waiting to be submitted together with its copy
    encoder: Option<wgpu::CommandEncoder>,
}

impl WgpuBackend {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        WgpuBackend {
            device,
            queue,
            row_order: RowOrder::TopDown,
            resources: None,
            encoder: None,
        }
    }

    pub fn with_row_order(mut self, row_order: RowOrder) -> Self {
        self.row_order = row_order;
        self
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    fn resources(&self) -> Result<&Resources, Error> {
        self.resources
            .as_ref()
            .ok_or(Error::Device("wgpu resources were released".to_string()))
    }

    fn encoder(&mut self) -> wgpu::CommandEncoder {
        match self.encoder.take() {
            Some(encoder) => encoder,
            None => self
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("frame readback"),
                }),
        }
    }

    fn check_copy_source(texture: &wgpu::Texture) -> Result<(), Error> {
        if !is_rgba8(texture.format()) {
            return Err(Error::UnsupportedTarget(format!(
                "direct copies need an RGBA8 target, not {:?}; use CaptureStrategy::GpuFlip",
                texture.format()
            )));
        }
        if texture.sample_count() != 1 {
            return Err(Error::UnsupportedTarget(
                "multisampled targets must be resolved before capture".to_string(),
            ));
        }
        if !texture.usage().contains(wgpu::TextureUsages::COPY_SRC) {
            return Err(Error::UnsupportedTarget(
                "capture source needs COPY_SRC usage".to_string(),
            ));
        }
        Ok(())
    }
}

impl Backend for WgpuBackend {
    type Target = wgpu::Texture;
    type Fence = WgpuFence;

    fn row_order(&self) -> RowOrder {
        self.row_order
    }

    fn requires_flip_pass(&self, source: &wgpu::Texture) -> bool {
        self.row_order.needs_flip() || !is_rgba8(source.format())
    }

    fn prepare(&mut self, config: &StreamConfig) -> Result<(), Error> {
        let unpadded = u32::try_from(row_bytes(config.width))
            .ok()
            .filter(|bytes| bytes.checked_add(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT).is_some())
            .ok_or(Error::InvalidConfig("frame rows are too wide for wgpu"))?;
        let padded_bytes_per_row = align_up(unpadded, wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);
        let size = u64::from(padded_bytes_per_row) * u64::from(config.height);
        let limit = self.device.limits().max_buffer_size;
        if size > limit {
            return Err(Error::Allocation { bytes: size });
        }
        let staging = (0..config.max_frames_inflight)
            .map(|slot| {
                self.device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some(&format!("{}_slot_{slot}", config.debug_name)),
                    size,
                    usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
                    mapped_at_creation: false,
                })
            })
            .collect();
        let flip_pass = FlipPass::new(
            &self.device,
            config.width,
            config.height,
            self.row_order,
            &config.debug_name,
        );
        logwise::info_sync!(
            "prepared {slots} staging buffers of {size} bytes",
            slots = config.max_frames_inflight,
            size = size
        );
        self.resources = Some(Resources {
            width: config.width,
            height: config.height,
            padded_bytes_per_row,
            staging,
            flip_pass,
        });
        Ok(())
    }

    fn flip_pass(&mut self, source: &wgpu::Texture) -> Result<(), Error> {
        let mut encoder = self.encoder();
        let resources = self
            .resources
            .as_mut()
            .ok_or(Error::Device("wgpu resources were released".to_string()))?;
        //on failure the encoder is dropped unsubmitted
        resources
            .flip_pass
            .encode(&self.device, &mut encoder, source)?;
        self.encoder = Some(encoder);
        Ok(())
    }

    fn copy_to_slot(
        &mut self,
        source: CopySource<'_, wgpu::Texture>,
        slot: Slot,
    ) -> Result<WgpuFence, Error> {
        let mut encoder = self.encoder();
        let resources = self
            .resources
            .as_ref()
            .ok_or(Error::Device("wgpu resources were released".to_string()))?;
        let texture = match source {
            CopySource::Target(texture) => {
                Self::check_copy_source(texture)?;
                texture
            }
            CopySource::Flipped => resources.flip_pass.target(),
        };
        let staging = resources
            .staging
            .get(slot.index())
            .ok_or(Error::Device(format!("no staging buffer for slot {}", slot.index())))?;

        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(resources.padded_bytes_per_row),
                    rows_per_image: None,
                },
            },
            wgpu::Extent3d {
                width: resources.width,
                height: resources.height,
                depth_or_array_layers: 1,
            },
        );
        let submission = self.queue.submit(std::iter::once(encoder.finish()));

        let status = MapStatus::default();
        let callback_status = status.clone();
        staging.map_async(wgpu::MapMode::Read, .., move |result| {
            callback_status.complete(result);
        });
        Ok(WgpuFence::new(self.device.clone(), submission, status))
    }

    fn resolve(&mut self, slot: Slot, dst: &mut [u8]) -> Result<(), Error> {
        let resources = self.resources()?;
        let staging = resources
            .staging
            .get(slot.index())
            .ok_or(Error::Device(format!("no staging buffer for slot {}", slot.index())))?;
        let row = resources.width as usize * BYTES_PER_PIXEL;
        let padded = resources.padded_bytes_per_row as usize;
        {
            let mapped = staging.slice(..).get_mapped_range();
            for (dst_row, src_row) in dst.chunks_exact_mut(row).zip(mapped.chunks(padded)) {
                dst_row.copy_from_slice(&src_row[..row]);
            }
        }
        staging.unmap();
        Ok(())
    }

    fn finish(&mut self) -> Result<(), Error> {
        if let Some(encoder) = self.encoder.take() {
            self.queue.submit(std::iter::once(encoder.finish()));
        }
        self.device.poll(wgpu::PollType::Wait)?;
        Ok(())
    }

    fn release(&mut self) {
        self.encoder = None;
        if let Some(resources) = self.resources.take() {
            for buffer in &resources.staging {
                buffer.destroy();
            }
            resources.flip_pass.destroy();
        }
    }
}
