// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Readback through a real wgpu device. Skips quietly on machines without an adapter.
#![cfg(feature = "backend_wgpu")]

use frames_in_flight::{CaptureStrategy, DownloadStream, RowOrder, StreamConfig, WgpuBackend};

const WIDTH: u32 = 3;
const HEIGHT: u32 = 2;

fn device() -> Option<(wgpu::Device, wgpu::Queue)> {
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::from_env_or_default());
    test_executors::spin_on(async move {
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions::default())
            .await
            .ok()?;
        adapter
            .request_device(&wgpu::DeviceDescriptor::default())
            .await
            .ok()
    })
}

fn texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    format: wgpu::TextureFormat,
    texels: &[u8],
) -> wgpu::Texture {
    let size = wgpu::Extent3d {
        width: WIDTH,
        height: HEIGHT,
        depth_or_array_layers: 1,
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("capture source"),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::COPY_SRC
            | wgpu::TextureUsages::COPY_DST
            | wgpu::TextureUsages::TEXTURE_BINDING,
        view_formats: &[],
    });
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        texels,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(WIDTH * 4),
            rows_per_image: None,
        },
        size,
    );
    texture
}

fn texels(seed: u8) -> Vec<u8> {
    (0..WIDTH * HEIGHT * 4)
        .map(|i| seed.wrapping_add((i * 9) as u8))
        .collect()
}

fn capture(
    backend: WgpuBackend,
    strategy: CaptureStrategy,
    source: &wgpu::Texture,
    frames: usize,
) -> Vec<Vec<u8>> {
    let config = StreamConfig::new(WIDTH, HEIGHT, 3)
        .with_strategy(strategy)
        .with_debug_name("wgpu_readback");
    let mut stream: DownloadStream<_, ()> = DownloadStream::new(backend, config).unwrap();
    let mut out = Vec::new();
    for _ in 0..frames {
        stream.download(source, None).unwrap();
        out.extend(
            stream
                .poll(false)
                .unwrap()
                .into_iter()
                .map(|f| f.pixels().to_vec()),
        );
    }
    out.extend(
        stream
            .poll(true)
            .unwrap()
            .into_iter()
            .map(|f| f.pixels().to_vec()),
    );
    stream.close().unwrap();
    out
}

#[test]
fn rgba_targets_round_trip() {
    let Some((device, queue)) = device() else {
        logwise::warn_sync!("no wgpu adapter available, skipping");
        return;
    };
    let expected = texels(1);
    let source = texture(&device, &queue, wgpu::TextureFormat::Rgba8Unorm, &expected);
    for strategy in [CaptureStrategy::GpuFlip, CaptureStrategy::HostFlip] {
        let backend = WgpuBackend::new(device.clone(), queue.clone());
        let frames = capture(backend, strategy, &source, 5);
        assert_eq!(frames.len(), 5);
        for frame in frames {
            assert_eq!(frame, expected, "{strategy:?}");
        }
    }
}

#[test]
fn bottom_up_targets_come_back_flipped() {
    let Some((device, queue)) = device() else {
        logwise::warn_sync!("no wgpu adapter available, skipping");
        return;
    };
    let stored = texels(40);
    let mut expected = stored.clone();
    frames_in_flight::pixel_layout::flip_rows(&mut expected, (WIDTH * 4) as usize);
    let source = texture(&device, &queue, wgpu::TextureFormat::Rgba8Unorm, &stored);
    for strategy in [CaptureStrategy::GpuFlip, CaptureStrategy::HostFlip] {
        let backend =
            WgpuBackend::new(device.clone(), queue.clone()).with_row_order(RowOrder::BottomUp);
        let frames = capture(backend, strategy, &source, 2);
        for frame in frames {
            assert_eq!(frame, expected, "{strategy:?}");
        }
    }
}

#[test]
fn bgra_targets_are_swizzled_by_the_flip_pass() {
    let Some((device, queue)) = device() else {
        logwise::warn_sync!("no wgpu adapter available, skipping");
        return;
    };
    let bgra = texels(90);
    let expected: Vec<u8> = bgra
        .chunks_exact(4)
        .flat_map(|p| [p[2], p[1], p[0], p[3]])
        .collect();
    let source = texture(&device, &queue, wgpu::TextureFormat::Bgra8Unorm, &bgra);
    let backend = WgpuBackend::new(device.clone(), queue.clone());
    let frames = capture(backend, CaptureStrategy::GpuFlip, &source, 1);
    assert_eq!(frames, vec![expected]);

    let backend = WgpuBackend::new(device, queue);
    let config = StreamConfig::new(WIDTH, HEIGHT, 3).with_strategy(CaptureStrategy::HostFlip);
    let mut stream: DownloadStream<_, ()> = DownloadStream::new(backend, config).unwrap();
    assert!(matches!(
        stream.download(&source, None),
        Err(frames_in_flight::Error::UnsupportedTarget(_))
    ));
}
