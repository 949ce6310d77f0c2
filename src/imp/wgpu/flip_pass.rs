// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Full-screen blit that rewrites a render target as top-down RGBA8.

use crate::Error;
use crate::pixel_layout::RowOrder;
use std::collections::HashMap;
use wgpu::TextureFormat;

/// Source formats the pass can read with `textureLoad` on a `texture_2d<f32>`.
const READABLE_FORMATS: [TextureFormat; 6] = [
    TextureFormat::Rgba8Unorm,
    TextureFormat::Rgba8UnormSrgb,
    TextureFormat::Bgra8Unorm,
    TextureFormat::Bgra8UnormSrgb,
    TextureFormat::Rgba16Float,
    TextureFormat::Rgb10a2Unorm,
];

fn shader_source(row_order: RowOrder) -> String {
    let source_row = match row_order {
        RowOrder::TopDown => "y",
        RowOrder::BottomUp => "size.y - 1u - y",
    };
    format!(
        r#"
@group(0) @binding(0) var source: texture_2d<f32>;

@vertex
fn vs_main(@builtin(vertex_index) vertex_index: u32) -> @builtin(position) vec4<f32> {{
    var positions = array<vec2<f32>, 3>(
        vec2<f32>(-1.0, -1.0),
        vec2<f32>( 3.0, -1.0),
        vec2<f32>(-1.0,  3.0)
    );
    return vec4<f32>(positions[vertex_index], 0.0, 1.0);
}}

@fragment
fn fs_main(@builtin(position) position: vec4<f32>) -> @location(0) vec4<f32> {{
    let size = textureDimensions(source);
    let x = u32(position.x);
    let y = u32(position.y);
    return textureLoad(source, vec2<u32>(x, {source_row}), 0);
}}
"#
    )
}

#[derive(Debug)]
pub(super) struct FlipPass {
    shader: wgpu::ShaderModule,
    //keyed by the view format we render through
    pipelines: HashMap<TextureFormat, wgpu::RenderPipeline>,
    target: wgpu::Texture,
}

impl FlipPass {
    pub(super) fn new(
        device: &wgpu::Device,
        width: u32,
        height: u32,
        row_order: RowOrder,
        debug_name: &str,
    ) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("flip pass"),
            source: wgpu::ShaderSource::Wgsl(shader_source(row_order).into()),
        });
        let target = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&format!("{debug_name}_flipped")),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[TextureFormat::Rgba8UnormSrgb],
        });
        FlipPass {
            shader,
            pipelines: HashMap::new(),
            target,
        }
    }

    pub(super) fn target(&self) -> &wgpu::Texture {
        &self.target
    }

    pub(super) fn check_source(source: &wgpu::Texture) -> Result<(), Error> {
        if !READABLE_FORMATS.contains(&source.format()) {
            return Err(Error::UnsupportedTarget(format!(
                "flip pass cannot read {:?}",
                source.format()
            )));
        }
        if source.sample_count() != 1 {
            return Err(Error::UnsupportedTarget(
                "multisampled targets must be resolved before capture".to_string(),
            ));
        }
        if !source
            .usage()
            .contains(wgpu::TextureUsages::TEXTURE_BINDING)
        {
            return Err(Error::UnsupportedTarget(
                "flip pass source needs TEXTURE_BINDING usage".to_string(),
            ));
        }
        Ok(())
    }

    fn pipeline(&mut self, device: &wgpu::Device, format: TextureFormat) -> &wgpu::RenderPipeline {
        let shader = &self.shader;
        self.pipelines.entry(format).or_insert_with(|| {
            logwise::info_sync!(
                "building flip pipeline for {format}",
                format = logwise::privacy::LogIt(&format)
            );
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("flip pass"),
                layout: None,
                vertex: wgpu::VertexState {
                    module: shader,
                    entry_point: Some("vs_main"),
                    compilation_options: Default::default(),
                    buffers: &[],
                },
                //no blending, depth or culling; wgpu pipelines carry their own state
                primitive: wgpu::PrimitiveState {
                    cull_mode: None,
                    ..Default::default()
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                fragment: Some(wgpu::FragmentState {
                    module: shader,
                    entry_point: Some("fs_main"),
                    compilation_options: Default::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                multiview: None,
                cache: None,
            })
        })
    }

    /// Records the pass into `encoder`.
    pub(super) fn encode(
        &mut self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        source: &wgpu::Texture,
    ) -> Result<(), Error> {
        Self::check_source(source)?;
        //render through a view whose sRGB-ness matches the source so bytes survive unchanged
        let view_format = if source.format().is_srgb() {
            TextureFormat::Rgba8UnormSrgb
        } else {
            TextureFormat::Rgba8Unorm
        };
        let target_view = self.target.create_view(&wgpu::TextureViewDescriptor {
            label: Some("flip pass target"),
            format: Some(view_format),
            ..Default::default()
        });
        let source_view = source.create_view(&wgpu::TextureViewDescriptor::default());
        let pipeline = self.pipeline(device, view_format);
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("flip pass source"),
            layout: &pipeline.get_bind_group_layout(0),
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&source_view),
            }],
        });

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("flip pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &target_view,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.draw(0..3, 0..1);
        drop(pass);
        Ok(())
    }

    pub(super) fn destroy(&self) {
        self.target.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shader_reads_mirrored_row_for_bottom_up_targets() {
        assert!(shader_source(RowOrder::BottomUp).contains("size.y - 1u - y"));
        assert!(shader_source(RowOrder::TopDown).contains("vec2<u32>(x, y)"));
    }
}
