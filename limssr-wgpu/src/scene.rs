//! Synthetic G-buffer and color readback for hosts without a renderer of their
//! own: the headless demo and the on-device tests.

use crate::backend::RenderTarget;
use crate::error::{Result, SsrError};
use crate::frame::CameraDescriptor;
use crate::render_targets::{CameraTextures, DEPTH_FORMAT, NORMALS_FORMAT};

const DEMO_SCENE_SHADER: &str = include_str!("../shaders/demo_scene.wgsl");

/// Fills the camera color, normals and depth with a floor (smoothness 0.9)
/// and a back wall (smoothness 0.1). Expects an identity view matrix.
pub fn draw_demo_scene(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    camera: &CameraDescriptor,
    textures: &CameraTextures,
) -> Result<()> {
    let module = crate::pipeline::validated(device, "limssr/demo_scene.wgsl", || {
        device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Demo Scene"),
            source: wgpu::ShaderSource::Wgsl(DEMO_SCENE_SHADER.into()),
        })
    })?;

    let matrices = [camera.projection.inverse().to_cols_array_2d(), camera.projection.to_cols_array_2d()];
    let uniforms = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Demo Scene Uniforms"),
        size: std::mem::size_of_val(&matrices) as u64,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    queue.write_buffer(&uniforms, 0, bytemuck::cast_slice(&matrices));

    let bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Demo Scene BGL"),
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }],
    });
    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Demo Scene BG"),
        layout: &bgl,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: uniforms.as_entire_binding(),
        }],
    });
    let layout = crate::pipeline::create_pipeline_layout(device, "Demo Scene", &[&bgl]);
    let pipeline = crate::pipeline::validated(device, "limssr/demo_scene.wgsl", || {
        device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Demo Scene"),
            layout: Some(&layout),
            vertex: wgpu::VertexState {
                module: &module,
                entry_point: Some("vs_main"),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                buffers: &[],
            },
            fragment: Some(wgpu::FragmentState {
                module: &module,
                entry_point: Some("fs_main"),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                targets: &[Some(camera.format.into()), Some(NORMALS_FORMAT.into())],
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Always,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        })
    })?;

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("Demo Scene"),
    });
    {
        let clear = wgpu::Operations {
            load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
            store: wgpu::StoreOp::Store,
        };
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Demo GBuffer"),
            color_attachments: &[
                Some(wgpu::RenderPassColorAttachment {
                    view: &textures.color.color_view,
                    resolve_target: None,
                    ops: clear,
                }),
                Some(wgpu::RenderPassColorAttachment {
                    view: &textures.normals.color_view,
                    resolve_target: None,
                    ops: clear,
                }),
            ],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &textures.depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            ..Default::default()
        });
        pass.set_pipeline(&pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.draw(0..3, 0..1);
    }
    queue.submit([encoder.finish()]);
    Ok(())
}

/// Copies a color target back to the CPU as tightly packed rows.
pub fn read_back(device: &wgpu::Device, queue: &wgpu::Queue, target: &RenderTarget) -> Result<Vec<u8>> {
    let readback_error = |reason: String| SsrError::Allocation {
        label: "Readback".into(),
        reason,
    };
    let format = target.color_texture.format();
    let texel = format
        .block_copy_size(None)
        .ok_or_else(|| readback_error(format!("{format:?} cannot be copied")))?;
    let unpadded = target.width * texel;
    let padded = unpadded.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT) * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

    let buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Readback"),
        size: padded as u64 * target.height as u64,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });
    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("Readback"),
    });
    encoder.copy_texture_to_buffer(
        wgpu::ImageCopyTexture {
            texture: &target.color_texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::ImageCopyBuffer {
            buffer: &buffer,
            layout: wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(padded),
                rows_per_image: Some(target.height),
            },
        },
        wgpu::Extent3d {
            width: target.width,
            height: target.height,
            depth_or_array_layers: 1,
        },
    );
    queue.submit([encoder.finish()]);

    let (tx, rx) = std::sync::mpsc::channel();
    buffer.slice(..).map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    let _ = device.poll(wgpu::Maintain::Wait);
    rx.recv()
        .map_err(|err| readback_error(err.to_string()))?
        .map_err(|err| readback_error(err.to_string()))?;

    let mapped = buffer.slice(..).get_mapped_range();
    let pixels: Vec<u8> = mapped
        .chunks(padded as usize)
        .flat_map(|row| row[..unpadded as usize].iter().copied())
        .collect();
    drop(mapped);
    buffer.unmap();
    Ok(pixels)
}
