//! Fullscreen pass recording shared by every fragment kernel, and the
//! scale/bias blit that fills the padded source copy.

use limssr_gpu_shared::uniforms::BlitParams;

use crate::pipeline;

/// How the pass treats the existing contents of its target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TargetLoad {
    Clear,
    /// Keep existing contents; the pipeline blends over them.
    Load,
}

/// Draw the fullscreen triangle into `target` with the given bind groups.
pub fn render_fullscreen_pass(
    encoder: &mut wgpu::CommandEncoder,
    label: &str,
    target: &wgpu::TextureView,
    load: TargetLoad,
    pipeline: &wgpu::RenderPipeline,
    bind_groups: &[&wgpu::BindGroup],
) {
    let load = match load {
        TargetLoad::Clear => wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
        TargetLoad::Load => wgpu::LoadOp::Load,
    };
    let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some(label),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view: target,
            resolve_target: None,
            ops: wgpu::Operations {
                load,
                store: wgpu::StoreOp::Store,
            },
        })],
        depth_stencil_attachment: None,
        ..Default::default()
    });

    pass.set_pipeline(pipeline);
    for (index, group) in bind_groups.iter().enumerate() {
        pass.set_bind_group(index as u32, *group, &[]);
    }
    pass.draw(0..3, 0..1);
}

/// `blit.wgsl` bound to one output format.
pub struct BlitPipeline {
    bgl: wgpu::BindGroupLayout,
    pipeline: wgpu::RenderPipeline,
    params: wgpu::Buffer,
}

impl BlitPipeline {
    pub fn new(
        device: &wgpu::Device,
        vert_module: &wgpu::ShaderModule,
        frag_module: &wgpu::ShaderModule,
        output_format: wgpu::TextureFormat,
    ) -> Self {
        let bgl = pipeline::create_blit_bgl(device);
        let layout = pipeline::create_pipeline_layout(device, "Blit", &[&bgl]);
        let pipeline = pipeline::create_fullscreen_effect_pipeline(
            device,
            "Blit Pipeline",
            vert_module,
            frag_module,
            "blit_scaled",
            &layout,
            output_format,
            None,
        );
        let params = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Blit Params"),
            size: std::mem::size_of::<BlitParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Self { bgl, pipeline, params }
    }

    /// Copies `source` into `target`; target uv maps to source uv as `uv * scale + bias`.
    /// One blit per submission: the parameters live in a single buffer.
    #[allow(clippy::too_many_arguments)]
    pub fn record(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        source: &wgpu::TextureView,
        sampler: &wgpu::Sampler,
        target: &wgpu::TextureView,
        params: BlitParams,
    ) {
        queue.write_buffer(&self.params, 0, bytemuck::bytes_of(&params));
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Blit BG"),
            layout: &self.bgl,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.params.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(source),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        });
        render_fullscreen_pass(encoder, "Blit Pass", target, TargetLoad::Clear, &self.pipeline, &[&bind_group]);
    }
}
