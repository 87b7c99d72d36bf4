//! Hi-Z depth pyramid stage.
//!
//! Seeds slice 0 from the camera depth buffer, then reduces slice `i` into
//! slice `i + 1` ten times. The whole chain is recorded into the frame's async
//! compute encoder as one ordered compute pass. The result is published on the
//! [`FrameContext`] for the tracer.

use std::collections::HashMap;
use std::sync::Arc;

use bytemuck::Zeroable;
use limssr_gpu_shared::kernels::PyramidKernel;
use limssr_gpu_shared::uniforms::{
    PyramidDebugParams, PyramidParams, PYRAMID_PARAMS_BINDING_SIZE, PYRAMID_SLICES, UNIFORM_OFFSET_ALIGNMENT,
};

use crate::config::{PaddingPolicy, PyramidDebug, PyramidSettings, SsrConfig};
use crate::error::{Result, SsrError};
use crate::frame::{FrameContext, FrameStage, GpuFrame, PublishedPyramid};
use crate::passes::blit::{render_fullscreen_pass, TargetLoad};
use crate::passes::{Dispatch, Kernel};
use crate::pipeline;
use crate::render_targets::{self, DepthPyramidTexture};
use crate::resolution::{ResolutionScale, SliceChain, WorkingResolution};
use crate::shader_library::{ShaderLibrary, DEPTH_PYRAMID_SHADER, FULLSCREEN_QUAD_SHADER};

/// Feature name other stages check for before relying on the pyramid.
pub const DEPTH_PYRAMID_FEATURE: &str = "depth_pyramid";

/// Everything the pyramid does in one frame, without touching the GPU.
#[derive(Clone, Debug, PartialEq)]
pub struct PyramidPlan {
    pub working: WorkingResolution,
    pub slices: SliceChain,
    /// Block 0 seeds slice 0; block `i + 1` reduces slice `i` into `i + 1`.
    pub params: [PyramidParams; PYRAMID_SLICES],
    pub debug: Option<PyramidDebugParams>,
    pub dispatches: Vec<Dispatch>,
}

impl PyramidPlan {
    pub fn new(camera: [u32; 2], scale: &ResolutionScale, padding: PaddingPolicy, debug: Option<&PyramidDebug>) -> Self {
        let working = WorkingResolution::hiz(camera, scale, padding);
        let slices = working.slices();
        let mut params = [PyramidParams::zeroed(); PYRAMID_SLICES];
        let mut dispatches = Vec::with_capacity(PYRAMID_SLICES + 1);

        let seed = slices.slice(0).actual;
        params[0] = PyramidParams {
            sx: camera[0],
            sy: camera[1],
            dx: seed[0],
            dy: seed[1],
            s_slice: 0,
            d_slice: 0,
            depth_scale: [camera[0] as f32 / seed[0] as f32, camera[1] as f32 / seed[1] as f32],
            ..PyramidParams::zeroed()
        };
        dispatches.push(Dispatch::compute(Kernel::Pyramid(PyramidKernel::Seed), seed));

        for dst in 1..PYRAMID_SLICES {
            let source = slices.slice(dst - 1).actual;
            let dest = slices.slice(dst).actual;
            params[dst] = PyramidParams {
                sx: source[0],
                sy: source[1],
                dx: dest[0],
                dy: dest[1],
                s_slice: (dst - 1) as u32,
                d_slice: dst as u32,
                ..PyramidParams::zeroed()
            };
            dispatches.push(Dispatch::compute(Kernel::Pyramid(PyramidKernel::Reduce), dest));
        }

        let debug = debug.map(|d| {
            let d = d.clamped();
            dispatches.push(Dispatch::fullscreen(Kernel::Pyramid(d.view.kernel()), camera));
            PyramidDebugParams {
                slice: d.slice as u32,
                actual: slices.slice(d.slice).actual,
                range: d.range,
                ..PyramidDebugParams::zeroed()
            }
        });

        Self {
            working,
            slices,
            params,
            debug,
            dispatches,
        }
    }

    /// Dynamic uniform offset of a params block.
    pub fn params_offset(block: usize) -> u32 {
        (block as u64 * UNIFORM_OFFSET_ALIGNMENT) as u32
    }
}

struct PyramidPipelines {
    seed_bgl: wgpu::BindGroupLayout,
    reduce_bgl: wgpu::BindGroupLayout,
    debug_bgl: wgpu::BindGroupLayout,
    seed: wgpu::ComputePipeline,
    reduce: wgpu::ComputePipeline,
    vert: wgpu::ShaderModule,
    module: wgpu::ShaderModule,
    debug_layout: wgpu::PipelineLayout,
    debug: HashMap<(PyramidKernel, wgpu::TextureFormat), wgpu::RenderPipeline>,
}

impl PyramidPipelines {
    fn new(device: &wgpu::Device, library: &ShaderLibrary) -> Result<Self> {
        let module = pipeline::compile_shader(device, library, DEPTH_PYRAMID_SHADER)?;
        let vert = pipeline::compile_shader(device, library, FULLSCREEN_QUAD_SHADER)?;

        let (seed_bgl, reduce_bgl, debug_bgl, seed, reduce, debug_layout) =
            pipeline::validated(device, DEPTH_PYRAMID_SHADER, || {
                let seed_bgl = pipeline::create_pyramid_seed_bgl(device);
                let reduce_bgl = pipeline::create_pyramid_reduce_bgl(device);
                let debug_bgl = pipeline::create_pyramid_debug_bgl(device);

                let seed = pipeline::create_compute_pipeline(
                    device,
                    "Pyramid Seed",
                    &module,
                    PyramidKernel::Seed.entry_point(),
                    &seed_bgl,
                );
                let reduce = pipeline::create_compute_pipeline(
                    device,
                    "Pyramid Reduce",
                    &module,
                    PyramidKernel::Reduce.entry_point(),
                    &reduce_bgl,
                );
                let debug_layout = pipeline::create_pipeline_layout(device, "Pyramid Debug", &[&debug_bgl]);
                (seed_bgl, reduce_bgl, debug_bgl, seed, reduce, debug_layout)
            })?;
        log::info!("depth pyramid pipelines ready");

        Ok(Self {
            seed_bgl,
            reduce_bgl,
            debug_bgl,
            seed,
            reduce,
            vert,
            module,
            debug_layout,
            debug: HashMap::new(),
        })
    }

    fn ensure_debug(&mut self, device: &wgpu::Device, kernel: PyramidKernel, format: wgpu::TextureFormat) -> Result<()> {
        if self.debug.contains_key(&(kernel, format)) {
            return Ok(());
        }
        let debug = pipeline::validated(device, DEPTH_PYRAMID_SHADER, || {
            pipeline::create_fullscreen_effect_pipeline(
                device,
                "Pyramid Debug",
                &self.vert,
                &self.module,
                kernel.entry_point(),
                &self.debug_layout,
                format,
                None,
            )
        })?;
        self.debug.insert((kernel, format), debug);
        Ok(())
    }
}

struct PyramidFrame {
    plan: PyramidPlan,
    texture: DepthPyramidTexture,
}

/// The depth pyramid stage.
pub struct DepthPyramid {
    config: SsrConfig,
    settings: PyramidSettings,
    enabled: bool,
    library: Arc<ShaderLibrary>,
    pipelines: Option<PyramidPipelines>,
    slice_buffer: Option<Arc<wgpu::Buffer>>,
    params_buffer: Option<wgpu::Buffer>,
    debug_buffer: Option<wgpu::Buffer>,
    frame: Option<PyramidFrame>,
}

impl DepthPyramid {
    pub fn new(config: SsrConfig, library: Arc<ShaderLibrary>) -> Self {
        Self {
            config,
            settings: PyramidSettings::default(),
            enabled: true,
            library,
            pipelines: None,
            slice_buffer: None,
            params_buffer: None,
            debug_buffer: None,
            frame: None,
        }
    }

    pub fn settings(&self) -> PyramidSettings {
        self.settings
    }

    /// Changing settings reallocates the slice resolution buffer on the next frame.
    pub fn set_settings(&mut self, settings: PyramidSettings) {
        let settings = settings.clamped();
        if settings != self.settings {
            self.slice_buffer = None;
        }
        self.settings = settings;
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Drops every GPU resource; the next frame resolves and allocates again.
    pub fn teardown(&mut self) {
        self.pipelines = None;
        self.slice_buffer = None;
        self.params_buffer = None;
        self.debug_buffer = None;
        self.frame = None;
    }

    pub fn plan(&self, ctx: &FrameContext) -> PyramidPlan {
        PyramidPlan::new(
            ctx.camera.extent(),
            &ctx.scale(),
            self.config.padding,
            self.settings.debug.as_ref(),
        )
    }
}

impl FrameStage for DepthPyramid {
    fn name(&self) -> &'static str {
        DEPTH_PYRAMID_FEATURE
    }

    /// Runs when a consumer asked for the pyramid this frame, or when a debug view is on.
    fn enqueue(&mut self, ctx: &mut FrameContext) -> bool {
        self.enabled
            && ctx.camera.post_processing_enabled
            && (ctx.is_requested(DEPTH_PYRAMID_FEATURE) || self.settings.debug.is_some())
    }

    fn configure(&mut self, gpu: &mut GpuFrame<'_>, ctx: &mut FrameContext) -> Result<()> {
        if self.pipelines.is_none() {
            self.pipelines = Some(PyramidPipelines::new(gpu.device, &self.library)?);
        }
        let plan = self.plan(ctx);
        let texture = render_targets::create_depth_pyramid(gpu.device, plan.working.padded)?;

        let slice_buffer = self
            .slice_buffer
            .get_or_insert_with(|| Arc::new(render_targets::create_slice_resolution_buffer(gpu.device)));
        gpu.queue
            .write_buffer(slice_buffer, 0, bytemuck::cast_slice(&plan.slices.padded_resolutions()[..]));

        let params_buffer = self
            .params_buffer
            .get_or_insert_with(|| render_targets::create_pyramid_params_buffer(gpu.device));
        gpu.queue.write_buffer(params_buffer, 0, bytemuck::cast_slice(&plan.params[..]));

        if let (Some(debug), Some(view)) = (plan.debug, self.settings.debug.map(|d| d.view)) {
            let debug_buffer = self.debug_buffer.get_or_insert_with(|| {
                gpu.device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("Pyramid Debug Params"),
                    size: std::mem::size_of::<PyramidDebugParams>() as u64,
                    usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                })
            });
            gpu.queue.write_buffer(debug_buffer, 0, bytemuck::bytes_of(&debug));
            if let Some(pipelines) = self.pipelines.as_mut() {
                pipelines.ensure_debug(gpu.device, view.kernel(), ctx.camera.format)?;
            }
        }

        log::debug!(
            "depth pyramid: camera {:?} -> slice 0 {:?} (actual {:?})",
            plan.working.camera,
            plan.working.padded,
            plan.working.actual
        );
        self.frame = Some(PyramidFrame { plan, texture });
        Ok(())
    }

    fn execute(&mut self, gpu: &mut GpuFrame<'_>, ctx: &mut FrameContext) -> Result<()> {
        let (Some(pipelines), Some(frame), Some(params_buffer), Some(slice_buffer)) = (
            self.pipelines.as_ref(),
            self.frame.as_ref(),
            self.params_buffer.as_ref(),
            self.slice_buffer.as_ref(),
        ) else {
            return Err(SsrError::MissingFeature("depth pyramid was not configured".into()));
        };

        let params_binding = wgpu::BindingResource::Buffer(wgpu::BufferBinding {
            buffer: params_buffer,
            offset: 0,
            size: wgpu::BufferSize::new(PYRAMID_PARAMS_BINDING_SIZE),
        });

        {
            let mut pass = gpu.async_compute.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Depth Pyramid"),
                timestamp_writes: None,
            });

            let compute = frame.plan.dispatches.iter().filter_map(|d| Some((d.kernel, d.workgroups?)));
            for (block, (kernel, [wx, wy])) in compute.enumerate() {
                let params = &frame.plan.params[block];
                let dest = &frame.texture.slice_views[params.d_slice as usize];
                let (label, compute_pipeline, bgl, input) = match kernel {
                    Kernel::Pyramid(PyramidKernel::Seed) => {
                        ("Pyramid Seed BG", &pipelines.seed, &pipelines.seed_bgl, (1, gpu.targets.depth_view))
                    }
                    _ => (
                        "Pyramid Reduce BG",
                        &pipelines.reduce,
                        &pipelines.reduce_bgl,
                        (2, &frame.texture.slice_views[params.s_slice as usize]),
                    ),
                };
                let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some(label),
                    layout: bgl,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: params_binding.clone(),
                        },
                        wgpu::BindGroupEntry {
                            binding: input.0,
                            resource: wgpu::BindingResource::TextureView(input.1),
                        },
                        wgpu::BindGroupEntry {
                            binding: 3,
                            resource: wgpu::BindingResource::TextureView(dest),
                        },
                    ],
                });
                pass.set_pipeline(compute_pipeline);
                pass.set_bind_group(0, &bind_group, &[PyramidPlan::params_offset(block)]);
                pass.dispatch_workgroups(wx, wy, 1);
            }
        }

        ctx.publish_pyramid(PublishedPyramid {
            working: frame.plan.working,
            slices: frame.plan.slices,
            array_view: frame.texture.array_view.clone(),
            slice_buffer: slice_buffer.clone(),
        });

        let debug_kernel = frame.plan.dispatches.iter().find_map(|d| match d.kernel {
            Kernel::Pyramid(k) if k.is_debug() => Some(k),
            _ => None,
        });
        if let (Some(kernel), Some(debug_buffer)) = (debug_kernel, self.debug_buffer.as_ref()) {
            if let Some(debug_pipeline) = pipelines.debug.get(&(kernel, ctx.camera.format)) {
                let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("Pyramid Debug BG"),
                    layout: &pipelines.debug_bgl,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 4,
                            resource: debug_buffer.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 5,
                            resource: wgpu::BindingResource::TextureView(frame.texture.array_view.as_ref()),
                        },
                        wgpu::BindGroupEntry {
                            binding: 6,
                            resource: slice_buffer.as_entire_binding(),
                        },
                    ],
                });
                render_fullscreen_pass(
                    &mut gpu.graphics,
                    "Pyramid Debug",
                    gpu.targets.color_view,
                    TargetLoad::Load,
                    debug_pipeline,
                    &[&bind_group],
                );
            }
        }
        Ok(())
    }

    fn cleanup(&mut self, _ctx: &mut FrameContext) {
        self.frame = None;
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}
