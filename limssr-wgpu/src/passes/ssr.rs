//! SSR trace/compose stage.
//!
//! Per frame: publish the resolution scale, pick the working resolution for
//! the active tracing mode, trace into a frame-scoped reflection target, then
//! blend the reflection over the camera color.

use std::collections::HashMap;
use std::sync::Arc;

use bytemuck::Zeroable;
use limssr_gpu_shared::kernels::SsrKernel;
use limssr_gpu_shared::uniforms::{BlitParams, SSRParams};

use crate::backend::RenderTarget;
use crate::config::{PaddingPolicy, SsrConfig};
use crate::error::{Result, SsrError};
use crate::frame::{CameraDescriptor, CameraTargets, FrameContext, FrameStage, GpuFrame};
use crate::passes::blit::{render_fullscreen_pass, BlitPipeline, TargetLoad};
use crate::passes::depth_pyramid::DEPTH_PYRAMID_FEATURE;
use crate::passes::{Dispatch, Kernel};
use crate::pipeline;
use crate::render_targets::{self, HDR_FORMAT};
use crate::resolution::{ResolutionScale, WorkingResolution};
use crate::settings::{Settings, TraceMode, TracingMode};
use crate::shader_library::{ShaderLibrary, BLIT_SHADER, FULLSCREEN_QUAD_SHADER, SSR_SHADER};

pub const SSR_FEATURE: &str = "screen_space_reflections";

/// One frame of SSR work, without touching the GPU.
#[derive(Clone, Debug, PartialEq)]
pub struct SsrPlan {
    pub mode: TraceMode,
    pub working: WorkingResolution,
    /// Size of the reflection target the trace kernel renders into.
    pub reflection_extent: [u32; 2],
    /// Size of the padded source copy, when the trace cannot read the camera color directly.
    pub source_copy: Option<[u32; 2]>,
    pub dispatches: Vec<Dispatch>,
}

impl SsrPlan {
    pub fn new(camera: [u32; 2], mode: TraceMode, scale: &ResolutionScale, padding: PaddingPolicy) -> Self {
        let working = match mode {
            TraceMode::Linear { downsample, .. } => WorkingResolution::linear(camera, downsample),
            TraceMode::HiZ { .. } => WorkingResolution::hiz(camera, scale, padding),
        };
        let source_copy = match mode {
            TraceMode::HiZ { .. } if working.is_padded() => Some(working.padded),
            _ => None,
        };
        let trace = match mode {
            TraceMode::Linear { .. } => SsrKernel::TraceLinear,
            TraceMode::HiZ { .. } => SsrKernel::TraceHiZ,
        };

        let mut dispatches = Vec::with_capacity(3);
        if let Some(extent) = source_copy {
            dispatches.push(Dispatch::fullscreen(Kernel::Blit, extent));
        }
        dispatches.push(Dispatch::fullscreen(Kernel::Ssr(trace), working.padded));
        dispatches.push(Dispatch::fullscreen(Kernel::Ssr(SsrKernel::Compose), camera));

        Self {
            mode,
            working,
            reflection_extent: working.padded,
            source_copy,
            dispatches,
        }
    }

    /// Shader parameters for this plan.
    pub fn params(&self, camera: &CameraDescriptor, settings: &Settings, frame_index: u32) -> SSRParams {
        let reflect_sky = matches!(self.mode, TraceMode::HiZ { reflect_sky: true, .. });
        SSRParams {
            inverse_projection: camera.projection.inverse().to_cols_array_2d(),
            projection: camera.projection.to_cols_array_2d(),
            inverse_view: camera.view.inverse().to_cols_array_2d(),
            view: camera.view.to_cols_array_2d(),
            world_space_view_dir: camera.world_view_dir().to_array(),
            screen_resolution: self.working.actual.map(|e| e as f32),
            padded_resolution: self.working.padded.map(|e| e as f32),
            padded_scale: self.working.padded_scale,
            stride: settings.step_stride,
            num_steps: self.mode.max_steps(),
            min_smoothness: settings.min_smoothness,
            render_scale: camera.render_scale,
            reflect_sky: reflect_sky as i32,
            frame: (frame_index & i32::MAX as u32) as i32,
            dither_mode: settings.dither_mode.shader_value(),
            ..SSRParams::zeroed()
        }
    }
}

struct SsrMaterial {
    trace_bgl: wgpu::BindGroupLayout,
    pyramid_bgl: wgpu::BindGroupLayout,
    compose_bgl: wgpu::BindGroupLayout,
    reflection_bgl: wgpu::BindGroupLayout,
    trace_linear: wgpu::RenderPipeline,
    trace_hiz: wgpu::RenderPipeline,
    compose_layout: wgpu::PipelineLayout,
    compose: HashMap<wgpu::TextureFormat, wgpu::RenderPipeline>,
    vert: wgpu::ShaderModule,
    module: wgpu::ShaderModule,
    blit: BlitPipeline,
    params: wgpu::Buffer,
    sampler: wgpu::Sampler,
}

impl SsrMaterial {
    fn new(device: &wgpu::Device, library: &ShaderLibrary) -> Result<Self> {
        let module = pipeline::compile_shader(device, library, SSR_SHADER)?;
        let vert = pipeline::compile_shader(device, library, FULLSCREEN_QUAD_SHADER)?;
        let blit_module = pipeline::compile_shader(device, library, BLIT_SHADER)?;

        let (trace_bgl, pyramid_bgl, compose_bgl, reflection_bgl, trace_linear, trace_hiz, compose_layout, blit) =
            pipeline::validated(device, SSR_SHADER, || {
                let trace_bgl = pipeline::create_ssr_trace_bgl(device);
                let pyramid_bgl = pipeline::create_ssr_pyramid_bgl(device);
                let compose_bgl = pipeline::create_ssr_compose_bgl(device);
                let reflection_bgl = pipeline::create_ssr_reflection_bgl(device);

                let linear_layout = pipeline::create_pipeline_layout(device, "SSR Trace Linear", &[&trace_bgl]);
                let hiz_layout =
                    pipeline::create_pipeline_layout(device, "SSR Trace HiZ", &[&trace_bgl, &pyramid_bgl]);
                let compose_layout =
                    pipeline::create_pipeline_layout(device, "SSR Compose", &[&compose_bgl, &reflection_bgl]);

                let trace_linear = pipeline::create_fullscreen_effect_pipeline(
                    device,
                    "SSR Trace Linear",
                    &vert,
                    &module,
                    SsrKernel::TraceLinear.entry_point(),
                    &linear_layout,
                    HDR_FORMAT,
                    None,
                );
                let trace_hiz = pipeline::create_fullscreen_effect_pipeline(
                    device,
                    "SSR Trace HiZ",
                    &vert,
                    &module,
                    SsrKernel::TraceHiZ.entry_point(),
                    &hiz_layout,
                    HDR_FORMAT,
                    None,
                );
                let blit = BlitPipeline::new(device, &vert, &blit_module, HDR_FORMAT);
                (
                    trace_bgl,
                    pyramid_bgl,
                    compose_bgl,
                    reflection_bgl,
                    trace_linear,
                    trace_hiz,
                    compose_layout,
                    blit,
                )
            })?;

        let params = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("SSR Params"),
            size: std::mem::size_of::<SSRParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        log::info!("SSR material ready");

        Ok(Self {
            trace_bgl,
            pyramid_bgl,
            compose_bgl,
            reflection_bgl,
            trace_linear,
            trace_hiz,
            compose_layout,
            compose: HashMap::new(),
            vert,
            module,
            blit,
            params,
            sampler: pipeline::create_linear_clamp_sampler(device),
        })
    }

    fn ensure_compose(&mut self, device: &wgpu::Device, format: wgpu::TextureFormat) -> Result<()> {
        if self.compose.contains_key(&format) {
            return Ok(());
        }
        log::info!("creating SSR compose pipeline for {format:?}");
        let compose = pipeline::validated(device, SSR_SHADER, || {
            pipeline::create_fullscreen_effect_pipeline(
                device,
                "SSR Compose",
                &self.vert,
                &self.module,
                SsrKernel::Compose.entry_point(),
                &self.compose_layout,
                format,
                Some(wgpu::BlendState::ALPHA_BLENDING),
            )
        })?;
        self.compose.insert(format, compose);
        Ok(())
    }

    fn trace_bind_group(
        &self,
        device: &wgpu::Device,
        targets: &CameraTargets<'_>,
        source: &wgpu::TextureView,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("SSR Trace BG"),
            layout: &self.trace_bgl,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.params.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(targets.depth_view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(targets.normals_view),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(source),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        })
    }
}

struct SsrFrame {
    plan: SsrPlan,
    reflection: RenderTarget,
    padded_source: Option<RenderTarget>,
}

/// The SSR trace/compose stage.
pub struct ScreenSpaceReflections {
    config: SsrConfig,
    settings: Settings,
    enabled: bool,
    library: Arc<ShaderLibrary>,
    material: Option<SsrMaterial>,
    frame_index: u32,
    frame: Option<SsrFrame>,
    executed: bool,
}

impl ScreenSpaceReflections {
    pub fn new(config: SsrConfig, settings: Settings, library: Arc<ShaderLibrary>) -> Self {
        Self {
            config,
            settings: settings.clamped(&config.bounds),
            enabled: true,
            library,
            material: None,
            frame_index: 0,
            frame: None,
            executed: false,
        }
    }

    pub fn settings(&self) -> Settings {
        self.settings
    }

    /// Clamps every field before committing.
    pub fn set_settings(&mut self, settings: Settings) {
        self.settings = settings.clamped(&self.config.bounds);
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Number of frames this stage has executed.
    pub fn frame_index(&self) -> u32 {
        self.frame_index
    }

    pub fn plan(&self, ctx: &FrameContext) -> SsrPlan {
        SsrPlan::new(
            ctx.camera.extent(),
            self.settings.trace_mode(),
            &ctx.scale(),
            self.config.padding,
        )
    }

    /// Collaborators the active tracing mode needs.
    pub fn check_prerequisites(&self, ctx: &FrameContext) -> Result<()> {
        if self.settings.tracing_mode == TracingMode::HiZ && !ctx.has_feature(DEPTH_PYRAMID_FEATURE) {
            return Err(SsrError::MissingFeature(format!(
                "Hi-Z tracing needs the {DEPTH_PYRAMID_FEATURE} feature"
            )));
        }
        Ok(())
    }
}

impl FrameStage for ScreenSpaceReflections {
    fn name(&self) -> &'static str {
        SSR_FEATURE
    }

    fn enqueue(&mut self, ctx: &mut FrameContext) -> bool {
        if !self.enabled || !ctx.camera.post_processing_enabled {
            return false;
        }
        ctx.set_scale(self.settings.resolution_scale());
        if self.settings.tracing_mode == TracingMode::HiZ {
            ctx.request_feature(DEPTH_PYRAMID_FEATURE);
        }
        true
    }

    fn configure(&mut self, gpu: &mut GpuFrame<'_>, ctx: &mut FrameContext) -> Result<()> {
        self.check_prerequisites(ctx)?;
        if self.material.is_none() {
            self.material = Some(SsrMaterial::new(gpu.device, &self.library)?);
        }
        let plan = self.plan(ctx);
        let reflection = render_targets::create_reflection_target(gpu.device, plan.reflection_extent)?;
        let padded_source = plan
            .source_copy
            .map(|extent| render_targets::create_padded_source(gpu.device, extent))
            .transpose()?;

        let params = plan.params(&ctx.camera, &self.settings, self.frame_index);
        if let Some(material) = self.material.as_mut() {
            material.ensure_compose(gpu.device, ctx.camera.format)?;
            gpu.queue.write_buffer(&material.params, 0, bytemuck::bytes_of(&params));
        }

        log::debug!(
            "ssr: {:?} camera {:?} -> trace {:?} (actual {:?})",
            plan.mode.tracing_mode(),
            plan.working.camera,
            plan.working.padded,
            plan.working.actual
        );
        self.frame = Some(SsrFrame {
            plan,
            reflection,
            padded_source,
        });
        Ok(())
    }

    fn execute(&mut self, gpu: &mut GpuFrame<'_>, ctx: &mut FrameContext) -> Result<()> {
        let (Some(material), Some(frame)) = (self.material.as_ref(), self.frame.as_ref()) else {
            return Err(SsrError::MissingFeature("SSR was not configured".into()));
        };
        let compose = material
            .compose
            .get(&ctx.camera.format)
            .ok_or_else(|| SsrError::MissingFeature(format!("no compose pipeline for {:?}", ctx.camera.format)))?;

        let pyramid_group = match frame.plan.mode {
            TraceMode::HiZ { .. } => {
                let pyramid = ctx
                    .pyramid()
                    .ok_or_else(|| SsrError::MissingFeature("depth pyramid was not published this frame".into()))?;
                if pyramid.working != frame.plan.working {
                    return Err(SsrError::MissingFeature(format!(
                        "depth pyramid slice 0 is {:?}, trace expects {:?}",
                        pyramid.working.padded, frame.plan.working.padded
                    )));
                }
                Some(gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("SSR Pyramid BG"),
                    layout: &material.pyramid_bgl,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: wgpu::BindingResource::TextureView(pyramid.array_view.as_ref()),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: pyramid.slice_buffer.as_entire_binding(),
                        },
                    ],
                }))
            }
            TraceMode::Linear { .. } => None,
        };

        // The trace reads the padded copy when there is one, the camera color otherwise.
        let source = frame
            .padded_source
            .as_ref()
            .map(|t| &t.color_view)
            .unwrap_or(gpu.targets.color_view);

        for dispatch in &frame.plan.dispatches {
            match dispatch.kernel {
                Kernel::Blit => {
                    if let Some(padded) = frame.padded_source.as_ref() {
                        material.blit.record(
                            gpu.device,
                            gpu.queue,
                            &mut gpu.graphics,
                            gpu.targets.color_view,
                            &material.sampler,
                            &padded.color_view,
                            BlitParams {
                                scale: frame.plan.working.padded_scale,
                                bias: [0.0, 0.0],
                            },
                        );
                    }
                }
                Kernel::Ssr(SsrKernel::TraceLinear) => {
                    let group = material.trace_bind_group(gpu.device, &gpu.targets, source);
                    render_fullscreen_pass(
                        &mut gpu.graphics,
                        "SSR Trace Linear",
                        &frame.reflection.color_view,
                        TargetLoad::Clear,
                        &material.trace_linear,
                        &[&group],
                    );
                }
                Kernel::Ssr(SsrKernel::TraceHiZ) => {
                    let group = material.trace_bind_group(gpu.device, &gpu.targets, source);
                    if let Some(pyramid_group) = pyramid_group.as_ref() {
                        render_fullscreen_pass(
                            &mut gpu.graphics,
                            "SSR Trace HiZ",
                            &frame.reflection.color_view,
                            TargetLoad::Clear,
                            &material.trace_hiz,
                            &[&group, pyramid_group],
                        );
                    }
                }
                Kernel::Ssr(SsrKernel::Compose) => {
                    let params_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
                        label: Some("SSR Compose BG"),
                        layout: &material.compose_bgl,
                        entries: &[
                            wgpu::BindGroupEntry {
                                binding: 0,
                                resource: material.params.as_entire_binding(),
                            },
                            wgpu::BindGroupEntry {
                                binding: 4,
                                resource: wgpu::BindingResource::Sampler(&material.sampler),
                            },
                        ],
                    });
                    let reflection_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
                        label: Some("SSR Reflection BG"),
                        layout: &material.reflection_bgl,
                        entries: &[wgpu::BindGroupEntry {
                            binding: 2,
                            resource: wgpu::BindingResource::TextureView(&frame.reflection.color_view),
                        }],
                    });
                    render_fullscreen_pass(
                        &mut gpu.graphics,
                        "SSR Compose",
                        gpu.targets.color_view,
                        TargetLoad::Load,
                        compose,
                        &[&params_group, &reflection_group],
                    );
                }
                Kernel::Pyramid(_) => {}
            }
        }

        self.executed = true;
        Ok(())
    }

    fn cleanup(&mut self, _ctx: &mut FrameContext) {
        if self.executed {
            self.frame_index = self.frame_index.wrapping_add(1);
        }
        self.executed = false;
        self.frame = None;
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::test_gpu;
    use crate::error::ErrorKind;
    use crate::frame::{test_camera, DescriptorHost, FrameReport, FrameScheduler};
    use crate::passes::depth_pyramid::DepthPyramid;
    use crate::passes::SubmissionQueue;
    use crate::render_targets::create_camera_textures;
    use crate::scene::{draw_demo_scene, read_back};
    use crate::settings::DitherMode;

    fn stage(settings: Settings) -> ScreenSpaceReflections {
        ScreenSpaceReflections::new(SsrConfig::default(), settings, Arc::new(ShaderLibrary::builtin()))
    }

    fn hiz(downsample: u32) -> Settings {
        Settings {
            tracing_mode: TracingMode::HiZ,
            downsample,
            ..Default::default()
        }
    }

    fn kernels(plan: &SsrPlan) -> Vec<Kernel> {
        plan.dispatches.iter().map(|d| d.kernel).collect()
    }

    #[test]
    fn test_linear_full_resolution() {
        let mut ssr = stage(Settings::default());
        let mut ctx = FrameContext::new(test_camera(1920, 1080), ResolutionScale::default(), vec![SSR_FEATURE]);
        assert!(ssr.enqueue(&mut ctx));
        assert_eq!(ctx.scale().value(), 1.0);
        assert!(!ctx.is_requested(DEPTH_PYRAMID_FEATURE));

        let plan = ssr.plan(&ctx);
        assert_eq!(plan.working.actual, [1920, 1080]);
        assert!(!plan.working.is_padded());
        assert_eq!(plan.reflection_extent, [1920, 1080]);
        assert_eq!(plan.source_copy, None);
        assert_eq!(
            kernels(&plan),
            vec![Kernel::Ssr(SsrKernel::TraceLinear), Kernel::Ssr(SsrKernel::Compose)]
        );
        assert!(plan.dispatches.iter().all(|d| d.queue == SubmissionQueue::Graphics));
    }

    #[test]
    fn test_linear_downsample_divides() {
        let ssr = stage(Settings {
            downsample: 2,
            ..Default::default()
        });
        let ctx = FrameContext::new(test_camera(1920, 1080), ResolutionScale::default(), vec![]);
        let plan = ssr.plan(&ctx);
        assert_eq!(plan.reflection_extent, [640, 360]);
        assert_eq!(plan.dispatches.last().map(|d| d.extent), Some([1920, 1080]));
    }

    #[test]
    fn test_hiz_downsampled_scenario() {
        let mut ssr = stage(hiz(1));
        let mut ctx = FrameContext::new(
            test_camera(1920, 1080),
            ResolutionScale::default(),
            vec![DEPTH_PYRAMID_FEATURE, SSR_FEATURE],
        );
        assert!(ssr.enqueue(&mut ctx));
        assert_eq!(ctx.scale().value(), 0.5);
        assert!(ctx.is_requested(DEPTH_PYRAMID_FEATURE));

        let plan = ssr.plan(&ctx);
        assert_eq!(plan.working.scaled, [960, 540]);
        assert_eq!(plan.reflection_extent, [1024, 1024]);
        assert_eq!(plan.source_copy, Some([1024, 1024]));
        assert_eq!(
            kernels(&plan),
            vec![
                Kernel::Blit,
                Kernel::Ssr(SsrKernel::TraceHiZ),
                Kernel::Ssr(SsrKernel::Compose)
            ]
        );

        let nearest = SsrPlan::new(
            [1920, 1080],
            ssr.settings().trace_mode(),
            &ctx.scale(),
            PaddingPolicy::NearestPowerOfTwo,
        );
        assert_eq!(nearest.reflection_extent, [1024, 512]);
    }

    #[test]
    fn test_hiz_matches_pyramid_slice_zero() {
        use crate::passes::depth_pyramid::PyramidPlan;
        let scale = ResolutionScale::new(1.0 / 3.0);
        let mode = hiz(2).trace_mode();
        for camera in [[1920, 1080], [1280, 720], [333, 77]] {
            let ssr = SsrPlan::new(camera, mode, &scale, PaddingPolicy::NextPowerOfTwo);
            let pyramid = PyramidPlan::new(camera, &scale, PaddingPolicy::NextPowerOfTwo, None);
            assert_eq!(ssr.working, pyramid.working);
            assert_eq!(ssr.reflection_extent, pyramid.slices.slice(0).padded);
        }
    }

    #[test]
    fn test_hiz_without_padding_reads_camera_color() {
        let plan = SsrPlan::new(
            [2048, 1024],
            hiz(1).trace_mode(),
            &ResolutionScale::new(0.5),
            PaddingPolicy::NextPowerOfTwo,
        );
        assert_eq!(plan.reflection_extent, [1024, 512]);
        assert_eq!(plan.source_copy, None);
        assert_eq!(plan.dispatches[0].kernel, Kernel::Ssr(SsrKernel::TraceHiZ));
    }

    #[test]
    fn test_max_steps_request_clamped() {
        let mut ssr = stage(Settings::default());
        ssr.set_settings(Settings {
            max_steps: 4.0,
            ..Default::default()
        });
        assert_eq!(ssr.settings().max_steps, 8.0);
        // get/set round trip is stable
        let current = ssr.settings();
        ssr.set_settings(current);
        assert_eq!(ssr.settings(), current);
    }

    #[test]
    fn test_hiz_without_pyramid_feature() {
        let ssr = stage(hiz(0));
        let ctx = FrameContext::new(test_camera(640, 480), ResolutionScale::default(), vec![SSR_FEATURE]);
        let err = ssr.check_prerequisites(&ctx).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);

        let ctx = FrameContext::new(
            test_camera(640, 480),
            ResolutionScale::default(),
            vec![DEPTH_PYRAMID_FEATURE, SSR_FEATURE],
        );
        assert!(ssr.check_prerequisites(&ctx).is_ok());

        let linear = stage(Settings::default());
        let ctx = FrameContext::new(test_camera(640, 480), ResolutionScale::default(), vec![]);
        assert!(linear.check_prerequisites(&ctx).is_ok());
    }

    #[test]
    fn test_enqueue_respects_flags() {
        let mut ssr = stage(hiz(2));
        let camera = CameraDescriptor {
            post_processing_enabled: false,
            ..test_camera(640, 480)
        };
        let mut ctx = FrameContext::new(camera, ResolutionScale::new(0.75), vec![]);
        assert!(!ssr.enqueue(&mut ctx));
        assert_eq!(ctx.scale().value(), 0.75);

        ssr.set_enabled(false);
        let mut ctx = FrameContext::new(test_camera(640, 480), ResolutionScale::default(), vec![]);
        assert!(!ssr.enqueue(&mut ctx));
        assert!(!ssr.is_enabled());
    }

    #[test]
    fn test_params() {
        let settings = Settings {
            dither_mode: DitherMode::Grid8x8,
            ..hiz(1)
        };
        let camera = test_camera(1920, 1080);
        let plan = SsrPlan::new(
            camera.extent(),
            settings.trace_mode(),
            &ResolutionScale::new(0.5),
            PaddingPolicy::NextPowerOfTwo,
        );
        let params = plan.params(&camera, &settings, 7);
        assert_eq!(params.screen_resolution, [960.0, 540.0]);
        assert_eq!(params.padded_resolution, [1024.0, 1024.0]);
        assert_eq!(params.padded_scale, [1024.0 / 960.0, 1024.0 / 540.0]);
        assert_eq!(params.num_steps, 128.0);
        assert_eq!(params.reflect_sky, 1);
        assert_eq!(params.frame, 7);
        assert_eq!(params.dither_mode, 0);
        assert_eq!(params.world_space_view_dir, [0.0, 0.0, -1.0, 0.0]);
        assert_eq!(params.render_scale, 1.0);

        let scaled_camera = CameraDescriptor {
            render_scale: 0.75,
            ..camera
        };
        assert_eq!(plan.params(&scaled_camera, &settings, 7).render_scale, 0.75);

        let linear = Settings::default();
        let plan = SsrPlan::new(camera.extent(), linear.trace_mode(), &ResolutionScale::default(), PaddingPolicy::NextPowerOfTwo);
        let params = plan.params(&camera, &linear, u32::MAX);
        assert_eq!(params.reflect_sky, 0);
        assert_eq!(params.padded_scale, [1.0, 1.0]);
        assert!(params.frame >= 0);
    }

    #[test]
    fn test_frame_index_only_counts_executed_frames() {
        let mut ssr = stage(Settings::default());
        let mut ctx = FrameContext::new(test_camera(64, 64), ResolutionScale::default(), vec![]);
        ssr.cleanup(&mut ctx);
        assert_eq!(ssr.frame_index(), 0);
    }

    // Parses and validates, but binds a global no pipeline layout provides.
    const UNBOUND_SSR_MODULE: &str = "
        @group(0) @binding(7) var<uniform> unbound: vec4<f32>;
        @fragment fn trace_linear() -> @location(0) vec4<f32> { return unbound; }
        @fragment fn compose() -> @location(0) vec4<f32> { return unbound; }
        @fragment fn trace_hiz() -> @location(0) vec4<f32> { return unbound; }
    ";

    const UNBOUND_PYRAMID_MODULE: &str = "
        @group(0) @binding(7) var<uniform> unbound: vec4<f32>;
        @group(0) @binding(3) var dest_slice: texture_storage_2d<r32float, write>;
        @compute @workgroup_size(8, 8, 1) fn reduce() { textureStore(dest_slice, vec2<i32>(0), unbound); }
        @compute @workgroup_size(8, 8, 1) fn seed() { textureStore(dest_slice, vec2<i32>(0), unbound); }
    ";

    struct DeviceRun {
        reports: Vec<FrameReport>,
        before: Vec<u8>,
        after: Vec<u8>,
        frame_index: u32,
    }

    /// Draws the demo scene, runs `frames` frames through `stages` and reads
    /// the camera color back before and after. `None` without an adapter.
    fn run_on_device(stages: Vec<Box<dyn FrameStage>>, frames: usize) -> Option<DeviceRun> {
        let gpu = test_gpu()?;
        let camera = test_camera(160, 90);
        let textures = create_camera_textures(&gpu.device, camera.width, camera.height, camera.format).unwrap();
        draw_demo_scene(&gpu.device, &gpu.queue, &camera, &textures).unwrap();
        let before = read_back(&gpu.device, &gpu.queue, &textures.color).unwrap();

        let mut scheduler = FrameScheduler::new();
        for stage in stages {
            scheduler.add_stage(stage);
        }
        let mut reports = Vec::new();
        for _ in 0..frames {
            let targets = CameraTargets {
                color_view: &textures.color.color_view,
                depth_view: &textures.depth_view,
                normals_view: &textures.normals.color_view,
            };
            reports.push(scheduler.run_frame(&DescriptorHost, &camera, &gpu.device, &gpu.queue, targets));
        }
        let after = read_back(&gpu.device, &gpu.queue, &textures.color).unwrap();
        let frame_index = scheduler
            .stage_mut::<ScreenSpaceReflections>()
            .map_or(0, |ssr| ssr.frame_index());
        Some(DeviceRun {
            reports,
            before,
            after,
            frame_index,
        })
    }

    fn pyramid_stage(library: &Arc<ShaderLibrary>) -> Box<dyn FrameStage> {
        Box::new(DepthPyramid::new(SsrConfig::default(), library.clone()))
    }

    fn ssr_stage(settings: Settings, library: &Arc<ShaderLibrary>) -> Box<dyn FrameStage> {
        Box::new(ScreenSpaceReflections::new(SsrConfig::default(), settings, library.clone()))
    }

    #[test]
    fn test_hiz_frames_on_device() {
        let library = Arc::new(ShaderLibrary::builtin());
        let stages = vec![pyramid_stage(&library), ssr_stage(hiz(1), &library)];
        let Some(run) = run_on_device(stages, 2) else {
            return;
        };
        for report in &run.reports {
            assert_eq!(report.executed, vec![DEPTH_PYRAMID_FEATURE, SSR_FEATURE]);
            assert!(report.failed.is_empty());
        }
        assert_eq!(run.frame_index, 2);
        assert_ne!(run.before, run.after, "floor should pick up wall reflections");
    }

    #[test]
    fn test_linear_frame_skips_pyramid() {
        let library = Arc::new(ShaderLibrary::builtin());
        let stages = vec![pyramid_stage(&library), ssr_stage(Settings::default(), &library)];
        let Some(run) = run_on_device(stages, 1) else {
            return;
        };
        assert_eq!(run.reports[0].admitted, vec![SSR_FEATURE]);
        assert_eq!(run.reports[0].executed, vec![SSR_FEATURE]);
        assert_eq!(run.frame_index, 1);
        assert_ne!(run.before, run.after);
    }

    #[test]
    fn test_missing_pyramid_kernel_leaves_image_unmodified() {
        let mut library = ShaderLibrary::builtin();
        library.remove(crate::shader_library::DEPTH_PYRAMID_SHADER);
        let library = Arc::new(library);
        let stages = vec![pyramid_stage(&library), ssr_stage(hiz(1), &library)];
        let Some(run) = run_on_device(stages, 1) else {
            return;
        };
        assert!(run.reports[0].executed.is_empty());
        assert_eq!(
            run.reports[0].failed,
            vec![
                (DEPTH_PYRAMID_FEATURE, ErrorKind::Configuration),
                (SSR_FEATURE, ErrorKind::Configuration)
            ]
        );
        assert_eq!(run.frame_index, 0);
        assert!(run.before == run.after, "color target was written");
    }

    #[test]
    fn test_unregistered_pyramid_leaves_image_unmodified() {
        let library = Arc::new(ShaderLibrary::builtin());
        let Some(run) = run_on_device(vec![ssr_stage(hiz(0), &library)], 1) else {
            return;
        };
        assert_eq!(run.reports[0].failed, vec![(SSR_FEATURE, ErrorKind::Configuration)]);
        assert_eq!(run.frame_index, 0);
        assert!(run.before == run.after, "color target was written");
    }

    #[test]
    fn test_pipeline_validation_error_skips_stage() {
        let mut library = ShaderLibrary::builtin();
        library.register(SSR_SHADER, UNBOUND_SSR_MODULE);
        let library = Arc::new(library);
        let Some(run) = run_on_device(vec![ssr_stage(Settings::default(), &library)], 2) else {
            return;
        };
        for report in &run.reports {
            assert_eq!(report.failed, vec![(SSR_FEATURE, ErrorKind::Configuration)]);
        }
        assert_eq!(run.frame_index, 0);
        assert!(run.before == run.after, "color target was written");
    }

    #[test]
    fn test_pyramid_pipeline_validation_error_skips_stage() {
        let mut library = ShaderLibrary::builtin();
        library.register(crate::shader_library::DEPTH_PYRAMID_SHADER, UNBOUND_PYRAMID_MODULE);
        let library = Arc::new(library);
        let stages = vec![pyramid_stage(&library), ssr_stage(hiz(1), &library)];
        let Some(run) = run_on_device(stages, 1) else {
            return;
        };
        assert_eq!(
            run.reports[0].failed,
            vec![
                (DEPTH_PYRAMID_FEATURE, ErrorKind::Configuration),
                (SSR_FEATURE, ErrorKind::Configuration)
            ]
        );
        assert!(run.before == run.after, "color target was written");
    }
}
