//! Per-frame context, the stage interface and a reference scheduler.
//!
//! A frame runs in four phases: every stage is offered the frame (`enqueue`,
//! consumers before producers so they can request what they read), admitted
//! stages configure and execute in registration order, every admitted
//! stage cleans up, and finally the two command encoders are submitted,
//! async compute first. That submission order is the synchronisation point
//! between the pyramid reduction chain and the Hi-Z trace that reads it.

use std::any::Any;
use std::sync::Arc;

use glam::{Mat4, Vec4};

use crate::error::{ErrorKind, Result, SsrError};
use crate::resolution::{ResolutionScale, SliceChain, WorkingResolution};

/// What the host tells us about the camera each frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraDescriptor {
    pub width: u32,
    pub height: u32,
    pub format: wgpu::TextureFormat,
    pub view: Mat4,
    pub projection: Mat4,
    pub post_processing_enabled: bool,
    /// Per-camera render scale, forwarded to the kernels as `_RenderScale`.
    pub render_scale: f32,
}

impl CameraDescriptor {
    pub fn extent(&self) -> [u32; 2] {
        [self.width, self.height]
    }

    /// Camera forward in world space.
    pub fn world_view_dir(&self) -> Vec4 {
        let forward = self.view.inverse() * Vec4::new(0.0, 0.0, -1.0, 0.0);
        forward.truncate().normalize_or_zero().extend(0.0)
    }
}

/// Adapts a host pipeline's camera representation, fixed at startup.
pub trait HostAdapter {
    type Camera;

    fn describe(&self, camera: &Self::Camera) -> CameraDescriptor;
}

/// Host whose cameras already are [`CameraDescriptor`]s.
#[derive(Clone, Copy, Debug, Default)]
pub struct DescriptorHost;

impl HostAdapter for DescriptorHost {
    type Camera = CameraDescriptor;

    fn describe(&self, camera: &CameraDescriptor) -> CameraDescriptor {
        *camera
    }
}

/// Pyramid outputs made available to later stages of the same frame.
#[derive(Clone)]
pub struct PublishedPyramid {
    pub working: WorkingResolution,
    pub slices: SliceChain,
    pub array_view: Arc<wgpu::TextureView>,
    pub slice_buffer: Arc<wgpu::Buffer>,
}

/// State threaded through every stage of one frame.
pub struct FrameContext {
    pub camera: CameraDescriptor,
    scale: ResolutionScale,
    features: Vec<&'static str>,
    requested: Vec<&'static str>,
    pyramid: Option<PublishedPyramid>,
}

impl FrameContext {
    /// `scale` is the previous frame's value; it stays in effect until a stage writes a new one.
    pub fn new(camera: CameraDescriptor, scale: ResolutionScale, features: Vec<&'static str>) -> Self {
        Self {
            camera,
            scale,
            features,
            requested: Vec::new(),
            pyramid: None,
        }
    }

    pub fn scale(&self) -> ResolutionScale {
        self.scale
    }

    pub fn set_scale(&mut self, value: f32) {
        self.scale = ResolutionScale::new(value);
    }

    pub fn has_feature(&self, name: &str) -> bool {
        self.features.iter().any(|f| *f == name)
    }

    /// Asks a producer stage to run this frame. Only meaningful during `enqueue`.
    pub fn request_feature(&mut self, name: &'static str) {
        if !self.requested.contains(&name) {
            self.requested.push(name);
        }
    }

    pub fn is_requested(&self, name: &str) -> bool {
        self.requested.iter().any(|f| *f == name)
    }

    pub fn publish_pyramid(&mut self, pyramid: PublishedPyramid) {
        self.pyramid = Some(pyramid);
    }

    pub fn pyramid(&self) -> Option<&PublishedPyramid> {
        self.pyramid.as_ref()
    }
}

/// Camera attachments for the current frame. All views are 2D, single layer.
pub struct CameraTargets<'a> {
    pub color_view: &'a wgpu::TextureView,
    pub depth_view: &'a wgpu::TextureView,
    /// RGB = world normal encoded `n * 0.5 + 0.5`, A = smoothness.
    pub normals_view: &'a wgpu::TextureView,
}

/// GPU handles and the frame's two command streams.
pub struct GpuFrame<'a> {
    pub device: &'a wgpu::Device,
    pub queue: &'a wgpu::Queue,
    pub targets: CameraTargets<'a>,
    pub async_compute: wgpu::CommandEncoder,
    pub graphics: wgpu::CommandEncoder,
}

impl<'a> GpuFrame<'a> {
    pub fn new(device: &'a wgpu::Device, queue: &'a wgpu::Queue, targets: CameraTargets<'a>) -> Self {
        let async_compute = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("LimSSR Async Compute"),
        });
        let graphics = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("LimSSR Graphics"),
        });
        Self {
            device,
            queue,
            targets,
            async_compute,
            graphics,
        }
    }

    /// Compute work is ordered before graphics work in a single submission.
    pub fn submit(self) -> wgpu::SubmissionIndex {
        self.queue
            .submit([self.async_compute.finish(), self.graphics.finish()])
    }
}

/// One pipeline stage driven by a [`FrameScheduler`].
pub trait FrameStage: Any {
    fn name(&self) -> &'static str;

    /// Admission for this frame. Runs for every stage, last registered first,
    /// before any stage configures.
    fn enqueue(&mut self, ctx: &mut FrameContext) -> bool;

    /// Resolve resources and acquire frame-scoped targets.
    fn configure(&mut self, gpu: &mut GpuFrame<'_>, ctx: &mut FrameContext) -> Result<()>;

    /// Record commands. Only called when `configure` succeeded.
    fn execute(&mut self, gpu: &mut GpuFrame<'_>, ctx: &mut FrameContext) -> Result<()>;

    /// Release frame-scoped targets. Called for every admitted stage.
    fn cleanup(&mut self, ctx: &mut FrameContext);

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Outcome of one frame, per stage name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameReport {
    pub admitted: Vec<&'static str>,
    pub executed: Vec<&'static str>,
    pub failed: Vec<(&'static str, ErrorKind)>,
}

fn report_stage_error(stage: &'static str, err: &SsrError) {
    match err.kind() {
        ErrorKind::Configuration => log::error!("{stage}: configuration error, skipping pass: {err}"),
        ErrorKind::Resource => log::error!("{stage}: resource error, skipping pass: {err}"),
        ErrorKind::Device => log::error!("{stage}: device error: {err}"),
    }
}

/// Reference host scheduler.
#[derive(Default)]
pub struct FrameScheduler {
    stages: Vec<Box<dyn FrameStage>>,
    scale: ResolutionScale,
}

impl FrameScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages run in the order they are added; producers go first.
    pub fn add_stage(&mut self, stage: Box<dyn FrameStage>) {
        self.stages.push(stage);
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub fn stage_mut<T: FrameStage>(&mut self) -> Option<&mut T> {
        self.stages
            .iter_mut()
            .find_map(|s| s.as_any_mut().downcast_mut::<T>())
    }

    /// Scale carried over from the last frame.
    pub fn scale(&self) -> ResolutionScale {
        self.scale
    }

    /// Runs every stage for one camera and submits the recorded work.
    pub fn run_frame<A: HostAdapter>(
        &mut self,
        host: &A,
        camera: &A::Camera,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        targets: CameraTargets<'_>,
    ) -> FrameReport {
        let mut ctx = FrameContext::new(host.describe(camera), self.scale, self.stage_names());
        let mut gpu = GpuFrame::new(device, queue, targets);
        let mut report = FrameReport::default();

        let mut admitted: Vec<usize> = (0..self.stages.len())
            .rev()
            .filter(|&i| self.stages[i].enqueue(&mut ctx))
            .collect();
        admitted.reverse();

        for &i in &admitted {
            let stage = &mut self.stages[i];
            let name = stage.name();
            report.admitted.push(name);
            let result = stage
                .configure(&mut gpu, &mut ctx)
                .and_then(|()| stage.execute(&mut gpu, &mut ctx));
            match result {
                Ok(()) => report.executed.push(name),
                Err(err) => {
                    report_stage_error(name, &err);
                    report.failed.push((name, err.kind()));
                }
            }
        }

        for &i in &admitted {
            self.stages[i].cleanup(&mut ctx);
        }

        gpu.submit();
        self.scale = ctx.scale();
        log::debug!("frame done: {report:?}");
        report
    }
}

#[cfg(test)]
pub(crate) fn test_camera(width: u32, height: u32) -> CameraDescriptor {
    CameraDescriptor {
        width,
        height,
        format: wgpu::TextureFormat::Rgba8Unorm,
        view: Mat4::IDENTITY,
        projection: Mat4::perspective_rh(60f32.to_radians(), width as f32 / height as f32, 0.1, 100.0),
        post_processing_enabled: true,
        render_scale: 1.0,
    }
}
