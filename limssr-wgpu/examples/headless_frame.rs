//! Renders one synthetic frame (floor + back wall) with Hi-Z reflections and
//! writes the camera color to `limssr_frame.png`.
//!
//!     RUST_LOG=debug cargo run -p limssr-wgpu --example headless_frame

use std::sync::Arc;

use glam::Mat4;
use limssr_wgpu::backend::GpuContext;
use limssr_wgpu::render_targets::create_camera_textures;
use limssr_wgpu::scene::{draw_demo_scene, read_back};
use limssr_wgpu::{
    reflection_scheduler, CameraDescriptor, CameraTargets, DescriptorHost, DitherMode, Settings, ShaderLibrary,
    SsrConfig, SsrError, TracingMode,
};

const WIDTH: u32 = 640;
const HEIGHT: u32 = 360;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let gpu = match GpuContext::headless() {
        Ok(gpu) => gpu,
        Err(SsrError::AdapterUnavailable) => {
            log::warn!("no GPU adapter available, nothing to render");
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    };

    let camera = CameraDescriptor {
        width: WIDTH,
        height: HEIGHT,
        format: wgpu::TextureFormat::Rgba8Unorm,
        view: Mat4::IDENTITY,
        projection: Mat4::perspective_rh(60f32.to_radians(), WIDTH as f32 / HEIGHT as f32, 0.1, 100.0),
        post_processing_enabled: true,
        render_scale: 1.0,
    };
    let textures = create_camera_textures(&gpu.device, WIDTH, HEIGHT, camera.format)?;
    draw_demo_scene(&gpu.device, &gpu.queue, &camera, &textures)?;

    let settings = Settings {
        tracing_mode: TracingMode::HiZ,
        dither_mode: DitherMode::Grid8x8,
        downsample: 1,
        ..Default::default()
    };
    let mut scheduler = reflection_scheduler(SsrConfig::default(), settings, Arc::new(ShaderLibrary::builtin()));
    let targets = CameraTargets {
        color_view: &textures.color.color_view,
        depth_view: &textures.depth_view,
        normals_view: &textures.normals.color_view,
    };
    let report = scheduler.run_frame(&DescriptorHost, &camera, &gpu.device, &gpu.queue, targets);
    log::info!("frame report: {report:?}");

    let pixels = read_back(&gpu.device, &gpu.queue, &textures.color)?;
    let image = image::RgbaImage::from_raw(WIDTH, HEIGHT, pixels).ok_or("readback size mismatch")?;
    image.save("limssr_frame.png")?;
    log::info!("wrote limssr_frame.png");
    Ok(())
}
