//! Frame-scoped targets for the SSR stages: reflection map, padded source copy,
//! the pyramid texture array, and the persistent pyramid buffers.

use std::sync::Arc;

use limssr_gpu_shared::uniforms::{PyramidParams, SliceResolutions, PYRAMID_SLICES, UNIFORM_OFFSET_ALIGNMENT};

use crate::backend::RenderTarget;
use crate::error::{Result, SsrError};

/// HDR color format used for reflection and source copies.
pub const HDR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
/// Camera depth format the kernels expect.
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
/// Depth pyramid slice format. Storage-writable and unfilterable.
pub const PYRAMID_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R32Float;
/// Normals + smoothness.
pub const NORMALS_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

fn check_extent(device: &wgpu::Device, label: &str, width: u32, height: u32, layers: u32) -> Result<()> {
    let limits = device.limits();
    let reason = if width == 0 || height == 0 {
        Some(format!("zero extent {width}x{height}"))
    } else if width > limits.max_texture_dimension_2d || height > limits.max_texture_dimension_2d {
        Some(format!(
            "{width}x{height} exceeds max texture dimension {}",
            limits.max_texture_dimension_2d
        ))
    } else if layers > limits.max_texture_array_layers {
        Some(format!("{layers} layers exceeds {}", limits.max_texture_array_layers))
    } else {
        None
    };
    match reason {
        Some(reason) => Err(SsrError::Allocation {
            label: label.to_owned(),
            reason,
        }),
        None => Ok(()),
    }
}

fn create_color_target(
    device: &wgpu::Device,
    label: &str,
    width: u32,
    height: u32,
    format: wgpu::TextureFormat,
) -> Result<RenderTarget> {
    check_extent(device, label, width, height, 1)?;
    let color_texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
        view_formats: &[],
    });
    let color_view = color_texture.create_view(&wgpu::TextureViewDescriptor::default());
    Ok(RenderTarget {
        color_texture,
        color_view,
        width,
        height,
    })
}

/// Reflection color written by the trace kernels.
pub fn create_reflection_target(device: &wgpu::Device, extent: [u32; 2]) -> Result<RenderTarget> {
    create_color_target(device, "SSR Reflection", extent[0], extent[1], HDR_FORMAT)
}

/// Power-of-two sized copy of the camera color for Hi-Z tracing.
pub fn create_padded_source(device: &wgpu::Device, extent: [u32; 2]) -> Result<RenderTarget> {
    create_color_target(device, "SSR Padded Source", extent[0], extent[1], HDR_FORMAT)
}

/// The depth pyramid: one array texture, every layer allocated at slice-0 size.
/// Slice `i` uses the top-left `padded[i]` region of layer `i`.
pub struct DepthPyramidTexture {
    pub texture: wgpu::Texture,
    /// Per-slice 2D views, for seed/reduce binding.
    pub slice_views: Vec<wgpu::TextureView>,
    /// All slices, for the tracer and debug views.
    pub array_view: Arc<wgpu::TextureView>,
    pub extent: [u32; 2],
}

pub fn create_depth_pyramid(device: &wgpu::Device, padded0: [u32; 2]) -> Result<DepthPyramidTexture> {
    let layers = PYRAMID_SLICES as u32;
    check_extent(device, "Depth Pyramid", padded0[0], padded0[1], layers)?;

    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Depth Pyramid"),
        size: wgpu::Extent3d {
            width: padded0[0],
            height: padded0[1],
            depth_or_array_layers: layers,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: PYRAMID_FORMAT,
        usage: wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::TEXTURE_BINDING,
        view_formats: &[],
    });

    let slice_views = (0..layers)
        .map(|layer| {
            texture.create_view(&wgpu::TextureViewDescriptor {
                label: Some("Depth Pyramid Slice"),
                dimension: Some(wgpu::TextureViewDimension::D2),
                base_array_layer: layer,
                array_layer_count: Some(1),
                ..Default::default()
            })
        })
        .collect();

    let array_view = texture.create_view(&wgpu::TextureViewDescriptor {
        label: Some("Depth Pyramid Array"),
        dimension: Some(wgpu::TextureViewDimension::D2Array),
        base_array_layer: 0,
        array_layer_count: Some(layers),
        ..Default::default()
    });

    Ok(DepthPyramidTexture {
        texture,
        slice_views,
        array_view: Arc::new(array_view),
        extent: padded0,
    })
}

/// Padded resolution of every slice. Lives across frames; rewritten each frame.
pub fn create_slice_resolution_buffer(device: &wgpu::Device) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Pyramid Slice Resolutions"),
        size: std::mem::size_of::<SliceResolutions>() as u64,
        usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

/// One [`PyramidParams`] block per pyramid dispatch, at uniform offset stride.
pub fn create_pyramid_params_buffer(device: &wgpu::Device) -> wgpu::Buffer {
    debug_assert_eq!(std::mem::size_of::<PyramidParams>() as u64, UNIFORM_OFFSET_ALIGNMENT);
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Pyramid Params"),
        size: UNIFORM_OFFSET_ALIGNMENT * PYRAMID_SLICES as u64,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

/// Camera attachments owned by a host that has no renderer of its own (demo, tests).
pub struct CameraTextures {
    pub color: RenderTarget,
    pub depth: wgpu::Texture,
    pub depth_view: wgpu::TextureView,
    pub normals: RenderTarget,
}

pub fn create_camera_textures(
    device: &wgpu::Device,
    width: u32,
    height: u32,
    color_format: wgpu::TextureFormat,
) -> Result<CameraTextures> {
    check_extent(device, "Camera", width, height, 1)?;
    let size = wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    };
    let usage = wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING;

    let color_texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Camera Color"),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: color_format,
        usage: usage | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    });
    let color_view = color_texture.create_view(&wgpu::TextureViewDescriptor::default());

    let depth = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Camera Depth"),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage,
        view_formats: &[],
    });
    let depth_view = depth.create_view(&wgpu::TextureViewDescriptor::default());

    Ok(CameraTextures {
        color: RenderTarget {
            color_texture,
            color_view,
            width,
            height,
        },
        depth,
        depth_view,
        normals: create_color_target(device, "Camera Normals", width, height, NORMALS_FORMAT)?,
    })
}
