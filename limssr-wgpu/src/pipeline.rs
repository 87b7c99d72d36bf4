//! Pipeline and bind group layout creation for the SSR and depth pyramid kernels.
//! Fullscreen effects share the vertex-index triangle from `fullscreen_quad.wgsl`.

use std::num::NonZeroU64;

use limssr_gpu_shared::uniforms::{PYRAMID_PARAMS_BINDING_SIZE, SSRParams};

use crate::error::{Result, SsrError};
use crate::render_targets::PYRAMID_FORMAT;
use crate::shader_library::ShaderLibrary;

/// Runs `create` inside a validation error scope. Pipeline and layout errors
/// come back as [`SsrError::ShaderCompilation`] instead of reaching the
/// device's uncaptured error handler.
pub fn validated<T>(device: &wgpu::Device, name: &str, create: impl FnOnce() -> T) -> Result<T> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let value = create();
    match pollster::block_on(device.pop_error_scope()) {
        Some(err) => Err(SsrError::ShaderCompilation {
            name: name.to_owned(),
            message: err.to_string(),
        }),
        None => Ok(value),
    }
}

/// Compiles a named module from the library inside a validation error scope.
pub fn compile_shader(device: &wgpu::Device, library: &ShaderLibrary, name: &str) -> Result<wgpu::ShaderModule> {
    let source = library.source(name)?;
    let module = validated(device, name, || {
        device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(name),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        })
    })?;
    log::info!("compiled shader {name}");
    Ok(module)
}

fn fullscreen_vertex_state(module: &wgpu::ShaderModule) -> wgpu::VertexState<'_> {
    wgpu::VertexState {
        module,
        entry_point: Some("vs_main"),
        compilation_options: wgpu::PipelineCompilationOptions::default(),
        buffers: &[],
    }
}

fn uniform_entry(binding: u32, visibility: wgpu::ShaderStages, size: Option<NonZeroU64>, dynamic: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: dynamic,
            min_binding_size: size,
        },
        count: None,
    }
}

fn texture_entry(
    binding: u32,
    visibility: wgpu::ShaderStages,
    sample_type: wgpu::TextureSampleType,
    view_dimension: wgpu::TextureViewDimension,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Texture {
            sample_type,
            view_dimension,
            multisampled: false,
        },
        count: None,
    }
}

fn slice_buffer_entry(binding: u32, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only: true },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

const FILTERABLE: wgpu::TextureSampleType = wgpu::TextureSampleType::Float { filterable: true };
const UNFILTERABLE: wgpu::TextureSampleType = wgpu::TextureSampleType::Float { filterable: false };

// ============================================================
// SSR
// ============================================================

/// SSR group 0 for the trace kernels, matches ssr.wgsl:
///   0: uniform SsrParams
///   1: texture_2d<f32>  (camera_depth, unfilterable)
///   2: texture_2d<f32>  (camera_normals)
///   3: texture_2d<f32>  (source_color)
///   4: sampler          (linear_clamp)
pub fn create_ssr_trace_bgl(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    let fragment = wgpu::ShaderStages::FRAGMENT;
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("SSR Trace BGL"),
        entries: &[
            uniform_entry(0, fragment, NonZeroU64::new(std::mem::size_of::<SSRParams>() as u64), false),
            texture_entry(1, fragment, UNFILTERABLE, wgpu::TextureViewDimension::D2),
            texture_entry(2, fragment, UNFILTERABLE, wgpu::TextureViewDimension::D2),
            texture_entry(3, fragment, FILTERABLE, wgpu::TextureViewDimension::D2),
            wgpu::BindGroupLayoutEntry {
                binding: 4,
                visibility: fragment,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
        ],
    })
}

/// SSR group 1 for `trace_hiz`:
///   0: texture_2d_array<f32> (depth_pyramid)
///   1: storage array<vec2<u32>, 11> (slice_resolutions)
pub fn create_ssr_pyramid_bgl(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    let fragment = wgpu::ShaderStages::FRAGMENT;
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("SSR Pyramid BGL"),
        entries: &[
            texture_entry(0, fragment, UNFILTERABLE, wgpu::TextureViewDimension::D2Array),
            slice_buffer_entry(1, fragment),
        ],
    })
}

/// SSR group 0 for `compose`: the camera color is the render target here, so
/// it must not appear in any bound group.
///   0: uniform SsrParams
///   4: sampler (linear_clamp)
pub fn create_ssr_compose_bgl(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    let fragment = wgpu::ShaderStages::FRAGMENT;
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("SSR Compose BGL"),
        entries: &[
            uniform_entry(0, fragment, NonZeroU64::new(std::mem::size_of::<SSRParams>() as u64), false),
            wgpu::BindGroupLayoutEntry {
                binding: 4,
                visibility: fragment,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
        ],
    })
}

/// SSR group 1 for `compose`:
///   2: texture_2d<f32> (reflection_map)
pub fn create_ssr_reflection_bgl(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("SSR Reflection BGL"),
        entries: &[texture_entry(
            2,
            wgpu::ShaderStages::FRAGMENT,
            FILTERABLE,
            wgpu::TextureViewDimension::D2,
        )],
    })
}

// ============================================================
// Depth pyramid
// ============================================================

fn pyramid_params_entry() -> wgpu::BindGroupLayoutEntry {
    uniform_entry(
        0,
        wgpu::ShaderStages::COMPUTE,
        NonZeroU64::new(PYRAMID_PARAMS_BINDING_SIZE),
        true,
    )
}

fn pyramid_dest_entry() -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding: 3,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::StorageTexture {
            access: wgpu::StorageTextureAccess::WriteOnly,
            format: PYRAMID_FORMAT,
            view_dimension: wgpu::TextureViewDimension::D2,
        },
        count: None,
    }
}

/// Pyramid `seed`, matches depth_pyramid.wgsl:
///   0: uniform PyramidParams (dynamic offset)
///   1: texture_2d<f32> (camera_depth, unfilterable)
///   3: texture_storage_2d<r32float, write> (dest_slice)
pub fn create_pyramid_seed_bgl(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Pyramid Seed BGL"),
        entries: &[
            pyramid_params_entry(),
            texture_entry(1, wgpu::ShaderStages::COMPUTE, UNFILTERABLE, wgpu::TextureViewDimension::D2),
            pyramid_dest_entry(),
        ],
    })
}

/// Pyramid `reduce`:
///   0: uniform PyramidParams (dynamic offset)
///   2: texture_2d<f32> (source_slice)
///   3: texture_storage_2d<r32float, write> (dest_slice)
pub fn create_pyramid_reduce_bgl(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Pyramid Reduce BGL"),
        entries: &[
            pyramid_params_entry(),
            texture_entry(2, wgpu::ShaderStages::COMPUTE, UNFILTERABLE, wgpu::TextureViewDimension::D2),
            pyramid_dest_entry(),
        ],
    })
}

/// Pyramid debug views:
///   4: uniform PyramidDebugParams
///   5: texture_2d_array<f32> (pyramid)
///   6: storage array<vec2<u32>, 11> (slice_resolutions)
pub fn create_pyramid_debug_bgl(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    let fragment = wgpu::ShaderStages::FRAGMENT;
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Pyramid Debug BGL"),
        entries: &[
            uniform_entry(4, fragment, None, false),
            texture_entry(5, fragment, UNFILTERABLE, wgpu::TextureViewDimension::D2Array),
            slice_buffer_entry(6, fragment),
        ],
    })
}

// ============================================================
// Blit
// ============================================================

/// Blit bind group layout, matches blit.wgsl:
///   0: uniform BlitParams
///   1: texture_2d<f32> (source_tex)
///   2: sampler          (source_sampler)
pub fn create_blit_bgl(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    let fragment = wgpu::ShaderStages::FRAGMENT;
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Blit BGL"),
        entries: &[
            uniform_entry(0, fragment, None, false),
            texture_entry(1, fragment, FILTERABLE, wgpu::TextureViewDimension::D2),
            wgpu::BindGroupLayoutEntry {
                binding: 2,
                visibility: fragment,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
        ],
    })
}

pub fn create_linear_clamp_sampler(device: &wgpu::Device) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("LimSSR Linear Clamp"),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        mipmap_filter: wgpu::FilterMode::Nearest,
        ..Default::default()
    })
}

// ============================================================
// Pipelines
// ============================================================

pub fn create_pipeline_layout(device: &wgpu::Device, label: &str, bgls: &[&wgpu::BindGroupLayout]) -> wgpu::PipelineLayout {
    device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(&format!("{label} Layout")),
        bind_group_layouts: bgls,
        push_constant_ranges: &[],
    })
}

/// Fullscreen triangle + one fragment entry point writing a single color target.
#[allow(clippy::too_many_arguments)]
pub fn create_fullscreen_effect_pipeline(
    device: &wgpu::Device,
    label: &str,
    vert_module: &wgpu::ShaderModule,
    frag_module: &wgpu::ShaderModule,
    frag_entry: &str,
    layout: &wgpu::PipelineLayout,
    output_format: wgpu::TextureFormat,
    blend: Option<wgpu::BlendState>,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(layout),
        vertex: fullscreen_vertex_state(vert_module),
        fragment: Some(wgpu::FragmentState {
            module: frag_module,
            entry_point: Some(frag_entry),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            targets: &[Some(wgpu::ColorTargetState {
                format: output_format,
                blend,
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        primitive: wgpu::PrimitiveState::default(),
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

pub fn create_compute_pipeline(
    device: &wgpu::Device,
    label: &str,
    module: &wgpu::ShaderModule,
    entry: &str,
    bgl: &wgpu::BindGroupLayout,
) -> wgpu::ComputePipeline {
    let layout = create_pipeline_layout(device, label, &[bgl]);
    device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(label),
        layout: Some(&layout),
        module,
        entry_point: Some(entry),
        compilation_options: wgpu::PipelineCompilationOptions::default(),
        cache: None,
    })
}
