use bytemuck::{Pod, Zeroable};

/// Number of slices in the depth pyramid (slice 0 plus ten reductions).
pub const PYRAMID_SLICES: usize = 11;

/// Uniform offset stride for per-dispatch pyramid parameters.
/// Matches WebGPU minUniformBufferOffsetAlignment.
pub const UNIFORM_OFFSET_ALIGNMENT: u64 = 256;

/// Parameter names exposed by `ssr.wgsl`, in declaration order.
/// These are the wire contract between the orchestrator and the kernels.
pub const SSR_PARAM_NAMES: [&str; 15] = [
    "_InverseProjectionMatrix",
    "_ProjectionMatrix",
    "_InverseViewMatrix",
    "_ViewMatrix",
    "_WorldSpaceViewDir",
    "_ScreenResolution",
    "_PaddedResolution",
    "_PaddedScale",
    "stride",
    "numSteps",
    "minSmoothness",
    "_RenderScale",
    "reflectSky",
    "_Frame",
    "_DitherMode",
];

/// SSR trace/compose parameters: matches `SsrParams` in ssr.wgsl.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct SSRParams {
    pub inverse_projection: [[f32; 4]; 4],
    pub projection: [[f32; 4]; 4],
    pub inverse_view: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    /// xyz = camera forward in world space, w unused. Part of the parameter
    /// contract for replacement kernels; the built-in kernels do not read it.
    pub world_space_view_dir: [f32; 4],
    pub screen_resolution: [f32; 2],
    pub padded_resolution: [f32; 2],
    pub padded_scale: [f32; 2],
    pub stride: f32,
    pub num_steps: f32,
    pub min_smoothness: f32,
    /// Host render scale of the camera. Contract-only, like `world_space_view_dir`.
    pub render_scale: f32,
    pub reflect_sky: i32,
    pub frame: i32,
    pub dither_mode: i32,
    pub _pad1: i32,
    pub _pad2: i32,
    pub _pad3: i32,
}

/// Per-dispatch pyramid parameters: matches `PyramidParams` in depth_pyramid.wgsl.
///
/// One block per dispatch lives in a single buffer at
/// [`UNIFORM_OFFSET_ALIGNMENT`] stride: block 0 seeds slice 0, block `i + 1`
/// reduces slice `i` into slice `i + 1`.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct PyramidParams {
    /// Source actual resolution.
    pub sx: u32,
    pub sy: u32,
    /// Destination actual resolution.
    pub dx: u32,
    pub dy: u32,
    pub s_slice: u32,
    pub d_slice: u32,
    /// Camera depth texels per slice-0 texel (seed only).
    pub depth_scale: [f32; 2],
    pub _alignment_pad: [[u32; 4]; 14],
}

/// Size of the part of [`PyramidParams`] the shader actually reads.
pub const PYRAMID_PARAMS_BINDING_SIZE: u64 = 32;

/// Pyramid debug view parameters: matches `PyramidDebugParams` in depth_pyramid.wgsl.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct PyramidDebugParams {
    pub slice: u32,
    pub _pad0: u32,
    /// Actual (unpadded) resolution of the displayed slice.
    pub actual: [u32; 2],
    /// Depth range remapped to [0, 1] by the remap view.
    pub range: [f32; 2],
    pub _pad1: [f32; 2],
}

/// Scale/bias blit parameters: matches `BlitParams` in blit.wgsl.
/// Destination uv maps to source uv as `uv * scale + bias`.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct BlitParams {
    pub scale: [f32; 2],
    pub bias: [f32; 2],
}

/// Padded resolution of every pyramid slice, as stored in the slice resolution buffer.
pub type SliceResolutions = [[u32; 2]; PYRAMID_SLICES];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ssr_params_size() {
        // 4 matrices + vec4 + 3 vec2 + 4 scalars + 3 ints, rounded to 16.
        assert_eq!(std::mem::size_of::<SSRParams>(), 336);
        assert_eq!(std::mem::size_of::<SSRParams>() % 16, 0);
    }

    #[test]
    fn test_pyramid_params_fill_one_offset_slot() {
        assert_eq!(std::mem::size_of::<PyramidParams>() as u64, UNIFORM_OFFSET_ALIGNMENT);
        assert!(PYRAMID_PARAMS_BINDING_SIZE <= UNIFORM_OFFSET_ALIGNMENT);
    }

    #[test]
    fn test_small_blocks_are_16_byte_multiples() {
        assert_eq!(std::mem::size_of::<PyramidDebugParams>(), 32);
        assert_eq!(std::mem::size_of::<BlitParams>(), 16);
        assert_eq!(std::mem::size_of::<SliceResolutions>(), PYRAMID_SLICES * 8);
    }

    #[test]
    fn test_param_names_unique() {
        for (i, a) in SSR_PARAM_NAMES.iter().enumerate() {
            for b in &SSR_PARAM_NAMES[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
