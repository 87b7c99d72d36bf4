/// Embedded WGSL sources for the LimSSR kernels.
/// Shader library names map onto these in `limssr-wgpu`.

pub const FULLSCREEN_QUAD_VERT: &str = include_str!("../shaders/fullscreen_quad.wgsl");
pub const SSR_SHADER: &str = include_str!("../shaders/ssr.wgsl");
pub const DEPTH_PYRAMID_SHADER: &str = include_str!("../shaders/depth_pyramid.wgsl");
pub const BLIT_FRAG: &str = include_str!("../shaders/blit.wgsl");
