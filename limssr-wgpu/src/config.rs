//! Construction-time configuration for the SSR stages.

use limssr_gpu_shared::kernels::PyramidKernel;
use limssr_gpu_shared::uniforms::PYRAMID_SLICES;

use crate::resolution::{nearest_power_of_two, next_power_of_two};

/// Largest downsample factor that keeps `1 / (d + 1)` inside the resolution scale range.
pub const DOWNSAMPLE_CEILING: u32 = 9;

/// Bounds the settings setter clamps against.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SettingsBounds {
    max_downsample: u32,
}

impl Default for SettingsBounds {
    fn default() -> Self {
        Self { max_downsample: 2 }
    }
}

impl SettingsBounds {
    pub fn new(max_downsample: u32) -> Self {
        Self {
            max_downsample: max_downsample.min(DOWNSAMPLE_CEILING),
        }
    }

    pub fn max_downsample(&self) -> u32 {
        self.max_downsample
    }
}

/// How the Hi-Z working resolution is rounded to a power of two.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PaddingPolicy {
    /// Round each axis up. Every camera texel keeps its own slice-0 texel.
    #[default]
    NextPowerOfTwo,
    /// Round each axis to the closest power of two, squeezing the image when rounding down.
    NearestPowerOfTwo,
}

impl PaddingPolicy {
    pub fn pad(self, extent: u32) -> u32 {
        match self {
            PaddingPolicy::NextPowerOfTwo => next_power_of_two(extent),
            PaddingPolicy::NearestPowerOfTwo => nearest_power_of_two(extent),
        }
    }
}

/// Fixed configuration shared by the pyramid and the tracer.
/// Both stages must be built from the same value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SsrConfig {
    pub bounds: SettingsBounds,
    pub padding: PaddingPolicy,
}

/// Which debug visualisation of the pyramid to draw.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PyramidDebugView {
    #[default]
    Raw,
    Remapped,
    Cells,
}

impl PyramidDebugView {
    pub fn kernel(self) -> PyramidKernel {
        match self {
            PyramidDebugView::Raw => PyramidKernel::DebugSlice,
            PyramidDebugView::Remapped => PyramidKernel::DebugRemap,
            PyramidDebugView::Cells => PyramidKernel::DebugCells,
        }
    }
}

/// Draws one pyramid slice over the camera target.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PyramidDebug {
    pub slice: usize,
    /// Depth range mapped to black..white by [`PyramidDebugView::Remapped`].
    pub range: [f32; 2],
    pub view: PyramidDebugView,
}

impl Default for PyramidDebug {
    fn default() -> Self {
        Self {
            slice: 0,
            range: [0.0, 1.0],
            view: PyramidDebugView::Raw,
        }
    }
}

impl PyramidDebug {
    pub fn clamped(self) -> Self {
        let lo = if self.range[0].is_finite() { self.range[0] } else { 0.0 };
        let hi = if self.range[1].is_finite() { self.range[1] } else { 1.0 };
        Self {
            slice: self.slice.min(PYRAMID_SLICES - 1),
            range: [lo.min(hi), lo.max(hi)],
            view: self.view,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PyramidSettings {
    pub debug: Option<PyramidDebug>,
}

impl PyramidSettings {
    pub fn clamped(self) -> Self {
        Self {
            debug: self.debug.map(PyramidDebug::clamped),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_capped() {
        assert_eq!(SettingsBounds::default().max_downsample(), 2);
        assert_eq!(SettingsBounds::new(1).max_downsample(), 1);
        assert_eq!(SettingsBounds::new(40).max_downsample(), DOWNSAMPLE_CEILING);
    }

    #[test]
    fn test_padding_policies() {
        assert_eq!(PaddingPolicy::default(), PaddingPolicy::NextPowerOfTwo);
        assert_eq!(PaddingPolicy::NextPowerOfTwo.pad(540), 1024);
        assert_eq!(PaddingPolicy::NearestPowerOfTwo.pad(540), 512);
        assert_eq!(PaddingPolicy::NearestPowerOfTwo.pad(1024), 1024);
    }

    #[test]
    fn test_debug_clamped() {
        let debug = PyramidDebug {
            slice: 14,
            range: [0.9, 0.2],
            view: PyramidDebugView::Remapped,
        }
        .clamped();
        assert_eq!(debug.slice, 10);
        assert_eq!(debug.range, [0.2, 0.9]);
        assert_eq!(debug.view.kernel(), PyramidKernel::DebugRemap);

        let debug = PyramidDebug {
            range: [f32::NAN, 0.5],
            ..Default::default()
        }
        .clamped();
        assert_eq!(debug.range, [0.0, 0.5]);
    }
}
