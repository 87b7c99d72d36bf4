//! Resolution math shared by the pyramid and the tracer.
//!
//! Both stages derive their working resolution from the same inputs (camera
//! size, [`ResolutionScale`], [`PaddingPolicy`]) so that pyramid slice 0 and the
//! Hi-Z trace target always agree texel for texel.

use limssr_gpu_shared::uniforms::{SliceResolutions, PYRAMID_SLICES};

use crate::config::PaddingPolicy;

pub const MIN_RESOLUTION_SCALE: f32 = 0.1;
pub const MAX_RESOLUTION_SCALE: f32 = 2.0;

/// Frame-scoped resolution scale, clamped to `[0.1, 2.0]` on every write.
/// The inverse is stored alongside so consumers never divide.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ResolutionScale {
    value: f32,
    inverse: f32,
}

impl Default for ResolutionScale {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl ResolutionScale {
    pub fn new(value: f32) -> Self {
        let value = if value.is_finite() {
            value.clamp(MIN_RESOLUTION_SCALE, MAX_RESOLUTION_SCALE)
        } else {
            1.0
        };
        Self {
            value,
            inverse: 1.0 / value,
        }
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn inverse(&self) -> f32 {
        self.inverse
    }

    /// `floor(extent * scale)`, never below one texel.
    pub fn apply(&self, extent: [u32; 2]) -> [u32; 2] {
        extent.map(|e| ((e as f32 * self.value).floor() as u32).max(1))
    }
}

pub fn next_power_of_two(v: u32) -> u32 {
    v.max(1).checked_next_power_of_two().unwrap_or(1 << 31)
}

/// Closest power of two; ties round up.
pub fn nearest_power_of_two(v: u32) -> u32 {
    let v = v.max(1);
    let up = next_power_of_two(v);
    if up == v {
        return v;
    }
    let down = up >> 1;
    if v - down < up.saturating_sub(v) {
        down
    } else {
        up
    }
}

/// One level of the depth pyramid.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TargetSlice {
    pub index: usize,
    /// Power-of-two allocation size of this level.
    pub padded: [u32; 2],
    /// Region holding valid depth; the rest is padding.
    pub actual: [u32; 2],
    /// `padded[i] / padded[0]`.
    pub scale: [f32; 2],
}

/// The 11 slices of a pyramid, derived from slice 0.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SliceChain {
    slices: [TargetSlice; PYRAMID_SLICES],
}

impl SliceChain {
    pub fn new(padded0: [u32; 2], actual0: [u32; 2]) -> Self {
        let padded0 = padded0.map(|p| p.max(1));
        let actual0 = [actual0[0].clamp(1, padded0[0]), actual0[1].clamp(1, padded0[1])];
        let slices = std::array::from_fn(|index| {
            let padded = padded0.map(|p| (p >> index).max(1));
            let actual = actual0.map(|a| a.div_ceil(1 << index).max(1));
            TargetSlice {
                index,
                padded,
                actual,
                scale: [
                    padded[0] as f32 / padded0[0] as f32,
                    padded[1] as f32 / padded0[1] as f32,
                ],
            }
        });
        Self { slices }
    }

    pub fn slice(&self, index: usize) -> &TargetSlice {
        &self.slices[index]
    }

    pub fn iter(&self) -> impl Iterator<Item = &TargetSlice> {
        self.slices.iter()
    }

    /// Contents of the slice resolution buffer.
    pub fn padded_resolutions(&self) -> SliceResolutions {
        self.slices.map(|s| s.padded)
    }
}

/// Resolution the tracer (and, in Hi-Z mode, the pyramid) works at.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WorkingResolution {
    pub camera: [u32; 2],
    /// Camera size after the resolution scale.
    pub scaled: [u32; 2],
    /// Allocation size. Equal to `actual` when no padding applies.
    pub padded: [u32; 2],
    /// Region of `padded` that maps onto the camera.
    pub actual: [u32; 2],
    /// `padded / actual`; camera uv maps to padded uv as `uv / padded_scale`.
    pub padded_scale: [f32; 2],
}

impl WorkingResolution {
    /// Hi-Z path: scale, then pad per axis.
    pub fn hiz(camera: [u32; 2], scale: &ResolutionScale, padding: PaddingPolicy) -> Self {
        let scaled = scale.apply(camera);
        let padded = scaled.map(|e| padding.pad(e));
        let actual = [scaled[0].min(padded[0]), scaled[1].min(padded[1])];
        Self {
            camera,
            scaled,
            padded,
            actual,
            padded_scale: [
                padded[0] as f32 / actual[0] as f32,
                padded[1] as f32 / actual[1] as f32,
            ],
        }
    }

    /// Linear path: integer divide by `downsample + 1`, no padding.
    pub fn linear(camera: [u32; 2], downsample: u32) -> Self {
        let divisor = downsample + 1;
        let scaled = camera.map(|e| e.div_ceil(divisor).max(1));
        Self {
            camera,
            scaled,
            padded: scaled,
            actual: scaled,
            padded_scale: [1.0, 1.0],
        }
    }

    pub fn is_padded(&self) -> bool {
        self.padded != self.actual
    }

    pub fn slices(&self) -> SliceChain {
        SliceChain::new(self.padded, self.actual)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_clamps_and_keeps_inverse() {
        for v in [0.0, 0.05, 0.1, 0.5, 1.0, 1.7, 2.0, 3.5, -1.0, f32::NAN, f32::INFINITY] {
            let s = ResolutionScale::new(v);
            assert!(s.value() >= MIN_RESOLUTION_SCALE && s.value() <= MAX_RESOLUTION_SCALE);
            assert!((s.inverse() - 1.0 / s.value()).abs() < 1e-6);
        }
        assert_eq!(ResolutionScale::new(f32::NAN).value(), 1.0);
        assert_eq!(ResolutionScale::default().value(), 1.0);
    }

    #[test]
    fn test_padding_is_idempotent() {
        for v in [1, 2, 64, 512, 1024, 4096] {
            assert_eq!(next_power_of_two(v), v);
            assert_eq!(nearest_power_of_two(v), v);
        }
        assert_eq!(next_power_of_two(960), 1024);
        assert_eq!(next_power_of_two(540), 1024);
        assert_eq!(nearest_power_of_two(540), 512);
        assert_eq!(nearest_power_of_two(960), 1024);
        assert_eq!(nearest_power_of_two(3), 4);
        assert_eq!(next_power_of_two(0), 1);
    }

    #[test]
    fn test_slice_padded_halves() {
        let chain = SliceChain::new([1024, 512], [960, 512]);
        for slice in chain.iter() {
            let i = slice.index;
            assert_eq!(slice.padded, [(1024u32 >> i).max(1), (512u32 >> i).max(1)]);
        }
        assert_eq!(chain.slice(10).padded, [1, 1]);
    }

    #[test]
    fn test_slice_scale() {
        let chain = SliceChain::new([1024, 512], [1024, 512]);
        assert_eq!(chain.slice(0).scale, [1.0, 1.0]);
        for slice in chain.iter() {
            let p0 = chain.slice(0).padded;
            assert_eq!(slice.scale[0], slice.padded[0] as f32 / p0[0] as f32);
            assert_eq!(slice.scale[1], slice.padded[1] as f32 / p0[1] as f32);
        }
        // y bottoms out at 1 before x does
        assert_eq!(chain.slice(9).padded, [2, 1]);
        assert_eq!(chain.slice(9).scale, [2.0 / 1024.0, 1.0 / 512.0]);
    }

    #[test]
    fn test_slice_actual_rounds_up_within_padded() {
        let chain = SliceChain::new([1024, 1024], [960, 540]);
        assert_eq!(chain.slice(0).actual, [960, 540]);
        assert_eq!(chain.slice(1).actual, [480, 270]);
        assert_eq!(chain.slice(2).actual, [240, 135]);
        assert_eq!(chain.slice(3).actual, [120, 68]);
        for slice in chain.iter() {
            assert!(slice.actual[0] <= slice.padded[0]);
            assert!(slice.actual[1] <= slice.padded[1]);
        }
        assert_eq!(chain.padded_resolutions()[3], [128, 128]);
    }

    #[test]
    fn test_hiz_working_resolution() {
        let scale = ResolutionScale::new(0.5);
        let next = WorkingResolution::hiz([1920, 1080], &scale, PaddingPolicy::NextPowerOfTwo);
        assert_eq!(next.scaled, [960, 540]);
        assert_eq!(next.padded, [1024, 1024]);
        assert_eq!(next.actual, [960, 540]);
        assert!(next.is_padded());
        assert!((next.padded_scale[0] - 1024.0 / 960.0).abs() < 1e-6);

        let nearest = WorkingResolution::hiz([1920, 1080], &scale, PaddingPolicy::NearestPowerOfTwo);
        assert_eq!(nearest.padded, [1024, 512]);
        assert_eq!(nearest.actual, [960, 512]);
    }

    #[test]
    fn test_linear_working_resolution() {
        let full = WorkingResolution::linear([1920, 1080], 0);
        assert_eq!(full.padded, [1920, 1080]);
        assert!(!full.is_padded());
        assert_eq!(full.padded_scale, [1.0, 1.0]);
        assert_eq!(WorkingResolution::linear([1919, 1079], 1).actual, [960, 540]);
    }
}
