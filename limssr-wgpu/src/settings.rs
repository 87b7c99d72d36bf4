//! Runtime SSR settings and the validating setter.

use crate::config::SettingsBounds;

pub const MIN_STEP_STRIDE: f32 = 0.001;
pub const MIN_MAX_STEPS: f32 = 8.0;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TracingMode {
    #[default]
    Linear,
    HiZ,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DitherMode {
    Grid8x8,
    #[default]
    InterleavedGradient,
}

impl DitherMode {
    /// Value of the `_DitherMode` shader parameter.
    pub fn shader_value(self) -> i32 {
        match self {
            DitherMode::Grid8x8 => 0,
            DitherMode::InterleavedGradient => 1,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Settings {
    /// View-space march step (linear mode).
    pub step_stride: f32,
    /// Iteration cap for both tracing modes.
    pub max_steps: f32,
    /// Working resolution divisor minus one.
    pub downsample: u32,
    /// Surfaces smoother than this reflect.
    pub min_smoothness: f32,
    pub tracing_mode: TracingMode,
    pub dither_mode: DitherMode,
    /// Hi-Z only: rays leaving through the far plane pick up the sky.
    pub reflect_sky: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            step_stride: 0.03,
            max_steps: 128.0,
            downsample: 0,
            min_smoothness: 0.5,
            tracing_mode: TracingMode::Linear,
            dither_mode: DitherMode::InterleavedGradient,
            reflect_sky: true,
        }
    }
}

fn finite_or(value: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}

impl Settings {
    /// Every field forced into its valid range. Non-finite floats take the default first.
    pub fn clamped(self, bounds: &SettingsBounds) -> Self {
        let defaults = Settings::default();
        Self {
            step_stride: finite_or(self.step_stride, defaults.step_stride).max(MIN_STEP_STRIDE),
            max_steps: finite_or(self.max_steps, defaults.max_steps).max(MIN_MAX_STEPS),
            downsample: self.downsample.min(bounds.max_downsample()),
            min_smoothness: finite_or(self.min_smoothness, defaults.min_smoothness).clamp(0.0, 1.0),
            ..self
        }
    }

    /// Resolution scale the tracer publishes for the frame.
    pub fn resolution_scale(&self) -> f32 {
        1.0 / (self.downsample + 1) as f32
    }

    /// The parameters that matter for the selected tracing mode.
    pub fn trace_mode(&self) -> TraceMode {
        match self.tracing_mode {
            TracingMode::Linear => TraceMode::Linear {
                stride: self.step_stride,
                max_steps: self.max_steps,
                downsample: self.downsample,
            },
            TracingMode::HiZ => TraceMode::HiZ {
                max_steps: self.max_steps,
                downsample: self.downsample,
                reflect_sky: self.reflect_sky,
            },
        }
    }
}

/// Tracing mode together with the settings it consumes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TraceMode {
    Linear { stride: f32, max_steps: f32, downsample: u32 },
    HiZ { max_steps: f32, downsample: u32, reflect_sky: bool },
}

impl TraceMode {
    pub fn tracing_mode(&self) -> TracingMode {
        match self {
            TraceMode::Linear { .. } => TracingMode::Linear,
            TraceMode::HiZ { .. } => TracingMode::HiZ,
        }
    }

    pub fn downsample(&self) -> u32 {
        match *self {
            TraceMode::Linear { downsample, .. } | TraceMode::HiZ { downsample, .. } => downsample,
        }
    }

    pub fn max_steps(&self) -> f32 {
        match *self {
            TraceMode::Linear { max_steps, .. } | TraceMode::HiZ { max_steps, .. } => max_steps,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_in_range(s: &Settings, bounds: &SettingsBounds) {
        assert!(s.step_stride >= MIN_STEP_STRIDE);
        assert!(s.max_steps >= MIN_MAX_STEPS);
        assert!(s.downsample <= bounds.max_downsample());
        assert!((0.0..=1.0).contains(&s.min_smoothness));
    }

    #[test]
    fn test_defaults_are_valid() {
        let bounds = SettingsBounds::default();
        let s = Settings::default();
        assert_eq!(s.clamped(&bounds), s);
        assert_eq!(s.tracing_mode, TracingMode::Linear);
        assert_eq!(s.dither_mode, DitherMode::InterleavedGradient);
    }

    #[test]
    fn test_max_steps_floor() {
        let s = Settings {
            max_steps: 4.0,
            ..Default::default()
        }
        .clamped(&SettingsBounds::default());
        assert_eq!(s.max_steps, 8.0);
    }

    #[test]
    fn test_clamp_out_of_range() {
        let bounds = SettingsBounds::default();
        let inputs = [
            Settings {
                step_stride: -3.0,
                max_steps: -1.0,
                downsample: 7,
                min_smoothness: 1.5,
                ..Default::default()
            },
            Settings {
                step_stride: 0.0,
                max_steps: 0.0,
                downsample: u32::MAX,
                min_smoothness: -0.2,
                ..Default::default()
            },
            Settings {
                step_stride: f32::NAN,
                max_steps: f32::INFINITY,
                downsample: 2,
                min_smoothness: f32::NAN,
                ..Default::default()
            },
        ];
        for input in inputs {
            let s = input.clamped(&bounds);
            assert_in_range(&s, &bounds);
            // clamping twice changes nothing
            assert_eq!(s.clamped(&bounds), s);
        }

        let s = inputs[2].clamped(&bounds);
        assert_eq!(s.step_stride, 0.03);
        assert_eq!(s.max_steps, 128.0);
        assert_eq!(s.min_smoothness, 0.5);
    }

    #[test]
    fn test_downsample_follows_bounds() {
        let s = Settings {
            downsample: 2,
            ..Default::default()
        };
        assert_eq!(s.clamped(&SettingsBounds::new(1)).downsample, 1);
        assert_eq!(s.clamped(&SettingsBounds::new(2)).downsample, 2);
    }

    #[test]
    fn test_trace_mode_variant() {
        let s = Settings {
            tracing_mode: TracingMode::HiZ,
            downsample: 1,
            reflect_sky: false,
            ..Default::default()
        };
        assert_eq!(
            s.trace_mode(),
            TraceMode::HiZ {
                max_steps: 128.0,
                downsample: 1,
                reflect_sky: false
            }
        );
        assert_eq!(s.trace_mode().tracing_mode(), TracingMode::HiZ);
        assert_eq!(s.resolution_scale(), 0.5);
        assert_eq!(DitherMode::Grid8x8.shader_value(), 0);
    }
}
