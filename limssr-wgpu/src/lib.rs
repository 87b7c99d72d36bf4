//! LimSSR: screen-space reflections for wgpu.
//!
//! Two frame stages cooperate through a [`FrameContext`]:
//! [`DepthPyramid`] builds an 11-slice min-depth pyramid on the async compute
//! stream, and [`ScreenSpaceReflections`] traces (linear or Hi-Z) and composes
//! the reflection over the camera color. A host drives both through
//! [`FrameScheduler`] or its own scheduler implementing the same order.

pub mod backend;
pub mod config;
pub mod error;
pub mod frame;
pub mod passes;
pub mod pipeline;
pub mod render_targets;
pub mod resolution;
pub mod scene;
pub mod settings;
pub mod shader_library;

pub use config::{PaddingPolicy, PyramidDebug, PyramidDebugView, PyramidSettings, SettingsBounds, SsrConfig};
pub use error::{ErrorKind, Result, SsrError};
pub use frame::{
    CameraDescriptor, CameraTargets, DescriptorHost, FrameContext, FrameReport, FrameScheduler, FrameStage, GpuFrame,
    HostAdapter,
};
pub use passes::depth_pyramid::{DepthPyramid, DEPTH_PYRAMID_FEATURE};
pub use passes::ssr::{ScreenSpaceReflections, SSR_FEATURE};
pub use resolution::ResolutionScale;
pub use settings::{DitherMode, Settings, TraceMode, TracingMode};
pub use shader_library::ShaderLibrary;

use std::sync::Arc;

/// A scheduler holding the pyramid and SSR stages, both built from `config`.
pub fn reflection_scheduler(config: SsrConfig, settings: Settings, library: Arc<ShaderLibrary>) -> FrameScheduler {
    let mut scheduler = FrameScheduler::new();
    scheduler.add_stage(Box::new(DepthPyramid::new(config, library.clone())));
    scheduler.add_stage(Box::new(ScreenSpaceReflections::new(config, settings, library)));
    scheduler
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reflection_scheduler_order() {
        let mut scheduler = reflection_scheduler(
            SsrConfig::default(),
            Settings::default(),
            Arc::new(ShaderLibrary::builtin()),
        );
        assert_eq!(scheduler.stage_names(), vec![DEPTH_PYRAMID_FEATURE, SSR_FEATURE]);
        assert_eq!(scheduler.scale().value(), 1.0);

        let ssr = scheduler.stage_mut::<ScreenSpaceReflections>().unwrap();
        ssr.set_settings(Settings {
            tracing_mode: TracingMode::HiZ,
            ..Default::default()
        });
        assert_eq!(ssr.settings().tracing_mode, TracingMode::HiZ);
        assert!(scheduler.stage_mut::<DepthPyramid>().is_some());
    }
}
