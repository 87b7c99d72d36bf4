//! Frame stages and their dispatch plans.
//!
//! Each stage first builds a plan: pure data describing resolutions and an
//! ordered list of [`Dispatch`] records. GPU recording walks that list, so the
//! plan is exactly what reaches the device.

pub mod blit;
pub mod depth_pyramid;
pub mod ssr;

use limssr_gpu_shared::kernels::{PyramidKernel, SsrKernel};

/// Which command stream a dispatch is recorded into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubmissionQueue {
    AsyncCompute,
    Graphics,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Kernel {
    Pyramid(PyramidKernel),
    Ssr(SsrKernel),
    /// Scale/bias copy into the padded source.
    Blit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Dispatch {
    pub kernel: Kernel,
    pub queue: SubmissionQueue,
    /// Texels covered: the compute grid, or the render target size.
    pub extent: [u32; 2],
    /// 8x8 group counts, compute dispatches only.
    pub workgroups: Option<[u32; 2]>,
}

impl Dispatch {
    pub fn compute(kernel: Kernel, extent: [u32; 2]) -> Self {
        Self {
            kernel,
            queue: SubmissionQueue::AsyncCompute,
            extent,
            workgroups: Some(extent.map(limssr_gpu_shared::kernels::workgroups)),
        }
    }

    pub fn fullscreen(kernel: Kernel, extent: [u32; 2]) -> Self {
        Self {
            kernel,
            queue: SubmissionQueue::Graphics,
            extent,
            workgroups: None,
        }
    }
}
