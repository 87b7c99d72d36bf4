//! Kernel slot tables.
//!
//! Each shader module exposes its kernels by slot index; the slot maps to a
//! WGSL entry point. Hosts and debug tooling refer to kernels by slot.

/// Thread group edge length used by every compute kernel (8x8 groups).
pub const WORKGROUP_SIZE: u32 = 8;

/// Kernels of the SSR module (`ssr.wgsl`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SsrKernel {
    TraceLinear,
    Compose,
    TraceHiZ,
}

impl SsrKernel {
    pub const ALL: [SsrKernel; 3] = [SsrKernel::TraceLinear, SsrKernel::Compose, SsrKernel::TraceHiZ];

    pub fn slot(self) -> u32 {
        match self {
            SsrKernel::TraceLinear => 0,
            SsrKernel::Compose => 1,
            SsrKernel::TraceHiZ => 2,
        }
    }

    pub fn entry_point(self) -> &'static str {
        match self {
            SsrKernel::TraceLinear => "trace_linear",
            SsrKernel::Compose => "compose",
            SsrKernel::TraceHiZ => "trace_hiz",
        }
    }

    pub fn from_slot(slot: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.slot() == slot)
    }
}

/// Kernels of the depth pyramid module (`depth_pyramid.wgsl`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PyramidKernel {
    Reduce,
    Seed,
    DebugSlice,
    DebugRemap,
    DebugCells,
}

impl PyramidKernel {
    pub const ALL: [PyramidKernel; 5] = [
        PyramidKernel::Reduce,
        PyramidKernel::Seed,
        PyramidKernel::DebugSlice,
        PyramidKernel::DebugRemap,
        PyramidKernel::DebugCells,
    ];

    pub fn slot(self) -> u32 {
        match self {
            PyramidKernel::Reduce => 0,
            PyramidKernel::Seed => 1,
            PyramidKernel::DebugSlice => 2,
            PyramidKernel::DebugRemap => 3,
            PyramidKernel::DebugCells => 4,
        }
    }

    pub fn entry_point(self) -> &'static str {
        match self {
            PyramidKernel::Reduce => "reduce",
            PyramidKernel::Seed => "seed",
            PyramidKernel::DebugSlice => "debug_slice",
            PyramidKernel::DebugRemap => "debug_remap",
            PyramidKernel::DebugCells => "debug_cells",
        }
    }

    pub fn is_debug(self) -> bool {
        self.slot() >= 2
    }

    pub fn from_slot(slot: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.slot() == slot)
    }
}

/// Number of workgroups needed to cover `extent` texels, at least one.
pub fn workgroups(extent: u32) -> u32 {
    extent.div_ceil(WORKGROUP_SIZE).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ssr_slots() {
        assert_eq!(SsrKernel::TraceLinear.slot(), 0);
        assert_eq!(SsrKernel::Compose.slot(), 1);
        assert_eq!(SsrKernel::TraceHiZ.slot(), 2);
        assert_eq!(SsrKernel::from_slot(2), Some(SsrKernel::TraceHiZ));
        assert_eq!(SsrKernel::from_slot(3), None);
    }

    #[test]
    fn test_pyramid_slots() {
        assert_eq!(PyramidKernel::Reduce.slot(), 0);
        assert_eq!(PyramidKernel::Seed.slot(), 1);
        let debug: Vec<u32> = PyramidKernel::ALL
            .iter()
            .filter(|k| k.is_debug())
            .map(|k| k.slot())
            .collect();
        assert_eq!(debug, vec![2, 3, 4]);
    }

    #[test]
    fn test_workgroups_round_up() {
        assert_eq!(workgroups(1920), 240);
        assert_eq!(workgroups(1921), 241);
        assert_eq!(workgroups(1), 1);
        assert_eq!(workgroups(0), 1);
    }
}
