//! Shared GPU data for LimSSR.
//!
//! Everything in here is plain data: uniform layouts that must match the WGSL
//! structs byte for byte, the kernel slot tables, and the embedded shader
//! sources. Backends depend on this crate; it depends on nothing GPU-specific.

pub mod kernels;
pub mod shaders;
pub mod uniforms;
