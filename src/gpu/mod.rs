//! GPU escape-time engine.
//!
//! This module drives a WGSL compute kernel through wgpu for cross-platform
//! support (Vulkan, Metal, DX12). The kernel writes iteration counts; the
//! shared palette turns them into pixels on readback.

pub mod buffers;
pub mod device;
pub mod orchestrator;
pub mod shaders;

pub use buffers::{DeviceBuffers, KernelParams};
pub use device::{enumerate_gpus, select_gpu, GpuInfo, Precision};
pub use orchestrator::{GpuConfig, GpuOrchestrator, OrchestratorState};
pub use shaders::{bundled_source, KernelProgram, KernelSource, WORKGROUP_SIZE};
