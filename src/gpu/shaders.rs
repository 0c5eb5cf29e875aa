//! Kernel source loading and compilation.
//!
//! The kernel is compiled once per device. Its bind group layout fixes the
//! argument order shared with the WGSL source: six scalar inputs followed
//! by the output array.

use crate::error::GpuError;
use crate::gpu::device::Precision;
use log::{debug, warn};
use pollster::block_on;
use std::path::PathBuf;
use wgpu::{BindGroupLayout, ComputePipeline, Device, PipelineLayout, ShaderModule};

/// Single-precision WGSL source bundled with the crate.
pub const MANDELBROT_WGSL: &str = include_str!("../shaders/mandelbrot.wgsl");

/// Double-precision variant, used when the device supports `f64`.
pub const MANDELBROT_F64_WGSL: &str = include_str!("../shaders/mandelbrot_f64.wgsl");

/// Bundled source for `precision`.
pub fn bundled_source(precision: Precision) -> &'static str {
    match precision {
        Precision::Single => MANDELBROT_WGSL,
        Precision::Double => MANDELBROT_F64_WGSL,
    }
}

/// Kernel entry point name.
pub const ENTRY_POINT: &str = "mandelbrot";

/// Workgroup edge length; must match `@workgroup_size` in the kernel.
pub const WORKGROUP_SIZE: u32 = 16;

/// Binding indices, in kernel argument order.
pub mod bindings {
    pub const ASPECT: u32 = 0;
    pub const SCALE: u32 = 1;
    pub const ITERATIONS: u32 = 2;
    pub const CENTER_X: u32 = 3;
    pub const CENTER_Y: u32 = 4;
    pub const LINE_SIZE: u32 = 5;
    pub const OUTPUT: u32 = 6;

    /// Number of scalar arguments preceding the output array.
    pub const SCALAR_COUNT: u32 = OUTPUT;
}

/// Where the kernel source text comes from.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum KernelSource {
    /// The WGSL compiled into the binary, in the device's precision.
    #[default]
    Bundled,
    /// A WGSL file read at initialization. Its float scalars must use the
    /// device's precision, since the scalar buffers are sized for it.
    File(PathBuf),
}

impl KernelSource {
    /// Returns the WGSL text for a device computing in `precision`.
    pub fn load(&self, precision: Precision) -> Result<String, GpuError> {
        match self {
            KernelSource::Bundled => Ok(bundled_source(precision).to_string()),
            KernelSource::File(path) => {
                std::fs::read_to_string(path).map_err(|source| GpuError::KernelSource {
                    path: path.clone(),
                    source,
                })
            }
        }
    }
}

/// A compiled kernel module plus the layouts its pipelines are built from.
pub struct KernelProgram {
    module: ShaderModule,
    bind_group_layout: BindGroupLayout,
    pipeline_layout: PipelineLayout,
}

impl KernelProgram {
    /// Compiles `source` on `device`.
    ///
    /// # Errors
    ///
    /// Returns `GpuError::KernelCompile` with the compiler messages if the
    /// source does not validate.
    pub fn compile(device: &Device, source: &str) -> Result<Self, GpuError> {
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("mandelbrot_kernel"),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });
        let info = block_on(module.get_compilation_info());
        let scope_error = block_on(device.pop_error_scope());

        let log = compilation_log(&info);
        if let Some(err) = scope_error {
            let log = if log.is_empty() { err.to_string() } else { log };
            return Err(GpuError::KernelCompile { log });
        }
        if !log.is_empty() {
            warn!("kernel compiled with messages:\n{}", log);
        }

        let entries: Vec<wgpu::BindGroupLayoutEntry> = (0..=bindings::OUTPUT)
            .map(|binding| wgpu::BindGroupLayoutEntry {
                binding,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage {
                        read_only: binding != bindings::OUTPUT,
                    },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            })
            .collect();

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("mandelbrot_bind_group_layout"),
            entries: &entries,
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("mandelbrot_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        debug!("kernel compiled ({} bytes of WGSL)", source.len());

        Ok(Self {
            module,
            bind_group_layout,
            pipeline_layout,
        })
    }

    /// Creates the compute pipeline (the dispatchable kernel) for this program.
    pub fn create_kernel(&self, device: &Device) -> ComputePipeline {
        device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("mandelbrot_pipeline"),
            layout: Some(&self.pipeline_layout),
            module: &self.module,
            entry_point: Some(ENTRY_POINT),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        })
    }

    /// Layout the output and scalar buffers are bound through.
    pub fn bind_group_layout(&self) -> &BindGroupLayout {
        &self.bind_group_layout
    }
}

fn compilation_log(info: &wgpu::CompilationInfo) -> String {
    info.messages
        .iter()
        .map(|msg| match &msg.location {
            Some(loc) => format!(
                "{:?} at {}:{}: {}",
                msg.message_type, loc.line_number, loc.line_position, msg.message
            ),
            None => format!("{:?}: {}", msg.message_type, msg.message),
        })
        .collect::<Vec<_>>()
        .join("\n")
}
