//! Device buffers for the Mandelbrot kernel.
//!
//! Six single-value scalar buffers feed the kernel its view parameters. The
//! four float scalars are sized for the kernel precision.
//! The output buffer holds one `u32` iteration count per pixel and is sized
//! for exactly one resolution; a CPU-mappable staging buffer of the same
//! size receives the copy for readback.

use crate::gpu::device::Precision;
use crate::gpu::shaders::bindings;
use crate::model::RenderRequest;
use bytesize::ByteSize;
use log::debug;
use wgpu::{BindGroup, BindGroupLayout, Buffer, BufferUsages, Device, Queue};

/// Bytes per output pixel.
pub const PIXEL_SIZE: u64 = std::mem::size_of::<u32>() as u64;

/// Scalar kernel arguments. Floats are narrowed on upload when the kernel
/// runs in single precision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KernelParams {
    pub aspect: f64,
    pub scale: f64,
    pub iterations: u32,
    pub center_x: f64,
    pub center_y: f64,
    pub line_size: u32,
}

impl KernelParams {
    pub fn from_request(request: &RenderRequest) -> Self {
        Self {
            aspect: request.aspect(),
            scale: request.transform.scale,
            iterations: request.max_iterations,
            center_x: request.transform.center_x,
            center_y: request.transform.center_y,
            line_size: request.width,
        }
    }
}

/// Buffers owned by one allocation of the orchestrator.
pub struct DeviceBuffers {
    aspect: Buffer,
    scale: Buffer,
    iterations: Buffer,
    center_x: Buffer,
    center_y: Buffer,
    line_size: Buffer,
    output: Buffer,
    staging: Buffer,
    output_size: u64,
    precision: Precision,
}

fn scalar_buffer(device: &Device, label: &'static str, size: u64) -> Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size,
        usage: BufferUsages::STORAGE | BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

impl DeviceBuffers {
    /// Allocates scalar, output and staging buffers for a `width x height` image.
    pub fn new(device: &Device, width: u32, height: u32, precision: Precision) -> Self {
        let output_size = width as u64 * height as u64 * PIXEL_SIZE;

        let output = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("output_buffer"),
            size: output_size,
            usage: BufferUsages::STORAGE | BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });

        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("output_staging_buffer"),
            size: output_size,
            usage: BufferUsages::MAP_READ | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        debug!(
            "allocated output buffers for {}x{} ({} each)",
            width,
            height,
            ByteSize::b(output_size)
        );

        let float = precision.float_size();
        Self {
            aspect: scalar_buffer(device, "aspect_buffer", float),
            scale: scalar_buffer(device, "scale_buffer", float),
            iterations: scalar_buffer(device, "iterations_buffer", 4),
            center_x: scalar_buffer(device, "center_x_buffer", float),
            center_y: scalar_buffer(device, "center_y_buffer", float),
            line_size: scalar_buffer(device, "line_size_buffer", 4),
            output,
            staging,
            output_size,
            precision,
        }
    }

    /// Byte size of the output buffer.
    pub fn output_size(&self) -> u64 {
        self.output_size
    }

    /// Precision the float scalars are stored in.
    pub fn precision(&self) -> Precision {
        self.precision
    }

    /// Returns a reference to the output buffer.
    pub fn output(&self) -> &Buffer {
        &self.output
    }

    /// Returns a reference to the readback staging buffer.
    pub fn staging(&self) -> &Buffer {
        &self.staging
    }

    /// Buffers in kernel argument order.
    fn in_binding_order(&self) -> [(u32, &Buffer); 7] {
        [
            (bindings::ASPECT, &self.aspect),
            (bindings::SCALE, &self.scale),
            (bindings::ITERATIONS, &self.iterations),
            (bindings::CENTER_X, &self.center_x),
            (bindings::CENTER_Y, &self.center_y),
            (bindings::LINE_SIZE, &self.line_size),
            (bindings::OUTPUT, &self.output),
        ]
    }

    /// Binds every buffer to its kernel argument slot.
    pub fn bind(&self, device: &Device, layout: &BindGroupLayout) -> BindGroup {
        let entries: Vec<wgpu::BindGroupEntry> = self
            .in_binding_order()
            .into_iter()
            .map(|(binding, buffer)| wgpu::BindGroupEntry {
                binding,
                resource: buffer.as_entire_binding(),
            })
            .collect();

        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("mandelbrot_bind_group"),
            layout,
            entries: &entries,
        })
    }

    /// Enqueues transfers of the six scalar values.
    pub fn upload(&self, queue: &Queue, params: &KernelParams) {
        self.write_float(queue, &self.aspect, params.aspect);
        self.write_float(queue, &self.scale, params.scale);
        queue.write_buffer(&self.iterations, 0, bytemuck::bytes_of(&params.iterations));
        self.write_float(queue, &self.center_x, params.center_x);
        self.write_float(queue, &self.center_y, params.center_y);
        queue.write_buffer(&self.line_size, 0, bytemuck::bytes_of(&params.line_size));
    }

    fn write_float(&self, queue: &Queue, buffer: &Buffer, value: f64) {
        match self.precision {
            Precision::Single => queue.write_buffer(buffer, 0, bytemuck::bytes_of(&(value as f32))),
            Precision::Double => queue.write_buffer(buffer, 0, bytemuck::bytes_of(&value)),
        }
    }

    /// Frees the device memory behind every buffer.
    pub fn destroy(self) {
        for (_, buffer) in self.in_binding_order() {
            buffer.destroy();
        }
        self.staging.destroy();
        debug!("released {} output buffers", ByteSize::b(self.output_size));
    }
}
