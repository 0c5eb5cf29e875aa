//! GPU kernel orchestrator.
//!
//! Owns the device, command queue, compiled kernel and device buffers, and
//! moves through an explicit state machine:
//!
//! ```text
//! Uninitialized --initialize--> Ready --compute_full--> Allocated
//!                                 ^                        |  ^
//!                                 +-------release----------+  +--recompute
//! any --shutdown--> Released
//! ```
//!
//! `compute_full` pays for buffer allocation and kernel creation once per
//! resolution; `recompute` only re-uploads the six scalar arguments, so
//! interactive pan and zoom frames skip every allocation.

use crate::error::{GpuError, RenderError};
use crate::escape::Palette;
use crate::gpu::buffers::{DeviceBuffers, KernelParams};
use crate::gpu::device::{open_device, select_gpu, GpuInfo, Precision};
use crate::gpu::shaders::{KernelProgram, KernelSource, WORKGROUP_SIZE};
use crate::model::{EngineKind, RenderRequest};
use crate::traits::Engine;
use log::{debug, info, warn};
use pollster::block_on;
use std::fmt;
use std::time::{Duration, Instant};
use wgpu::{BindGroup, ComputePipeline, Device, Queue};

/// Default timeout for reading results back from the device.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// GPU orchestrator configuration.
#[derive(Debug, Clone)]
pub struct GpuConfig {
    /// Adapter index; auto-selects when None.
    pub adapter_index: Option<usize>,
    /// Where the kernel source is loaded from.
    pub kernel: KernelSource,
    /// Maximum wait for a readback.
    pub timeout: Duration,
    /// Shared iteration-to-color mapping applied on readback.
    pub palette: Palette,
}

impl Default for GpuConfig {
    fn default() -> Self {
        Self {
            adapter_index: None,
            kernel: KernelSource::Bundled,
            timeout: DEFAULT_TIMEOUT,
            palette: Palette::default(),
        }
    }
}

/// Observable orchestrator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    Uninitialized,
    Ready,
    Allocated { width: u32, height: u32 },
    Released,
}

impl fmt::Display for OrchestratorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrchestratorState::Uninitialized => write!(f, "uninitialized"),
            OrchestratorState::Ready => write!(f, "ready"),
            OrchestratorState::Allocated { width, height } => {
                write!(f, "allocated for {}x{}", width, height)
            }
            OrchestratorState::Released => write!(f, "released"),
        }
    }
}

struct DeviceContext {
    device: Device,
    queue: Queue,
    info: GpuInfo,
    program: KernelProgram,
}

struct Allocation {
    kernel: ComputePipeline,
    bind_group: BindGroup,
    buffers: DeviceBuffers,
    width: u32,
    height: u32,
}

impl Allocation {
    fn release(self) {
        let Allocation {
            kernel,
            bind_group,
            buffers,
            ..
        } = self;
        drop(bind_group);
        drop(kernel);
        buffers.destroy();
    }
}

enum Stage {
    Uninitialized,
    Ready(DeviceContext),
    Allocated(DeviceContext, Allocation),
    Released,
}

impl Stage {
    fn state(&self) -> OrchestratorState {
        match self {
            Stage::Uninitialized => OrchestratorState::Uninitialized,
            Stage::Ready(_) => OrchestratorState::Ready,
            Stage::Allocated(_, alloc) => OrchestratorState::Allocated {
                width: alloc.width,
                height: alloc.height,
            },
            Stage::Released => OrchestratorState::Released,
        }
    }
}

/// Runs `f` inside validation and out-of-memory error scopes, appending any
/// captured device error to `diagnostics` under `step`.
fn scoped<T>(device: &Device, step: &str, diagnostics: &mut Vec<String>, f: impl FnOnce() -> T) -> T {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
    let value = f();
    let out_of_memory = block_on(device.pop_error_scope());
    let validation = block_on(device.pop_error_scope());
    for error in [out_of_memory, validation].into_iter().flatten() {
        diagnostics.push(format!("{}: {}", step, error));
    }
    value
}

impl DeviceContext {
    fn allocate(&self, width: u32, height: u32, diagnostics: &mut Vec<String>) -> Allocation {
        let device = &self.device;
        let kernel = scoped(device, "create kernel", diagnostics, || {
            self.program.create_kernel(device)
        });
        let buffers = scoped(device, "allocate buffers", diagnostics, || {
            DeviceBuffers::new(device, width, height, self.info.precision)
        });
        let bind_group = scoped(device, "bind kernel arguments", diagnostics, || {
            buffers.bind(device, self.program.bind_group_layout())
        });
        Allocation {
            kernel,
            bind_group,
            buffers,
            width,
            height,
        }
    }

    /// Uploads scalars, dispatches, waits and reads back into `buffer`.
    ///
    /// Every step runs even if an earlier one reported an error; the caller's
    /// buffer is only written when all steps succeeded.
    fn run(
        &self,
        alloc: &Allocation,
        request: &RenderRequest,
        buffer: &mut [u32],
        palette: &Palette,
        timeout: Duration,
        mut diagnostics: Vec<String>,
    ) -> Result<(), GpuError> {
        let device = &self.device;
        let params = KernelParams::from_request(request);

        scoped(device, "upload scalars", &mut diagnostics, || {
            alloc.buffers.upload(&self.queue, &params)
        });

        scoped(device, "dispatch", &mut diagnostics, || {
            let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("mandelbrot_encoder"),
            });
            {
                let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some("mandelbrot_pass"),
                    timestamp_writes: None,
                });
                pass.set_pipeline(&alloc.kernel);
                pass.set_bind_group(0, &alloc.bind_group, &[]);
                pass.dispatch_workgroups(
                    alloc.width.div_ceil(WORKGROUP_SIZE),
                    alloc.height.div_ceil(WORKGROUP_SIZE),
                    1,
                );
            }
            encoder.copy_buffer_to_buffer(
                alloc.buffers.output(),
                0,
                alloc.buffers.staging(),
                0,
                alloc.buffers.output_size(),
            );
            self.queue.submit(Some(encoder.finish()));
        });

        if !diagnostics.is_empty() {
            warn!("device call reported {} error(s)", diagnostics.len());
            return Err(GpuError::DeviceCall { diagnostics });
        }

        self.read_back(alloc, request.max_iterations, buffer, palette, timeout)
    }

    /// Waits for the staging buffer to map, then colors each count into `buffer`.
    fn read_back(
        &self,
        alloc: &Allocation,
        max_iterations: u32,
        buffer: &mut [u32],
        palette: &Palette,
        timeout: Duration,
    ) -> Result<(), GpuError> {
        let staging = alloc.buffers.staging();
        let slice = staging.slice(..);

        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            tx.send(result).ok();
        });

        let start = Instant::now();
        loop {
            let _ = self.device.poll(wgpu::PollType::Poll);

            if let Ok(result) = rx.try_recv() {
                result.map_err(|e| GpuError::BufferMapping(e.to_string()))?;
                break;
            }

            if start.elapsed() > timeout {
                staging.unmap();
                return Err(GpuError::Timeout(timeout));
            }

            std::thread::sleep(Duration::from_micros(100));
        }

        {
            let data = slice.get_mapped_range();
            let counts: &[u32] = bytemuck::cast_slice(&data);
            for (pixel, &count) in buffer.iter_mut().zip(counts) {
                *pixel = palette.color(count, max_iterations);
            }
        }
        staging.unmap();

        Ok(())
    }
}

/// Drives the Mandelbrot kernel on one GPU device.
///
/// Not reentrant: callers serialize `compute_full`, `recompute` and
/// `release` through `&mut self`.
pub struct GpuOrchestrator {
    config: GpuConfig,
    stage: Stage,
}

impl GpuOrchestrator {
    /// Creates an uninitialized orchestrator.
    pub fn new(config: GpuConfig) -> Self {
        Self {
            config,
            stage: Stage::Uninitialized,
        }
    }

    /// Current state.
    pub fn state(&self) -> OrchestratorState {
        self.stage.state()
    }

    /// Information about the selected GPU, once initialized.
    pub fn gpu_info(&self) -> Option<&GpuInfo> {
        match &self.stage {
            Stage::Ready(ctx) | Stage::Allocated(ctx, _) => Some(&ctx.info),
            _ => None,
        }
    }

    /// Kernel precision of the selected GPU, once initialized.
    pub fn precision(&self) -> Option<Precision> {
        self.gpu_info().map(|info| info.precision)
    }

    fn invalid_state(&self, operation: &'static str) -> GpuError {
        GpuError::InvalidState {
            operation,
            state: self.state().to_string(),
        }
    }

    /// Selects a device, opens a queue and compiles the kernel.
    ///
    /// The kernel runs in `f64` when the adapter supports it and falls back
    /// to `f32` otherwise.
    ///
    /// # Errors
    ///
    /// Returns `GpuError::NoAdapter` when no device exists and
    /// `GpuError::KernelCompile` with the compiler log when the source is invalid.
    pub fn initialize(&mut self) -> Result<(), GpuError> {
        if !matches!(self.stage, Stage::Uninitialized) {
            return Err(self.invalid_state("initialize"));
        }

        let (adapter, info) = select_gpu(self.config.adapter_index)?;
        info!("using GPU {} ({})", info, info.vendor);
        if !info.is_discrete() {
            debug!("{} is not a discrete GPU", info.name);
        }

        if info.precision == Precision::Single {
            warn!(
                "{} has no 64-bit float support; GPU kernel falls back to f32 and deep zooms lose detail",
                info.name
            );
        }

        let (device, queue) = open_device(&adapter, info.precision)?;
        let source = self.config.kernel.load(info.precision)?;
        let program = KernelProgram::compile(&device, &source)?;

        self.stage = Stage::Ready(DeviceContext {
            device,
            queue,
            info,
            program,
        });
        debug!("orchestrator ready");
        Ok(())
    }

    /// Allocates buffers and the kernel for `request`'s resolution, then renders.
    ///
    /// Valid only when `Ready`. Moves to `Allocated` even if a device call
    /// fails, so `release` can still free whatever was created.
    pub fn compute_full(
        &mut self,
        request: &RenderRequest,
        buffer: &mut [u32],
    ) -> Result<f64, RenderError> {
        request.validate_buffer(buffer)?;

        let ctx = match std::mem::replace(&mut self.stage, Stage::Released) {
            Stage::Ready(ctx) => ctx,
            other => {
                self.stage = other;
                return Err(self.invalid_state("compute_full").into());
            }
        };

        let start = Instant::now();
        let mut diagnostics = Vec::new();
        let alloc = ctx.allocate(request.width, request.height, &mut diagnostics);
        debug!(
            "allocated kernel and buffers for {}",
            request.resolution_label()
        );

        let result = ctx.run(
            &alloc,
            request,
            buffer,
            &self.config.palette,
            self.config.timeout,
            diagnostics,
        );
        self.stage = Stage::Allocated(ctx, alloc);
        result?;

        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        debug!("GPU full compute finished in {:.2} ms", elapsed_ms);
        Ok(elapsed_ms)
    }

    /// Re-renders at the allocated resolution, uploading only the scalar arguments.
    ///
    /// Valid only when `Allocated` for `request.width x request.height`.
    pub fn recompute(
        &mut self,
        request: &RenderRequest,
        buffer: &mut [u32],
    ) -> Result<f64, RenderError> {
        request.validate_buffer(buffer)?;

        let Stage::Allocated(ctx, alloc) = &self.stage else {
            return Err(self.invalid_state("recompute").into());
        };
        if (alloc.width, alloc.height) != (request.width, request.height) {
            return Err(GpuError::ResolutionChanged {
                expected: (alloc.width, alloc.height),
                requested: (request.width, request.height),
            }
            .into());
        }

        let start = Instant::now();
        ctx.run(
            alloc,
            request,
            buffer,
            &self.config.palette,
            self.config.timeout,
            Vec::new(),
        )?;

        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        debug!("GPU recompute finished in {:.2} ms", elapsed_ms);
        Ok(elapsed_ms)
    }

    /// Frees the device buffers and kernel, keeping the device and compiled program.
    ///
    /// A no-op when already `Ready`.
    pub fn release(&mut self) -> Result<(), GpuError> {
        match std::mem::replace(&mut self.stage, Stage::Released) {
            Stage::Allocated(ctx, alloc) => {
                debug!("releasing allocation for {}x{}", alloc.width, alloc.height);
                alloc.release();
                self.stage = Stage::Ready(ctx);
                Ok(())
            }
            Stage::Ready(ctx) => {
                self.stage = Stage::Ready(ctx);
                Ok(())
            }
            other => {
                self.stage = other;
                Err(self.invalid_state("release"))
            }
        }
    }

    /// Releases everything, including the device. Terminal.
    pub fn shutdown(&mut self) {
        if let Stage::Allocated(_, alloc) = std::mem::replace(&mut self.stage, Stage::Released) {
            alloc.release();
        }
    }
}

impl Drop for GpuOrchestrator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Engine for GpuOrchestrator {
    fn kind(&self) -> EngineKind {
        EngineKind::Gpu
    }

    fn describe(&self) -> String {
        match self.gpu_info() {
            Some(info) => format!("{} ({:?}, {})", info.name, info.backend, info.precision),
            None => format!("GPU ({})", self.state()),
        }
    }

    /// Initializes on first use, then picks `recompute` when the resolution
    /// matches the current allocation and `compute_full` otherwise.
    fn render(&mut self, request: &RenderRequest, buffer: &mut [u32]) -> Result<f64, RenderError> {
        request.validate_buffer(buffer)?;

        match self.state() {
            OrchestratorState::Uninitialized => {
                self.initialize()?;
                self.compute_full(request, buffer)
            }
            OrchestratorState::Ready => self.compute_full(request, buffer),
            OrchestratorState::Allocated { width, height }
                if (width, height) == (request.width, request.height) =>
            {
                self.recompute(request, buffer)
            }
            OrchestratorState::Allocated { .. } => {
                self.release()?;
                self.compute_full(request, buffer)
            }
            OrchestratorState::Released => Err(self.invalid_state("render").into()),
        }
    }

    fn reset(&mut self) -> Result<(), RenderError> {
        match self.state() {
            OrchestratorState::Allocated { .. } => Ok(self.release()?),
            _ => Ok(()),
        }
    }
}
