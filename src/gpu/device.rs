//! GPU device enumeration and selection.
//!
//! Adapters are enumerated across every wgpu backend; the orchestrator
//! picks one by index or prefers a discrete GPU.

use crate::error::GpuError;
use pollster::block_on;
use std::fmt;
use wgpu::{
    Adapter, Backend, Backends, Device, DeviceType, Features, Instance, InstanceDescriptor, Limits,
    Queue,
};

/// Float width the kernel computes in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    /// `f32`; every adapter supports it.
    Single,
    /// `f64`; matches the CPU engines. Needs `Features::SHADER_F64`.
    Double,
}

impl Precision {
    /// Widest precision an adapter with `features` can run.
    pub fn supported_by(features: Features) -> Self {
        if features.contains(Features::SHADER_F64) {
            Precision::Double
        } else {
            Precision::Single
        }
    }

    /// Bytes per float scalar argument.
    pub fn float_size(self) -> u64 {
        match self {
            Precision::Single => 4,
            Precision::Double => 8,
        }
    }

    fn required_features(self) -> Features {
        match self {
            Precision::Single => Features::empty(),
            Precision::Double => Features::SHADER_F64,
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Precision::Single => write!(f, "f32"),
            Precision::Double => write!(f, "f64"),
        }
    }
}

/// An adapter the kernel can run on.
#[derive(Debug, Clone)]
pub struct GpuInfo {
    /// Position in [`enumerate_gpus`] order; stable for `--gpu-index`.
    pub index: usize,
    pub name: String,
    /// Human-readable PCI vendor.
    pub vendor: String,
    pub backend: Backend,
    pub device_type: DeviceType,
    pub driver: String,
    /// Kernel precision this adapter supports.
    pub precision: Precision,
}

impl GpuInfo {
    fn from_adapter(index: usize, adapter: &Adapter) -> Self {
        let info = adapter.get_info();
        Self {
            index,
            name: info.name,
            vendor: vendor_name(info.vendor),
            backend: info.backend,
            device_type: info.device_type,
            driver: info.driver,
            precision: Precision::supported_by(adapter.features()),
        }
    }

    /// Whether this is a dedicated card.
    pub fn is_discrete(&self) -> bool {
        self.device_type == DeviceType::DiscreteGpu
    }
}

impl fmt::Display for GpuInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} ({:?}, {:?}, {}",
            self.index, self.name, self.backend, self.device_type, self.precision
        )?;
        if !self.driver.is_empty() {
            write!(f, ", driver {}", self.driver)?;
        }
        write!(f, ")")
    }
}

fn adapters() -> Vec<Adapter> {
    let instance = Instance::new(&InstanceDescriptor::default());
    instance.enumerate_adapters(Backends::all())
}

/// Every adapter visible through any backend, possibly none.
pub fn enumerate_gpus() -> Vec<GpuInfo> {
    adapters()
        .iter()
        .enumerate()
        .map(|(index, adapter)| GpuInfo::from_adapter(index, adapter))
        .collect()
}

/// Picks the adapter at `index`, or the preferred one when `index` is `None`.
///
/// # Errors
///
/// `GpuError::NoAdapter` when nothing is enumerated, and
/// `GpuError::AdapterNotFound` (listing the names) for an out-of-range index.
pub fn select_gpu(index: Option<usize>) -> Result<(Adapter, GpuInfo), GpuError> {
    let mut adapters = adapters();
    if adapters.is_empty() {
        return Err(GpuError::NoAdapter);
    }

    let selected = index.unwrap_or_else(|| auto_select_gpu(&adapters));
    if selected >= adapters.len() {
        return Err(GpuError::AdapterNotFound {
            index: selected,
            available: adapters.iter().map(|a| a.get_info().name).collect(),
        });
    }

    let adapter = adapters.swap_remove(selected);
    let info = GpuInfo::from_adapter(selected, &adapter);
    Ok((adapter, info))
}

/// Index of the preferred adapter: discrete, then integrated, then virtual,
/// then whatever comes first.
fn auto_select_gpu(adapters: &[Adapter]) -> usize {
    let types: Vec<DeviceType> = adapters.iter().map(|a| a.get_info().device_type).collect();
    preferred_index(&types)
}

fn preferred_index(types: &[DeviceType]) -> usize {
    [
        DeviceType::DiscreteGpu,
        DeviceType::IntegratedGpu,
        DeviceType::VirtualGpu,
    ]
    .iter()
    .find_map(|wanted| types.iter().position(|t| t == wanted))
    .unwrap_or(0)
}

/// Device limits for rendering: the defaults, with buffer sizes raised to
/// what `adapter` supports so large resolutions fit in one output binding.
pub fn render_limits(adapter: &Adapter) -> Limits {
    let supported = adapter.limits();
    Limits {
        max_buffer_size: supported.max_buffer_size,
        max_storage_buffer_binding_size: supported.max_storage_buffer_binding_size,
        ..Limits::default()
    }
}

/// Opens a device and its command queue on `adapter` with [`render_limits`].
///
/// `Precision::Double` requests `SHADER_F64`.
pub fn open_device(adapter: &Adapter, precision: Precision) -> Result<(Device, Queue), GpuError> {
    open_device_with(adapter, precision, render_limits(adapter))
}

/// Opens a device with explicit `limits`.
pub fn open_device_with(
    adapter: &Adapter,
    precision: Precision,
    limits: Limits,
) -> Result<(Device, Queue), GpuError> {
    block_on(adapter.request_device(&wgpu::DeviceDescriptor {
        label: Some("mandelbench"),
        required_features: precision.required_features(),
        required_limits: limits,
        memory_hints: wgpu::MemoryHints::Performance,
        trace: wgpu::Trace::Off,
        experimental_features: wgpu::ExperimentalFeatures::disabled(),
    }))
    .map_err(|e| GpuError::DeviceRequest(e.to_string()))
}

const VENDORS: &[(u32, &str)] = &[
    (0x1002, "AMD"),
    (0x1010, "ImgTec"),
    (0x106B, "Apple"),
    (0x10DE, "NVIDIA"),
    (0x13B5, "ARM"),
    (0x5143, "Qualcomm"),
    (0x8086, "Intel"),
];

fn vendor_name(vendor_id: u32) -> String {
    VENDORS
        .iter()
        .find(|(id, _)| *id == vendor_id)
        .map(|(_, name)| name.to_string())
        .unwrap_or_else(|| format!("Unknown (0x{:04X})", vendor_id))
}
