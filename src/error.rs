//! Error types for rendering, GPU orchestration and statistics history.
//!
//! CPU engines report configuration problems immediately and stop the render.
//! GPU failures are grouped under [`GpuError`] so the CPU path stays usable
//! when no device can be found.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Unified error type for render requests.
#[derive(Error, Debug)]
pub enum RenderError {
    /// Width or height is zero.
    #[error("Configuration error: invalid dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    /// The caller-supplied pixel buffer does not hold exactly `width * height` pixels.
    #[error("Configuration error: pixel buffer holds {actual} pixels, expected {expected}")]
    BufferSize { expected: usize, actual: usize },

    /// `max_iterations` is zero.
    #[error("Configuration error: max iterations must be at least 1")]
    InvalidIterations,

    /// The view transform or a viewport operation was given a non-finite or non-positive value.
    #[error("Configuration error: {0}")]
    InvalidView(String),

    /// A benchmark was configured with zero trials.
    #[error("Configuration error: benchmark needs at least one trial")]
    InvalidTrials,

    /// The GPU engine was requested in a build without GPU support.
    #[error("GPU support not compiled (build with --features gpu)")]
    GpuUnavailable,

    /// GPU-specific errors.
    #[error("GPU error: {0}")]
    Gpu(#[from] GpuError),
}

impl RenderError {
    /// Returns true for the recoverable configuration family of errors.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            RenderError::InvalidDimensions { .. }
                | RenderError::BufferSize { .. }
                | RenderError::InvalidIterations
                | RenderError::InvalidView(_)
                | RenderError::InvalidTrials
        )
    }
}

/// GPU-specific errors.
#[derive(Error, Debug)]
pub enum GpuError {
    /// No GPU adapter found.
    #[error("No GPU adapter found")]
    NoAdapter,

    /// Specified GPU adapter not found.
    #[error("GPU adapter {index} not found (available: {available:?})")]
    AdapterNotFound {
        index: usize,
        available: Vec<String>,
    },

    /// Failed to request GPU device.
    #[error("Failed to request GPU device: {0}")]
    DeviceRequest(String),

    /// The kernel source file could not be read.
    #[error("Failed to read kernel source {}: {source}", path.display())]
    KernelSource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Kernel compilation failed; carries the compiler log.
    #[error("Kernel compilation failed:\n{log}")]
    KernelCompile { log: String },

    /// One or more device operations failed during a compute call.
    #[error("Device call failed: {}", diagnostics.join("; "))]
    DeviceCall { diagnostics: Vec<String> },

    /// Operation not permitted in the orchestrator's current state.
    #[error("Cannot {operation} while orchestrator is {state}")]
    InvalidState {
        operation: &'static str,
        state: String,
    },

    /// `recompute` was called with a resolution different from the allocated one.
    #[error("Resolution changed from {expected:?} to {requested:?}; release and compute_full first")]
    ResolutionChanged {
        expected: (u32, u32),
        requested: (u32, u32),
    },

    /// Buffer mapping failed.
    #[error("Buffer mapping failed: {0}")]
    BufferMapping(String),

    /// GPU operation timed out.
    #[error("GPU operation timed out after {0:?}")]
    Timeout(Duration),
}

/// Errors loading or saving the statistics history file.
#[derive(Error, Debug)]
pub enum HistoryError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed history file.
    #[error("Invalid history file: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_dimensions_display() {
        let err = RenderError::InvalidDimensions {
            width: 0,
            height: 768,
        };
        let msg = err.to_string();
        assert!(msg.contains("Configuration error"));
        assert!(msg.contains("0x768"));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_invalid_trials_is_configuration() {
        let err = RenderError::InvalidTrials;
        assert!(err.to_string().contains("at least one trial"));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_gpu_error_display() {
        let err = GpuError::NoAdapter;
        assert!(err.to_string().contains("No GPU adapter"));

        let err = GpuError::Timeout(Duration::from_secs(30));
        assert!(err.to_string().contains("30s"));
    }

    #[test]
    fn test_device_call_joins_diagnostics() {
        let err = GpuError::DeviceCall {
            diagnostics: vec!["scale buffer: out of memory".into(), "dispatch: lost".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("scale buffer: out of memory; dispatch: lost"));
    }

    #[test]
    fn test_kernel_compile_carries_log() {
        let err = GpuError::KernelCompile {
            log: "error: expected ';'".into(),
        };
        assert!(err.to_string().contains("expected ';'"));
    }

    #[test]
    fn test_adapter_not_found_display() {
        let err = GpuError::AdapterNotFound {
            index: 5,
            available: vec!["GPU 0".into(), "GPU 1".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("5"));
        assert!(msg.contains("GPU 0"));
    }

    #[test]
    fn test_gpu_error_to_render_error() {
        let err: RenderError = GpuError::NoAdapter.into();
        assert!(matches!(err, RenderError::Gpu(GpuError::NoAdapter)));
        assert!(!err.is_configuration());
    }
}
