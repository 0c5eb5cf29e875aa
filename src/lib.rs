//! Mandelbrot escape-time rendering with interchangeable engines.
//!
//! Three engines produce identical-format pixel buffers: a single-threaded
//! reference, a row-partitioned multi-threaded engine and (with the `gpu`
//! feature) a wgpu compute kernel. Around them sit a viewport controller
//! for interactive pan and zoom, timing statistics with JSON history and a
//! repeated-trial benchmark.

pub mod benchmark;
pub mod cpu;
pub mod error;
pub mod escape;
#[cfg(feature = "gpu")]
pub mod gpu;
pub mod history;
pub mod model;
pub mod render;
pub mod stats;
pub mod traits;
pub mod viewport;

pub use error::{GpuError, HistoryError, RenderError};
pub use model::{EngineKind, RenderRequest, ViewTransform};
pub use render::{RenderOutput, Renderer};
pub use stats::{ComputationRecord, StatsAggregator};
pub use traits::Engine;
pub use viewport::Viewport;
