//! Core traits for escape-time engines.
//!
//! This module defines the `Engine` trait that the linear, parallel and GPU
//! implementations satisfy, so the renderer and the benchmark loop can
//! drive them interchangeably.

use crate::error::RenderError;
use crate::model::{EngineKind, RenderRequest};

/// Trait for Mandelbrot computation strategies.
///
/// Implementations write exactly `request.pixel_count()` pixels into the
/// caller-owned buffer, row-major, and never resize or retain it.
pub trait Engine: Send {
    /// Which strategy this engine implements.
    fn kind(&self) -> EngineKind;

    /// Returns information about the hardware the engine runs on.
    fn describe(&self) -> String;

    /// Renders `request` into `buffer`.
    ///
    /// # Returns
    /// * `Ok(elapsed_ms)` - Wall-clock time of the compute phase
    /// * `Err(RenderError)` - Invalid request, or a device failure; nothing
    ///   is written to `buffer` for configuration errors
    fn render(&mut self, request: &RenderRequest, buffer: &mut [u32]) -> Result<f64, RenderError>;

    /// Frees per-resolution resources so the next render starts cold.
    fn reset(&mut self) -> Result<(), RenderError> {
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Engine double that fills with a constant and reports a scripted time.
    pub struct FixedEngine {
        pub kind: EngineKind,
        pub elapsed_ms: f64,
        pub calls: usize,
        pub resets: usize,
        /// Renders fail with `NoAdapter` once `calls` reaches this.
        pub fail_at: Option<usize>,
    }

    impl FixedEngine {
        pub fn new(kind: EngineKind, elapsed_ms: f64) -> Self {
            Self {
                kind,
                elapsed_ms,
                calls: 0,
                resets: 0,
                fail_at: None,
            }
        }

        /// Succeeds `successes` times, then fails every render.
        pub fn failing_after(kind: EngineKind, elapsed_ms: f64, successes: usize) -> Self {
            Self {
                fail_at: Some(successes),
                ..Self::new(kind, elapsed_ms)
            }
        }
    }

    impl Engine for FixedEngine {
        fn kind(&self) -> EngineKind {
            self.kind
        }

        fn describe(&self) -> String {
            format!("fixed {}", self.kind)
        }

        fn render(
            &mut self,
            request: &RenderRequest,
            buffer: &mut [u32],
        ) -> Result<f64, RenderError> {
            request.validate_buffer(buffer)?;
            if self.fail_at.is_some_and(|n| self.calls >= n) {
                return Err(crate::error::GpuError::NoAdapter.into());
            }
            buffer.fill(self.calls as u32);
            self.calls += 1;
            Ok(self.elapsed_ms)
        }

        fn reset(&mut self) -> Result<(), RenderError> {
            self.resets += 1;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::FixedEngine;
    use super::*;
    use crate::model::ViewTransform;

    #[test]
    fn test_engine_trait_object_dispatch() {
        let mut engines: Vec<Box<dyn Engine>> = vec![
            Box::new(FixedEngine::new(EngineKind::Linear, 1.0)),
            Box::new(FixedEngine::new(EngineKind::Gpu, 2.0)),
        ];
        let view = ViewTransform::new(0.0, 0.0, 1.0).unwrap();
        let request = RenderRequest::new(2, 2, view, 10).unwrap();
        let mut buffer = vec![7u32; 4];

        let times: Vec<f64> = engines
            .iter_mut()
            .map(|e| e.render(&request, &mut buffer).unwrap())
            .collect();
        assert_eq!(times, vec![1.0, 2.0]);
        assert_eq!(engines[1].kind(), EngineKind::Gpu);
        assert!(engines[0].describe().contains("Linear"));
    }
}
