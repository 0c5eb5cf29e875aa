//! Render contract: one entry point over all three engines.

use crate::cpu::{CpuEngineConfig, LinearEngine, ParallelEngine};
use crate::error::RenderError;
use crate::model::{EngineKind, RenderRequest};
use crate::stats::ComputationRecord;
use crate::traits::Engine;

#[cfg(feature = "gpu")]
use crate::gpu::{GpuConfig, GpuOrchestrator};

/// A finished render.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderOutput {
    pub engine: EngineKind,
    pub resolution: String,
    pub elapsed_ms: f64,
    /// Row-major `0xAARRGGBB` pixels.
    pub pixels: Vec<u32>,
}

impl RenderOutput {
    /// Statistics record for this render.
    pub fn record(&self) -> ComputationRecord {
        ComputationRecord::new(self.elapsed_ms, self.resolution.clone(), self.engine)
    }
}

/// Owns one instance of each engine and dispatches requests by kind.
pub struct Renderer {
    linear: LinearEngine,
    parallel: ParallelEngine,
    #[cfg(feature = "gpu")]
    gpu: GpuOrchestrator,
}

impl Renderer {
    /// Creates a renderer; the GPU engine uses its default configuration.
    pub fn new(cpu: &CpuEngineConfig) -> Self {
        Self {
            linear: LinearEngine::new(cpu),
            parallel: ParallelEngine::new(cpu),
            #[cfg(feature = "gpu")]
            gpu: GpuOrchestrator::new(GpuConfig {
                palette: cpu.palette,
                ..Default::default()
            }),
        }
    }

    /// Creates a renderer with an explicit GPU configuration.
    #[cfg(feature = "gpu")]
    pub fn with_gpu(cpu: &CpuEngineConfig, gpu: GpuConfig) -> Self {
        Self {
            linear: LinearEngine::new(cpu),
            parallel: ParallelEngine::new(cpu),
            gpu: GpuOrchestrator::new(gpu),
        }
    }

    /// The engine for `kind`.
    pub fn engine_mut(&mut self, kind: EngineKind) -> Result<&mut dyn Engine, RenderError> {
        match kind {
            EngineKind::Linear => Ok(&mut self.linear),
            EngineKind::Parallel => Ok(&mut self.parallel),
            #[cfg(feature = "gpu")]
            EngineKind::Gpu => Ok(&mut self.gpu),
            #[cfg(not(feature = "gpu"))]
            EngineKind::Gpu => Err(RenderError::GpuUnavailable),
        }
    }

    /// The GPU orchestrator, for callers that drive its state machine directly.
    #[cfg(feature = "gpu")]
    pub fn gpu_mut(&mut self) -> &mut GpuOrchestrator {
        &mut self.gpu
    }

    /// Renders into a caller-owned buffer and returns the elapsed milliseconds.
    pub fn render_into(
        &mut self,
        kind: EngineKind,
        request: &RenderRequest,
        buffer: &mut [u32],
    ) -> Result<f64, RenderError> {
        self.engine_mut(kind)?.render(request, buffer)
    }

    /// Allocates a pixel buffer and renders into it.
    ///
    /// Allocation happens before the engine starts timing.
    pub fn render(
        &mut self,
        kind: EngineKind,
        request: &RenderRequest,
    ) -> Result<RenderOutput, RenderError> {
        request.validate()?;
        let mut pixels = vec![0u32; request.pixel_count()];
        let elapsed_ms = self.render_into(kind, request, &mut pixels)?;
        Ok(RenderOutput {
            engine: kind,
            resolution: request.resolution_label(),
            elapsed_ms,
            pixels,
        })
    }

    /// Hands the engines over, e.g. to a background benchmark.
    pub fn into_engines(self) -> Vec<Box<dyn Engine>> {
        let mut engines: Vec<Box<dyn Engine>> =
            vec![Box::new(self.linear), Box::new(self.parallel)];
        #[cfg(feature = "gpu")]
        engines.push(Box::new(self.gpu));
        engines
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new(&CpuEngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ViewTransform;
    use crate::viewport::Viewport;

    #[test]
    fn test_linear_and_parallel_agree_through_renderer() {
        let mut renderer = Renderer::new(&CpuEngineConfig {
            threads: Some(3),
            ..Default::default()
        });
        let request = Viewport::new(860).unwrap().request(48, 40, 256).unwrap();

        let linear = renderer.render(EngineKind::Linear, &request).unwrap();
        let parallel = renderer.render(EngineKind::Parallel, &request).unwrap();
        assert_eq!(linear.pixels, parallel.pixels);
        assert_eq!(linear.resolution, "48x40");
    }

    #[test]
    fn test_render_rejects_zero_dimensions() {
        let mut renderer = Renderer::default();
        let view = ViewTransform::new(0.0, 0.0, 1.0).unwrap();
        let request = RenderRequest {
            width: 16,
            height: 0,
            transform: view,
            max_iterations: 10,
        };
        for kind in EngineKind::all() {
            let err = renderer.render(kind, &request).unwrap_err();
            assert!(err.is_configuration(), "{}: {}", kind, err);
        }
    }

    #[test]
    fn test_output_record() {
        let mut renderer = Renderer::default();
        let request = Viewport::new(860).unwrap().request(8, 8, 20).unwrap();
        let output = renderer.render(EngineKind::Linear, &request).unwrap();
        let record = output.record();
        assert_eq!(record.engine, EngineKind::Linear);
        assert_eq!(record.resolution, "8x8");
        assert_eq!(record.elapsed_ms, output.elapsed_ms);
    }

    #[test]
    fn test_into_engines_covers_every_kind() {
        let engines = Renderer::default().into_engines();
        let kinds: Vec<EngineKind> = engines.iter().map(|e| e.kind()).collect();
        assert_eq!(kinds[..2], [EngineKind::Linear, EngineKind::Parallel]);
        #[cfg(feature = "gpu")]
        assert_eq!(kinds[2], EngineKind::Gpu);
    }

    #[cfg(not(feature = "gpu"))]
    #[test]
    fn test_gpu_unavailable_without_feature() {
        let mut renderer = Renderer::default();
        let request = Viewport::new(860).unwrap().request(8, 8, 20).unwrap();
        assert!(matches!(
            renderer.render(EngineKind::Gpu, &request),
            Err(RenderError::GpuUnavailable)
        ));
    }
}
