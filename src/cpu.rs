//! CPU escape-time engines.
//!
//! `LinearEngine` walks the image row-major on the calling thread and is the
//! reference output. `ParallelEngine` splits the rows into contiguous,
//! disjoint ranges and fills each range on its own worker thread; both call
//! the same row kernel, so their buffers are byte-identical.

use crate::error::RenderError;
use crate::escape::Palette;
use crate::model::{EngineKind, RenderRequest};
use crate::traits::Engine;
use log::debug;
use std::ops::Range;
use std::time::Instant;

/// CPU engine configuration.
#[derive(Debug, Clone)]
pub struct CpuEngineConfig {
    /// Number of worker threads (defaults to CPU count if None).
    pub threads: Option<usize>,
    /// Shared iteration-to-color mapping.
    pub palette: Palette,
}

impl Default for CpuEngineConfig {
    fn default() -> Self {
        Self {
            threads: None,
            palette: Palette::default(),
        }
    }
}

/// Fills `rows` (a slice holding whole rows starting at `first_row`).
fn fill_rows(rows: &mut [u32], first_row: u32, request: &RenderRequest, palette: &Palette) {
    let width = request.width as usize;
    let view = request.transform;
    for (offset, row) in rows.chunks_exact_mut(width).enumerate() {
        let py = (first_row as usize + offset) as f64;
        for (px, pixel) in row.iter_mut().enumerate() {
            let (cx, cy) = view.point_at(px as f64, py, request.width, request.height);
            *pixel = palette.shade(cx, cy, request.max_iterations);
        }
    }
}

/// Single-threaded reference engine.
#[derive(Debug, Clone, Default)]
pub struct LinearEngine {
    palette: Palette,
}

impl LinearEngine {
    pub fn new(config: &CpuEngineConfig) -> Self {
        Self {
            palette: config.palette,
        }
    }
}

impl Engine for LinearEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Linear
    }

    fn describe(&self) -> String {
        "1 thread".to_string()
    }

    fn render(&mut self, request: &RenderRequest, buffer: &mut [u32]) -> Result<f64, RenderError> {
        request.validate_buffer(buffer)?;

        let start = Instant::now();
        fill_rows(buffer, 0, request, &self.palette);
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

        debug!(
            "linear render {} finished in {:.2} ms",
            request.resolution_label(),
            elapsed_ms
        );
        Ok(elapsed_ms)
    }
}

/// Splits `height` rows into at most `workers` contiguous ranges.
///
/// Every range but the last holds `ceil(height / workers)` rows; the result
/// depends only on its arguments.
pub fn partition_rows(height: u32, workers: usize) -> Vec<Range<u32>> {
    let workers = workers.max(1) as u32;
    let rows_per_worker = height.div_ceil(workers).max(1);
    (0..height)
        .step_by(rows_per_worker as usize)
        .map(|start| start..(start + rows_per_worker).min(height))
        .collect()
}

/// Fork-join engine partitioning rows across worker threads.
#[derive(Debug, Clone)]
pub struct ParallelEngine {
    palette: Palette,
    num_threads: usize,
}

impl ParallelEngine {
    /// Creates a parallel engine with the given configuration.
    pub fn new(config: &CpuEngineConfig) -> Self {
        let num_threads = config.threads.unwrap_or_else(num_cpus::get).max(1);
        Self {
            palette: config.palette,
            num_threads,
        }
    }

    /// Returns the number of worker threads.
    pub fn num_threads(&self) -> usize {
        self.num_threads
    }
}

impl Default for ParallelEngine {
    fn default() -> Self {
        Self::new(&CpuEngineConfig::default())
    }
}

impl Engine for ParallelEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Parallel
    }

    fn describe(&self) -> String {
        format!("{} threads", self.num_threads)
    }

    fn render(&mut self, request: &RenderRequest, buffer: &mut [u32]) -> Result<f64, RenderError> {
        request.validate_buffer(buffer)?;

        let ranges = partition_rows(request.height, self.num_threads);
        let width = request.width as usize;
        let palette = &self.palette;

        let start = Instant::now();
        std::thread::scope(|scope| {
            let mut rest = &mut buffer[..];
            for range in &ranges {
                let rows = (range.end - range.start) as usize;
                let (chunk, tail) = std::mem::take(&mut rest).split_at_mut(rows * width);
                rest = tail;
                let first_row = range.start;
                scope.spawn(move || fill_rows(chunk, first_row, request, palette));
            }
        });
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

        debug!(
            "parallel render {} on {} workers finished in {:.2} ms",
            request.resolution_label(),
            ranges.len(),
            elapsed_ms
        );
        Ok(elapsed_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::escape::INTERIOR_COLOR;
    use crate::model::ViewTransform;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn request(width: u32, height: u32, view: ViewTransform, iterations: u32) -> RenderRequest {
        RenderRequest::new(width, height, view, iterations).unwrap()
    }

    fn render_with(engine: &mut dyn Engine, request: &RenderRequest) -> Vec<u32> {
        let mut buffer = vec![0u32; request.pixel_count()];
        engine.render(request, &mut buffer).unwrap();
        buffer
    }

    #[test]
    fn test_partition_covers_all_rows() {
        let ranges = partition_rows(10, 3);
        assert_eq!(ranges, vec![0..4, 4..8, 8..10]);
    }

    #[test]
    fn test_partition_more_workers_than_rows() {
        let ranges = partition_rows(3, 8);
        assert_eq!(ranges, vec![0..1, 1..2, 2..3]);
    }

    #[test]
    fn test_partition_is_deterministic() {
        assert_eq!(partition_rows(4096, 12), partition_rows(4096, 12));
        assert_eq!(partition_rows(7, 0), vec![0..7]);
    }

    #[test]
    fn test_partition_ranges_are_disjoint_and_contiguous() {
        for height in [1, 2, 31, 100, 1023] {
            for workers in 1..17 {
                let ranges = partition_rows(height, workers);
                assert!(ranges.len() <= workers);
                assert_eq!(ranges.first().unwrap().start, 0);
                assert_eq!(ranges.last().unwrap().end, height);
                for pair in ranges.windows(2) {
                    assert_eq!(pair[0].end, pair[1].start);
                }
            }
        }
    }

    #[test]
    fn test_linear_center_of_set_is_interior() {
        let view = ViewTransform::new(-0.5, 0.0, 0.01).unwrap();
        let buffer = render_with(&mut LinearEngine::default(), &request(5, 5, view, 200));
        assert_eq!(buffer[12], INTERIOR_COLOR);
    }

    #[test]
    fn test_linear_matches_core_model_per_pixel() {
        let view = ViewTransform::new(-0.75, 0.1, 2.5).unwrap();
        let req = request(16, 9, view, 64);
        let buffer = render_with(&mut LinearEngine::default(), &req);
        let palette = Palette::default();
        for py in 0..9u32 {
            for px in 0..16u32 {
                let (cx, cy) = view.point_at(px as f64, py as f64, 16, 9);
                assert_eq!(
                    buffer[(py * 16 + px) as usize],
                    palette.shade(cx, cy, 64)
                );
            }
        }
    }

    #[test]
    fn test_parallel_matches_linear() {
        let view = ViewTransform::new(-2.07, -1.40, 2.0).unwrap();
        let req = request(64, 48, view, 300);
        let linear = render_with(&mut LinearEngine::default(), &req);
        for threads in [1, 2, 3, 7, 64] {
            let mut parallel = ParallelEngine::new(&CpuEngineConfig {
                threads: Some(threads),
                ..Default::default()
            });
            assert_eq!(render_with(&mut parallel, &req), linear, "{} threads", threads);
        }
    }

    #[test]
    fn test_parallel_matches_linear_random_views() {
        let mut rng = StdRng::seed_from_u64(0x5EED);
        let mut linear = LinearEngine::default();
        let mut parallel = ParallelEngine::new(&CpuEngineConfig {
            threads: Some(5),
            ..Default::default()
        });

        for _ in 0..12 {
            let view = ViewTransform::new(
                rng.gen_range(-2.0..1.0),
                rng.gen_range(-1.5..1.5),
                rng.gen_range(0.001..4.0),
            )
            .unwrap();
            let req = request(
                rng.gen_range(1..40),
                rng.gen_range(1..40),
                view,
                rng.gen_range(1..500),
            );
            assert_eq!(
                render_with(&mut parallel, &req),
                render_with(&mut linear, &req)
            );
        }
    }

    #[test]
    fn test_zero_width_writes_nothing() {
        let view = ViewTransform::new(0.0, 0.0, 1.0).unwrap();
        let req = RenderRequest {
            width: 0,
            height: 4,
            transform: view,
            max_iterations: 10,
        };
        let mut buffer = vec![0xDEAD_BEEFu32; 4];
        for engine in [
            &mut LinearEngine::default() as &mut dyn Engine,
            &mut ParallelEngine::default(),
        ] {
            let err = engine.render(&req, &mut buffer).unwrap_err();
            assert!(matches!(err, RenderError::InvalidDimensions { .. }));
        }
        assert!(buffer.iter().all(|&p| p == 0xDEAD_BEEF));
    }

    #[test]
    fn test_wrong_buffer_size_rejected() {
        let view = ViewTransform::new(0.0, 0.0, 1.0).unwrap();
        let req = request(4, 4, view, 10);
        let mut buffer = vec![0u32; 15];
        let err = ParallelEngine::default()
            .render(&req, &mut buffer)
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_parallel_engine_describe() {
        let engine = ParallelEngine::new(&CpuEngineConfig {
            threads: Some(4),
            ..Default::default()
        });
        assert_eq!(engine.num_threads(), 4);
        assert!(engine.describe().contains("4 threads"));
        assert!(ParallelEngine::default().num_threads() > 0);
    }
}
