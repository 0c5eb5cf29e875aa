//! Render request data model.
//!
//! A [`RenderRequest`] bundles the pixel dimensions, the [`ViewTransform`]
//! and the iteration cap. Every engine maps pixels to the complex plane
//! through [`ViewTransform::point_at`], so all of them agree on which point
//! each pixel samples.

use crate::error::RenderError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The computation strategy that produced a render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// Single-threaded scalar reference.
    Linear,
    /// Rows partitioned across a worker pool.
    Parallel,
    /// Compute kernel on a GPU device.
    Gpu,
}

impl EngineKind {
    /// All engines, in benchmark order.
    pub fn all() -> [EngineKind; 3] {
        [EngineKind::Linear, EngineKind::Parallel, EngineKind::Gpu]
    }

    /// Human-readable name.
    pub fn name(&self) -> &'static str {
        match self {
            EngineKind::Linear => "Linear",
            EngineKind::Parallel => "Parallel",
            EngineKind::Gpu => "GPU",
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Affine mapping from the pixel grid onto the complex plane.
///
/// `scale` is the vertical extent of the view; the horizontal extent is
/// `scale * aspect` where `aspect = width / height`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewTransform {
    pub center_x: f64,
    pub center_y: f64,
    pub scale: f64,
}

impl ViewTransform {
    /// Creates a transform, rejecting non-finite values and `scale <= 0`.
    pub fn new(center_x: f64, center_y: f64, scale: f64) -> Result<Self, RenderError> {
        let transform = Self {
            center_x,
            center_y,
            scale,
        };
        transform.validate()?;
        Ok(transform)
    }

    /// Checks the `scale > 0` invariant and that all fields are finite.
    pub fn validate(&self) -> Result<(), RenderError> {
        if !self.center_x.is_finite() || !self.center_y.is_finite() {
            return Err(RenderError::InvalidView(format!(
                "center ({}, {}) is not finite",
                self.center_x, self.center_y
            )));
        }
        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(RenderError::InvalidView(format!(
                "scale {} must be finite and positive",
                self.scale
            )));
        }
        Ok(())
    }

    /// Complex-plane point sampled by pixel `(px, py)` in a `width x height` image.
    #[inline]
    pub fn point_at(&self, px: f64, py: f64, width: u32, height: u32) -> (f64, f64) {
        let w = width as f64;
        let h = height as f64;
        let aspect = w / h;
        (
            self.center_x + (px / w - 0.5) * self.scale * aspect,
            self.center_y + (py / h - 0.5) * self.scale,
        )
    }
}

/// One render call's inputs. Immutable once built.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderRequest {
    pub width: u32,
    pub height: u32,
    pub transform: ViewTransform,
    pub max_iterations: u32,
}

impl RenderRequest {
    /// Builds and validates a request.
    pub fn new(
        width: u32,
        height: u32,
        transform: ViewTransform,
        max_iterations: u32,
    ) -> Result<Self, RenderError> {
        let request = Self {
            width,
            height,
            transform,
            max_iterations,
        };
        request.validate()?;
        Ok(request)
    }

    /// Rejects zero dimensions, zero iterations and invalid transforms.
    pub fn validate(&self) -> Result<(), RenderError> {
        if self.width == 0 || self.height == 0 {
            return Err(RenderError::InvalidDimensions {
                width: self.width,
                height: self.height,
            });
        }
        if self.max_iterations == 0 {
            return Err(RenderError::InvalidIterations);
        }
        self.transform.validate()
    }

    /// Validates the request and that `buffer` holds exactly one pixel per cell.
    pub fn validate_buffer(&self, buffer: &[u32]) -> Result<(), RenderError> {
        self.validate()?;
        let expected = self.pixel_count();
        if buffer.len() != expected {
            return Err(RenderError::BufferSize {
                expected,
                actual: buffer.len(),
            });
        }
        Ok(())
    }

    /// Number of pixels in the image.
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Width divided by height.
    pub fn aspect(&self) -> f64 {
        self.width as f64 / self.height as f64
    }

    /// Label such as `"4096x4096"` used to group statistics.
    pub fn resolution_label(&self) -> String {
        resolution_label(self.width, self.height)
    }
}

/// Formats a resolution the way statistics records store it.
pub fn resolution_label(width: u32, height: u32) -> String {
    format!("{}x{}", width, height)
}
