//! Viewport controller: the interactive view over the complex plane.
//!
//! Turns wheel ticks and mouse drags into [`ViewTransform`] updates and
//! builds render requests from the current view.

use crate::error::RenderError;
use crate::model::{RenderRequest, ViewTransform};

/// Canonical view center, real part.
pub const CANONICAL_CENTER_X: f64 = -2.07;
/// Canonical view center, imaginary part.
pub const CANONICAL_CENTER_Y: f64 = -1.40;
/// Display width at which the canonical scale is exactly 2.
pub const REFERENCE_WIDTH: f64 = 860.0;

/// Scale factor for one wheel tick towards the cursor.
pub const ZOOM_IN_FACTOR: f64 = 0.97;
/// Scale factor for one wheel tick away from the cursor.
pub const ZOOM_OUT_FACTOR: f64 = 1.03;
/// Fraction of the way the center moves towards the cursor per zoom step.
pub const ZOOM_DAMPING: f64 = 0.05;

/// Owns the view transform for one display.
#[derive(Debug, Clone, PartialEq)]
pub struct Viewport {
    transform: ViewTransform,
    display_width: u32,
}

impl Viewport {
    /// Creates a viewport showing the canonical view for a display `display_width` pixels wide.
    pub fn new(display_width: u32) -> Result<Self, RenderError> {
        check_display(display_width)?;
        Ok(Self {
            transform: canonical_view(display_width),
            display_width,
        })
    }

    /// Current transform.
    pub fn transform(&self) -> ViewTransform {
        self.transform
    }

    /// Display width the canonical scale is derived from.
    pub fn display_width(&self) -> u32 {
        self.display_width
    }

    /// Restores the canonical view.
    pub fn reset(&mut self) {
        self.transform = canonical_view(self.display_width);
    }

    /// Changes the display width used by `reset`. The current view is kept.
    pub fn resize(&mut self, display_width: u32) -> Result<(), RenderError> {
        check_display(display_width)?;
        self.display_width = display_width;
        Ok(())
    }

    /// Zooms by `factor` around pixel `(px, py)`.
    ///
    /// `factor < 1` zooms in. The center drifts only [`ZOOM_DAMPING`] of the
    /// way towards the point under the cursor, so one tick is a gentle shift.
    pub fn zoom_at(
        &mut self,
        px: f64,
        py: f64,
        image_width: u32,
        image_height: u32,
        factor: f64,
    ) -> Result<(), RenderError> {
        check_image(image_width, image_height)?;
        if !factor.is_finite() || factor <= 0.0 {
            return Err(RenderError::InvalidView(format!(
                "zoom factor {} must be finite and positive",
                factor
            )));
        }

        let (focus_x, focus_y) = self.transform.point_at(px, py, image_width, image_height);
        let next = ViewTransform {
            center_x: self.transform.center_x * (1.0 - ZOOM_DAMPING) + focus_x * ZOOM_DAMPING,
            center_y: self.transform.center_y * (1.0 - ZOOM_DAMPING) + focus_y * ZOOM_DAMPING,
            scale: self.transform.scale * factor,
        };
        next.validate()?;
        self.transform = next;
        Ok(())
    }

    /// Moves the view by a drag of `(dx, dy)` pixels.
    ///
    /// The content follows the cursor: a wider view (larger scale) pans
    /// further per pixel.
    pub fn pan(
        &mut self,
        dx: f64,
        dy: f64,
        image_width: u32,
        image_height: u32,
    ) -> Result<(), RenderError> {
        check_image(image_width, image_height)?;
        let w = image_width as f64;
        let h = image_height as f64;
        let next = ViewTransform {
            center_x: self.transform.center_x - dx / w * self.transform.scale * (w / h),
            center_y: self.transform.center_y - dy / h * self.transform.scale,
            scale: self.transform.scale,
        };
        next.validate()?;
        self.transform = next;
        Ok(())
    }

    /// Builds a render request for the current view.
    pub fn request(
        &self,
        width: u32,
        height: u32,
        max_iterations: u32,
    ) -> Result<RenderRequest, RenderError> {
        RenderRequest::new(width, height, self.transform, max_iterations)
    }
}

/// The canonical view for a display `display_width` pixels wide.
pub fn canonical_view(display_width: u32) -> ViewTransform {
    ViewTransform {
        center_x: CANONICAL_CENTER_X,
        center_y: CANONICAL_CENTER_Y,
        scale: 2.0 * (REFERENCE_WIDTH / display_width as f64),
    }
}

fn check_display(display_width: u32) -> Result<(), RenderError> {
    if display_width == 0 {
        return Err(RenderError::InvalidView(
            "display width must be positive".to_string(),
        ));
    }
    Ok(())
}

fn check_image(width: u32, height: u32) -> Result<(), RenderError> {
    if width == 0 || height == 0 {
        return Err(RenderError::InvalidDimensions { width, height });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_uses_canonical_view() {
        let viewport = Viewport::new(1024).unwrap();
        let view = viewport.transform();
        assert_eq!(view.center_x, -2.07);
        assert_eq!(view.center_y, -1.40);
        assert_eq!(view.scale, 2.0 * (860.0 / 1024.0));
    }

    #[test]
    fn test_zoom_in_decreases_scale() {
        let mut viewport = Viewport::new(860).unwrap();
        let before = viewport.transform().scale;
        viewport
            .zoom_at(100.0, 200.0, 860, 860, ZOOM_IN_FACTOR)
            .unwrap();
        assert!(viewport.transform().scale < before);
    }

    #[test]
    fn test_zoom_out_increases_scale() {
        let mut viewport = Viewport::new(860).unwrap();
        let before = viewport.transform().scale;
        viewport
            .zoom_at(100.0, 200.0, 860, 860, ZOOM_OUT_FACTOR)
            .unwrap();
        assert!(viewport.transform().scale > before);
    }

    #[test]
    fn test_zoom_at_center_keeps_center() {
        let mut viewport = Viewport::new(800).unwrap();
        viewport.zoom_at(400.0, 300.0, 800, 600, 0.5).unwrap();
        let view = viewport.transform();
        assert!((view.center_x - CANONICAL_CENTER_X).abs() < 1e-12);
        assert!((view.center_y - CANONICAL_CENTER_Y).abs() < 1e-12);
    }

    #[test]
    fn test_zoom_drifts_gently_towards_cursor() {
        let mut viewport = Viewport::new(860).unwrap();
        let before = viewport.transform();
        let (focus_x, _) = before.point_at(860.0, 430.0, 860, 860);
        viewport.zoom_at(860.0, 430.0, 860, 860, ZOOM_IN_FACTOR).unwrap();
        let moved = viewport.transform().center_x - before.center_x;
        let expected = (focus_x - before.center_x) * ZOOM_DAMPING;
        assert!((moved - expected).abs() < 1e-12);
        assert!(moved > 0.0);
    }

    #[test]
    fn test_zoom_rejects_bad_factor() {
        let mut viewport = Viewport::new(860).unwrap();
        let before = viewport.clone();
        assert!(viewport.zoom_at(0.0, 0.0, 860, 860, 0.0).is_err());
        assert!(viewport.zoom_at(0.0, 0.0, 860, 860, f64::NAN).is_err());
        assert!(viewport.zoom_at(0.0, 0.0, 0, 860, 0.97).is_err());
        assert_eq!(viewport, before);
    }

    #[test]
    fn test_pan_scales_with_view() {
        let mut narrow = Viewport::new(860).unwrap();
        let mut wide = Viewport::new(430).unwrap(); // scale 4 vs 2
        narrow.pan(10.0, 0.0, 500, 500).unwrap();
        wide.pan(10.0, 0.0, 500, 500).unwrap();

        let narrow_shift = CANONICAL_CENTER_X - narrow.transform().center_x;
        let wide_shift = CANONICAL_CENTER_X - wide.transform().center_x;
        assert!(narrow_shift > 0.0);
        assert!((wide_shift - 2.0 * narrow_shift).abs() < 1e-12);
    }

    #[test]
    fn test_pan_follows_cursor() {
        let mut viewport = Viewport::new(860).unwrap();
        let before = viewport.transform();
        let grabbed = before.point_at(100.0, 50.0, 400, 200);
        viewport.pan(30.0, -20.0, 400, 200).unwrap();
        let after = viewport.transform().point_at(130.0, 30.0, 400, 200);
        assert!((after.0 - grabbed.0).abs() < 1e-12);
        assert!((after.1 - grabbed.1).abs() < 1e-12);
        assert_eq!(viewport.transform().scale, before.scale);
    }

    #[test]
    fn test_reset_restores_exact_canonical_view() {
        let mut viewport = Viewport::new(1024).unwrap();
        viewport.zoom_at(10.0, 10.0, 1024, 1024, 0.97).unwrap();
        viewport.pan(5.0, 7.0, 1024, 1024).unwrap();
        viewport.reset();
        assert_eq!(viewport.transform(), canonical_view(1024));
        assert_eq!(viewport.transform().scale, 2.0 * (860.0 / 1024.0));
    }

    #[test]
    fn test_resize_changes_reset_scale() {
        let mut viewport = Viewport::new(860).unwrap();
        viewport.resize(430).unwrap();
        assert_eq!(viewport.transform().scale, 2.0);
        viewport.reset();
        assert_eq!(viewport.transform().scale, 4.0);
        assert!(viewport.resize(0).is_err());
    }

    #[test]
    fn test_zero_display_width_is_a_view_error() {
        let err = Viewport::new(0).unwrap_err();
        assert!(matches!(err, RenderError::InvalidView(_)));
        assert!(err.is_configuration());
        assert!(err.to_string().contains("display width"));

        let mut viewport = Viewport::new(860).unwrap();
        let err = viewport.resize(0).unwrap_err();
        assert!(matches!(err, RenderError::InvalidView(_)));
        assert_eq!(viewport.display_width(), 860);
    }

    #[test]
    fn test_request_uses_current_view() {
        let viewport = Viewport::new(860).unwrap();
        let request = viewport.request(64, 32, 1000).unwrap();
        assert_eq!(request.transform, viewport.transform());
        assert!(viewport.request(0, 32, 1000).is_err());
    }
}
