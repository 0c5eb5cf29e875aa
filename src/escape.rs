//! Escape-time core model shared by every engine.
//!
//! Both functions here are pure: the same inputs always produce the same
//! iteration count and the same pixel, whichever engine calls them.

/// Opaque black, used for points that never escape.
pub const INTERIOR_COLOR: u32 = 0xFF00_0000;

/// Default palette exponent applied to the normalized iteration count.
pub const DEFAULT_EXPONENT: f64 = 1.35;

/// Iterates `z <- z^2 + c` from zero and returns the number of steps taken
/// before `|z| > 2`, or `max_iterations` if the orbit stays bounded.
#[inline]
pub fn escape_time(cx: f64, cy: f64, max_iterations: u32) -> u32 {
    let mut x = 0.0f64;
    let mut y = 0.0f64;
    let mut i = 0;
    while i < max_iterations && x * x + y * y <= 4.0 {
        let xt = x * x - y * y + cx;
        y = 2.0 * x * y + cy;
        x = xt;
        i += 1;
    }
    i
}

/// Maps iteration counts to `0xAARRGGBB` pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Palette {
    /// Contrast exponent: the normalized count is raised to `1 / exponent`.
    pub exponent: f64,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            exponent: DEFAULT_EXPONENT,
        }
    }
}

impl Palette {
    pub fn new(exponent: f64) -> Self {
        Self { exponent }
    }

    /// Color for an iteration count. Counts at or above `max_iterations` are interior.
    #[inline]
    pub fn color(&self, iterations: u32, max_iterations: u32) -> u32 {
        if iterations >= max_iterations {
            return INTERIOR_COLOR;
        }
        let t = (iterations as f64 / max_iterations as f64).powf(1.0 / self.exponent);
        let u = 1.0 - t;
        // Bernstein polynomials: dark blue through orange to near white
        let r = 9.0 * u * t * t * t;
        let g = 15.0 * u * u * t * t;
        let b = 8.5 * u * u * u * t;
        0xFF00_0000 | (channel(r) << 16) | (channel(g) << 8) | channel(b)
    }

    /// Escape-time pixel for point `(cx, cy)`.
    #[inline]
    pub fn shade(&self, cx: f64, cy: f64, max_iterations: u32) -> u32 {
        self.color(escape_time(cx, cy, max_iterations), max_iterations)
    }
}

#[inline]
fn channel(v: f64) -> u32 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_never_escapes() {
        assert_eq!(escape_time(0.0, 0.0, 1000), 1000);
        assert_eq!(escape_time(-1.0, 0.0, 500), 500);
    }

    #[test]
    fn test_far_point_escapes_immediately() {
        // z1 = c, |c| > 2
        assert_eq!(escape_time(3.0, 0.0, 1000), 1);
        assert_eq!(escape_time(0.0, -2.5, 1000), 1);
    }

    #[test]
    fn test_known_escape_count() {
        // c = 1: 0, 1, 2, 5 -> escapes on the third step
        assert_eq!(escape_time(1.0, 0.0, 1000), 3);
    }

    #[test]
    fn test_interior_is_black() {
        let palette = Palette::default();
        assert_eq!(palette.color(1000, 1000), INTERIOR_COLOR);
        assert_eq!(palette.shade(0.0, 0.0, 100), INTERIOR_COLOR);
    }

    #[test]
    fn test_color_is_deterministic_and_opaque() {
        let palette = Palette::default();
        for n in [0, 1, 17, 250, 999] {
            let c = palette.color(n, 1000);
            assert_eq!(c, palette.color(n, 1000));
            assert_eq!(c >> 24, 0xFF);
        }
    }

    #[test]
    fn test_zero_iterations_is_black_exterior() {
        // t = 0 collapses every channel
        assert_eq!(Palette::default().color(0, 1000), 0xFF00_0000);
    }

    #[test]
    fn test_exponent_changes_color() {
        let soft = Palette::new(1.0);
        let hard = Palette::new(DEFAULT_EXPONENT);
        assert_ne!(soft.color(100, 1000), hard.color(100, 1000));
    }
}
