//! Field of View
//!
//! [`Fov`] holds the four signed half-angles defining a view frustum, and
//! [`Fov::uv_to_tangent_rect`] derives the tangent-plane rectangle used by
//! the layer and distortion shaders to map normalized UVs onto it.

/// A normalized rectangle: origin plus extent, used both for the
/// UV-to-tangent transform and for sub-image descriptors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizedRect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

/// Four signed half-angles, in radians, defining a view frustum.
///
/// Angles are signed: a typical `angle_left` is negative and
/// `angle_right` positive; the sign convention for `angle_up`/
/// `angle_down` depends on the caller and must be preserved end-to-end —
/// this type never normalizes or reorders them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fov {
    pub angle_left: f32,
    pub angle_right: f32,
    pub angle_up: f32,
    pub angle_down: f32,
}

impl Fov {
    /// Computes the tangent-plane transform `(u, v) -> (x, y)` for this
    /// FOV, matching the distortion shader's expectations exactly
    /// (including the sign conventions baked into the offset formulas).
    #[must_use]
    pub fn uv_to_tangent_rect(&self) -> NormalizedRect {
        let tan_left = self.angle_left.tan();
        let tan_right = self.angle_right.tan();
        let tan_down = self.angle_down.tan();
        let tan_up = self.angle_up.tan();

        let tan_width = tan_right - tan_left;
        let tan_height = tan_up - tan_down;

        let tan_offset_x = ((tan_right + tan_left) - tan_width) / 2.0;
        let tan_offset_y = (-(tan_up + tan_down) - tan_height) / 2.0;

        NormalizedRect {
            x: tan_offset_x,
            y: tan_offset_y,
            w: tan_width,
            h: tan_height,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_4;
    use std::f32::consts::FRAC_PI_6;

    const EPSILON: f32 = 1e-4;

    fn approx_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < EPSILON
    }

    fn assert_rect(rect: NormalizedRect, x: f32, y: f32, w: f32, h: f32) {
        assert!(approx_eq(rect.x, x), "x: {} vs {x}", rect.x);
        assert!(approx_eq(rect.y, y), "y: {} vs {y}", rect.y);
        assert!(approx_eq(rect.w, w), "w: {} vs {w}", rect.w);
        assert!(approx_eq(rect.h, h), "h: {} vs {h}", rect.h);
    }

    #[test]
    fn symmetric_45_degrees() {
        let fov = Fov {
            angle_left: -FRAC_PI_4,
            angle_right: FRAC_PI_4,
            angle_up: FRAC_PI_4,
            angle_down: -FRAC_PI_4,
        };
        assert_rect(fov.uv_to_tangent_rect(), -1.0, -1.0, 2.0, 2.0);
    }

    #[test]
    fn vertically_flipped_45_degrees() {
        let fov = Fov {
            angle_left: -FRAC_PI_4,
            angle_right: FRAC_PI_4,
            angle_up: -FRAC_PI_4,
            angle_down: FRAC_PI_4,
        };
        assert_rect(fov.uv_to_tangent_rect(), -1.0, 1.0, 2.0, -2.0);
    }

    #[test]
    fn horizontally_flipped_45_degrees() {
        let fov = Fov {
            angle_left: FRAC_PI_4,
            angle_right: -FRAC_PI_4,
            angle_up: FRAC_PI_4,
            angle_down: -FRAC_PI_4,
        };
        assert_rect(fov.uv_to_tangent_rect(), 1.0, -1.0, -2.0, 2.0);
    }

    #[test]
    fn symmetric_30_degrees() {
        let fov = Fov {
            angle_left: -FRAC_PI_6,
            angle_right: FRAC_PI_6,
            angle_up: FRAC_PI_6,
            angle_down: -FRAC_PI_6,
        };
        let t = FRAC_PI_6.tan();
        assert_rect(fov.uv_to_tangent_rect(), -t, -t, 2.0 * t, 2.0 * t);
    }
}
