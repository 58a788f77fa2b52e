//! Timewarp Matrix
//!
//! Late reprojection of a rendered image from a stale head pose to a
//! fresh one, expressed as a single 4x4 matrix baked from a simplified
//! projection and the rotational delta between the two poses.

use glam::{Mat4, Quat};

use super::fov::Fov;
use super::pose::Pose;

const NEAR_PLANE: f32 = 0.5;
const FAR_PLANE: f32 = 1.5;

/// Builds a simplified projection matrix for timewarp. Mirrors the
/// non-depth branch actually compiled by the source (the `#if 0` branch
/// that drops `a33`/`a43` is dead code there; this keeps the live one).
#[must_use]
fn calc_projection(fov: &Fov) -> Mat4 {
    let tan_left = fov.angle_left.tan();
    let tan_right = fov.angle_right.tan();
    let tan_down = fov.angle_down.tan();
    let tan_up = fov.angle_up.tan();

    let tan_width = tan_right - tan_left;
    // Vulkan projection space: Y points down.
    let tan_height = tan_down - tan_up;

    let a11 = 2.0 / tan_width;
    let a22 = 2.0 / tan_height;
    let a31 = (tan_right + tan_left) / tan_width;
    let a32 = (tan_up + tan_down) / tan_height;
    let a33 = -FAR_PLANE / (FAR_PLANE - NEAR_PLANE);
    let a43 = -(FAR_PLANE * NEAR_PLANE) / (FAR_PLANE - NEAR_PLANE);

    // Column-major, matching glam's Mat4::from_cols_array convention.
    Mat4::from_cols_array(&[
        a11, 0.0, 0.0, 0.0, //
        0.0, a22, 0.0, 0.0, //
        a31, a32, a33, -1.0, //
        0.0, 0.0, a43, 0.0, //
    ])
}

/// Rotation-only model matrix for an orientation (a "view matrix
/// inverse"): places geometry relative to the given orientation.
#[must_use]
fn orientation_model_matrix(orientation: Quat) -> Mat4 {
    Mat4::from_quat(orientation)
}

/// Computes the timewarp matrix that reprojects an image rendered at
/// `src_pose`/`src_fov` onto `new_pose`.
///
/// `result = P_src * inverse(view(new_pose)) * model(src_pose)`, where
/// `view(new_pose)` is the inverse of `model(new_pose)`.
#[must_use]
pub fn calc_time_warp_matrix(src_pose: &Pose, src_fov: &Fov, new_pose: &Pose) -> Mat4 {
    let src_proj = calc_projection(src_fov);

    let src_rot_inv = orientation_model_matrix(src_pose.orientation);

    let new_rot_inv = orientation_model_matrix(new_pose.orientation);
    let new_rot = new_rot_inv.inverse();

    let delta_rot = new_rot * src_rot_inv;
    let delta_rot_inv = delta_rot.inverse();

    src_proj * delta_rot_inv
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_4;

    const EPSILON: f32 = 1e-4;

    fn symmetric_fov(half_angle: f32) -> Fov {
        Fov {
            angle_left: -half_angle,
            angle_right: half_angle,
            angle_up: half_angle,
            angle_down: -half_angle,
        }
    }

    #[test]
    fn identical_poses_yield_pure_projection() {
        let pose = Pose::new(Quat::from_rotation_y(0.3), glam::Vec3::ZERO);
        let fov = symmetric_fov(FRAC_PI_4);
        let matrix = calc_time_warp_matrix(&pose, &fov, &pose);
        let expected = calc_projection(&fov);
        for i in 0..16 {
            assert!(
                (matrix.to_cols_array()[i] - expected.to_cols_array()[i]).abs() < EPSILON,
                "component {i} differs"
            );
        }
    }

    #[test]
    fn differing_orientation_changes_result() {
        let src = Pose::new(Quat::IDENTITY, glam::Vec3::ZERO);
        let new = Pose::new(Quat::from_rotation_y(0.5), glam::Vec3::ZERO);
        let fov = symmetric_fov(FRAC_PI_4);
        let identical = calc_time_warp_matrix(&src, &fov, &src);
        let warped = calc_time_warp_matrix(&src, &fov, &new);
        assert_ne!(identical.to_cols_array(), warped.to_cols_array());
    }
}
