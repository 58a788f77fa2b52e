//! Pose and Rigid-Body Transform
//!
//! [`Pose`] is the basic rigid-body transform used throughout the
//! compositor: a unit quaternion orientation and a 3-vector position.

use glam::{Quat, Vec3};

/// A rigid-body transform: orientation then position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    /// Unit quaternion orientation.
    pub orientation: Quat,
    /// Position in the parent space.
    pub position: Vec3,
}

impl Pose {
    /// The identity pose: no rotation, at the origin.
    pub const IDENTITY: Pose = Pose {
        orientation: Quat::IDENTITY,
        position: Vec3::ZERO,
    };

    /// Builds a pose from an orientation and a position.
    #[must_use]
    pub fn new(orientation: Quat, position: Vec3) -> Self {
        Self { orientation, position }
    }

    /// Composes `self` into `base`'s space: rotates `self.position` by
    /// `base.orientation`, adds `base.position`, and multiplies the
    /// quaternions `base.orientation * self.orientation`.
    ///
    /// This is the `math_pose_transform(base, body, out)` operation: it
    /// answers "where does `self`, expressed in `base`'s frame, land in
    /// `base`'s parent frame".
    #[must_use]
    pub fn transform_by(&self, base: &Pose) -> Pose {
        Pose {
            orientation: (base.orientation * self.orientation).normalize(),
            position: base.orientation * self.position + base.position,
        }
    }

    /// Inverts the pose: the transform that undoes `self`.
    #[must_use]
    pub fn inverted(&self) -> Pose {
        let inv_orientation = self.orientation.conjugate();
        Pose {
            orientation: inv_orientation,
            position: inv_orientation * (-self.position),
        }
    }
}

impl Default for Pose {
    fn default() -> Self {
        Pose::IDENTITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-5;

    fn vec3_approx(a: Vec3, b: Vec3) -> bool {
        (a - b).length() < EPSILON
    }

    #[test]
    fn identity_transform_by_identity_is_identity() {
        let out = Pose::IDENTITY.transform_by(&Pose::IDENTITY);
        assert!(vec3_approx(out.position, Vec3::ZERO));
        assert!(out.orientation.angle_between(Quat::IDENTITY) < EPSILON);
    }

    #[test]
    fn inverted_composes_to_identity() {
        let pose = Pose::new(Quat::from_rotation_y(1.2), Vec3::new(1.0, 2.0, 3.0));
        let out = pose.transform_by(&pose.inverted());
        assert!(vec3_approx(out.position, Vec3::ZERO));
        assert!(out.orientation.angle_between(Quat::IDENTITY) < EPSILON);
    }
}
