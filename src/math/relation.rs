//! Relation and Relation Chain
//!
//! A [`Relation`] is a pose plus optional linear/angular velocity, each
//! component individually flagged valid or invalid. A [`RelationChain`]
//! composes up to [`RelationChain::MAX_STEPS`] such relations into one,
//! following the exact fold used by the runtime this core is modeled on.

use bitflags::bitflags;
use glam::{Quat, Vec3};

use super::pose::Pose;

bitflags! {
    /// Validity/tracked flags for a [`Relation`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct RelationFlags: u32 {
        const ORIENTATION_VALID    = 1 << 0;
        const POSITION_VALID       = 1 << 1;
        const LINEAR_VELOCITY_VALID  = 1 << 2;
        const ANGULAR_VELOCITY_VALID = 1 << 3;
        const ORIENTATION_TRACKED  = 1 << 4;
        const POSITION_TRACKED     = 1 << 5;
    }
}

/// A pose plus optional linear/angular velocity, each flagged valid or
/// invalid independently. The all-zero relation (`Relation::CLEARED`) is
/// the canonical "nothing is known" value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Relation {
    pub flags: RelationFlags,
    pub pose: Pose,
    pub linear_velocity: Vec3,
    pub angular_velocity: Vec3,
}

impl Relation {
    /// The cleared relation: all flags zero, all vectors zero.
    pub const CLEARED: Relation = Relation {
        flags: RelationFlags::empty(),
        pose: Pose::IDENTITY,
        linear_velocity: Vec3::ZERO,
        angular_velocity: Vec3::ZERO,
    };

    /// A fully valid identity relation: orientation and position valid
    /// and tracked, zero velocity (not flagged valid).
    #[must_use]
    pub fn identity_valid() -> Relation {
        Relation {
            flags: RelationFlags::ORIENTATION_VALID
                | RelationFlags::POSITION_VALID
                | RelationFlags::ORIENTATION_TRACKED
                | RelationFlags::POSITION_TRACKED,
            pose: Pose::IDENTITY,
            linear_velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
        }
    }

    #[must_use]
    fn has_pose_component(&self) -> bool {
        self.flags
            .intersects(RelationFlags::ORIENTATION_VALID | RelationFlags::POSITION_VALID)
    }

    /// Returns the pose with invalid components forced to identity,
    /// matching `make_valid_pose`: an invalid orientation becomes
    /// identity, an invalid position becomes zero.
    #[must_use]
    fn valid_pose(&self) -> Pose {
        Pose {
            orientation: if self.flags.contains(RelationFlags::ORIENTATION_VALID) {
                self.pose.orientation
            } else {
                Quat::IDENTITY
            },
            position: if self.flags.contains(RelationFlags::POSITION_VALID) {
                self.pose.position
            } else {
                Vec3::ZERO
            },
        }
    }

    /// Negates pose, linear velocity, and angular velocity; keeps flags
    /// unchanged.
    #[must_use]
    pub fn inverted(&self) -> Relation {
        Relation {
            flags: self.flags,
            pose: self.pose.inverted(),
            linear_velocity: -self.linear_velocity,
            angular_velocity: -self.angular_velocity,
        }
    }

    /// Interpolates between `a` and `b` at parameter `t`, only touching
    /// the components named in `flags` (orientation slerped, the rest
    /// lerped). The output carries `flags` verbatim.
    #[must_use]
    pub fn interpolate(a: &Relation, b: &Relation, t: f32, flags: RelationFlags) -> Relation {
        let mut out = Relation::CLEARED;
        out.flags = flags;

        if flags.contains(RelationFlags::ORIENTATION_VALID) {
            out.pose.orientation = a.pose.orientation.slerp(b.pose.orientation, t);
        }
        if flags.contains(RelationFlags::POSITION_VALID) {
            out.pose.position = a.pose.position.lerp(b.pose.position, t);
        }
        if flags.contains(RelationFlags::LINEAR_VELOCITY_VALID) {
            out.linear_velocity = a.linear_velocity.lerp(b.linear_velocity, t);
        }
        if flags.contains(RelationFlags::ANGULAR_VELOCITY_VALID) {
            out.angular_velocity = a.angular_velocity.lerp(b.angular_velocity, t);
        }
        out
    }
}

impl Default for Relation {
    fn default() -> Self {
        Relation::CLEARED
    }
}

/// Composes `a` (the body relation, in base space `b`) with `b` (the base
/// relation), producing the relation of `a` expressed in `b`'s parent
/// space.
///
/// This is `apply_relation(a, b, out)`: a direct port of the source's
/// fold step, including the "3-DoF uplift" band-aid that upgrades an
/// orientation-only relation to also have a (zeroed) valid position
/// before the validity flags are ANDed together.
#[must_use]
pub fn compose(a: &Relation, b: &Relation) -> Relation {
    let mut af = a.flags;
    let mut bf = b.flags;

    let body_pose = a.valid_pose();
    let base_pose = b.valid_pose();

    // Band-aid for 3-DoF devices: upgrade orientation-only relations to
    // also claim a (zeroed) valid position, so the whole chain doesn't
    // lose position-valid just because one step is orientation-only.
    if af.contains(RelationFlags::ORIENTATION_VALID) && !af.contains(RelationFlags::POSITION_VALID) {
        af.insert(RelationFlags::POSITION_VALID);
    }
    if bf.contains(RelationFlags::ORIENTATION_VALID) && !bf.contains(RelationFlags::POSITION_VALID) {
        bf.insert(RelationFlags::POSITION_VALID);
    }

    let mut new_flags = RelationFlags::empty();
    let anded = af & bf;
    new_flags.set(RelationFlags::ORIENTATION_VALID, anded.contains(RelationFlags::ORIENTATION_VALID));
    new_flags.set(RelationFlags::POSITION_VALID, anded.contains(RelationFlags::POSITION_VALID));
    new_flags.set(RelationFlags::ORIENTATION_TRACKED, anded.contains(RelationFlags::ORIENTATION_TRACKED));
    new_flags.set(RelationFlags::POSITION_TRACKED, anded.contains(RelationFlags::POSITION_TRACKED));
    let has_linear_velocity = anded.contains(RelationFlags::LINEAR_VELOCITY_VALID);
    let has_angular_velocity = anded.contains(RelationFlags::ANGULAR_VELOCITY_VALID);
    new_flags.set(RelationFlags::LINEAR_VELOCITY_VALID, has_linear_velocity);
    new_flags.set(RelationFlags::ANGULAR_VELOCITY_VALID, has_angular_velocity);

    let pose = body_pose.transform_by(&base_pose);

    let mut linear_velocity = Vec3::ZERO;
    let mut angular_velocity = Vec3::ZERO;

    if has_linear_velocity {
        linear_velocity += base_pose.orientation * a.linear_velocity;
        linear_velocity += b.linear_velocity;
    }

    if has_angular_velocity {
        angular_velocity += base_pose.orientation * a.angular_velocity;
        angular_velocity += b.angular_velocity;

        // Tangential ("lever arm") velocity: an angular velocity at the
        // origin produces linear velocity everywhere else.
        let rotated_position = base_pose.orientation * body_pose.position;
        let tangential_velocity = b.angular_velocity.cross(rotated_position);
        linear_velocity += tangential_velocity;
    }

    Relation {
        flags: new_flags,
        pose,
        linear_velocity,
        angular_velocity,
    }
}

/// An ordered sequence of up to [`RelationChain::MAX_STEPS`] relations
/// representing a transform path `A -> B -> C -> ...`.
#[derive(Debug, Clone, Default)]
pub struct RelationChain {
    steps: smallvec::SmallVec<[Relation; RelationChain::MAX_STEPS]>,
}

impl RelationChain {
    /// Chains pick N >= 8; this implementation uses 8.
    pub const MAX_STEPS: usize = 8;

    #[must_use]
    pub fn new() -> Self {
        Self { steps: smallvec::SmallVec::new() }
    }

    /// Appends a step. Exceeding `MAX_STEPS` is a programmer error.
    pub fn push(&mut self, relation: Relation) {
        assert!(
            self.steps.len() < Self::MAX_STEPS,
            "relation chain overflow: exceeded {} steps",
            Self::MAX_STEPS
        );
        self.steps.push(relation);
    }

    /// Removes every step, returning the chain to empty.
    pub fn clear(&mut self) {
        self.steps.clear();
    }

    /// Resolves the chain into a single relation.
    ///
    /// If the chain is empty, or any step has neither orientation-valid
    /// nor position-valid, the result is the fully-cleared relation. The
    /// output orientation is renormalized to absorb floating-point drift
    /// accumulated across the fold.
    #[must_use]
    pub fn resolve(&self) -> Relation {
        if self.steps.is_empty() || self.has_step_with_no_pose() {
            return Relation::CLEARED;
        }

        let mut acc = self.steps[0];
        for step in &self.steps[1..] {
            acc = compose(&acc, step);
        }
        acc.pose.orientation = acc.pose.orientation.normalize();
        acc
    }

    fn has_step_with_no_pose(&self) -> bool {
        self.steps.iter().any(|r| !r.has_pose_component())
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
    fn empty_chain_resolves_to_cleared() {
        let chain = RelationChain::new();
        assert_eq!(chain.resolve(), Relation::CLEARED);
    }

    #[test]
    fn step_with_neither_orientation_nor_position_clears_whole_chain() {
        let mut chain = RelationChain::new();
        chain.push(Relation::identity_valid());
        chain.push(Relation {
            flags: RelationFlags::LINEAR_VELOCITY_VALID,
            ..Relation::CLEARED
        });
        assert_eq!(chain.resolve(), Relation::CLEARED);
    }

    #[test]
    fn single_step_chain_is_passthrough() {
        // A position-only relation (no orientation) with only one step
        // in the chain is returned as-is: the fold never runs.
        let position_only = Relation {
            flags: RelationFlags::POSITION_VALID,
            pose: Pose::new(Quat::IDENTITY, Vec3::new(1.0, 2.0, 3.0)),
            ..Relation::CLEARED
        };
        let mut chain = RelationChain::new();
        chain.push(position_only);
        let resolved = chain.resolve();
        assert_eq!(resolved.flags, RelationFlags::POSITION_VALID);
        assert!(vec3_approx(resolved.pose.position, Vec3::new(1.0, 2.0, 3.0)));
    }

    #[test]
    fn identity_append_is_invariant() {
        let mut base = RelationChain::new();
        base.push(Relation::identity_valid());
        base.push(Relation {
            flags: RelationFlags::POSITION_VALID,
            pose: Pose::new(Quat::IDENTITY, Vec3::new(5.0, 0.0, 0.0)),
            ..Relation::CLEARED
        });
        let before = base.resolve();

        base.push(Relation::identity_valid());
        let after = base.resolve();

        assert_eq!(before.flags, after.flags);
        assert!(vec3_approx(before.pose.position, after.pose.position));
    }

    #[test]
    fn three_dof_uplift() {
        // Step A: orientation-valid, identity orientation, no position.
        let step_a = Relation {
            flags: RelationFlags::ORIENTATION_VALID,
            pose: Pose::IDENTITY,
            ..Relation::CLEARED
        };
        // Step B: position-valid at (1,0,0), no orientation.
        let step_b = Relation {
            flags: RelationFlags::POSITION_VALID,
            pose: Pose::new(Quat::IDENTITY, Vec3::new(1.0, 0.0, 0.0)),
            ..Relation::CLEARED
        };

        let mut chain = RelationChain::new();
        chain.push(step_a);
        chain.push(step_b);
        let resolved = chain.resolve();

        assert!(!resolved.flags.contains(RelationFlags::ORIENTATION_VALID));
        assert!(resolved.flags.contains(RelationFlags::POSITION_VALID));
        assert!(vec3_approx(resolved.pose.position, Vec3::new(1.0, 0.0, 0.0)));
    }

    #[test]
    fn resolve_is_deterministic() {
        let mut chain = RelationChain::new();
        chain.push(Relation {
            flags: RelationFlags::ORIENTATION_VALID | RelationFlags::POSITION_VALID,
            pose: Pose::new(Quat::from_rotation_y(0.4), Vec3::new(1.0, 0.0, 0.0)),
            ..Relation::CLEARED
        });
        chain.push(Relation {
            flags: RelationFlags::ORIENTATION_VALID | RelationFlags::POSITION_VALID,
            pose: Pose::new(Quat::from_rotation_x(0.2), Vec3::new(0.0, 1.0, 0.0)),
            ..Relation::CLEARED
        });

        let a = chain.resolve();
        let b = chain.resolve();
        assert_eq!(a.flags, b.flags);
        assert!(vec3_approx(a.pose.position, b.pose.position));
        assert!(a.pose.orientation.angle_between(b.pose.orientation) < EPSILON);
    }

    #[test]
    fn linear_velocity_includes_lever_arm() {
        let a = Relation {
            flags: RelationFlags::ORIENTATION_VALID
                | RelationFlags::POSITION_VALID
                | RelationFlags::LINEAR_VELOCITY_VALID
                | RelationFlags::ANGULAR_VELOCITY_VALID,
            pose: Pose::new(Quat::IDENTITY, Vec3::new(1.0, 0.0, 0.0)),
            linear_velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
        };
        let b = Relation {
            flags: RelationFlags::ORIENTATION_VALID
                | RelationFlags::POSITION_VALID
                | RelationFlags::LINEAR_VELOCITY_VALID
                | RelationFlags::ANGULAR_VELOCITY_VALID,
            pose: Pose::IDENTITY,
            linear_velocity: Vec3::ZERO,
            angular_velocity: Vec3::new(0.0, 0.0, 1.0),
        };

        let out = compose(&a, &b);
        // angular velocity about +Z at b's origin induces a linear
        // velocity at a's position (1,0,0): omega x r = (0,0,1) x (1,0,0) = (0,1,0)
        assert!(vec3_approx(out.linear_velocity, Vec3::new(0.0, 1.0, 0.0)));
    }

    #[test]
    fn chain_push_past_max_steps_panics() {
        let result = std::panic::catch_unwind(|| {
            let mut chain = RelationChain::new();
            for _ in 0..RelationChain::MAX_STEPS + 1 {
                chain.push(Relation::identity_valid());
            }
        });
        assert!(result.is_err());
    }
}
