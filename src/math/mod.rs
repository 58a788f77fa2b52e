//! Math primitives: poses, fields of view, relation chains, and the
//! timewarp matrix derived from them.

pub mod fov;
pub mod pose;
pub mod relation;
pub mod timewarp;

pub use fov::{Fov, NormalizedRect};
pub use pose::Pose;
pub use relation::{compose, Relation, RelationChain, RelationFlags};
pub use timewarp::calc_time_warp_matrix;
