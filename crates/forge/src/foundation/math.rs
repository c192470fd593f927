//! Math types used by the geometry domain: instance placement is a rotation
//! plus a translation, both stored and manipulated through these aliases
//! rather than raw float arrays.

pub use nalgebra::{Quaternion, Unit, Vector3};

/// 3D vector type, used for instance translation and AABB extents.
pub type Vec3 = Vector3<f32>;

/// Unit quaternion type, used for instance rotation.
pub type Quat = Unit<Quaternion<f32>>;
