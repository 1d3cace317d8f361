//! Math primitives for the elastid parameter-estimation pipeline.
//!
//! Thin nalgebra aliases plus the quaternion and bounding-box utilities the
//! mesh and simulation crates share.

pub mod aabb;
pub mod quaternion;

pub use aabb::Aabb;
pub use quaternion::Quat;

use nalgebra as na;

/// 3D vector alias.
pub type Vec3 = na::Vector3<f64>;
/// 3x3 matrix alias.
pub type Mat3 = na::Matrix3<f64>;
/// 4x4 matrix alias.
pub type Mat4 = na::Matrix4<f64>;
/// Dynamic vector.
pub type DVec = na::DVector<f64>;
/// Dynamic matrix.
pub type DMat = na::DMatrix<f64>;

/// Standard gravity (m/s²).
pub const GRAVITY: f64 = 9.8;
