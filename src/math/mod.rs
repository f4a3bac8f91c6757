//! Mathematical utilities

pub mod matrix;

pub use matrix::{is_identity, rotation_x, rotation_xyz, IDENTITY_EPSILON};
