//! 4x4 matrix helpers shared by transform resolution and authoring.
//!
//! Matrices use glam's column-vector convention (`world = parent * local`).
//! On the wire a matrix is four arrays of four numbers taken column by column,
//! so `m[3]` holds the translation `[tx, ty, tz, 1]`.

use crate::core::types::{DMat4, DVec3};

/// Per-entry tolerance for the identity test.
pub const IDENTITY_EPSILON: f64 = 1e-12;

/// True when all 16 entries are within [`IDENTITY_EPSILON`] of identity.
pub fn is_identity(m: &DMat4) -> bool {
    let cols = m.to_cols_array_2d();
    for (c, col) in cols.iter().enumerate() {
        for (r, v) in col.iter().enumerate() {
            let expected = if r == c { 1.0 } else { 0.0 };
            if (v - expected).abs() > IDENTITY_EPSILON {
                return false;
            }
        }
    }
    true
}

/// Wire layout of a matrix.
pub fn to_nested(m: &DMat4) -> [[f64; 4]; 4] {
    m.to_cols_array_2d()
}

/// Inverse of [`to_nested`].
pub fn from_nested(rows: &[[f64; 4]; 4]) -> DMat4 {
    DMat4::from_cols_array_2d(rows)
}

/// Rotation from XYZ Euler angles in degrees, X applied first.
pub fn rotation_xyz(degrees: DVec3) -> DMat4 {
    let rx = DMat4::from_rotation_x(degrees.x.to_radians());
    let ry = DMat4::from_rotation_y(degrees.y.to_radians());
    let rz = DMat4::from_rotation_z(degrees.z.to_radians());
    rz * ry * rx
}

/// Rotation about X in degrees.
pub fn rotation_x(degrees: f64) -> DMat4 {
    DMat4::from_rotation_x(degrees.to_radians())
}
