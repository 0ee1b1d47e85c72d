//! Math type re-exports and rig-specific transform utilities.
//!
//! Vectors are `glam::DVec3`. [`Transform`] wraps a `glam::DMat4` but exposes the
//! row-vector convention used throughout the rigging code: rows 0..2 are the
//! local X/Y/Z axes, row 3 is the translation, and `a * b` reads as "`a`
//! expressed in `b`'s space" (`local * parent_world == world`).

pub use glam::{DMat3, DMat4, DQuat, DVec3, DVec4};

use crate::util::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Mul;

/// 3D vector type used for positions and directions.
pub type Vector = DVec3;

/// Determinant magnitude below which a transform is considered singular.
pub const DEGENERATE_EPSILON: f64 = 1e-9;

/// Default tolerance for approximate comparisons.
pub const TOLERANCE: f64 = 1e-6;

/// Normal of the YZ plane, the default mirror plane for characters.
pub const MIRROR_PLANE: Vector = DVec3::new(-1.0, 0.0, 0.0);

/// Reflect a vector across the plane through the origin with the given normal.
#[inline]
pub fn reflect_vector(v: Vector, plane: Vector) -> Vector {
    let n = plane.normalize_or_zero();
    v - n * 2.0 * v.dot(n)
}

/// Compare two vectors within a tolerance.
#[inline]
pub fn vec_approx_eq(a: Vector, b: Vector, eps: f64) -> bool {
    (a - b).abs().max_element() <= eps
}

// ============================================================================
// Transform
// ============================================================================

/// 4x4 affine transform, row-major with translation in row 3.
#[derive(Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transform(pub DMat4);

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Self = Self(DMat4::IDENTITY);

    /// Build from 16 values in row-major order.
    pub fn from_rows(m: [f64; 16]) -> Self {
        // Row i of the rig matrix is column i of the glam matrix.
        Self(DMat4::from_cols_array(&m))
    }

    /// The 16 values in row-major order.
    pub fn to_rows(&self) -> [f64; 16] {
        self.0.to_cols_array()
    }

    /// Build from axis rows and a translation row.
    pub fn from_axes(x: Vector, y: Vector, z: Vector, t: Vector) -> Self {
        Self(DMat4::from_cols(
            x.extend(0.0),
            y.extend(0.0),
            z.extend(0.0),
            t.extend(1.0),
        ))
    }

    pub fn from_translation(t: Vector) -> Self {
        Self(DMat4::from_translation(t))
    }

    pub fn from_quat(q: DQuat) -> Self {
        Self(DMat4::from_quat(q))
    }

    pub fn from_rotation_translation(q: DQuat, t: Vector) -> Self {
        Self(DMat4::from_rotation_translation(q, t))
    }

    pub fn from_scale(s: Vector) -> Self {
        Self(DMat4::from_scale(s))
    }

    /// Rotation about an axis, angle in radians.
    pub fn from_axis_angle(axis: Vector, angle: f64) -> Self {
        Self(DMat4::from_axis_angle(axis.normalize_or_zero(), angle))
    }

    /// Rotation from XYZ Euler angles in degrees, X applied first.
    pub fn from_euler_xyz(degrees: Vector) -> Self {
        Self::from_quat(euler_xyz_to_quat(degrees))
    }

    #[inline]
    pub fn x_axis(&self) -> Vector {
        self.0.x_axis.truncate()
    }

    #[inline]
    pub fn y_axis(&self) -> Vector {
        self.0.y_axis.truncate()
    }

    #[inline]
    pub fn z_axis(&self) -> Vector {
        self.0.z_axis.truncate()
    }

    /// Axis row by index (0 = X, 1 = Y, 2 = Z).
    pub fn axis(&self, index: usize) -> Vector {
        match index {
            0 => self.x_axis(),
            1 => self.y_axis(),
            _ => self.z_axis(),
        }
    }

    #[inline]
    pub fn translation(&self) -> Vector {
        self.0.w_axis.truncate()
    }

    pub fn with_translation(mut self, t: Vector) -> Self {
        self.0.w_axis = t.extend(1.0);
        self
    }

    /// Rotation part with scale removed.
    pub fn rotation(&self) -> DQuat {
        let (_, rotation, _) = self.0.to_scale_rotation_translation();
        rotation.normalize()
    }

    /// Per-axis scale (length of each axis row).
    pub fn scale(&self) -> Vector {
        Vector::new(self.x_axis().length(), self.y_axis().length(), self.z_axis().length())
    }

    /// Scale every axis row uniformly, keeping the translation.
    pub fn scaled(&self, factor: f64) -> Self {
        Self::from_axes(
            self.x_axis() * factor,
            self.y_axis() * factor,
            self.z_axis() * factor,
            self.translation(),
        )
    }

    /// Same transform with unit-length axes.
    pub fn normalized(&self) -> Self {
        Self::from_rotation_translation(self.rotation(), self.translation())
    }

    /// Move by an offset expressed in world space.
    pub fn translated(&self, offset: Vector) -> Self {
        self.with_translation(self.translation() + offset)
    }

    #[inline]
    pub fn determinant(&self) -> f64 {
        self.0.determinant()
    }

    pub fn transpose(&self) -> Self {
        Self(self.0.transpose())
    }

    /// Inverse transform; fails when the determinant is near zero.
    pub fn inverse(&self) -> Result<Self> {
        let det = self.determinant();
        if det.abs() < DEGENERATE_EPSILON {
            return Err(Error::degenerate(format!(
                "transform is not invertible (determinant {det:e})"
            )));
        }
        Ok(Self(self.0.inverse()))
    }

    /// Reflect axes and translation across a plane through the origin.
    pub fn reflect(&self, plane: Vector) -> Self {
        Self::from_axes(
            reflect_vector(self.x_axis(), plane),
            reflect_vector(self.y_axis(), plane),
            reflect_vector(self.z_axis(), plane),
            reflect_vector(self.translation(), plane),
        )
    }

    /// Transform a point (row vector times matrix).
    #[inline]
    pub fn transform_point(&self, p: Vector) -> Vector {
        self.0.transform_point3(p)
    }

    /// Transform a direction, ignoring translation.
    #[inline]
    pub fn transform_vector(&self, v: Vector) -> Vector {
        self.0.transform_vector3(v)
    }

    pub fn approx_eq(&self, other: &Self, eps: f64) -> bool {
        self.0.abs_diff_eq(other.0, eps)
    }

    /// Euler XYZ angles in degrees of the rotation part.
    pub fn euler_xyz(&self) -> Vector {
        quat_to_euler_xyz(self.rotation())
    }
}

impl Mul for Transform {
    type Output = Transform;

    /// `self` expressed in `rhs`'s space.
    #[inline]
    fn mul(self, rhs: Transform) -> Transform {
        Transform(rhs.0 * self.0)
    }
}

impl From<DMat4> for Transform {
    fn from(m: DMat4) -> Self {
        Self(m)
    }
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = self.to_rows();
        write!(f, "Transform(")?;
        for (i, row) in r.chunks(4).enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "[{:.3}, {:.3}, {:.3}, {:.3}]", row[0], row[1], row[2], row[3])?;
        }
        write!(f, ")")
    }
}

// ============================================================================
// Rotation helpers
// ============================================================================

/// XYZ Euler (degrees, X applied first) to quaternion.
pub fn euler_xyz_to_quat(degrees: Vector) -> DQuat {
    let r = degrees * (std::f64::consts::PI / 180.0);
    DQuat::from_rotation_z(r.z) * DQuat::from_rotation_y(r.y) * DQuat::from_rotation_x(r.x)
}

/// Quaternion to XYZ Euler degrees (X applied first).
pub fn quat_to_euler_xyz(q: DQuat) -> Vector {
    let (z, y, x) = q.to_euler(glam::EulerRot::ZYX);
    Vector::new(x, y, z) * (180.0 / std::f64::consts::PI)
}

/// Shortest rotation taking direction `from` onto direction `to`.
pub fn rotation_arc(from: Vector, to: Vector) -> DQuat {
    let (a, b) = (from.normalize_or_zero(), to.normalize_or_zero());
    if a == Vector::ZERO || b == Vector::ZERO {
        return DQuat::IDENTITY;
    }
    DQuat::from_rotation_arc(a, b)
}

/// Normalized weighted blend of rotations, aligned to the first hemisphere.
pub fn blend_rotations(rotations: &[(DQuat, f64)]) -> DQuat {
    let Some(&(reference, _)) = rotations.first() else {
        return DQuat::IDENTITY;
    };
    let mut acc = DVec4::ZERO;
    for &(q, w) in rotations {
        let v = DVec4::from(q);
        let aligned = if v.dot(DVec4::from(reference)) < 0.0 { -v } else { v };
        acc += aligned * w;
    }
    if acc.length_squared() < DEGENERATE_EPSILON {
        return reference;
    }
    DQuat::from_vec4(acc.normalize())
}
