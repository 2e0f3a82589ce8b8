//! Vector math for placement poses and squeeze geometry.
//!
//! The town simulation does not run in lock-step, so plain `f32` is used
//! throughout. Anything that drives a state transition (squeeze ratio,
//! hazard intensity) is clamped before it is compared.

use serde::{Deserialize, Serialize};

/// Lengths below this are treated as zero when normalizing.
pub const EPSILON: f32 = 1e-6;

/// 3D vector in world space (Y up).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    /// X coordinate.
    pub x: f32,
    /// Y coordinate (up).
    pub y: f32,
    /// Z coordinate (forward).
    pub z: f32,
}

impl Vec3 {
    /// Zero vector.
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);
    /// Unit vector with all components set to one.
    pub const ONE: Self = Self::new(1.0, 1.0, 1.0);
    /// World up.
    pub const UP: Self = Self::new(0.0, 1.0, 0.0);
    /// World right.
    pub const RIGHT: Self = Self::new(1.0, 0.0, 0.0);
    /// World forward.
    pub const FORWARD: Self = Self::new(0.0, 0.0, 1.0);

    /// Create a new vector.
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Dot product of two vectors.
    #[must_use]
    pub fn dot(self, other: Self) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// Cross product (right-handed).
    #[must_use]
    pub fn cross(self, other: Self) -> Self {
        Self::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    /// Squared length (avoids sqrt for comparisons).
    #[must_use]
    pub fn length_squared(self) -> f32 {
        self.dot(self)
    }

    /// Length (magnitude) of the vector.
    #[must_use]
    pub fn length(self) -> f32 {
        self.length_squared().sqrt()
    }

    /// Distance to another point.
    #[must_use]
    pub fn distance(self, other: Self) -> f32 {
        (self - other).length()
    }

    /// Unit vector in the same direction, or `None` for a degenerate vector.
    #[must_use]
    pub fn try_normalize(self) -> Option<Self> {
        let len = self.length();
        if len <= EPSILON {
            None
        } else {
            Some(self * (1.0 / len))
        }
    }

    /// Remove the component along `normal` (which must be unit length).
    #[must_use]
    pub fn project_on_plane(self, normal: Self) -> Self {
        self - normal * self.dot(normal)
    }

    /// Component-wise product.
    #[must_use]
    pub fn scale(self, other: Self) -> Self {
        Self::new(self.x * other.x, self.y * other.y, self.z * other.z)
    }

    /// Linearly interpolate between two vectors.
    #[must_use]
    pub fn lerp(self, other: Self, t: f32) -> Self {
        self + (other - self) * t
    }
}

impl std::ops::Add for Vec3 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl std::ops::Sub for Vec3 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl std::ops::Mul<f32> for Vec3 {
    type Output = Self;

    fn mul(self, rhs: f32) -> Self::Output {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl std::ops::Neg for Vec3 {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self::new(-self.x, -self.y, -self.z)
    }
}

/// Position plus orientation, stored as an orthonormal forward/up pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// World position.
    pub position: Vec3,
    /// Unit forward axis.
    pub forward: Vec3,
    /// Unit up axis.
    pub up: Vec3,
}

impl Default for Pose {
    fn default() -> Self {
        Self::at(Vec3::ZERO)
    }
}

impl Pose {
    /// Identity orientation at `position`.
    #[must_use]
    pub const fn at(position: Vec3) -> Self {
        Self {
            position,
            forward: Vec3::FORWARD,
            up: Vec3::UP,
        }
    }

    /// Build a pose looking along `forward` with the given `up` hint.
    ///
    /// Returns `None` when `forward` is degenerate or parallel to `up`.
    #[must_use]
    pub fn look_rotation(position: Vec3, forward: Vec3, up: Vec3) -> Option<Self> {
        let forward = forward.try_normalize()?;
        let right = up.cross(forward).try_normalize()?;
        let up = forward.cross(right);
        Some(Self {
            position,
            forward,
            up,
        })
    }

    /// Unit right axis (`up × forward`).
    #[must_use]
    pub fn right(&self) -> Vec3 {
        self.up.cross(self.forward)
    }
}

/// 3x3 matrix stored as columns.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mat3 {
    /// Column vectors.
    pub cols: [Vec3; 3],
}

impl Mat3 {
    /// Build from three column vectors.
    #[must_use]
    pub const fn from_cols(x: Vec3, y: Vec3, z: Vec3) -> Self {
        Self { cols: [x, y, z] }
    }

    /// Diagonal scale matrix.
    #[must_use]
    pub const fn from_diagonal(d: Vec3) -> Self {
        Self::from_cols(
            Vec3::new(d.x, 0.0, 0.0),
            Vec3::new(0.0, d.y, 0.0),
            Vec3::new(0.0, 0.0, d.z),
        )
    }

    /// Transpose (the inverse for an orthonormal basis).
    #[must_use]
    pub fn transpose(&self) -> Self {
        let [a, b, c] = self.cols;
        Self::from_cols(
            Vec3::new(a.x, b.x, c.x),
            Vec3::new(a.y, b.y, c.y),
            Vec3::new(a.z, b.z, c.z),
        )
    }

    /// Matrix-vector product.
    #[must_use]
    pub fn mul_vec(&self, v: Vec3) -> Vec3 {
        self.cols[0] * v.x + self.cols[1] * v.y + self.cols[2] * v.z
    }

    /// Matrix-matrix product.
    #[must_use]
    pub fn mul_mat(&self, rhs: &Self) -> Self {
        Self::from_cols(
            self.mul_vec(rhs.cols[0]),
            self.mul_vec(rhs.cols[1]),
            self.mul_vec(rhs.cols[2]),
        )
    }

    /// Length of each column, i.e. how much each local axis is stretched.
    #[must_use]
    pub fn column_lengths(&self) -> Vec3 {
        Vec3::new(
            self.cols[0].length(),
            self.cols[1].length(),
            self.cols[2].length(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn test_vec3_cross_is_right_handed() {
        let z = Vec3::RIGHT.cross(Vec3::UP);
        assert_eq!(z, Vec3::FORWARD);
    }

    #[test]
    fn test_vec3_normalize_degenerate() {
        assert!(Vec3::ZERO.try_normalize().is_none());
        let n = Vec3::new(3.0, 0.0, 4.0).try_normalize().unwrap();
        assert!(approx(n.length(), 1.0));
        assert!(approx(n.x, 0.6));
    }

    #[test]
    fn test_project_on_plane() {
        let v = Vec3::new(1.0, 2.0, 3.0).project_on_plane(Vec3::UP);
        assert_eq!(v, Vec3::new(1.0, 0.0, 3.0));
    }

    #[test]
    fn test_pose_look_rotation_orthonormal() {
        let pose = Pose::look_rotation(Vec3::ZERO, Vec3::new(1.0, 0.5, 0.0), Vec3::UP).unwrap();
        assert!(approx(pose.forward.length(), 1.0));
        assert!(approx(pose.up.length(), 1.0));
        assert!(approx(pose.forward.dot(pose.up), 0.0));
        assert!(Pose::look_rotation(Vec3::ZERO, Vec3::UP, Vec3::UP).is_none());
    }

    #[test]
    fn test_mat3_transpose_round_trip() {
        let m = Mat3::from_cols(
            Vec3::new(1.0, 2.0, 3.0),
            Vec3::new(4.0, 5.0, 6.0),
            Vec3::new(7.0, 8.0, 9.0),
        );
        assert_eq!(m.transpose().transpose(), m);
        assert_eq!(m.mul_vec(Vec3::RIGHT), Vec3::new(1.0, 2.0, 3.0));
    }
}
