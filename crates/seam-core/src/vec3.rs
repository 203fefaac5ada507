//! Minimal 3D vector for block positions and mining directions.

use std::fmt;
use std::ops::{Add, Mul, Sub};

/// A 3-component `f32` vector.
///
/// Used for block world positions (where `(0, 0, 0)` means "unset") and
/// for the normalized mining-direction hint. Only the handful of
/// operations the pool needs are implemented; this is not a general
/// linear-algebra type.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Vec3 {
    /// X component.
    pub x: f32,
    /// Y component.
    pub y: f32,
    /// Z component.
    pub z: f32,
}

impl Vec3 {
    /// The zero vector, doubling as the "position unset" sentinel.
    pub const ZERO: Self = Self {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    /// Construct from components.
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Whether this position has been set (any non-zero component).
    ///
    /// Zero is the metadata default, so a block sitting exactly at the
    /// world origin is indistinguishable from an unannotated one. The
    /// zone manager avoids this by offsetting world coordinates.
    pub fn is_set(&self) -> bool {
        *self != Self::ZERO
    }

    /// Squared Euclidean length.
    pub fn length_sq(&self) -> f32 {
        self.x * self.x + self.y * self.y + self.z * self.z
    }

    /// Euclidean length.
    pub fn length(&self) -> f32 {
        self.length_sq().sqrt()
    }

    /// Squared distance to another point.
    pub fn distance_sq(&self, other: Self) -> f32 {
        (*self - other).length_sq()
    }

    /// Unit-length copy, or `None` for zero/non-finite vectors.
    pub fn normalized(&self) -> Option<Self> {
        let len = self.length();
        if !len.is_finite() || len <= f32::EPSILON {
            return None;
        }
        Some(Self::new(self.x / len, self.y / len, self.z / len))
    }
}

impl Add for Vec3 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f32> for Vec3 {
    type Output = Self;

    fn mul(self, rhs: f32) -> Self {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl fmt::Display for Vec3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}
