use crate::types::Vector3;
use std::ops;

/// Rotation quaternion `[w, x, y, z]` (Hamilton convention).
///
/// Orientations produced by the filter map body-frame vectors into the earth
/// frame: `v_earth = q ⊗ [0, v_body] ⊗ q*`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quaternion {
    pub w: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Display angles in radians, ZYX (yaw, then pitch, then roll) order.
///
/// Lossy near pitch = ±90°; never fed back into the filter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EulerAngles {
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

impl EulerAngles {
    /// `[roll, pitch, yaw]` in degrees.
    pub fn to_degrees(self) -> [f64; 3] {
        [
            self.roll.to_degrees(),
            self.pitch.to_degrees(),
            self.yaw.to_degrees(),
        ]
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Quaternion::IDENTITY
    }
}

impl Quaternion {
    pub const IDENTITY: Quaternion = Quaternion { w: 1.0, x: 0.0, y: 0.0, z: 0.0 };

    pub const fn new(w: f64, x: f64, y: f64, z: f64) -> Self {
        Self { w, x, y, z }
    }

    pub const fn identity() -> Self {
        Self::IDENTITY
    }

    /// Pure quaternion `[0, v]`.
    pub const fn from_vector(v: Vector3) -> Self {
        Self::new(0.0, v.x, v.y, v.z)
    }

    /// Rotation of `angle` radians about `axis`. A degenerate axis yields identity.
    pub fn from_axis_angle(axis: Vector3, angle: f64) -> Self {
        match axis.normalized() {
            Some(a) => {
                let (s, c) = (angle * 0.5).sin_cos();
                Quaternion::new(c, a.x * s, a.y * s, a.z * s)
            }
            None => Quaternion::IDENTITY,
        }
    }

    /// Vector part.
    pub fn vector(self) -> Vector3 {
        Vector3::new(self.x, self.y, self.z)
    }

    pub fn conjugate(self) -> Self {
        Quaternion::new(self.w, -self.x, -self.y, -self.z)
    }

    pub fn dot(self, other: Quaternion) -> f64 {
        self.w * other.w + self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn norm(self) -> f64 {
        self.dot(self).sqrt()
    }

    pub fn is_finite(self) -> bool {
        self.w.is_finite() && self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    /// Finite and within `eps` of unit norm.
    pub fn is_unit(self, eps: f64) -> bool {
        self.is_finite() && (self.norm() - 1.0).abs() <= eps
    }

    /// Scale to unit norm. Returns `None` when the norm is near zero or not finite.
    pub fn normalized(self) -> Option<Quaternion> {
        let n = self.norm();
        if !n.is_finite() || n < 1e-12 {
            return None;
        }
        Some(self * (1.0 / n))
    }

    /// Rotate `v` by this quaternion: `q ⊗ [0, v] ⊗ q*`.
    pub fn rotate_vector(self, v: Vector3) -> Vector3 {
        (self * Quaternion::from_vector(v) * self.conjugate()).vector()
    }

    /// Smallest rotation angle (radians) between two unit orientations.
    pub fn angle_to(self, other: Quaternion) -> f64 {
        2.0 * self.dot(other).abs().clamp(0.0, 1.0).acos()
    }

    /// Rotation axis and angle (radians). The axis is +X for a null rotation.
    pub fn to_axis_angle(self) -> (Vector3, f64) {
        let w = self.w.clamp(-1.0, 1.0);
        let angle = 2.0 * w.acos();
        let s = (1.0 - w * w).sqrt();
        if s < 1e-9 {
            return (Vector3::new(1.0, 0.0, 0.0), 0.0);
        }
        (self.vector() * (1.0 / s), angle)
    }

    /// 3x3 row-major rotation matrix.
    pub fn to_rotation_matrix(self) -> [[f64; 3]; 3] {
        let Quaternion { w, x, y, z } = self;
        [
            [1.0 - 2.0*(y*y + z*z), 2.0*(x*y - z*w),       2.0*(x*z + y*w)],
            [2.0*(x*y + z*w),       1.0 - 2.0*(x*x + z*z), 2.0*(y*z - x*w)],
            [2.0*(x*z - y*w),       2.0*(y*z + x*w),       1.0 - 2.0*(x*x + y*y)],
        ]
    }

    /// Roll/pitch/yaw for display.
    ///
    /// Near gimbal lock yaw is pinned to zero and the remaining rotation is
    /// reported as roll.
    pub fn to_euler(self) -> EulerAngles {
        let m = self.to_rotation_matrix();
        let pitch = (-m[2][0]).clamp(-1.0, 1.0).asin();
        if pitch.cos().abs() > 1e-6 {
            EulerAngles {
                roll: m[2][1].atan2(m[2][2]),
                pitch,
                yaw: m[1][0].atan2(m[0][0]),
            }
        } else {
            EulerAngles {
                roll: (-m[1][2]).atan2(m[1][1]),
                pitch,
                yaw: 0.0,
            }
        }
    }
}

impl ops::Mul for Quaternion {
    type Output = Self;

    fn mul(self, b: Self) -> Self {
        let a = self;
        Quaternion::new(
            a.w * b.w - a.x * b.x - a.y * b.y - a.z * b.z,
            a.w * b.x + a.x * b.w + a.y * b.z - a.z * b.y,
            a.w * b.y - a.x * b.z + a.y * b.w + a.z * b.x,
            a.w * b.z + a.x * b.y - a.y * b.x + a.z * b.w,
        )
    }
}

impl ops::Mul<f64> for Quaternion {
    type Output = Self;

    fn mul(self, k: f64) -> Self {
        Quaternion::new(self.w * k, self.x * k, self.y * k, self.z * k)
    }
}

impl ops::Mul<Quaternion> for f64 {
    type Output = Quaternion;

    fn mul(self, q: Quaternion) -> Quaternion {
        q * self
    }
}

impl ops::Add for Quaternion {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Quaternion::new(self.w + rhs.w, self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl ops::Sub for Quaternion {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Quaternion::new(self.w - rhs.w, self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl From<[f64; 4]> for Quaternion {
    /// From `[w, x, y, z]`.
    fn from(q: [f64; 4]) -> Self {
        Quaternion::new(q[0], q[1], q[2], q[3])
    }
}
