use std::ops;

/// Three-component vector used for angular rate, acceleration and magnetic field.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub const ZERO: Vector3 = Vector3 { x: 0.0, y: 0.0, z: 0.0 };

    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn dot(self, other: Vector3) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn norm(self) -> f64 {
        self.dot(self).sqrt()
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    /// Unit vector in the same direction, or `None` for zero-length and
    /// non-finite input.
    pub fn normalized(self) -> Option<Vector3> {
        let n = self.norm();
        if !n.is_finite() || n <= f64::EPSILON {
            return None;
        }
        Some(self * (1.0 / n))
    }
}

impl ops::Add for Vector3 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Vector3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl ops::Sub for Vector3 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Vector3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl ops::Mul<f64> for Vector3 {
    type Output = Self;

    fn mul(self, k: f64) -> Self {
        Vector3::new(self.x * k, self.y * k, self.z * k)
    }
}

impl From<[f64; 3]> for Vector3 {
    fn from(v: [f64; 3]) -> Self {
        Vector3::new(v[0], v[1], v[2])
    }
}

/// Unit in which a sensor reports angular velocity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AngularUnit {
    RadiansPerSecond,
    DegreesPerSecond,
}

impl AngularUnit {
    /// Convert a rate in this unit to rad/s.
    pub fn to_radians(self, rate: Vector3) -> Vector3 {
        match self {
            AngularUnit::RadiansPerSecond => rate,
            AngularUnit::DegreesPerSecond => Vector3::new(
                rate.x.to_radians(),
                rate.y.to_radians(),
                rate.z.to_radians(),
            ),
        }
    }
}

/// One reading as produced by a sensor, gyro still in the sensor's native unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawSample {
    pub gyro: Vector3,
    pub accel: Vector3,
    pub mag: Vector3,
}

impl RawSample {
    /// Normalize units at the read boundary.
    pub fn into_sample(self, unit: AngularUnit) -> SensorSample {
        SensorSample {
            gyro: unit.to_radians(self.gyro),
            accel: self.accel,
            mag: self.mag,
        }
    }
}

/// Gyro/accel/mag triple captured at one instant, gyro in rad/s.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorSample {
    /// Angular velocity (rad/s).
    pub gyro: Vector3,
    /// Linear acceleration, any consistent unit.
    pub accel: Vector3,
    /// Magnetic field, any consistent unit.
    pub mag: Vector3,
}

bitflags::bitflags! {
    /// Terms that contributed to one filter update.
    ///
    /// An empty set means the update was rejected and the orientation was
    /// left untouched.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Correction: u8 {
        const GYRO  = 1 << 0;
        const ACCEL = 1 << 1;
        const MAG   = 1 << 2;
    }
}

impl Correction {
    /// Gyro integration ran but no reference-vector correction was applied.
    pub fn is_gyro_only(self) -> bool {
        self == Correction::GYRO
    }
}
