//! Gradient-descent attitude filter (Madgwick AHRS).
//!
//! The gyroscope rate is integrated as `q_dot = 0.5 * q ⊗ [0, ω]` and
//! corrected by a fixed-size step along the normalized gradient of the
//! misalignment between the predicted and measured gravity and magnetic
//! field directions. The result is re-normalized every update.

use crate::quaternion::Quaternion;
use crate::types::{Correction, SensorSample, Vector3};

/// Default filter gain.
pub const DEFAULT_BETA: f64 = 0.05;

/// Gradients at or below this norm are treated as zero and skipped.
const GRADIENT_EPSILON: f64 = 1e-9;

/// Pluggable orientation estimator driven by the background loop.
pub trait OrientationFilter {
    /// Fold one sample (gyro in rad/s) into the estimate.
    fn step(&mut self, sample: &SensorSample) -> Correction;

    /// Current orientation estimate.
    fn current(&self) -> Quaternion;

    /// Replace the carried orientation.
    fn reset(&mut self, orientation: Quaternion);
}

/// Madgwick MARG filter state: orientation, sample period and gain.
#[derive(Debug, Clone)]
pub struct Madgwick {
    q: Quaternion,
    sample_period: f64,
    beta: f64,
}

impl Madgwick {
    /// Creates a filter starting at `initial`.
    ///
    /// - `sample_period`, seconds between updates
    /// - `beta`, gradient step gain; higher tracks accel/mag faster but
    ///   passes more of their noise through
    pub fn new(initial: Quaternion, sample_period: f64, beta: f64) -> Self {
        Self {
            q: initial.normalized().unwrap_or(Quaternion::IDENTITY),
            sample_period,
            beta,
        }
    }

    pub fn beta(&self) -> f64 {
        self.beta
    }

    pub fn set_beta(&mut self, beta: f64) {
        self.beta = beta;
    }

    pub fn sample_period(&self) -> f64 {
        self.sample_period
    }

    /// 9-DOF update. Gyro in rad/s; accel and mag in any consistent units.
    ///
    /// A zero or non-finite accel or mag reading skips the correction and
    /// only integrates the gyro.
    pub fn update(&mut self, gyro: Vector3, accel: Vector3, mag: Vector3) -> Correction {
        let gradient = match (accel.normalized(), mag.normalized()) {
            (Some(a), Some(m)) => self.marg_gradient(a, m),
            _ => None,
        };
        self.integrate(gyro, gradient, Correction::ACCEL | Correction::MAG)
    }

    /// 6-DOF update for sensors without a magnetometer. Heading is then
    /// driven by the gyro alone.
    pub fn update_imu(&mut self, gyro: Vector3, accel: Vector3) -> Correction {
        let gradient = accel.normalized().and_then(|a| self.imu_gradient(a));
        self.integrate(gyro, gradient, Correction::ACCEL)
    }

    fn integrate(
        &mut self,
        gyro: Vector3,
        gradient: Option<Quaternion>,
        terms: Correction,
    ) -> Correction {
        let q = self.q;
        let dt = self.sample_period;
        let q_dot = 0.5 * (q * Quaternion::from_vector(gyro));

        if let Some(step) = gradient {
            if let Some(next) = (q + (q_dot - self.beta * step) * dt).normalized() {
                self.q = next;
                return Correction::GYRO | terms;
            }
        }

        match (q + q_dot * dt).normalized() {
            Some(next) => {
                self.q = next;
                Correction::GYRO
            }
            None => Correction::empty(),
        }
    }

    /// Normalized `Jᵀ f` for gravity plus magnetic field (a, m unit length).
    fn marg_gradient(&self, a: Vector3, m: Vector3) -> Option<Quaternion> {
        let Quaternion { w, x, y, z } = self.q;

        // Earth field direction with inclination kept and east component dropped.
        let h = self.q.rotate_vector(m);
        let bx = (h.x * h.x + h.y * h.y).sqrt();
        let bz = h.z;

        let f = [
            2.0 * (x * z - w * y) - a.x,
            2.0 * (w * x + y * z) - a.y,
            2.0 * (0.5 - x * x - y * y) - a.z,
            2.0 * bx * (0.5 - y * y - z * z) + 2.0 * bz * (x * z - w * y) - m.x,
            2.0 * bx * (x * y - w * z) + 2.0 * bz * (w * x + y * z) - m.y,
            2.0 * bx * (w * y + x * z) + 2.0 * bz * (0.5 - x * x - y * y) - m.z,
        ];

        let j = [
            [-2.0 * y, 2.0 * z, -2.0 * w, 2.0 * x],
            [2.0 * x, 2.0 * w, 2.0 * z, 2.0 * y],
            [0.0, -4.0 * x, -4.0 * y, 0.0],
            [
                -2.0 * bz * y,
                2.0 * bz * z,
                -4.0 * bx * y - 2.0 * bz * w,
                -4.0 * bx * z + 2.0 * bz * x,
            ],
            [
                -2.0 * bx * z + 2.0 * bz * x,
                2.0 * bx * y + 2.0 * bz * w,
                2.0 * bx * x + 2.0 * bz * z,
                -2.0 * bx * w + 2.0 * bz * y,
            ],
            [
                2.0 * bx * y,
                2.0 * bx * z - 4.0 * bz * x,
                2.0 * bx * w - 4.0 * bz * y,
                2.0 * bx * x,
            ],
        ];

        normalized_gradient(&j, &f)
    }

    /// Normalized `Jᵀ f` for gravity only.
    fn imu_gradient(&self, a: Vector3) -> Option<Quaternion> {
        let Quaternion { w, x, y, z } = self.q;

        let f = [
            2.0 * (x * z - w * y) - a.x,
            2.0 * (w * x + y * z) - a.y,
            2.0 * (0.5 - x * x - y * y) - a.z,
        ];
        let j = [
            [-2.0 * y, 2.0 * z, -2.0 * w, 2.0 * x],
            [2.0 * x, 2.0 * w, 2.0 * z, 2.0 * y],
            [0.0, -4.0 * x, -4.0 * y, 0.0],
        ];

        normalized_gradient(&j, &f)
    }
}

impl OrientationFilter for Madgwick {
    fn step(&mut self, sample: &SensorSample) -> Correction {
        self.update(sample.gyro, sample.accel, sample.mag)
    }

    fn current(&self) -> Quaternion {
        self.q
    }

    fn reset(&mut self, orientation: Quaternion) {
        self.q = orientation.normalized().unwrap_or(Quaternion::IDENTITY);
    }
}

/// `Jᵀ f` scaled to unit length, or `None` when it is (numerically) zero.
fn normalized_gradient<const N: usize>(j: &[[f64; 4]; N], f: &[f64; N]) -> Option<Quaternion> {
    let mut g = [0.0f64; 4];
    for (row, fr) in j.iter().zip(f.iter()) {
        for (gi, jri) in g.iter_mut().zip(row.iter()) {
            *gi += jri * fr;
        }
    }
    let g = Quaternion::from(g);
    let n = g.norm();
    if !n.is_finite() || n <= GRADIENT_EPSILON {
        return None;
    }
    Some(g * (1.0 / n))
}
