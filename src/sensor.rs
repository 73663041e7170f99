use crate::quaternion::Quaternion;
use crate::types::{AngularUnit, RawSample, Vector3};
use crate::Result;
use std::time::Duration;

/// A device that can be sampled for one gyro/accel/mag reading at a time.
///
/// `read` may block for as long as the underlying bus needs. The estimator
/// never holds its state lock across this call.
pub trait SensorSource {
    /// Read one sample. Gyro is reported in [`SensorSource::gyro_unit`].
    fn read(&mut self) -> Result<RawSample>;

    /// Unit of the gyro channel returned by `read`.
    fn gyro_unit(&self) -> AngularUnit;

    /// Re-establish the link after a disconnect error.
    fn reconnect(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<S: SensorSource + ?Sized> SensorSource for Box<S> {
    fn read(&mut self) -> Result<RawSample> {
        (**self).read()
    }

    fn gyro_unit(&self) -> AngularUnit {
        (**self).gyro_unit()
    }

    fn reconnect(&mut self) -> Result<()> {
        (**self).reconnect()
    }
}

/// Earth-frame gravity direction (z up), in g.
pub const EARTH_GRAVITY: Vector3 = Vector3::new(0.0, 0.0, 1.0);

/// Earth-frame magnetic field used by [`SyntheticSource`] unless overridden:
/// north along x with downward inclination.
pub const EARTH_FIELD: Vector3 = Vector3::new(0.22, 0.0, -0.42);

/// Simulated rigid body spinning at a constant body rate.
///
/// Each `read` advances the true orientation by one `step` and reports what
/// a noiseless sensor would measure, gyro in deg/s.
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    truth: Quaternion,
    rate_deg: Vector3,
    step: f64,
    field: Vector3,
    latency: Duration,
    reads: u64,
}

impl SyntheticSource {
    /// `rate_deg` is the body angular rate in deg/s, `step` the simulated
    /// seconds elapsed per read.
    pub fn new(rate_deg: Vector3, step: f64) -> Self {
        Self {
            truth: Quaternion::IDENTITY,
            rate_deg,
            step,
            field: EARTH_FIELD,
            latency: Duration::ZERO,
            reads: 0,
        }
    }

    /// Start the body at `orientation` instead of identity.
    pub fn with_orientation(mut self, orientation: Quaternion) -> Self {
        self.truth = orientation.normalized().unwrap_or(Quaternion::IDENTITY);
        self
    }

    /// Override the earth magnetic field vector.
    pub fn with_field(mut self, field: Vector3) -> Self {
        self.field = field;
        self
    }

    /// Block every read for `latency` to mimic a slow bus.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Orientation of the simulated body after the last read.
    pub fn true_orientation(&self) -> Quaternion {
        self.truth
    }

    pub fn reads(&self) -> u64 {
        self.reads
    }
}

impl SensorSource for SyntheticSource {
    fn read(&mut self) -> Result<RawSample> {
        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }

        let omega = AngularUnit::DegreesPerSecond.to_radians(self.rate_deg);
        let delta = Quaternion::from_axis_angle(omega, omega.norm() * self.step);
        self.truth = (self.truth * delta).normalized().unwrap_or(self.truth);
        self.reads += 1;

        let to_body = self.truth.conjugate();
        Ok(RawSample {
            gyro: self.rate_deg,
            accel: to_body.rotate_vector(EARTH_GRAVITY),
            mag: to_body.rotate_vector(self.field),
        })
    }

    fn gyro_unit(&self) -> AngularUnit {
        AngularUnit::DegreesPerSecond
    }
}
