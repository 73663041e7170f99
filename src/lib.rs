//! # imuviz - asynchronous MARG orientation estimation
//!
//! Fuses gyroscope, accelerometer and magnetometer readings into a unit
//! quaternion on a background thread. Provides:
//! - A Madgwick gradient-descent AHRS filter in double precision
//! - A fixed-rate estimator loop that tolerates slow and failing sensors
//! - Lock-guarded snapshots for render/telemetry loops at any cadence
//! - Mounting-offset compensation for display
//!
//! ## Quick Start
//! ```no_run
//! use imuviz::{EstimatorConfig, MountingCalibration, OrientationEstimator, SyntheticSource, Vector3};
//! use std::time::Duration;
//!
//! let source = SyntheticSource::new(Vector3::new(0.0, 0.0, 45.0), 1.0 / 30.0);
//! let estimator = OrientationEstimator::start(source, EstimatorConfig::default()).unwrap();
//! let mount = MountingCalibration::identity();
//!
//! for _ in 0..100 {
//!     let q = mount.apply(estimator.snapshot());
//!     println!("{:?}", q.to_euler().to_degrees());
//!     std::thread::sleep(Duration::from_millis(16));
//! }
//! estimator.stop();
//! ```

pub mod error;
pub mod types;
pub mod quaternion;
pub mod filter;
pub mod sensor;
pub mod config;
pub mod estimator;
pub mod mounting;

pub use error::ImuvizError;
pub use types::*;
pub use quaternion::{EulerAngles, Quaternion};
pub use filter::{Madgwick, OrientationFilter};
pub use sensor::{SensorSource, SyntheticSource};
pub use config::EstimatorConfig;
pub use estimator::{EstimatorState, EstimatorStats, OrientationEstimator};
pub use mounting::{compensate, MountingCalibration};

/// Result type alias for imuviz operations.
pub type Result<T> = std::result::Result<T, ImuvizError>;
