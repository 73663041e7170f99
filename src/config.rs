use crate::filter::DEFAULT_BETA;
use crate::quaternion::Quaternion;
use crate::{ImuvizError, Result};
use std::str::FromStr;
use std::time::Duration;

/// Default estimation rate.
pub const DEFAULT_TARGET_HZ: f64 = 30.0;

/// Estimator construction parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct EstimatorConfig {
    /// Orientation the filter starts from (e.g. the mounting calibration).
    pub initial_orientation: Quaternion,
    /// Target cycle rate. The filter's sample period is `1 / target_hz`.
    pub target_hz: f64,
    /// Madgwick gain.
    pub beta: f64,
    /// Consecutive failed reads before the sensor is reported as faulted.
    pub fault_threshold: u32,
    /// Minimum wait between reconnect attempts after a disconnect.
    pub reconnect_delay: Duration,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            initial_orientation: Quaternion::IDENTITY,
            target_hz: DEFAULT_TARGET_HZ,
            beta: DEFAULT_BETA,
            fault_threshold: 30,
            reconnect_delay: Duration::from_millis(500),
        }
    }
}

impl EstimatorConfig {
    pub fn with_initial_orientation(mut self, q: Quaternion) -> Self {
        self.initial_orientation = q;
        self
    }

    pub fn with_target_hz(mut self, hz: f64) -> Self {
        self.target_hz = hz;
        self
    }

    pub fn with_beta(mut self, beta: f64) -> Self {
        self.beta = beta;
        self
    }

    pub fn with_fault_threshold(mut self, n: u32) -> Self {
        self.fault_threshold = n;
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Seconds between cycles.
    pub fn sample_period(&self) -> f64 {
        1.0 / self.target_hz
    }

    /// Wall-clock target period.
    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(self.sample_period())
    }

    pub fn validate(&self) -> Result<()> {
        if !self.target_hz.is_finite() || self.target_hz <= 0.0 {
            return Err(ImuvizError::InvalidConfig(format!(
                "target_hz must be positive, got {}",
                self.target_hz
            )));
        }
        if Duration::try_from_secs_f64(self.sample_period()).is_err() {
            return Err(ImuvizError::InvalidConfig(format!(
                "target_hz {} gives a period too long to schedule",
                self.target_hz
            )));
        }
        if !self.beta.is_finite() || self.beta < 0.0 {
            return Err(ImuvizError::InvalidConfig(format!(
                "beta must be non-negative, got {}",
                self.beta
            )));
        }
        if self.initial_orientation.normalized().is_none() {
            return Err(ImuvizError::InvalidConfig(
                "initial orientation has zero or non-finite norm".into(),
            ));
        }
        if self.fault_threshold == 0 {
            return Err(ImuvizError::InvalidConfig("fault_threshold must be at least 1".into()));
        }
        Ok(())
    }

    /// Defaults overridden by environment variables:
    ///
    /// - `IMUVIZ_TARGET_HZ`
    /// - `IMUVIZ_BETA`
    /// - `IMUVIZ_FAULT_THRESHOLD`
    /// - `IMUVIZ_RECONNECT_MS`
    /// - `IMUVIZ_INITIAL_ORIENTATION` as `w,x,y,z`
    ///
    /// Unparsable values are logged and ignored.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            initial_orientation: read_quaternion(&lookup, "IMUVIZ_INITIAL_ORIENTATION")
                .unwrap_or(defaults.initial_orientation),
            target_hz: read_value(&lookup, "IMUVIZ_TARGET_HZ").unwrap_or(defaults.target_hz),
            beta: read_value(&lookup, "IMUVIZ_BETA").unwrap_or(defaults.beta),
            fault_threshold: read_value(&lookup, "IMUVIZ_FAULT_THRESHOLD")
                .unwrap_or(defaults.fault_threshold),
            reconnect_delay: read_value::<u64>(&lookup, "IMUVIZ_RECONNECT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.reconnect_delay),
        };
        config.validate()?;
        Ok(config)
    }
}

fn read_value<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    let raw = lookup(name)?;
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }
    match value.parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            log::warn!("Ignoring {}='{}' (not parsable)", name, value);
            None
        }
    }
}

fn read_quaternion(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<Quaternion> {
    let raw = lookup(name)?;
    let parts: Option<Vec<f64>> = raw.split(',').map(|p| p.trim().parse::<f64>().ok()).collect();
    match parts.as_deref() {
        Some([w, x, y, z]) => Some(Quaternion::new(*w, *x, *y, *z)),
        _ => {
            log::warn!("Ignoring {}='{}' (expected w,x,y,z)", name, raw);
            None
        }
    }
}
