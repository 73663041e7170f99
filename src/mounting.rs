//! Sensor mounting compensation.
//!
//! The filter estimates the orientation of the sensor itself. When the
//! sensor sits on the tracked body at a fixed rotational offset, consumers
//! remove that offset at display time; the filter never sees it.

use crate::quaternion::Quaternion;

/// Remove a fixed mounting offset: `raw ⊗ calibration*`.
pub fn compensate(raw: Quaternion, calibration: Quaternion) -> Quaternion {
    raw * calibration.conjugate()
}

/// Fixed rotation of the sensor relative to the tracked body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MountingCalibration(Quaternion);

impl Default for MountingCalibration {
    fn default() -> Self {
        Self::identity()
    }
}

impl MountingCalibration {
    /// No offset; `apply` returns its input unchanged.
    pub const fn identity() -> Self {
        MountingCalibration(Quaternion::IDENTITY)
    }

    /// Offset from a (not necessarily normalized) quaternion. Degenerate
    /// input falls back to identity.
    pub fn new(offset: Quaternion) -> Self {
        MountingCalibration(offset.normalized().unwrap_or(Quaternion::IDENTITY))
    }

    /// Use the current raw estimate as the offset, so the present pose
    /// displays as level and facing forward.
    pub fn capture(raw: Quaternion) -> Self {
        Self::new(raw)
    }

    pub fn quaternion(&self) -> Quaternion {
        self.0
    }

    /// Orientation of the tracked body for display.
    pub fn apply(&self, raw: Quaternion) -> Quaternion {
        compensate(raw, self.0)
    }
}
