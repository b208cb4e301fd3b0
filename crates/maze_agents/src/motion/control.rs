//! Polar pose controller.

use crate::types::Pose;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Wraps an angle into `(-PI, PI]`.
pub fn normalize_angle(angle: f64) -> f64 {
    if !angle.is_finite() {
        return 0.0;
    }
    let mut a = angle % (2.0 * PI);
    if a > PI {
        a -= 2.0 * PI;
    } else if a <= -PI {
        a += 2.0 * PI;
    }
    a
}

/// Gains and limits of [`PolarController`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolarConfig {
    pub linear_gain: f64,
    pub max_linear: f64,
    pub heading_gain: f64,
    pub max_angular: f64,
}

impl Default for PolarConfig {
    fn default() -> Self {
        Self {
            linear_gain: 4.0,
            max_linear: 4.0,
            heading_gain: 8.0,
            max_angular: 6.0,
        }
    }
}

/// Steers toward a point: turns to face it and drives forward only while
/// roughly facing it.
#[derive(Debug, Clone, Copy, Default)]
pub struct PolarController {
    config: PolarConfig,
}

impl PolarController {
    pub fn new(config: PolarConfig) -> Self {
        Self { config }
    }

    /// Returns `(v, w)` that drive `pose` toward `(x, y)`.
    pub fn evaluate(&self, pose: &Pose, x: f64, y: f64) -> (f64, f64) {
        let distance = pose.distance_to_point(x, y);
        if distance < 1e-9 {
            return (0.0, 0.0);
        }
        let bearing = (y - pose.y).atan2(x - pose.x);
        let error = normalize_angle(bearing - pose.theta);

        let speed = (self.config.linear_gain * distance).min(self.config.max_linear);
        let v = speed * error.cos().max(0.0);
        let w = (self.config.heading_gain * error)
            .clamp(-self.config.max_angular, self.config.max_angular);
        (v, w)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_angle() {
        assert!((normalize_angle(-3.0 * PI / 2.0) - PI / 2.0).abs() < 1e-12);
        assert!((normalize_angle(-PI / 2.0) + PI / 2.0).abs() < 1e-12);
        assert!((normalize_angle(5.0 * PI / 2.0) - PI / 2.0).abs() < 1e-12);
        assert_eq!(normalize_angle(f64::NAN), 0.0);
    }

    #[test]
    fn test_drives_forward_when_facing_target() {
        let c = PolarController::default();
        let (v, w) = c.evaluate(&Pose::origin(), 10.0, 0.0);
        assert_eq!(v, 4.0);
        assert_eq!(w, 0.0);
    }

    #[test]
    fn test_turns_in_place_when_target_behind() {
        let c = PolarController::default();
        let (v, w) = c.evaluate(&Pose::origin(), -1.0, 0.0);
        assert_eq!(v, 0.0);
        assert!(w.abs() > 0.0);
    }

    #[test]
    fn test_at_target_is_still() {
        let c = PolarController::default();
        assert_eq!(c.evaluate(&Pose::new(1.0, 1.0, 0.3), 1.0, 1.0), (0.0, 0.0));
    }
}
