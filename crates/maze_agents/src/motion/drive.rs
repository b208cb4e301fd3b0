//! Differential-drive model.

use super::control::normalize_angle;
use crate::types::Pose;
use serde::{Deserialize, Serialize};

/// Wheel actuation applied during one drive update.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WheelCommand {
    pub left: f64,
    pub right: f64,
}

/// Converts velocity targets into wheel actuation and integrates the pose.
pub trait DriveController {
    /// Advances the drive by `dt` seconds while tracking linear velocity `v`
    /// and angular velocity `w`. Returns the actuation applied to the wheels.
    fn evaluate(&mut self, dt: f64, v: f64, w: f64) -> WheelCommand;

    /// Current pose estimate.
    fn pose(&self) -> Pose;

    /// Current (left, right) wheel surface speeds.
    fn wheel_speeds(&self) -> (f64, f64);

    /// Places the robot at `pose` with the wheels at rest.
    fn set_pose(&mut self, pose: Pose);

    /// Returns the robot to the origin at rest.
    fn reset(&mut self) {
        self.set_pose(Pose::origin());
    }
}

impl<T: DriveController + ?Sized> DriveController for Box<T> {
    fn evaluate(&mut self, dt: f64, v: f64, w: f64) -> WheelCommand {
        (**self).evaluate(dt, v, w)
    }

    fn pose(&self) -> Pose {
        (**self).pose()
    }

    fn wheel_speeds(&self) -> (f64, f64) {
        (**self).wheel_speeds()
    }

    fn set_pose(&mut self, pose: Pose) {
        (**self).set_pose(pose)
    }
}

/// Parameters of [`KinematicDrive`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    /// Distance between the wheels.
    pub wheel_base: f64,
    /// Proportional gain of the per-wheel speed loop.
    pub speed_gain: f64,
    /// Actuation saturation per wheel.
    pub max_torque: f64,
    /// Wheel inertia; speed changes by `torque * dt / inertia`.
    pub inertia: f64,
    /// Skip the wheel dynamics and track targets exactly.
    pub ideal: bool,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            wheel_base: 0.5,
            speed_gain: 20.0,
            max_torque: 40.0,
            inertia: 1.0,
            ideal: false,
        }
    }
}

impl DriveConfig {
    /// A drive whose wheels follow their targets without lag.
    pub fn ideal() -> Self {
        Self {
            ideal: true,
            ..Default::default()
        }
    }
}

/// Unicycle kinematics with P-controlled wheels and first-order lag.
#[derive(Debug, Clone)]
pub struct KinematicDrive {
    config: DriveConfig,
    pose: Pose,
    left: f64,
    right: f64,
}

impl KinematicDrive {
    pub fn new(config: DriveConfig) -> Self {
        Self {
            config,
            pose: Pose::origin(),
            left: 0.0,
            right: 0.0,
        }
    }

    pub fn ideal() -> Self {
        Self::new(DriveConfig::ideal())
    }

    pub fn config(&self) -> &DriveConfig {
        &self.config
    }

    fn wheel_targets(&self, v: f64, w: f64) -> (f64, f64) {
        let half = self.config.wheel_base / 2.0;
        (v - w * half, v + w * half)
    }

    fn integrate(&mut self, dt: f64) {
        let v = (self.left + self.right) / 2.0;
        let w = (self.right - self.left) / self.config.wheel_base;
        let mid = self.pose.theta + w * dt / 2.0;
        self.pose.x += v * mid.cos() * dt;
        self.pose.y += v * mid.sin() * dt;
        self.pose.theta = normalize_angle(self.pose.theta + w * dt);
    }
}

impl Default for KinematicDrive {
    fn default() -> Self {
        Self::new(DriveConfig::default())
    }
}

impl DriveController for KinematicDrive {
    fn evaluate(&mut self, dt: f64, v: f64, w: f64) -> WheelCommand {
        if !(dt.is_finite() && dt > 0.0) {
            return WheelCommand::default();
        }
        let (target_left, target_right) = self.wheel_targets(v, w);

        let command = if self.config.ideal {
            self.left = target_left;
            self.right = target_right;
            WheelCommand {
                left: target_left,
                right: target_right,
            }
        } else {
            let limit = self.config.max_torque;
            let command = WheelCommand {
                left: (self.config.speed_gain * (target_left - self.left)).clamp(-limit, limit),
                right: (self.config.speed_gain * (target_right - self.right))
                    .clamp(-limit, limit),
            };
            self.left += command.left * dt / self.config.inertia;
            self.right += command.right * dt / self.config.inertia;
            command
        };

        self.integrate(dt);
        command
    }

    fn pose(&self) -> Pose {
        self.pose
    }

    fn wheel_speeds(&self) -> (f64, f64) {
        (self.left, self.right)
    }

    fn set_pose(&mut self, pose: Pose) {
        self.pose = pose;
        self.left = 0.0;
        self.right = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn test_ideal_drive_goes_straight() {
        let mut drive = KinematicDrive::ideal();
        for _ in 0..60 {
            drive.evaluate(1.0 / 60.0, 1.0, 0.0);
        }
        let pose = drive.pose();
        assert!((pose.x - 1.0).abs() < 1e-9);
        assert!(pose.y.abs() < 1e-9);
    }

    #[test]
    fn test_ideal_drive_turns_in_place() {
        let mut drive = KinematicDrive::ideal();
        for _ in 0..100 {
            drive.evaluate(0.01, 0.0, PI / 2.0);
        }
        let pose = drive.pose();
        assert!((pose.theta - PI / 2.0).abs() < 1e-9);
        assert!(pose.x.abs() < 1e-9 && pose.y.abs() < 1e-9);
    }

    #[test]
    fn test_lagged_wheels_converge() {
        let mut drive = KinematicDrive::default();
        let first = drive.evaluate(0.01, 1.0, 0.0);
        assert!(first.left > 0.0 && first.right > 0.0);
        for _ in 0..300 {
            drive.evaluate(0.01, 1.0, 0.0);
        }
        let (l, r) = drive.wheel_speeds();
        assert!((l - 1.0).abs() < 1e-3 && (r - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_zero_dt_is_noop() {
        let mut drive = KinematicDrive::ideal();
        let cmd = drive.evaluate(0.0, 5.0, 1.0);
        assert_eq!(cmd, WheelCommand::default());
        assert_eq!(drive.pose(), Pose::origin());
    }

    #[test]
    fn test_set_pose_stops_wheels() {
        let mut drive = KinematicDrive::ideal();
        drive.evaluate(0.1, 1.0, 0.0);
        drive.set_pose(Pose::new(3.0, 4.0, 1.0));
        assert_eq!(drive.wheel_speeds(), (0.0, 0.0));
        assert_eq!(drive.pose(), Pose::new(3.0, 4.0, 1.0));
        drive.reset();
        assert_eq!(drive.pose(), Pose::origin());
    }
}
