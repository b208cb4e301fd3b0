//! Straight-line reference trajectory with a trapezoidal speed profile.

use crate::types::Pose;
use serde::{Deserialize, Serialize};

/// Speed profile limits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrajectoryConfig {
    pub max_speed: f64,
    pub acceleration: f64,
    pub deceleration: f64,
}

impl Default for TrajectoryConfig {
    fn default() -> Self {
        Self {
            max_speed: 3.0,
            acceleration: 3.0,
            deceleration: 3.0,
        }
    }
}

impl TrajectoryConfig {
    /// Slower profile used when backing away from a wall.
    pub fn backup() -> Self {
        Self {
            max_speed: 1.5,
            acceleration: 3.0,
            deceleration: 3.0,
        }
    }
}

/// A reference point moving along a segment from a start to an end pose.
#[derive(Debug, Clone)]
pub struct StraightLineMotion {
    config: TrajectoryConfig,
    origin: (f64, f64),
    heading: (f64, f64),
    length: f64,
    travelled: f64,
    speed: f64,
}

impl StraightLineMotion {
    pub fn new(config: TrajectoryConfig) -> Self {
        Self {
            config,
            origin: (0.0, 0.0),
            heading: (0.0, 0.0),
            length: 0.0,
            travelled: 0.0,
            speed: 0.0,
        }
    }

    /// Starts a new segment from `from` to `to`, at rest.
    pub fn start_motion(&mut self, from: &Pose, to: &Pose) {
        let dx = to.x - from.x;
        let dy = to.y - from.y;
        let length = dx.hypot(dy);
        self.origin = (from.x, from.y);
        self.heading = if length > 0.0 {
            (dx / length, dy / length)
        } else {
            (0.0, 0.0)
        };
        self.length = length;
        self.travelled = 0.0;
        self.speed = 0.0;
    }

    /// Advances the reference by `dt` seconds and returns its position.
    pub fn evaluate(&mut self, dt: f64) -> (f64, f64) {
        if dt > 0.0 && !self.is_finished() {
            let remaining = self.length - self.travelled;
            let stopping = self.speed * self.speed / (2.0 * self.config.deceleration);
            let creep = 0.05 * self.config.max_speed;
            self.speed = if remaining <= stopping {
                (self.speed - self.config.deceleration * dt).max(creep)
            } else {
                (self.speed + self.config.acceleration * dt).min(self.config.max_speed)
            };
            self.travelled = (self.travelled + self.speed * dt).min(self.length);
            if self.is_finished() {
                self.speed = 0.0;
            }
        }
        self.point()
    }

    /// Current reference position.
    pub fn point(&self) -> (f64, f64) {
        (
            self.origin.0 + self.heading.0 * self.travelled,
            self.origin.1 + self.heading.1 * self.travelled,
        )
    }

    pub fn is_finished(&self) -> bool {
        self.travelled >= self.length
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reaches_end_and_stops() {
        let mut motion = StraightLineMotion::new(TrajectoryConfig::default());
        motion.start_motion(&Pose::origin(), &Pose::new(0.0, 10.5, 0.0));
        let mut last = (0.0, 0.0);
        for _ in 0..1_000 {
            last = motion.evaluate(1.0 / 60.0);
            if motion.is_finished() {
                break;
            }
        }
        assert!(last.0.abs() < 1e-12);
        assert!((last.1 - 10.5).abs() < 1e-9);
        assert!(motion.is_finished());
    }

    #[test]
    fn test_speed_is_limited() {
        let config = TrajectoryConfig::default();
        let mut motion = StraightLineMotion::new(config);
        motion.start_motion(&Pose::origin(), &Pose::new(100.0, 0.0, 0.0));
        let mut previous = 0.0;
        for _ in 0..200 {
            let (x, _) = motion.evaluate(0.1);
            assert!(x - previous <= config.max_speed * 0.1 + 1e-9);
            previous = x;
        }
    }

    #[test]
    fn test_zero_length_segment_is_finished() {
        let mut motion = StraightLineMotion::new(TrajectoryConfig::default());
        let p = Pose::new(2.0, 3.0, 0.0);
        motion.start_motion(&p, &p);
        assert!(motion.is_finished());
        assert_eq!(motion.evaluate(0.1), (2.0, 3.0));
    }
}
