//! Tick bus abstraction.
//!
//! The robot talks to the external simulator over a publish/subscribe channel
//! of named scalar topics. The simulator paces the control loop: every frame it
//! publishes the elapsed time on [`topics::TICK`], and the executor blocks on
//! that topic once per control iteration.
//!
//! [`SyntheticBus`] is an in-memory implementation driven by a deterministic
//! clock. It backs the simulated maze world and the test suite.

use crate::error::{Error, Result};
use crate::types::{Pose, Scalar};
use std::collections::{HashMap, VecDeque};

/// Topic names shared with the simulator.
pub mod topics {
    /// Elapsed seconds since the previous simulation frame (float).
    pub const TICK: &str = "tick";
    /// Collision flag (0/1). Cleared by publishing 0 after handling.
    pub const COLLISION: &str = "Collision";
    /// Maze exit reached (0/1).
    pub const GOAL_REACHED: &str = "GoalReached";
    /// Id of the last checkpoint crossed, 0 when none.
    pub const CHECKPOINT_REACHED: &str = "checkpoint_reached";
    /// Pulse (1 then 0) that clears checkpoint state in the simulator.
    pub const RESET_CHECKPOINTS: &str = "reset_checkpoints";
    pub const X: &str = "X";
    pub const Y: &str = "Y";
    pub const THETA: &str = "Theta";
}

/// A publish/subscribe channel of named scalar topics.
pub trait TickBus {
    /// Blocks until the next value arrives on `topic` and returns it.
    fn wait_next(&mut self, topic: &str) -> Result<Scalar>;

    /// Returns the last value seen on `topic` without blocking.
    fn read_last(&self, topic: &str) -> Option<Scalar>;

    /// Publishes a value on `topic`.
    fn publish(&mut self, topic: &str, value: Scalar) -> Result<()>;

    /// Reads a 0/1 flag. A topic that never updated reads as unset.
    fn read_flag(&self, topic: &str) -> bool {
        self.read_last(topic).map(|v| v.is_set()).unwrap_or(false)
    }

    /// Reads an integer topic, `0` when absent.
    fn read_int(&self, topic: &str) -> i64 {
        self.read_last(topic).map(|v| v.as_i64()).unwrap_or(0)
    }

    /// Publishes a pose as the `X`, `Y`, `Theta` triple, in that order.
    fn publish_pose(&mut self, pose: &Pose) -> Result<()> {
        self.publish(topics::X, Scalar::Float(pose.x))?;
        self.publish(topics::Y, Scalar::Float(pose.y))?;
        self.publish(topics::THETA, Scalar::Float(pose.theta))
    }
}

impl<T: TickBus + ?Sized> TickBus for Box<T> {
    fn wait_next(&mut self, topic: &str) -> Result<Scalar> {
        (**self).wait_next(topic)
    }

    fn read_last(&self, topic: &str) -> Option<Scalar> {
        (**self).read_last(topic)
    }

    fn publish(&mut self, topic: &str, value: Scalar) -> Result<()> {
        (**self).publish(topic, value)
    }
}

/// Maximum number of publications retained for inspection.
const PUBLISH_LOG_CAPACITY: usize = 4096;

/// A value scheduled to appear on a topic at a given frame.
#[derive(Debug, Clone)]
struct ScheduledValue {
    frame: u64,
    topic: String,
    value: Scalar,
}

/// In-memory bus with a deterministic synthetic clock.
///
/// Every `wait_next(tick)` advances the clock by one frame of `tick_dt`
/// seconds and applies any values scheduled for that frame. Waiting on any
/// other topic returns its current value immediately.
#[derive(Debug, Clone)]
pub struct SyntheticBus {
    values: HashMap<String, Scalar>,
    scheduled: Vec<ScheduledValue>,
    published: VecDeque<(String, Scalar)>,
    tick_dt: f64,
    frame: u64,
    frame_limit: Option<u64>,
}

impl SyntheticBus {
    /// Creates a bus whose clock advances `tick_dt` seconds per frame.
    pub fn new(tick_dt: f64) -> Self {
        Self {
            values: HashMap::new(),
            scheduled: Vec::new(),
            published: VecDeque::new(),
            tick_dt,
            frame: 0,
            frame_limit: None,
        }
    }

    /// A 60 Hz clock.
    pub fn sixty_hz() -> Self {
        Self::new(1.0 / 60.0)
    }

    /// Stops producing ticks after `frames` frames; further waits fail.
    pub fn with_frame_limit(mut self, frames: u64) -> Self {
        self.frame_limit = Some(frames);
        self
    }

    /// Sets a topic value directly, as the simulator would.
    pub fn set(&mut self, topic: &str, value: impl Into<Scalar>) {
        self.values.insert(topic.to_string(), value.into());
    }

    /// Schedules `value` to appear on `topic` when the clock reaches `frame`.
    pub fn schedule(&mut self, frame: u64, topic: &str, value: impl Into<Scalar>) {
        self.scheduled.push(ScheduledValue {
            frame,
            topic: topic.to_string(),
            value: value.into(),
        });
    }

    /// Number of frames produced so far.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Simulated seconds elapsed.
    pub fn elapsed(&self) -> f64 {
        self.frame as f64 * self.tick_dt
    }

    /// Publications seen so far, oldest first.
    pub fn published(&self) -> impl Iterator<Item = &(String, Scalar)> {
        self.published.iter()
    }

    fn advance(&mut self) -> Result<Scalar> {
        if let Some(limit) = self.frame_limit {
            if self.frame >= limit {
                return Err(Error::Bus(format!(
                    "tick source stopped after {} frames",
                    limit
                )));
            }
        }
        self.frame += 1;
        let frame = self.frame;
        let (due, pending): (Vec<_>, Vec<_>) = self
            .scheduled
            .drain(..)
            .partition(|s| s.frame <= frame);
        self.scheduled = pending;
        for s in due {
            self.values.insert(s.topic, s.value);
        }
        let tick = Scalar::Float(self.tick_dt);
        self.values.insert(topics::TICK.to_string(), tick);
        Ok(tick)
    }
}

impl Default for SyntheticBus {
    fn default() -> Self {
        Self::sixty_hz()
    }
}

impl TickBus for SyntheticBus {
    fn wait_next(&mut self, topic: &str) -> Result<Scalar> {
        if topic == topics::TICK {
            return self.advance();
        }
        self.values
            .get(topic)
            .copied()
            .ok_or_else(|| Error::Bus(format!("no value on topic {}", topic)))
    }

    fn read_last(&self, topic: &str) -> Option<Scalar> {
        self.values.get(topic).copied()
    }

    fn publish(&mut self, topic: &str, value: Scalar) -> Result<()> {
        self.values.insert(topic.to_string(), value);
        if self.published.len() >= PUBLISH_LOG_CAPACITY {
            self.published.pop_front();
        }
        self.published.push_back((topic.to_string(), value));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_advances_clock() {
        let mut bus = SyntheticBus::new(0.02);
        assert_eq!(bus.read_last(topics::TICK), None);
        let dt = bus.wait_next(topics::TICK).unwrap();
        assert_eq!(dt, Scalar::Float(0.02));
        bus.wait_next(topics::TICK).unwrap();
        assert_eq!(bus.frame(), 2);
        assert!((bus.elapsed() - 0.04).abs() < 1e-12);
    }

    #[test]
    fn test_absent_flag_reads_unset() {
        let bus = SyntheticBus::default();
        assert!(!bus.read_flag(topics::COLLISION));
        assert_eq!(bus.read_int(topics::CHECKPOINT_REACHED), 0);
    }

    #[test]
    fn test_scheduled_values_apply_on_frame() {
        let mut bus = SyntheticBus::default();
        bus.schedule(3, topics::COLLISION, 1i64);
        bus.wait_next(topics::TICK).unwrap();
        bus.wait_next(topics::TICK).unwrap();
        assert!(!bus.read_flag(topics::COLLISION));
        bus.wait_next(topics::TICK).unwrap();
        assert!(bus.read_flag(topics::COLLISION));
    }

    #[test]
    fn test_frame_limit_fails_waits() {
        let mut bus = SyntheticBus::default().with_frame_limit(1);
        assert!(bus.wait_next(topics::TICK).is_ok());
        assert!(matches!(bus.wait_next(topics::TICK), Err(Error::Bus(_))));
    }

    #[test]
    fn test_publish_pose_order() {
        let mut bus = SyntheticBus::default();
        bus.publish_pose(&Pose::new(1.0, 2.0, 0.5)).unwrap();
        let topics_seen: Vec<_> = bus.published().map(|(t, _)| t.clone()).collect();
        assert_eq!(topics_seen, vec!["X", "Y", "Theta"]);
        assert_eq!(bus.read_last(topics::Y), Some(Scalar::Float(2.0)));
    }

    #[test]
    fn test_wait_on_unknown_topic_is_error() {
        let mut bus = SyntheticBus::default();
        assert!(bus.wait_next("missing").is_err());
        bus.set("missing", 4i64);
        assert_eq!(bus.wait_next("missing").unwrap(), Scalar::Int(4));
    }
}
