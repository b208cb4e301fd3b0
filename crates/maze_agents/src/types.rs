//! Core data types shared by the motion, environment and learning layers.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of discrete actions (one per [`Direction`]).
pub const ACTION_COUNT: usize = 4;

/// A timestamp in microseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// Returns the current timestamp.
    pub fn now() -> Self {
        let now = chrono::Utc::now();
        let micros = (now.timestamp() as u64) * 1_000_000 + (now.timestamp_subsec_micros() as u64);
        Self(micros)
    }

    /// Formats the timestamp as an RFC 3339 string, e.g. for log lines.
    pub fn to_rfc3339(&self) -> String {
        let secs = (self.0 / 1_000_000) as i64;
        let nanos = ((self.0 % 1_000_000) * 1_000) as u32;
        chrono::DateTime::from_timestamp(secs, nanos)
            .map(|dt| dt.to_rfc3339())
            .unwrap_or_default()
    }
}

/// A scalar payload carried on a bus topic.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Scalar {
    /// An integer payload (flags, checkpoint ids).
    Int(i64),
    /// A floating-point payload (tick deltas, pose components).
    Float(f64),
}

impl Scalar {
    /// Returns the payload as an `f64`.
    pub fn as_f64(&self) -> f64 {
        match self {
            Scalar::Int(i) => *i as f64,
            Scalar::Float(f) => *f,
        }
    }

    /// Returns the payload as an `i64`, truncating floats.
    pub fn as_i64(&self) -> i64 {
        match self {
            Scalar::Int(i) => *i,
            Scalar::Float(f) => *f as i64,
        }
    }

    /// Interprets the payload as a 0/1 flag.
    pub fn is_set(&self) -> bool {
        self.as_i64() != 0
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Scalar::Int(v)
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::Float(v)
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Int(i) => write!(f, "{}", i),
            Scalar::Float(v) => write!(f, "{:.4}", v),
        }
    }
}

/// Continuous robot pose in world units and radians.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub theta: f64,
}

impl Pose {
    pub fn new(x: f64, y: f64, theta: f64) -> Self {
        Self { x, y, theta }
    }

    /// The pose every episode starts from.
    pub fn origin() -> Self {
        Self::default()
    }

    /// Euclidean distance between the positions of two poses.
    pub fn distance_to(&self, other: &Pose) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// Distance from this pose to a point.
    pub fn distance_to_point(&self, x: f64, y: f64) -> f64 {
        (self.x - x).hypot(self.y - y)
    }

    /// Returns this pose translated by `(dx, dy)`, heading unchanged.
    pub fn translated(&self, dx: f64, dy: f64) -> Self {
        Self::new(self.x + dx, self.y + dy, self.theta)
    }

    /// Linear interpolation of the position toward `other`; keeps this heading.
    pub fn lerp(&self, other: &Pose, t: f64) -> Self {
        Self::new(
            self.x + (other.x - self.x) * t,
            self.y + (other.y - self.y) * t,
            self.theta,
        )
    }
}

impl fmt::Display for Pose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.2}, {:.2}, {:.2})", self.x, self.y, self.theta)
    }
}

/// One of the four grid moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    /// All directions in action-index order.
    pub const ALL: [Direction; ACTION_COUNT] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    /// Maps an action index to a direction.
    pub fn from_index(index: usize) -> Result<Self> {
        Self::ALL
            .get(index)
            .copied()
            .ok_or(Error::InvalidAction(index))
    }

    /// The action index of this direction.
    pub fn index(&self) -> usize {
        match self {
            Direction::Up => 0,
            Direction::Down => 1,
            Direction::Left => 2,
            Direction::Right => 3,
        }
    }

    /// Unit displacement in world coordinates (y grows upward).
    pub fn unit_vector(&self) -> (f64, f64) {
        match self {
            Direction::Up => (0.0, 1.0),
            Direction::Down => (0.0, -1.0),
            Direction::Left => (-1.0, 0.0),
            Direction::Right => (1.0, 0.0),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Direction::Up => "UP",
            Direction::Down => "DOWN",
            Direction::Left => "LEFT",
            Direction::Right => "RIGHT",
        }
    }
}

impl FromStr for Direction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "UP" => Ok(Direction::Up),
            "DOWN" => Ok(Direction::Down),
            "LEFT" => Ok(Direction::Left),
            "RIGHT" => Ok(Direction::Right),
            _ => Err(Error::InvalidDirection(s.to_string())),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The outcome of a single call to
/// [`MotionExecutor::move_direction`](crate::MotionExecutor::move_direction).
///
/// Exactly one variant is produced per move. Only a checkpoint carries a payload:
/// the id reported by the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MoveResult {
    Success,
    Collision,
    GoalReached,
    Timeout,
    CheckpointReached(u8),
}

impl MoveResult {
    /// The checkpoint id, if this is a checkpoint result.
    pub fn checkpoint(&self) -> Option<u8> {
        match self {
            MoveResult::CheckpointReached(id) => Some(*id),
            _ => None,
        }
    }

    /// `true` for results that extend the consecutive-success streak.
    pub fn extends_streak(&self) -> bool {
        matches!(
            self,
            MoveResult::Success | MoveResult::CheckpointReached(_)
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            MoveResult::Success => "success",
            MoveResult::Collision => "collision",
            MoveResult::GoalReached => "goal_reached",
            MoveResult::Timeout => "timeout",
            MoveResult::CheckpointReached(_) => "checkpoint_reached",
        }
    }
}

impl fmt::Display for MoveResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MoveResult::CheckpointReached(id) => write!(f, "checkpoint_reached({})", id),
            other => f.write_str(other.name()),
        }
    }
}

/// Quantized robot position used as the Q-table key.
///
/// Each axis is the pose coordinate divided by the cell size, rounded to the
/// nearest integer and clamped to `[-grid_limit, grid_limit]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DiscreteState {
    pub x: i32,
    pub y: i32,
}

impl DiscreteState {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for DiscreteState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.x, self.y)
    }
}

/// Projects continuous poses onto [`DiscreteState`] grid cells.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Discretizer {
    /// World units per grid cell.
    pub cell_size: f64,
    /// Largest absolute cell index on either axis.
    pub grid_limit: i32,
}

impl Default for Discretizer {
    fn default() -> Self {
        Self {
            cell_size: 10.5,
            grid_limit: 20,
        }
    }
}

impl Discretizer {
    pub fn new(cell_size: f64, grid_limit: i32) -> Self {
        Self {
            cell_size,
            grid_limit,
        }
    }

    /// Discretizes a pose. Deterministic; the heading is ignored.
    pub fn discretize(&self, pose: &Pose) -> DiscreteState {
        DiscreteState::new(self.axis(pose.x), self.axis(pose.y))
    }

    /// World coordinates of the centre of a cell.
    pub fn cell_center(&self, state: &DiscreteState) -> Pose {
        Pose::new(
            state.x as f64 * self.cell_size,
            state.y as f64 * self.cell_size,
            0.0,
        )
    }

    fn axis(&self, value: f64) -> i32 {
        if !value.is_finite() {
            return 0;
        }
        let cell = (value / self.cell_size).round();
        let limit = self.grid_limit as f64;
        cell.clamp(-limit, limit) as i32
    }
}

/// Axis-aligned rectangle in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl Bounds {
    pub fn new(min_x: f64, max_x: f64, min_y: f64, max_y: f64) -> Self {
        Self {
            min_x,
            max_x,
            min_y,
            max_y,
        }
    }

    /// Returns `true` if the point lies inside the rectangle, edges included.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }
}

impl Default for Bounds {
    /// The square covered by the default discretization grid.
    fn default() -> Self {
        let half = 20.0 * 10.5;
        Self::new(-half, half, -half, half)
    }
}
