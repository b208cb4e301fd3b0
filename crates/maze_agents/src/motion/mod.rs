//! Motion layer: turns discrete grid moves into closed-loop drive control.
//!
//! The [`MotionExecutor`] owns the bus handle and a [`DriveController`]. In
//! physics mode each move follows a [`StraightLineMotion`] reference with a
//! [`PolarController`]; in fast mode it probes the target and snaps to it.

pub mod control;
pub mod drive;
pub mod executor;
pub mod trajectory;

pub use control::{normalize_angle, PolarConfig, PolarController};
pub use drive::{DriveConfig, DriveController, KinematicDrive, WheelCommand};
pub use executor::{ExecutionMode, MotionConfig, MotionExecutor, MoveOutcome};
pub use trajectory::{StraightLineMotion, TrajectoryConfig};
