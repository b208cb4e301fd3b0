//! Reinforcement-learning environment over the motion layer.
//!
//! [`MazeEnvironment`] maps actions `0..4` onto grid moves, shapes rewards
//! from the move outcome and episode counters, detects movement loops and
//! decides when an episode ends.

pub mod episode;
pub mod maze;
pub mod reward;

pub use episode::{EpisodeState, PositionHistory};
pub use maze::{EnvironmentConfig, MazeEnvironment, Step, StepInfo};
pub use reward::{RewardBreakdown, RewardConfig, RewardContext};
