#![doc = include_str!("../README.md")]
//! # Maze Agents
//!
//! Closed-loop motion execution and tabular Q-learning for a differential-drive
//! robot navigating a grid maze.
//!
//! ## Overview
//!
//! The crate is layered bottom-up:
//! - **Bus**: a [`TickBus`] pacing control to the simulator clock and carrying
//!   the collision, goal and checkpoint signals
//! - **Motion**: a [`MotionExecutor`] turning one grid move into either a
//!   closed-loop trajectory (physics mode) or a probe-and-snap (fast mode)
//! - **Environment**: a [`MazeEnvironment`] with reward shaping, loop detection
//!   and episode termination
//! - **Learning**: a [`QLearningAgent`] with a pluggable [`ExplorationStrategy`]
//! - **Training**: an [`RLTrainer`] running episodes and persisting the model
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  action   ┌────────────────┐  direction  ┌────────────────┐
//! │ QLearning    │──────────►│ MazeEnvironment│────────────►│ MotionExecutor │
//! │ Agent        │◄──────────│                │◄────────────│                │
//! └──────▲───────┘ state,    └────────────────┘ MoveOutcome └───┬────────┬───┘
//!        │         reward                                       │        │
//! ┌──────┴───────┐                                      ┌───────▼──┐ ┌───▼──────────┐
//! │  RLTrainer   │                                      │ TickBus  │ │ Drive        │
//! └──────────────┘                                      │          │ │ Controller   │
//!                                                       └──────────┘ └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use maze_agents::{simulated_trainer, Config};
//!
//! # fn main() -> maze_agents::Result<()> {
//! let config = Config::fast_training().with_episodes(100);
//! let mut trainer = simulated_trainer(&config)?;
//! let report = trainer.train(config.training.episodes)?;
//! println!("{} of {} episodes reached the goal", report.successes, report.episodes);
//! # Ok(())
//! # }
//! ```

pub mod bus;
pub mod config;
pub mod environment;
pub mod error;
pub mod learning;
pub mod motion;
pub mod persistence;
pub mod sim;
pub mod trainer;
pub mod types;

pub use bus::{topics, SyntheticBus, TickBus};
pub use config::{Config, ConfigError};
pub use environment::{
    EnvironmentConfig, EpisodeState, MazeEnvironment, RewardBreakdown, RewardConfig, Step,
    StepInfo,
};
pub use error::{Error, Result};
pub use learning::{
    AgentConfig, AgentStats, CuriosityConfig, CuriosityStrategy, EpisodeHistory,
    EpsilonGreedyConfig, EpsilonGreedyStrategy, ExplorationStrategy, QLearningAgent, QTable,
    StrategyConfig, StrategyInfo, StrategyState,
};
pub use motion::{
    DriveConfig, DriveController, ExecutionMode, KinematicDrive, MotionConfig, MotionExecutor,
    MoveOutcome,
};
pub use persistence::{PersistedModel, PersistenceError, SnapshotManager};
pub use sim::{MazeConfig, MazeLayout, SimulatedMaze};
pub use trainer::{RLTrainer, TestReport, TrainingConfig, TrainingReport};
pub use types::*;

/// Maze Agents version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Creates a trainer over the built-in simulator.
///
/// The maze comes from `config.maze`, and fast-mode bounds are taken from the
/// maze layout.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or the maze layout cannot
/// be loaded.
pub fn simulated_trainer(config: &Config) -> Result<RLTrainer<SimulatedMaze, KinematicDrive>> {
    config.validate()?;
    let sim = SimulatedMaze::from_config(&config.maze, config.motion.cell_size)?;
    let mut config = config.clone();
    config.motion.bounds = sim.bounds();
    let drive = KinematicDrive::new(config.motion.drive);
    Ok(RLTrainer::from_config(sim, drive, &config))
}
