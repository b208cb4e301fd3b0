//! Tabular Q-learning.
//!
//! The [`QLearningAgent`] keeps one [`QEntry`] per visited
//! [`DiscreteState`](crate::DiscreteState) and delegates action choice during
//! training to an [`ExplorationStrategy`].

pub mod agent;
pub mod q_table;
pub mod strategy;

pub use agent::{
    AgentConfig, AgentStats, EpisodeHistory, EpisodeMark, QLearningAgent, WindowStats,
    DEFAULT_STATS_WINDOW,
};
pub use q_table::{argmax, max_value, QEntry, QTable};
pub use strategy::{
    CuriosityConfig, CuriosityStrategy, EpsilonGreedyConfig, EpsilonGreedyStrategy,
    ExplorationStrategy, StrategyConfig, StrategyInfo, StrategyState,
};
