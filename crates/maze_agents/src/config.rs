//! Configuration for maze training runs.
//!
//! [`Config`] gathers the settings of every layer: motion execution, the RL
//! environment and its rewards, the agent and exploration strategy, the
//! training loop and the simulated maze. All sections implement `Default`
//! and deserialize from partial JSON, so a config file only needs the values
//! it changes.
//!
//! # Configuration Presets
//!
//! - [`Config::physics()`] - closed-loop control, one iteration per tick
//! - [`Config::fast_training()`] - snap-to-target moves for quick training
//!
//! # Examples
//!
//! ```
//! # use maze_agents::{Config, ExecutionMode};
//! let config = Config::fast_training().with_episodes(500).with_seed(7);
//! assert_eq!(config.motion.mode, ExecutionMode::Fast);
//! assert!(config.validate().is_ok());
//! ```

use crate::environment::{EnvironmentConfig, RewardConfig};
use crate::error::Result;
use crate::learning::{AgentConfig, StrategyConfig};
use crate::motion::{ExecutionMode, MotionConfig};
use crate::sim::MazeConfig;
use crate::trainer::TrainingConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable enabling fast mode when set to anything but `0`/`false`.
pub const ENV_FAST_MODE: &str = "MAZE_FAST_MODE";
/// Environment variable overriding the number of training episodes.
pub const ENV_EPISODES: &str = "MAZE_EPISODES";
/// Environment variable overriding the model file path.
pub const ENV_MODEL_PATH: &str = "MAZE_MODEL_PATH";
/// Environment variable overriding the save interval in episodes.
pub const ENV_SAVE_EVERY: &str = "MAZE_SAVE_EVERY";

/// Complete configuration of a training run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub motion: MotionConfig,
    pub environment: EnvironmentConfig,
    pub rewards: RewardConfig,
    pub agent: AgentConfig,
    pub strategy: StrategyConfig,
    pub training: TrainingConfig,
    pub maze: MazeConfig,
}

impl Config {
    /// Closed-loop physics execution. Same as `Config::default()`.
    pub fn physics() -> Self {
        Self::default()
    }

    /// Fast mode: every move probes its target once and snaps to it.
    pub fn fast_training() -> Self {
        Self {
            motion: MotionConfig::fast(),
            ..Default::default()
        }
    }

    /// Reads a JSON config file. Missing fields keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&text).map_err(|e| {
            ConfigError::Invalid(format!("{}: {}", path.display(), e))
        })?;
        Ok(config)
    }

    /// Default configuration with environment overrides applied.
    ///
    /// Supported variables:
    /// - `MAZE_FAST_MODE` - use fast mode
    /// - `MAZE_EPISODES` - number of training episodes
    /// - `MAZE_MODEL_PATH` - model file path
    /// - `MAZE_SAVE_EVERY` - save interval in episodes
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Applies environment overrides on top of this configuration.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies overrides from `lookup`. Unparsable values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_FAST_MODE) {
            let enabled = !matches!(value.trim().to_ascii_lowercase().as_str(), "0" | "false");
            if enabled {
                self.motion.mode = ExecutionMode::Fast;
            }
        }

        if let Some(episodes) = lookup(ENV_EPISODES).and_then(|v| v.trim().parse().ok()) {
            self.training.episodes = episodes;
        }

        if let Some(path) = lookup(ENV_MODEL_PATH) {
            if !path.trim().is_empty() {
                self.training.model_path = PathBuf::from(path);
            }
        }

        if let Some(every) = lookup(ENV_SAVE_EVERY).and_then(|v| v.trim().parse().ok()) {
            self.training.save_every = every;
        }
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.motion.mode = mode;
        self
    }

    pub fn with_episodes(mut self, episodes: u32) -> Self {
        self.training.episodes = episodes;
        self
    }

    pub fn with_model_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.training.model_path = path.into();
        self
    }

    pub fn with_layout(mut self, path: impl Into<PathBuf>) -> Self {
        self.maze.layout_path = Some(path.into());
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.agent.seed = Some(seed);
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending setting.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        fn positive(name: &str, value: f64) -> std::result::Result<(), ConfigError> {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(ConfigError::Invalid(format!("{} must be positive, got {}", name, value)))
            }
        }

        positive("motion.cell_size", self.motion.cell_size)?;
        positive("motion.target_tolerance", self.motion.target_tolerance)?;
        positive("motion.stop_tick", self.motion.stop_tick)?;
        positive("environment.discretizer.cell_size", self.environment.discretizer.cell_size)?;
        positive("maze.tick_dt", self.maze.tick_dt)?;
        positive("agent.learning_rate", self.agent.learning_rate)?;

        if self.motion.max_iterations == 0 || self.motion.max_backup_iterations == 0 {
            return Err(ConfigError::Invalid(
                "motion iteration bounds must be at least 1".to_string(),
            ));
        }
        if !(self.motion.probe_fraction > 0.0 && self.motion.probe_fraction <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "motion.probe_fraction must be in (0, 1], got {}",
                self.motion.probe_fraction
            )));
        }
        if self.environment.max_steps == 0 {
            return Err(ConfigError::Invalid(
                "environment.max_steps must be at least 1".to_string(),
            ));
        }
        if self.environment.loop_repeats < 2
            || self.environment.loop_window < self.environment.loop_repeats
        {
            return Err(ConfigError::Invalid(format!(
                "loop detection needs 2 <= loop_repeats <= loop_window, got {} and {}",
                self.environment.loop_repeats, self.environment.loop_window
            )));
        }
        if self.agent.learning_rate > 1.0 {
            return Err(ConfigError::Invalid(format!(
                "agent.learning_rate must be at most 1, got {}",
                self.agent.learning_rate
            )));
        }
        if !(0.0..=1.0).contains(&self.agent.discount_factor) {
            return Err(ConfigError::Invalid(format!(
                "agent.discount_factor must be in [0, 1], got {}",
                self.agent.discount_factor
            )));
        }
        if self.agent.initial_q_low > self.agent.initial_q_high {
            return Err(ConfigError::Invalid(
                "agent.initial_q_low exceeds agent.initial_q_high".to_string(),
            ));
        }
        if self.training.save_every == 0 || self.training.stats_window == 0 {
            return Err(ConfigError::Invalid(
                "training.save_every and training.stats_window must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

/// Defines errors that can occur while loading or validating configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// The configuration contains an invalid setting.
    Invalid(String),
    /// A maze layout could not be parsed.
    Layout(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Invalid(msg) => write!(f, "Invalid configuration: {}", msg),
            ConfigError::Layout(msg) => write!(f, "Invalid maze layout: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(Config::default().validate().is_ok());
        assert!(Config::fast_training().validate().is_ok());
        assert_eq!(Config::physics().motion.mode, ExecutionMode::Physics);
    }

    #[test]
    fn test_overrides() {
        let mut config = Config::default();
        config.apply_overrides(lookup(&[
            (ENV_FAST_MODE, "1"),
            (ENV_EPISODES, "42"),
            (ENV_MODEL_PATH, "/tmp/agent.json"),
            (ENV_SAVE_EVERY, "7"),
        ]));
        assert_eq!(config.motion.mode, ExecutionMode::Fast);
        assert_eq!(config.training.episodes, 42);
        assert_eq!(config.training.model_path, PathBuf::from("/tmp/agent.json"));
        assert_eq!(config.training.save_every, 7);
    }

    #[test]
    fn test_bad_overrides_are_ignored() {
        let mut config = Config::default();
        config.apply_overrides(lookup(&[
            (ENV_FAST_MODE, "false"),
            (ENV_EPISODES, "many"),
            (ENV_MODEL_PATH, "  "),
        ]));
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.motion.cell_size = 0.0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.agent.discount_factor = 1.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.environment.loop_repeats = 10;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.training.save_every = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.motion.probe_fraction = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                "motion": { "mode": "fast" },
                "training": { "episodes": 12 },
                "strategy": { "kind": "epsilon_greedy", "epsilon": 0.4 }
            }"#,
        )
        .unwrap();
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.motion.mode, ExecutionMode::Fast);
        assert_eq!(config.motion.cell_size, 10.5);
        assert_eq!(config.training.episodes, 12);
        assert_eq!(config.training.save_every, 50);
        assert_eq!(config.strategy.build().name(), "epsilon_greedy");
    }

    #[test]
    fn test_from_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Config::from_file(dir.path().join("missing.json")),
            Err(Error::Io(_))
        ));
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{").unwrap();
        assert!(matches!(
            Config::from_file(&path),
            Err(Error::Config(ConfigError::Invalid(_)))
        ));
    }

    #[test]
    fn test_builders() {
        let config = Config::default()
            .with_mode(ExecutionMode::Fast)
            .with_episodes(3)
            .with_model_path("m.json")
            .with_layout("mazes/corridor.txt")
            .with_seed(11);
        assert_eq!(config.motion.mode, ExecutionMode::Fast);
        assert_eq!(config.training.episodes, 3);
        assert_eq!(config.training.model_path, PathBuf::from("m.json"));
        assert_eq!(config.maze.layout_path, Some(PathBuf::from("mazes/corridor.txt")));
        assert_eq!(config.agent.seed, Some(11));
    }

    #[test]
    fn test_config_error_display() {
        let e = ConfigError::Layout("no goal".into());
        assert_eq!(e.to_string(), "Invalid maze layout: no goal");
    }
}
