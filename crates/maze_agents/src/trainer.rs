//! Episode orchestration, model persistence and training statistics.
//!
//! [`RLTrainer`] drives a [`QLearningAgent`] through a [`MazeEnvironment`].
//! Whatever happens inside the loop, the model is saved before `train` or
//! `resume` returns, and it reflects the last fully completed episode: a
//! partially played episode is rolled back on interrupt or error.

use crate::bus::TickBus;
use crate::config::Config;
use crate::environment::MazeEnvironment;
use crate::error::{Error, Result};
use crate::learning::{AgentStats, QLearningAgent, WindowStats};
use crate::motion::{DriveController, MotionExecutor};
use crate::persistence::SnapshotManager;
use crate::types::MoveResult;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Settings of the training loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub episodes: u32,
    pub test_episodes: u32,
    /// Save the model (and a snapshot) every this many episodes.
    pub save_every: u32,
    pub model_path: PathBuf,
    /// Directory for episode-numbered snapshots; none are written when `None`.
    pub snapshot_dir: Option<PathBuf>,
    pub max_snapshots: usize,
    /// Episodes covered by the rolling statistics.
    pub stats_window: usize,
    /// Episodes covered by the per-episode success-rate line.
    pub success_window: usize,
    /// Indent the saved model.
    pub pretty_json: bool,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            episodes: 200,
            test_episodes: 5,
            save_every: 50,
            model_path: PathBuf::from("models/q_agent.json"),
            snapshot_dir: None,
            max_snapshots: 5,
            stats_window: 50,
            success_window: 20,
            pretty_json: false,
        }
    }
}

/// Outcome of one played episode.
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeSummary {
    pub total_reward: f64,
    pub steps: u32,
    pub max_streak: u32,
    pub result: MoveResult,
    /// Checkpoint ids in the order they were crossed.
    pub checkpoints: Vec<u8>,
}

impl EpisodeSummary {
    pub fn success(&self) -> bool {
        self.result == MoveResult::GoalReached
    }
}

/// What a call to [`RLTrainer::train`] or [`RLTrainer::resume`] did.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingReport {
    /// Episodes completed in this call.
    pub episodes: u32,
    pub successes: u32,
    pub interrupted: bool,
    /// Rolling statistics at the end of the run.
    pub window: WindowStats,
    pub stats: Option<AgentStats>,
}

/// Results of greedy evaluation episodes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TestReport {
    pub episodes: u32,
    pub successes: u32,
    pub total_steps: u64,
    pub results: Vec<MoveResult>,
}

impl TestReport {
    pub fn success_rate(&self) -> f64 {
        if self.episodes == 0 {
            0.0
        } else {
            self.successes as f64 / self.episodes as f64
        }
    }

    pub fn avg_steps(&self) -> f64 {
        if self.episodes == 0 {
            0.0
        } else {
            self.total_steps as f64 / self.episodes as f64
        }
    }
}

/// Trains and evaluates a Q-learning agent in the maze.
pub struct RLTrainer<B: TickBus, D: DriveController> {
    env: MazeEnvironment<B, D>,
    agent: QLearningAgent,
    config: TrainingConfig,
    snapshots: Option<SnapshotManager>,
    interrupt: Arc<AtomicBool>,
}

impl<B: TickBus, D: DriveController> RLTrainer<B, D> {
    /// Creates a trainer; snapshots are enabled when `snapshot_dir` is set.
    pub fn new(env: MazeEnvironment<B, D>, agent: QLearningAgent, config: TrainingConfig) -> Self {
        let snapshots = config
            .snapshot_dir
            .as_ref()
            .map(|dir| SnapshotManager::new(dir, config.max_snapshots));
        Self {
            env,
            agent,
            config,
            snapshots,
            interrupt: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Wires executor, environment and agent from a full [`Config`].
    pub fn from_config(bus: B, drive: D, config: &Config) -> Self {
        let executor = MotionExecutor::new(bus, drive, config.motion.clone());
        let env = MazeEnvironment::new(
            executor,
            config.environment.clone(),
            config.rewards.clone(),
        );
        let agent = QLearningAgent::new(config.agent.clone(), config.strategy.build());
        Self::new(env, agent, config.training.clone())
    }

    /// Flag that stops training between steps once set.
    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupt)
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn agent(&self) -> &QLearningAgent {
        &self.agent
    }

    pub fn agent_mut(&mut self) -> &mut QLearningAgent {
        &mut self.agent
    }

    pub fn environment(&self) -> &MazeEnvironment<B, D> {
        &self.env
    }

    pub fn environment_mut(&mut self) -> &mut MazeEnvironment<B, D> {
        &mut self.env
    }

    fn interrupted(&self) -> bool {
        self.interrupt.load(Ordering::SeqCst)
    }

    /// Trains for `episodes` episodes, continuing from a saved model if one
    /// exists.
    pub fn train(&mut self, episodes: u32) -> Result<TrainingReport> {
        if self.agent.load_model(&self.config.model_path)? {
            info!("Loaded existing model");
        }
        self.run_training(episodes)
    }

    /// Like [`train`](Self::train) but requires a saved model.
    pub fn resume(&mut self, episodes: u32) -> Result<TrainingReport> {
        if !self.agent.load_model(&self.config.model_path)? {
            error!("No trained model found!");
            return Err(self.model_not_found());
        }
        info!(
            "Resuming from {} completed episodes",
            self.agent.history().len()
        );
        self.run_training(episodes)
    }

    fn run_training(&mut self, episodes: u32) -> Result<TrainingReport> {
        info!("Starting training for {} episodes", episodes);
        info!("Strategy: {}", self.agent.strategy().name());

        self.env.wait_for_tick()?;
        info!("Simulation clock is live");

        let mut report = TrainingReport {
            episodes: 0,
            successes: 0,
            interrupted: false,
            window: WindowStats::default(),
            stats: None,
        };
        let outcome = self.training_loop(episodes, &mut report);
        let saved = self.save();

        report.window = self.agent.history().window(self.config.stats_window);
        report.stats = self.agent.get_stats_over(self.config.stats_window);
        info!("Training completed!");
        if let Some(stats) = &report.stats {
            info!("Final Training Statistics:");
            log_agent_stats(stats);
        }

        match (outcome, saved) {
            (Err(e), Err(save_error)) => {
                error!("Model could not be saved: {}", save_error);
                Err(e)
            }
            (Err(e), Ok(())) => Err(e),
            (Ok(()), Err(save_error)) => Err(save_error),
            (Ok(()), Ok(())) => Ok(report),
        }
    }

    fn training_loop(&mut self, episodes: u32, report: &mut TrainingReport) -> Result<()> {
        for episode in 1..=episodes {
            if self.interrupted() {
                info!("Training interrupted by user");
                report.interrupted = true;
                break;
            }
            info!("Episode {}/{}", episode, episodes);

            let mark = self.agent.mark();
            let summary = match self.play_episode(true) {
                Ok(Some(summary)) => summary,
                Ok(None) => {
                    info!("Training interrupted by user, discarding episode {}", episode);
                    self.agent.rollback(mark);
                    report.interrupted = true;
                    break;
                }
                Err(e) => {
                    error!("Episode {}/{} failed: {}", episode, episodes, e);
                    self.agent.rollback(mark);
                    return Err(e);
                }
            };

            for id in &summary.checkpoints {
                self.agent.record_checkpoint(*id);
            }
            self.agent
                .end_episode(summary.total_reward, summary.steps, summary.success());
            self.env.reset_checkpoints()?;

            report.episodes += 1;
            if summary.success() {
                report.successes += 1;
            }
            info!(
                "{}: Reward: {:.1}, Steps: {}, Max streak: {}, Strategy: {}",
                if summary.success() { "GOAL" } else { "FAIL" },
                summary.total_reward,
                summary.steps,
                summary.max_streak,
                self.agent.strategy().name()
            );

            let history = self.agent.history();
            if history.len() >= self.config.success_window {
                let recent = history.window(self.config.success_window);
                info!(
                    "Success rate (last {}): {:.1}%",
                    recent.episodes,
                    recent.success_rate * 100.0
                );
            }

            if episode % self.config.save_every.max(1) == 0 {
                self.save()?;
                self.save_snapshot()?;
                self.log_window_stats();
            }
        }
        Ok(())
    }

    /// Plays one episode. Returns `None` if interrupted before it ended.
    fn play_episode(&mut self, training: bool) -> Result<Option<EpisodeSummary>> {
        let mut state = self.env.reset()?;
        let mut total_reward = 0.0;
        let mut max_streak = 0;
        let mut checkpoints = Vec::new();

        loop {
            if self.interrupted() {
                return Ok(None);
            }

            let action = self.agent.choose_action(&state, training);
            let step = self.env.step(action)?;
            if training {
                self.agent
                    .update_q_value(&state, action, step.reward, &step.state, step.done)?;
            }

            total_reward += step.reward;
            max_streak = max_streak.max(step.info.success_streak);
            if let Some(id) = step.info.checkpoint {
                checkpoints.push(id);
            }
            state = step.state;

            if step.done {
                return Ok(Some(EpisodeSummary {
                    total_reward,
                    steps: step.info.steps,
                    max_streak,
                    result: step.info.result,
                    checkpoints,
                }));
            }
        }
    }

    /// Runs `episodes` greedy episodes without learning.
    pub fn test(&mut self, episodes: u32) -> Result<TestReport> {
        info!("Testing agent for {} episodes", episodes);
        if !self.agent.load_model(&self.config.model_path)? {
            error!("No trained model found!");
            return Err(self.model_not_found());
        }
        self.env.wait_for_tick()?;

        let mut report = TestReport::default();
        for episode in 1..=episodes {
            if self.interrupted() {
                info!("Testing interrupted by user");
                break;
            }
            info!("Test episode {}/{}", episode, episodes);
            let Some(summary) = self.play_episode(false)? else {
                info!("Testing interrupted by user");
                break;
            };
            self.env.reset_checkpoints()?;

            report.episodes += 1;
            report.total_steps += summary.steps as u64;
            report.results.push(summary.result);
            if summary.success() {
                report.successes += 1;
                info!("Goal reached in {} steps!", summary.steps);
            } else {
                info!("Test failed: {}", summary.result);
            }
        }

        info!("Test Results:");
        info!(
            "Success rate: {}/{} ({:.1}%)",
            report.successes,
            report.episodes,
            report.success_rate() * 100.0
        );
        info!("Average steps: {:.1}", report.avg_steps());
        Ok(report)
    }

    /// Loads the saved model and logs its statistics.
    ///
    /// Returns `Ok(None)` for a model without recorded episodes.
    pub fn show_stats(&mut self) -> Result<Option<AgentStats>> {
        if !self.agent.load_model(&self.config.model_path)? {
            error!("No trained model found!");
            return Err(self.model_not_found());
        }
        let stats = self.agent.get_stats_over(self.config.stats_window);
        match &stats {
            Some(stats) => {
                info!("Model Statistics:");
                log_agent_stats(stats);
            }
            None => warn!(
                "Model has {} states but no recorded episodes",
                self.agent.table().len()
            ),
        }
        Ok(stats)
    }

    /// Writes the model to the configured path.
    pub fn save(&self) -> Result<()> {
        let path = &self.config.model_path;
        self.agent.to_model().save(path, self.config.pretty_json)?;
        info!("Model saved to {}", path.display());
        Ok(())
    }

    fn save_snapshot(&self) -> Result<()> {
        if let Some(snapshots) = &self.snapshots {
            let episode = self.agent.history().len() as u64;
            snapshots.save(&self.agent.to_model(), episode)?;
        }
        Ok(())
    }

    fn log_window_stats(&self) {
        let history = self.agent.history();
        if history.is_empty() {
            return;
        }
        let window = history.window(self.config.stats_window);
        info!("Statistics (last {} episodes):", window.episodes);
        info!("  Average reward: {:.2}", window.avg_reward);
        info!("  Average steps: {:.1}", window.avg_steps);
        info!("  Success rate: {:.1}%", window.success_rate * 100.0);
        info!("  States explored: {}", self.agent.table().len());
        if !history.checkpoint_discoveries.is_empty() {
            info!("  Checkpoint discoveries: {:?}", history.checkpoint_discoveries);
        }
    }

    fn model_not_found(&self) -> Error {
        Error::ModelNotFound(self.config.model_path.display().to_string())
    }
}

fn log_agent_stats(stats: &AgentStats) {
    info!("  episodes: {}", stats.episodes);
    info!("  states_explored: {}", stats.states_explored);
    info!("  avg_reward: {:.2}", stats.avg_reward);
    info!("  max_reward: {:.2}", stats.max_reward);
    info!("  avg_steps: {:.1}", stats.avg_steps);
    info!("  success_rate: {:.1}%", stats.success_rate * 100.0);
    info!(
        "  last {} episodes: avg_reward {:.2}, success_rate {:.1}%",
        stats.recent.episodes,
        stats.recent.avg_reward,
        stats.recent.success_rate * 100.0
    );
    info!("  learning_rate: {:.4}", stats.learning_rate);
    info!("  checkpoint_discoveries: {:?}", stats.checkpoint_discoveries);
    info!(
        "  strategy: {} (epsilon {:.3}, states tracked {})",
        stats.strategy.name, stats.strategy.epsilon, stats.strategy.states_tracked
    );
}
