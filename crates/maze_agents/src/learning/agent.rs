//! Tabular Q-learning agent.

use super::q_table::{argmax, max_value, QEntry, QTable};
use super::strategy::{CuriosityStrategy, ExplorationStrategy, StrategyInfo, StrategyState};
use crate::error::{Error, Result};
use crate::persistence::{
    CountRecord, PersistedModel, PersistenceError, QRecord, MODEL_FORMAT_VERSION,
};
use crate::types::{DiscreteState, Timestamp, ACTION_COUNT};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// Configuration for the [`QLearningAgent`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// The learning rate (alpha) at the start of training.
    pub learning_rate: f64,
    /// The discount factor (gamma).
    pub discount_factor: f64,
    /// Floor for the decayed learning rate.
    pub min_learning_rate: f64,
    /// Multiplicative learning-rate decay applied after every episode.
    pub learning_rate_decay: f64,
    /// New states start with values drawn from `[initial_q_low, initial_q_high)`.
    pub initial_q_low: f64,
    pub initial_q_high: f64,
    /// Seed for reproducible runs; entropy-seeded when `None`.
    pub seed: Option<u64>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            discount_factor: 0.95,
            min_learning_rate: 0.01,
            learning_rate_decay: 0.995,
            initial_q_low: 0.1,
            initial_q_high: 1.0,
            seed: None,
        }
    }
}

impl AgentConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn with_discount_factor(mut self, discount_factor: f64) -> Self {
        self.discount_factor = discount_factor;
        self
    }
}

/// Cumulative per-episode results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EpisodeHistory {
    pub rewards: Vec<f64>,
    pub steps: Vec<u32>,
    pub successes: Vec<bool>,
    /// How many times each checkpoint id was crossed over all episodes.
    pub checkpoint_discoveries: BTreeMap<u8, u64>,
}

/// Episodes covered by [`AgentStats::recent`] unless a window is given.
pub const DEFAULT_STATS_WINDOW: usize = 50;

/// Averages over a window of recent episodes.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WindowStats {
    pub episodes: usize,
    pub avg_reward: f64,
    pub avg_steps: f64,
    pub success_rate: f64,
}

impl EpisodeHistory {
    pub fn record(&mut self, reward: f64, steps: u32, success: bool) {
        self.rewards.push(reward);
        self.steps.push(steps);
        self.successes.push(success);
    }

    pub fn record_checkpoint(&mut self, id: u8) {
        *self.checkpoint_discoveries.entry(id).or_insert(0) += 1;
    }

    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }

    /// Statistics over the last `window` episodes (all when fewer).
    pub fn window(&self, window: usize) -> WindowStats {
        let n = self.len().min(window);
        if n == 0 {
            return WindowStats::default();
        }
        let from = self.len() - n;
        let rewards = &self.rewards[from..];
        let steps = &self.steps[from.min(self.steps.len())..];
        let successes = &self.successes[from.min(self.successes.len())..];
        WindowStats {
            episodes: n,
            avg_reward: rewards.iter().sum::<f64>() / n as f64,
            avg_steps: steps.iter().map(|s| *s as f64).sum::<f64>() / steps.len().max(1) as f64,
            success_rate: successes.iter().filter(|s| **s).count() as f64
                / successes.len().max(1) as f64,
        }
    }
}

/// Summary of a trained agent.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentStats {
    pub episodes: usize,
    pub states_explored: usize,
    pub avg_reward: f64,
    pub max_reward: f64,
    pub avg_steps: f64,
    pub success_rate: f64,
    /// Averages over the most recent episodes only.
    pub recent: WindowStats,
    pub learning_rate: f64,
    pub checkpoint_discoveries: BTreeMap<u8, u64>,
    pub strategy: StrategyInfo,
}

/// Agent state at the start of an episode, for rolling back a partial one.
#[derive(Debug, Clone)]
pub struct EpisodeMark {
    table: QTable,
    strategy: StrategyState,
    learning_rate: f64,
}

/// Q-learning over [`DiscreteState`]s with four actions.
#[derive(Debug)]
pub struct QLearningAgent {
    table: QTable,
    strategy: Box<dyn ExplorationStrategy>,
    config: AgentConfig,
    learning_rate: f64,
    history: EpisodeHistory,
    rng: StdRng,
}

impl QLearningAgent {
    pub fn new(config: AgentConfig, strategy: Box<dyn ExplorationStrategy>) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        };
        Self {
            table: QTable::new(),
            strategy,
            learning_rate: config.learning_rate,
            config,
            history: EpisodeHistory::default(),
            rng,
        }
    }

    /// An agent using the default [`CuriosityStrategy`].
    pub fn with_curiosity(config: AgentConfig) -> Self {
        Self::new(config, Box::new(CuriosityStrategy::default()))
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn table(&self) -> &QTable {
        &self.table
    }

    pub fn strategy(&self) -> &dyn ExplorationStrategy {
        self.strategy.as_ref()
    }

    pub fn history(&self) -> &EpisodeHistory {
        &self.history
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    fn entry(&mut self, state: DiscreteState) -> &mut QEntry {
        self.table.entry_or_init(
            state,
            self.config.initial_q_low,
            self.config.initial_q_high,
            &mut self.rng,
        )
    }

    /// Action values of `state`, creating the entry on first access.
    pub fn get_q_values(&mut self, state: &DiscreteState) -> [f64; ACTION_COUNT] {
        self.entry(*state).values
    }

    /// Action visit counts of `state`; zeros for unseen states.
    pub fn action_counts(&self, state: &DiscreteState) -> [u64; ACTION_COUNT] {
        self.table
            .get(state)
            .map(|e| e.counts)
            .unwrap_or([0; ACTION_COUNT])
    }

    /// Overwrites the action values of `state`, keeping its counts.
    pub fn set_q_values(&mut self, state: DiscreteState, values: [f64; ACTION_COUNT]) {
        self.entry(state).values = values;
    }

    /// Picks an action for `state`.
    ///
    /// Outside training this is the greedy action, ties going to the lowest
    /// index. During training the strategy decides and the chosen action's
    /// visit count is incremented.
    pub fn choose_action(&mut self, state: &DiscreteState, training: bool) -> usize {
        let entry = self.entry(*state);
        let (values, counts) = (entry.values, entry.counts);
        if !training {
            return argmax(&values);
        }

        let mut action = self
            .strategy
            .choose_action(&values, &counts, Some(state), &mut self.rng);
        if action >= ACTION_COUNT {
            warn!(
                "{} strategy returned action {}, using greedy action",
                self.strategy.name(),
                action
            );
            action = argmax(&values);
        }
        if let Some(entry) = self.table.get_mut(state) {
            entry.counts[action] += 1;
        }
        action
    }

    /// Temporal-difference update. Returns the new value of `(state, action)`.
    ///
    /// `Q += lr * (reward + gamma * max Q(next) - Q)`; the bootstrap term is
    /// dropped when `done`.
    pub fn update_q_value(
        &mut self,
        state: &DiscreteState,
        action: usize,
        reward: f64,
        next_state: &DiscreteState,
        done: bool,
    ) -> Result<f64> {
        if action >= ACTION_COUNT {
            return Err(Error::InvalidAction(action));
        }
        let target = if done {
            reward
        } else {
            let next_best = max_value(&self.get_q_values(next_state));
            reward + self.config.discount_factor * next_best
        };
        let lr = self.learning_rate;
        let entry = self.entry(*state);
        let current = entry.values[action];
        let updated = current + lr * (target - current);
        if updated.is_finite() {
            entry.values[action] = updated;
        } else {
            warn!("non-finite Q update for {} action {} ignored", state, action);
        }
        Ok(entry.values[action])
    }

    /// Multiplies the learning rate by the decay factor, down to the floor.
    pub fn decay_learning_rate(&mut self) {
        self.learning_rate = (self.learning_rate * self.config.learning_rate_decay)
            .max(self.config.min_learning_rate);
    }

    /// Records a finished training episode and advances the schedules.
    pub fn end_episode(&mut self, total_reward: f64, steps: u32, success: bool) {
        self.history.record(total_reward, steps, success);
        self.decay_learning_rate();
        self.strategy.update();
    }

    pub fn record_checkpoint(&mut self, id: u8) {
        self.history.record_checkpoint(id);
    }

    /// Summary statistics; `None` before the first episode.
    pub fn get_stats(&self) -> Option<AgentStats> {
        self.get_stats_over(DEFAULT_STATS_WINDOW)
    }

    /// Like [`get_stats`](Self::get_stats), with `recent` taken over the last
    /// `window` episodes.
    pub fn get_stats_over(&self, window: usize) -> Option<AgentStats> {
        if self.history.is_empty() {
            return None;
        }
        let all = self.history.window(usize::MAX);
        let max_reward = self
            .history
            .rewards
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
        Some(AgentStats {
            episodes: all.episodes,
            states_explored: self.table.len(),
            avg_reward: all.avg_reward,
            max_reward,
            avg_steps: all.avg_steps,
            success_rate: all.success_rate,
            recent: self.history.window(window),
            learning_rate: self.learning_rate,
            checkpoint_discoveries: self.history.checkpoint_discoveries.clone(),
            strategy: self.strategy.info(),
        })
    }

    /// Captures the learnable state before an episode starts.
    pub fn mark(&self) -> EpisodeMark {
        EpisodeMark {
            table: self.table.clone(),
            strategy: self.strategy.export_state(),
            learning_rate: self.learning_rate,
        }
    }

    /// Restores the state captured by [`mark`](Self::mark).
    pub fn rollback(&mut self, mark: EpisodeMark) {
        self.table = mark.table;
        self.strategy.import_state(mark.strategy);
        self.learning_rate = mark.learning_rate;
    }

    /// Builds the persisted form of this agent.
    pub fn to_model(&self) -> PersistedModel {
        let rows = self.table.sorted();
        PersistedModel {
            version: MODEL_FORMAT_VERSION,
            saved_at: Timestamp::now(),
            learning_rate: self.learning_rate,
            q_table: rows
                .iter()
                .map(|(state, e)| QRecord {
                    state: *state,
                    values: e.values,
                })
                .collect(),
            action_counts: rows
                .iter()
                .map(|(state, e)| CountRecord {
                    state: *state,
                    counts: e.counts,
                })
                .collect(),
            history: self.history.clone(),
            strategy: Some(self.strategy.export_state()),
        }
    }

    /// Replaces this agent's learned state with `model`.
    ///
    /// Counts for states without values are dropped; states without counts
    /// start at zero.
    pub fn apply_model(&mut self, model: PersistedModel) {
        let mut counts: BTreeMap<DiscreteState, [u64; ACTION_COUNT]> = model
            .action_counts
            .into_iter()
            .map(|r| (r.state, r.counts))
            .collect();
        let known: HashSet<DiscreteState> = model.q_table.iter().map(|r| r.state).collect();
        let orphans = counts.keys().filter(|s| !known.contains(s)).count();
        if orphans > 0 {
            debug!("dropping action counts of {} states without values", orphans);
        }

        self.table.clear();
        let mut backfilled = 0;
        for record in model.q_table {
            let entry_counts = counts.remove(&record.state).unwrap_or_else(|| {
                backfilled += 1;
                [0; ACTION_COUNT]
            });
            self.table.insert(
                record.state,
                QEntry {
                    values: record.values,
                    counts: entry_counts,
                },
            );
        }
        if backfilled > 0 {
            debug!("initialised action counts for {} states", backfilled);
        }

        self.history = model.history;
        if let Some(strategy) = model.strategy {
            self.strategy.import_state(strategy);
        }
        if model.learning_rate.is_finite() && model.learning_rate > 0.0 {
            self.learning_rate = model.learning_rate;
        }
    }

    /// Saves the agent to `path`.
    pub fn save_model(
        &self,
        path: impl AsRef<Path>,
    ) -> std::result::Result<(), PersistenceError> {
        let path = path.as_ref();
        self.to_model().save(path, false)?;
        debug!("model saved to {}", path.display());
        Ok(())
    }

    /// Loads the agent from `path`. Returns `Ok(false)` if no file exists.
    pub fn load_model(
        &mut self,
        path: impl AsRef<Path>,
    ) -> std::result::Result<bool, PersistenceError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(false);
        }
        let model = PersistedModel::load(path)?;
        let saved_at = model.saved_at;
        self.apply_model(model);
        info!(
            "loaded model from {} saved {} ({} states, {} episodes)",
            path.display(),
            saved_at.to_rfc3339(),
            self.table.len(),
            self.history.len()
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learning::strategy::{CuriosityConfig, EpsilonGreedyStrategy};

    fn agent() -> QLearningAgent {
        QLearningAgent::with_curiosity(AgentConfig::default().with_seed(3))
    }

    #[test]
    fn test_td_update_matches_closed_form() {
        let mut agent = QLearningAgent::with_curiosity(
            AgentConfig::default()
                .with_seed(1)
                .with_learning_rate(0.1)
                .with_discount_factor(0.9),
        );
        let s = DiscreteState::new(0, 0);
        let next = DiscreteState::new(1, 0);
        agent.set_q_values(s, [1.0, 2.0, 3.0, 4.0]);
        agent.set_q_values(next, [0.0, 0.0, 10.0, 0.0]);
        let updated = agent.update_q_value(&s, 1, 5.0, &next, false).unwrap();
        assert!((updated - 3.2).abs() < 1e-12);
        assert!((agent.get_q_values(&s)[1] - 3.2).abs() < 1e-12);
    }

    #[test]
    fn test_terminal_update_drops_bootstrap() {
        let mut agent = agent();
        let s = DiscreteState::new(0, 0);
        let next = DiscreteState::new(1, 0);
        agent.set_q_values(s, [0.0; 4]);
        agent.set_q_values(next, [100.0; 4]);
        let updated = agent.update_q_value(&s, 0, 10.0, &next, true).unwrap();
        assert!((updated - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_action_rejected() {
        let mut agent = agent();
        let s = DiscreteState::new(0, 0);
        assert!(matches!(
            agent.update_q_value(&s, 4, 1.0, &s, false),
            Err(Error::InvalidAction(4))
        ));
    }

    #[test]
    fn test_new_state_initialised_lazily() {
        let mut agent = agent();
        let s = DiscreteState::new(5, 5);
        assert!(agent.table().get(&s).is_none());
        let q = agent.get_q_values(&s);
        assert!(q.iter().all(|v| (0.1..1.0).contains(v)));
        assert_eq!(agent.action_counts(&s), [0; ACTION_COUNT]);
    }

    #[test]
    fn test_greedy_choice_does_not_count() {
        let mut agent = agent();
        let s = DiscreteState::new(0, 0);
        agent.set_q_values(s, [1.0, 7.0, 7.0, 2.0]);
        assert_eq!(agent.choose_action(&s, false), 1);
        assert_eq!(agent.action_counts(&s), [0; ACTION_COUNT]);
    }

    #[test]
    fn test_training_choice_counts_action() {
        let mut agent = agent();
        let s = DiscreteState::new(0, 0);
        let mut total = 0;
        for _ in 0..10 {
            let a = agent.choose_action(&s, true);
            assert!(a < ACTION_COUNT);
            total += 1;
        }
        assert_eq!(agent.action_counts(&s).iter().sum::<u64>(), total);
    }

    #[test]
    fn test_learning_rate_decay_floor() {
        let mut agent = agent();
        agent.decay_learning_rate();
        assert!((agent.learning_rate() - 0.0995).abs() < 1e-12);
        for _ in 0..10_000 {
            agent.decay_learning_rate();
        }
        assert_eq!(agent.learning_rate(), 0.01);
    }

    #[test]
    fn test_stats_after_episodes() {
        let mut agent = agent();
        assert!(agent.get_stats().is_none());
        agent.end_episode(10.0, 20, false);
        agent.end_episode(30.0, 10, true);
        agent.record_checkpoint(2);
        let stats = agent.get_stats().unwrap();
        assert_eq!(stats.episodes, 2);
        assert_eq!(stats.avg_reward, 20.0);
        assert_eq!(stats.max_reward, 30.0);
        assert_eq!(stats.avg_steps, 15.0);
        assert_eq!(stats.success_rate, 0.5);
        assert_eq!(stats.recent.episodes, 2);
        assert_eq!(stats.checkpoint_discoveries.get(&2), Some(&1));
    }

    #[test]
    fn test_stats_recent_window() {
        let mut agent = agent();
        for i in 0..60 {
            agent.end_episode(if i < 10 { 100.0 } else { 0.0 }, 5, i < 10);
        }
        let stats = agent.get_stats().unwrap();
        assert_eq!(stats.episodes, 60);
        assert_eq!(stats.recent.episodes, 50);
        assert_eq!(stats.recent.success_rate, 0.0);
        assert_eq!(stats.recent.avg_reward, 0.0);
        assert!(stats.success_rate > 0.16 && stats.success_rate < 0.17);

        let narrow = agent.get_stats_over(5).unwrap();
        assert_eq!(narrow.recent.episodes, 5);
    }

    #[test]
    fn test_history_window() {
        let mut history = EpisodeHistory::default();
        for i in 0..10 {
            history.record(i as f64, 10, i % 2 == 0);
        }
        let w = history.window(4);
        assert_eq!(w.episodes, 4);
        assert_eq!(w.avg_reward, 7.5);
        assert_eq!(w.success_rate, 0.5);
        assert_eq!(history.window(0), WindowStats::default());
    }

    #[test]
    fn test_mark_and_rollback() {
        let mut agent = agent();
        let s = DiscreteState::new(0, 0);
        agent.set_q_values(s, [1.0; 4]);
        let mark = agent.mark();
        agent.update_q_value(&s, 0, 100.0, &s, true).unwrap();
        agent.choose_action(&DiscreteState::new(3, 3), true);
        agent.rollback(mark);
        assert_eq!(agent.get_q_values(&s), [1.0; 4]);
        assert_eq!(agent.table().len(), 1);
        assert_eq!(agent.strategy().info().total_visits, 0);
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");

        let mut agent = agent();
        let s = DiscreteState::new(1, -1);
        for _ in 0..5 {
            agent.choose_action(&s, true);
        }
        agent.update_q_value(&s, 2, 4.0, &DiscreteState::new(2, -1), false).unwrap();
        agent.end_episode(4.0, 1, false);
        agent.record_checkpoint(1);
        agent.save_model(&path).unwrap();

        let mut restored = QLearningAgent::with_curiosity(AgentConfig::default());
        assert!(restored.load_model(&path).unwrap());
        assert_eq!(restored.table(), agent.table());
        assert_eq!(restored.history(), agent.history());
        assert_eq!(
            restored.strategy().export_state(),
            agent.strategy().export_state()
        );
        assert_eq!(restored.learning_rate(), agent.learning_rate());
    }

    #[test]
    fn test_load_missing_model_returns_false() {
        let dir = tempfile::tempdir().unwrap();
        let mut agent = agent();
        assert!(!agent.load_model(dir.path().join("nope.json")).unwrap());
    }

    #[test]
    fn test_load_backfills_counts_and_drops_orphans() {
        let mut agent = agent();
        agent.apply_model(PersistedModel {
            version: MODEL_FORMAT_VERSION,
            saved_at: Timestamp(0),
            learning_rate: 0.05,
            q_table: vec![QRecord {
                state: DiscreteState::new(0, 0),
                values: [1.0, 2.0, 3.0, 4.0],
            }],
            action_counts: vec![CountRecord {
                state: DiscreteState::new(9, 9),
                counts: [1, 1, 1, 1],
            }],
            history: EpisodeHistory::default(),
            strategy: None,
        });
        assert_eq!(agent.table().len(), 1);
        assert_eq!(agent.action_counts(&DiscreteState::new(0, 0)), [0; 4]);
        assert!(agent.table().get(&DiscreteState::new(9, 9)).is_none());
        assert_eq!(agent.learning_rate(), 0.05);
    }

    #[test]
    fn test_custom_strategy() {
        let mut agent = QLearningAgent::new(
            AgentConfig::default().with_seed(9),
            Box::new(EpsilonGreedyStrategy::default()),
        );
        assert_eq!(agent.strategy().name(), "epsilon_greedy");
        let a = agent.choose_action(&DiscreteState::new(0, 0), true);
        assert!(a < ACTION_COUNT);

        let curious = QLearningAgent::new(
            AgentConfig::default(),
            Box::new(CuriosityStrategy::new(CuriosityConfig::default())),
        );
        assert_eq!(curious.strategy().name(), "curiosity");
    }
}
