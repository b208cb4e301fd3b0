//! Exploration strategies.
//!
//! A strategy picks the action during training given the state's action
//! values and visit counts. [`CuriosityStrategy`] favours rarely visited
//! states and actions; [`EpsilonGreedyStrategy`] is the classic decaying
//! epsilon-greedy rule.

use super::q_table::argmax;
use crate::types::{DiscreteState, ACTION_COUNT};
use log::debug;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Offset keeping the novelty term finite for untried actions.
const NOVELTY_EPSILON: f64 = 1e-6;

/// Summary of a strategy for statistics output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyInfo {
    pub name: String,
    pub epsilon: f64,
    pub novelty_bonus: f64,
    pub states_tracked: usize,
    pub total_visits: u64,
}

/// Persisted internal state of a strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyState {
    pub name: String,
    pub epsilon: f64,
    #[serde(default)]
    pub novelty_bonus: f64,
    #[serde(default)]
    pub state_visits: Vec<(DiscreteState, u64)>,
}

/// Chooses training actions.
pub trait ExplorationStrategy: fmt::Debug {
    fn name(&self) -> &'static str;

    /// Picks an action index in `0..ACTION_COUNT`.
    fn choose_action(
        &mut self,
        q_values: &[f64; ACTION_COUNT],
        action_counts: &[u64; ACTION_COUNT],
        state: Option<&DiscreteState>,
        rng: &mut StdRng,
    ) -> usize;

    /// Called once at the end of every training episode.
    fn update(&mut self) {}

    fn info(&self) -> StrategyInfo;

    fn export_state(&self) -> StrategyState;

    fn import_state(&mut self, state: StrategyState);
}

/// Settings of [`CuriosityStrategy`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CuriosityConfig {
    /// Base exploration probability.
    pub epsilon: f64,
    /// Weight of the per-action novelty term used when exploiting.
    pub novelty_bonus: f64,
    /// Extra exploration for new states: `visit_scale / (visits + 1)`.
    pub visit_scale: f64,
    /// Upper bound of the exploration probability.
    pub max_exploration: f64,
    /// Add the novelty term to the values before taking the argmax.
    pub augment_exploitation: bool,
}

impl Default for CuriosityConfig {
    fn default() -> Self {
        Self {
            epsilon: 0.3,
            novelty_bonus: 3.0,
            visit_scale: 10.0,
            max_exploration: 0.8,
            augment_exploitation: true,
        }
    }
}

/// Novelty-driven exploration.
#[derive(Debug, Clone)]
pub struct CuriosityStrategy {
    config: CuriosityConfig,
    state_visits: HashMap<DiscreteState, u64>,
}

impl CuriosityStrategy {
    pub fn new(config: CuriosityConfig) -> Self {
        Self {
            config,
            state_visits: HashMap::new(),
        }
    }

    pub fn config(&self) -> &CuriosityConfig {
        &self.config
    }

    /// Exploration probability for a state seen `visits` times before.
    pub fn exploration_probability(&self, visits: u64) -> f64 {
        (self.config.epsilon + self.config.visit_scale / (visits as f64 + 1.0))
            .min(self.config.max_exploration)
    }

    pub fn visits(&self, state: &DiscreteState) -> u64 {
        self.state_visits.get(state).copied().unwrap_or(0)
    }

    fn least_visited(counts: &[u64; ACTION_COUNT], rng: &mut StdRng) -> usize {
        let min = counts.iter().copied().min().unwrap_or(0);
        let candidates: Vec<usize> = (0..ACTION_COUNT).filter(|a| counts[*a] == min).collect();
        candidates.choose(rng).copied().unwrap_or(0)
    }

    fn novelty_scores(
        &self,
        q: &[f64; ACTION_COUNT],
        counts: &[u64; ACTION_COUNT],
    ) -> [f64; ACTION_COUNT] {
        std::array::from_fn(|a| {
            q[a] + self.config.novelty_bonus / ((counts[a] as f64).sqrt() + NOVELTY_EPSILON)
        })
    }
}

impl Default for CuriosityStrategy {
    fn default() -> Self {
        Self::new(CuriosityConfig::default())
    }
}

impl ExplorationStrategy for CuriosityStrategy {
    fn name(&self) -> &'static str {
        "curiosity"
    }

    fn choose_action(
        &mut self,
        q_values: &[f64; ACTION_COUNT],
        action_counts: &[u64; ACTION_COUNT],
        state: Option<&DiscreteState>,
        rng: &mut StdRng,
    ) -> usize {
        let visits = state.map(|s| self.visits(s)).unwrap_or(0);
        let explore = self.exploration_probability(visits);
        if let Some(s) = state {
            *self.state_visits.entry(*s).or_insert(0) += 1;
        }

        if rng.random::<f64>() < explore {
            Self::least_visited(action_counts, rng)
        } else if self.config.augment_exploitation {
            argmax(&self.novelty_scores(q_values, action_counts))
        } else {
            argmax(q_values)
        }
    }

    fn info(&self) -> StrategyInfo {
        StrategyInfo {
            name: self.name().to_string(),
            epsilon: self.config.epsilon,
            novelty_bonus: self.config.novelty_bonus,
            states_tracked: self.state_visits.len(),
            total_visits: self.state_visits.values().sum(),
        }
    }

    fn export_state(&self) -> StrategyState {
        let mut state_visits: Vec<_> = self.state_visits.iter().map(|(s, v)| (*s, *v)).collect();
        state_visits.sort_by_key(|(s, _)| *s);
        StrategyState {
            name: self.name().to_string(),
            epsilon: self.config.epsilon,
            novelty_bonus: self.config.novelty_bonus,
            state_visits,
        }
    }

    fn import_state(&mut self, state: StrategyState) {
        if state.name != self.name() {
            debug!("importing {} state into {} strategy", state.name, self.name());
        }
        self.config.epsilon = state.epsilon;
        self.config.novelty_bonus = state.novelty_bonus;
        self.state_visits = state.state_visits.into_iter().collect();
    }
}

/// Settings of [`EpsilonGreedyStrategy`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EpsilonGreedyConfig {
    pub epsilon: f64,
    pub epsilon_decay: f64,
    pub epsilon_min: f64,
}

impl Default for EpsilonGreedyConfig {
    fn default() -> Self {
        Self {
            epsilon: 0.8,
            epsilon_decay: 0.995,
            epsilon_min: 0.1,
        }
    }
}

/// Decaying epsilon-greedy exploration that tries untried actions first.
#[derive(Debug, Clone, Default)]
pub struct EpsilonGreedyStrategy {
    config: EpsilonGreedyConfig,
}

impl EpsilonGreedyStrategy {
    pub fn new(config: EpsilonGreedyConfig) -> Self {
        Self { config }
    }

    pub fn epsilon(&self) -> f64 {
        self.config.epsilon
    }
}

impl ExplorationStrategy for EpsilonGreedyStrategy {
    fn name(&self) -> &'static str {
        "epsilon_greedy"
    }

    fn choose_action(
        &mut self,
        q_values: &[f64; ACTION_COUNT],
        action_counts: &[u64; ACTION_COUNT],
        _state: Option<&DiscreteState>,
        rng: &mut StdRng,
    ) -> usize {
        if rng.random::<f64>() >= self.config.epsilon {
            return argmax(q_values);
        }
        let untried: Vec<usize> = (0..ACTION_COUNT).filter(|a| action_counts[*a] == 0).collect();
        match untried.choose(rng) {
            Some(a) => *a,
            None => rng.random_range(0..ACTION_COUNT),
        }
    }

    fn update(&mut self) {
        self.config.epsilon =
            (self.config.epsilon * self.config.epsilon_decay).max(self.config.epsilon_min);
    }

    fn info(&self) -> StrategyInfo {
        StrategyInfo {
            name: self.name().to_string(),
            epsilon: self.config.epsilon,
            novelty_bonus: 0.0,
            states_tracked: 0,
            total_visits: 0,
        }
    }

    fn export_state(&self) -> StrategyState {
        StrategyState {
            name: self.name().to_string(),
            epsilon: self.config.epsilon,
            novelty_bonus: 0.0,
            state_visits: Vec::new(),
        }
    }

    fn import_state(&mut self, state: StrategyState) {
        self.config.epsilon = state.epsilon;
    }
}

/// Which strategy to build, with its settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategyConfig {
    Curiosity(CuriosityConfig),
    EpsilonGreedy(EpsilonGreedyConfig),
}

impl Default for StrategyConfig {
    fn default() -> Self {
        StrategyConfig::Curiosity(CuriosityConfig::default())
    }
}

impl StrategyConfig {
    pub fn build(&self) -> Box<dyn ExplorationStrategy> {
        match self {
            StrategyConfig::Curiosity(c) => Box::new(CuriosityStrategy::new(c.clone())),
            StrategyConfig::EpsilonGreedy(c) => Box::new(EpsilonGreedyStrategy::new(c.clone())),
        }
    }
}
