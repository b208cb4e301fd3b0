//! Tabular action values with per-action visit counters.

use crate::types::{DiscreteState, ACTION_COUNT};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Index of the largest value; ties and NaNs resolve to the lowest index.
pub fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    let mut best_value = f64::NEG_INFINITY;
    for (i, v) in values.iter().enumerate() {
        if *v > best_value {
            best = i;
            best_value = *v;
        }
    }
    best
}

/// Largest finite-comparable value, `0.0` for an empty slice.
pub fn max_value(values: &[f64]) -> f64 {
    values.get(argmax(values)).copied().unwrap_or(0.0)
}

/// Action values and visit counts of one state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QEntry {
    pub values: [f64; ACTION_COUNT],
    pub counts: [u64; ACTION_COUNT],
}

impl QEntry {
    pub fn new(values: [f64; ACTION_COUNT]) -> Self {
        Self {
            values,
            counts: [0; ACTION_COUNT],
        }
    }

    /// Values drawn uniformly from `[low, high)`.
    pub fn random<R: Rng + ?Sized>(low: f64, high: f64, rng: &mut R) -> Self {
        let mut values = [low; ACTION_COUNT];
        if high > low {
            for v in values.iter_mut() {
                *v = rng.random_range(low..high);
            }
        }
        Self::new(values)
    }

    pub fn best_action(&self) -> usize {
        argmax(&self.values)
    }

    pub fn total_visits(&self) -> u64 {
        self.counts.iter().sum()
    }
}

/// Lazily populated Q-table.
///
/// Value vectors and visit counters share one entry, so a state can never
/// have one without the other.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QTable {
    entries: HashMap<DiscreteState, QEntry>,
}

impl QTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The entry for `state`, creating it with random values in `[low, high)`.
    pub fn entry_or_init<R: Rng + ?Sized>(
        &mut self,
        state: DiscreteState,
        low: f64,
        high: f64,
        rng: &mut R,
    ) -> &mut QEntry {
        self.entries
            .entry(state)
            .or_insert_with(|| QEntry::random(low, high, rng))
    }

    pub fn get(&self, state: &DiscreteState) -> Option<&QEntry> {
        self.entries.get(state)
    }

    pub fn get_mut(&mut self, state: &DiscreteState) -> Option<&mut QEntry> {
        self.entries.get_mut(state)
    }

    /// Inserts or replaces an entry.
    pub fn insert(&mut self, state: DiscreteState, entry: QEntry) {
        self.entries.insert(state, entry);
    }

    pub fn contains(&self, state: &DiscreteState) -> bool {
        self.entries.contains_key(state)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DiscreteState, &QEntry)> {
        self.entries.iter()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Entries sorted by state, for stable output.
    pub fn sorted(&self) -> Vec<(DiscreteState, &QEntry)> {
        let mut rows: Vec<_> = self.entries.iter().map(|(s, e)| (*s, e)).collect();
        rows.sort_by_key(|(s, _)| *s);
        rows
    }
}
