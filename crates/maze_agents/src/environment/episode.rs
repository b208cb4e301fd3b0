//! Per-episode bookkeeping.

use crate::types::{DiscreteState, MoveResult};
use std::collections::{HashMap, VecDeque};

/// Bounded ring of recent discrete positions used for loop detection.
#[derive(Debug, Clone)]
pub struct PositionHistory {
    capacity: usize,
    positions: VecDeque<DiscreteState>,
}

impl PositionHistory {
    /// Fewer recorded positions than this never count as a loop.
    pub const MIN_SAMPLES: usize = 4;

    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            positions: VecDeque::with_capacity(capacity.max(1)),
        }
    }

    /// Records a position, evicting the oldest once full.
    pub fn push(&mut self, state: DiscreteState) {
        if self.positions.len() == self.capacity {
            self.positions.pop_front();
        }
        self.positions.push_back(state);
    }

    /// Highest number of times a single position occurs in the window.
    pub fn max_repeats(&self) -> usize {
        let mut counts: HashMap<DiscreteState, usize> = HashMap::new();
        for p in &self.positions {
            *counts.entry(*p).or_insert(0) += 1;
        }
        counts.values().copied().max().unwrap_or(0)
    }

    /// `true` when some position appears at least `repeats` times.
    pub fn in_loop(&self, repeats: usize) -> bool {
        self.positions.len() >= Self::MIN_SAMPLES && self.max_repeats() >= repeats
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn clear(&mut self) {
        self.positions.clear();
    }
}

/// Mutable state of the running episode. Reset by
/// [`MazeEnvironment::reset`](crate::MazeEnvironment::reset).
#[derive(Debug, Clone)]
pub struct EpisodeState {
    pub steps: u32,
    pub success_streak: u32,
    pub max_streak: u32,
    pub total_collisions: u32,
    pub total_reward: f64,
    pub milestone_awarded: bool,
    pub positions: PositionHistory,
    visits: HashMap<DiscreteState, u32>,
}

impl EpisodeState {
    pub fn new(loop_window: usize) -> Self {
        Self {
            steps: 0,
            success_streak: 0,
            max_streak: 0,
            total_collisions: 0,
            total_reward: 0.0,
            milestone_awarded: false,
            positions: PositionHistory::new(loop_window),
            visits: HashMap::new(),
        }
    }

    /// Counts a visit to `state` and returns the number of earlier visits.
    pub fn visit(&mut self, state: DiscreteState) -> u32 {
        let count = self.visits.entry(state).or_insert(0);
        let previous = *count;
        *count += 1;
        previous
    }

    /// Number of distinct states visited this episode.
    pub fn distinct_states(&self) -> usize {
        self.visits.len()
    }

    /// Applies the streak and collision counters for a finished move.
    pub fn record_result(&mut self, result: MoveResult) {
        if result.extends_streak() {
            self.success_streak += 1;
            self.max_streak = self.max_streak.max(self.success_streak);
        } else {
            self.success_streak = 0;
            if result == MoveResult::Collision {
                self.total_collisions += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(x: i32, y: i32) -> DiscreteState {
        DiscreteState::new(x, y)
    }

    #[test]
    fn test_loop_detected_on_three_repeats() {
        let mut history = PositionHistory::new(6);
        for p in [s(0, 0), s(1, 0), s(0, 0), s(1, 0), s(0, 0), s(2, 0)] {
            history.push(p);
        }
        assert_eq!(history.max_repeats(), 3);
        assert!(history.in_loop(3));
    }

    #[test]
    fn test_no_loop_with_distinct_positions() {
        let mut history = PositionHistory::new(6);
        for x in 0..6 {
            history.push(s(x, 0));
        }
        assert!(!history.in_loop(3));
    }

    #[test]
    fn test_short_history_never_loops() {
        let mut history = PositionHistory::new(6);
        for _ in 0..3 {
            history.push(s(0, 0));
        }
        assert!(!history.in_loop(3));
        history.push(s(0, 0));
        assert!(history.in_loop(3));
    }

    #[test]
    fn test_window_evicts_oldest() {
        let mut history = PositionHistory::new(6);
        for p in [s(0, 0), s(0, 0), s(0, 0)] {
            history.push(p);
        }
        for x in 1..=6 {
            history.push(s(x, 0));
        }
        assert_eq!(history.len(), 6);
        assert_eq!(history.max_repeats(), 1);
    }

    #[test]
    fn test_streak_and_collisions() {
        let mut state = EpisodeState::new(6);
        state.record_result(MoveResult::Success);
        state.record_result(MoveResult::CheckpointReached(2));
        assert_eq!(state.success_streak, 2);
        state.record_result(MoveResult::Collision);
        assert_eq!(state.success_streak, 0);
        assert_eq!(state.max_streak, 2);
        assert_eq!(state.total_collisions, 1);
        state.record_result(MoveResult::Timeout);
        assert_eq!(state.total_collisions, 1);
    }

    #[test]
    fn test_visit_counts() {
        let mut state = EpisodeState::new(6);
        assert_eq!(state.visit(s(1, 1)), 0);
        assert_eq!(state.visit(s(1, 1)), 1);
        assert_eq!(state.distinct_states(), 1);
    }
}
