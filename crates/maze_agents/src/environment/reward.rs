//! Reward shaping.
//!
//! [`RewardConfig::compute`] is a pure function of the move result and the
//! episode counters *before* the streak is updated for that move. It returns
//! the individual terms so they can be logged and tested separately.

use crate::types::MoveResult;
use serde::{Deserialize, Serialize};

/// Reward weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    pub collision: f64,
    pub goal_reached: f64,
    pub success: f64,
    pub timeout: f64,
    /// Bonus for checkpoint 1.
    pub checkpoint_base: f64,
    /// Extra bonus per checkpoint id above 1.
    pub checkpoint_increment: f64,
    /// Added to a checkpoint bonus when the streak is at least `streak_threshold`.
    pub checkpoint_streak_bonus: f64,
    pub streak_threshold: u32,
    /// Goal bonus per move of the current streak.
    pub goal_streak_bonus: f64,
    pub goal_streak_cap: f64,
    pub loop_penalty: f64,
    pub loop_multiplier: f64,
    /// Paid once when the episode reaches the minimum step count.
    pub milestone_bonus: f64,
    /// Paid for every non-collision step past the minimum step count.
    pub longevity_bonus: f64,
    /// Paid when a move ends in a state not yet visited this episode.
    pub first_visit_bonus: f64,
    /// Charged when a state has been visited more than `revisit_threshold` times.
    pub revisit_penalty: f64,
    pub revisit_threshold: u32,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            collision: -13.0,
            goal_reached: 1000.0,
            success: 0.0,
            timeout: 0.0,
            checkpoint_base: 50.0,
            checkpoint_increment: 100.0,
            checkpoint_streak_bonus: 25.0,
            streak_threshold: 5,
            goal_streak_bonus: 20.0,
            goal_streak_cap: 200.0,
            loop_penalty: -13.0,
            loop_multiplier: 1.5,
            milestone_bonus: 0.0,
            longevity_bonus: 0.0,
            first_visit_bonus: 0.0,
            revisit_penalty: 0.0,
            revisit_threshold: 5,
        }
    }
}

/// Inputs of one reward computation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RewardContext {
    pub result: MoveResult,
    /// Consecutive successful moves before this one.
    pub streak: u32,
    /// Step count including this move.
    pub steps: u32,
    pub min_steps: u32,
    pub in_loop: bool,
    /// Earlier visits to the resulting state this episode.
    pub prior_visits: u32,
    pub milestone_awarded: bool,
}

/// The individual reward terms of one step.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RewardBreakdown {
    pub base: f64,
    pub checkpoint: f64,
    pub goal_bonus: f64,
    pub loop_penalty: f64,
    pub milestone: f64,
    pub longevity: f64,
    pub exploration: f64,
}

impl RewardBreakdown {
    /// Sum of all terms; a non-finite sum is reported as `0.0`.
    pub fn total(&self) -> f64 {
        let total = self.base
            + self.checkpoint
            + self.goal_bonus
            + self.loop_penalty
            + self.milestone
            + self.longevity
            + self.exploration;
        if total.is_finite() {
            total
        } else {
            0.0
        }
    }

    /// `true` if the milestone bonus was paid on this step.
    pub fn awarded_milestone(&self) -> bool {
        self.milestone != 0.0
    }
}

impl RewardConfig {
    pub fn base(&self, result: MoveResult) -> f64 {
        match result {
            MoveResult::Collision => self.collision,
            MoveResult::GoalReached => self.goal_reached,
            MoveResult::Timeout => self.timeout,
            MoveResult::Success | MoveResult::CheckpointReached(_) => self.success,
        }
    }

    /// Bonus for crossing checkpoint `id`; strictly increasing in `id`.
    pub fn checkpoint_bonus(&self, id: u8, streak: u32) -> f64 {
        let mut bonus =
            self.checkpoint_base + (id.max(1) as f64 - 1.0) * self.checkpoint_increment;
        if streak >= self.streak_threshold {
            bonus += self.checkpoint_streak_bonus;
        }
        bonus
    }

    /// Goal bonus proportional to the streak, capped.
    pub fn goal_bonus(&self, streak: u32) -> f64 {
        (streak as f64 * self.goal_streak_bonus).min(self.goal_streak_cap)
    }

    pub fn compute(&self, ctx: &RewardContext) -> RewardBreakdown {
        let mut terms = RewardBreakdown {
            base: self.base(ctx.result),
            ..Default::default()
        };

        match ctx.result {
            MoveResult::CheckpointReached(id) => {
                terms.checkpoint = self.checkpoint_bonus(id, ctx.streak);
            }
            MoveResult::GoalReached => terms.goal_bonus = self.goal_bonus(ctx.streak),
            _ => {}
        }

        if ctx.in_loop {
            terms.loop_penalty = self.loop_penalty * self.loop_multiplier;
        }

        if !ctx.milestone_awarded && ctx.steps >= ctx.min_steps && self.milestone_bonus != 0.0 {
            terms.milestone = self.milestone_bonus;
        }
        if ctx.steps > ctx.min_steps && ctx.result != MoveResult::Collision {
            terms.longevity = self.longevity_bonus;
        }

        if ctx.prior_visits == 0 {
            terms.exploration = self.first_visit_bonus;
        } else if ctx.prior_visits > self.revisit_threshold {
            terms.exploration = self.revisit_penalty;
        }

        terms
    }
}
