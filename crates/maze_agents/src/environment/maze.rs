//! The maze RL environment.

use super::episode::EpisodeState;
use super::reward::{RewardBreakdown, RewardConfig, RewardContext};
use crate::bus::{topics, TickBus};
use crate::error::Result;
use crate::motion::{DriveController, MotionExecutor};
use crate::types::{DiscreteState, Direction, Discretizer, MoveResult, Pose, Scalar};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Episode limits and environment timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    /// Hard step limit once `min_steps` has passed.
    pub max_steps: u32,
    /// Steps before which an episode only ends on the escape conditions.
    pub min_steps: u32,
    /// Collisions that end an episode after `min_steps`; 1.5 times this before.
    pub collision_limit: u32,
    /// A loop ends the episode only after this many steps.
    pub loop_step_threshold: u32,
    /// Number of recent positions kept for loop detection.
    pub loop_window: usize,
    /// Occurrences of one position within the window that make a loop.
    pub loop_repeats: usize,
    /// Sleep after resetting the robot.
    pub reset_settle_ms: u64,
    /// How long `reset_checkpoints` holds its pulse high.
    pub checkpoint_pulse_ms: u64,
    /// Maps continuous poses to grid states.
    pub discretizer: Discretizer,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            max_steps: 200,
            min_steps: 20,
            collision_limit: 10,
            loop_step_threshold: 15,
            loop_window: 6,
            loop_repeats: 3,
            reset_settle_ms: 0,
            checkpoint_pulse_ms: 0,
            discretizer: Discretizer::default(),
        }
    }
}

impl EnvironmentConfig {
    /// Termination policy.
    ///
    /// The goal always ends the episode. Before `min_steps` only too many
    /// collisions or a late loop end it; afterwards the step limit, the
    /// collision limit or a loop past `loop_step_threshold` do.
    pub fn is_done(
        &self,
        result: MoveResult,
        steps: u32,
        collisions: u32,
        in_loop: bool,
    ) -> bool {
        if result == MoveResult::GoalReached {
            return true;
        }
        if steps < self.min_steps {
            let collision_escape = collisions as f64 > 1.5 * self.collision_limit as f64;
            let loop_escape = in_loop && steps as f64 >= 0.8 * self.min_steps as f64;
            return collision_escape || loop_escape;
        }
        steps >= self.max_steps
            || collisions >= self.collision_limit
            || (in_loop && steps > self.loop_step_threshold)
    }
}

/// Per-step diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct StepInfo {
    pub result: MoveResult,
    pub checkpoint: Option<u8>,
    pub steps: u32,
    pub success_streak: u32,
    pub total_collisions: u32,
    pub pose: Pose,
    pub in_loop: bool,
}

/// What [`MazeEnvironment::step`] returns.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub state: DiscreteState,
    pub reward: f64,
    pub done: bool,
    pub info: StepInfo,
    pub terms: RewardBreakdown,
}

/// Discrete-state, discrete-action view of the robot in the maze.
pub struct MazeEnvironment<B: TickBus, D: DriveController> {
    executor: MotionExecutor<B, D>,
    config: EnvironmentConfig,
    rewards: RewardConfig,
    episode: EpisodeState,
}

impl<B: TickBus, D: DriveController> MazeEnvironment<B, D> {
    /// Wraps `executor` with the given termination and reward settings.
    pub fn new(
        executor: MotionExecutor<B, D>,
        config: EnvironmentConfig,
        rewards: RewardConfig,
    ) -> Self {
        let episode = EpisodeState::new(config.loop_window);
        Self {
            executor,
            config,
            rewards,
            episode,
        }
    }

    /// Episode limits in effect.
    pub fn config(&self) -> &EnvironmentConfig {
        &self.config
    }

    /// Reward settings in effect.
    pub fn rewards(&self) -> &RewardConfig {
        &self.rewards
    }

    /// The underlying move executor.
    pub fn executor(&self) -> &MotionExecutor<B, D> {
        &self.executor
    }

    pub fn executor_mut(&mut self) -> &mut MotionExecutor<B, D> {
        &mut self.executor
    }

    /// The running episode's counters.
    pub fn episode(&self) -> &EpisodeState {
        &self.episode
    }

    /// Discretized current position.
    pub fn state(&self) -> DiscreteState {
        self.config.discretizer.discretize(&self.executor.pose())
    }

    /// Blocks until the simulator produces a tick.
    pub fn wait_for_tick(&mut self) -> Result<f64> {
        self.executor.wait_for_tick()
    }

    /// Starts a new episode with the robot at the origin.
    pub fn reset(&mut self) -> Result<DiscreteState> {
        self.episode = EpisodeState::new(self.config.loop_window);
        self.executor.reset()?;
        pause(self.config.reset_settle_ms);
        let state = self.state();
        debug!("environment reset at {}", state);
        Ok(state)
    }

    /// Pulses `reset_checkpoints` so the simulator forgets crossed checkpoints.
    pub fn reset_checkpoints(&mut self) -> Result<()> {
        let bus = self.executor.bus_mut();
        bus.publish(topics::RESET_CHECKPOINTS, Scalar::Int(1))?;
        pause(self.config.checkpoint_pulse_ms);
        bus.publish(topics::RESET_CHECKPOINTS, Scalar::Int(0))?;
        debug!("checkpoints reset");
        Ok(())
    }

    /// Executes action `0..4` (UP, DOWN, LEFT, RIGHT).
    pub fn step(&mut self, action: usize) -> Result<Step> {
        let direction = Direction::from_index(action)?;
        self.episode.steps += 1;

        let outcome = self.executor.move_direction(direction, 1)?;
        let result = outcome.result;
        let state = self.config.discretizer.discretize(&outcome.pose);

        self.episode.positions.push(state);
        let in_loop = self.episode.positions.in_loop(self.config.loop_repeats);
        let prior_visits = self.episode.visit(state);

        let terms = self.rewards.compute(&RewardContext {
            result,
            streak: self.episode.success_streak,
            steps: self.episode.steps,
            min_steps: self.config.min_steps,
            in_loop,
            prior_visits,
            milestone_awarded: self.episode.milestone_awarded,
        });
        if terms.awarded_milestone() {
            self.episode.milestone_awarded = true;
        }
        let reward = terms.total();

        self.episode.record_result(result);
        self.episode.total_reward += reward;

        if let Some(id) = result.checkpoint() {
            info!(
                "checkpoint {} reached at step {} (bonus {:.1})",
                id, self.episode.steps, terms.checkpoint
            );
        }
        if in_loop {
            debug!("loop detected at {} (penalty {:.1})", state, terms.loop_penalty);
        }

        let done = self.config.is_done(
            result,
            self.episode.steps,
            self.episode.total_collisions,
            in_loop,
        );

        Ok(Step {
            state,
            reward,
            done,
            info: StepInfo {
                result,
                checkpoint: result.checkpoint(),
                steps: self.episode.steps,
                success_streak: self.episode.success_streak,
                total_collisions: self.episode.total_collisions,
                pose: outcome.pose,
                in_loop,
            },
            terms,
        })
    }
}

fn pause(millis: u64) {
    if millis > 0 {
        std::thread::sleep(Duration::from_millis(millis));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::SyntheticBus;
    use crate::error::Error;
    use crate::motion::{KinematicDrive, MotionConfig};
    use crate::sim::{MazeLayout, SimulatedMaze};

    fn env_for(layout: &str) -> MazeEnvironment<SimulatedMaze, KinematicDrive> {
        let sim = SimulatedMaze::new(MazeLayout::parse(layout).unwrap(), 10.5, 1.0 / 60.0);
        let executor = MotionExecutor::new(sim, KinematicDrive::ideal(), MotionConfig::fast());
        MazeEnvironment::new(executor, EnvironmentConfig::default(), RewardConfig::default())
    }

    const RIGHT: usize = 3;
    const LEFT: usize = 2;

    #[test]
    fn test_corridor_episode() {
        let mut env = env_for("#######\n#S.1.G#\n#######");
        assert_eq!(env.reset().unwrap(), DiscreteState::new(0, 0));

        let step = env.step(RIGHT).unwrap();
        assert_eq!(step.info.result, MoveResult::Success);
        assert_eq!(step.state, DiscreteState::new(1, 0));
        assert_eq!(step.reward, 0.0);
        assert!(!step.done);

        let step = env.step(RIGHT).unwrap();
        assert_eq!(step.info.result, MoveResult::CheckpointReached(1));
        assert_eq!(step.info.checkpoint, Some(1));
        assert_eq!(step.reward, 50.0);
        assert!(!step.done);

        env.step(RIGHT).unwrap();
        let step = env.step(RIGHT).unwrap();
        assert_eq!(step.info.result, MoveResult::GoalReached);
        assert_eq!(step.reward, 1000.0 + 3.0 * 20.0);
        assert!(step.done);
        assert_eq!(env.episode().max_streak, 3);
    }

    #[test]
    fn test_collision_step() {
        let mut env = env_for("#######\n#S.1.G#\n#######");
        env.reset().unwrap();
        let step = env.step(LEFT).unwrap();
        assert_eq!(step.info.result, MoveResult::Collision);
        assert_eq!(step.state, DiscreteState::new(0, 0));
        assert_eq!(step.reward, -13.0);
        assert_eq!(step.info.total_collisions, 1);
        assert_eq!(step.info.success_streak, 0);
        assert!(!step.done);
    }

    #[test]
    fn test_repeated_collisions_trigger_loop_penalty() {
        let mut env = env_for("#######\n#S.1.G#\n#######");
        env.reset().unwrap();
        for _ in 0..3 {
            assert!(!env.step(LEFT).unwrap().info.in_loop);
        }
        let step = env.step(LEFT).unwrap();
        assert!(step.info.in_loop);
        assert_eq!(step.reward, -13.0 + -13.0 * 1.5);
    }

    #[test]
    fn test_reset_clears_episode() {
        let mut env = env_for("#######\n#S.1.G#\n#######");
        env.reset().unwrap();
        env.step(RIGHT).unwrap();
        env.step(LEFT).unwrap();
        assert_eq!(env.episode().steps, 2);
        env.reset().unwrap();
        assert_eq!(env.episode().steps, 0);
        assert_eq!(env.episode().total_collisions, 0);
        assert_eq!(env.state(), DiscreteState::new(0, 0));
    }

    #[test]
    fn test_invalid_action() {
        let mut env = env_for("S.G");
        env.reset().unwrap();
        assert!(matches!(env.step(4), Err(Error::InvalidAction(4))));
    }

    #[test]
    fn test_reset_checkpoints_pulses() {
        let sim = SyntheticBus::default();
        let executor = MotionExecutor::new(sim, KinematicDrive::ideal(), MotionConfig::fast());
        let mut env =
            MazeEnvironment::new(executor, EnvironmentConfig::default(), RewardConfig::default());
        env.reset_checkpoints().unwrap();
        let pulses: Vec<_> = env
            .executor()
            .bus()
            .published()
            .filter(|(t, _)| t == topics::RESET_CHECKPOINTS)
            .map(|(_, v)| *v)
            .collect();
        assert_eq!(pulses, vec![Scalar::Int(1), Scalar::Int(0)]);
    }

    #[test]
    fn test_goal_ends_episode_immediately() {
        let config = EnvironmentConfig::default();
        assert!(config.is_done(MoveResult::GoalReached, 1, 0, false));
    }

    #[test]
    fn test_checkpoint_alone_never_ends_episode() {
        let config = EnvironmentConfig::default();
        assert!(!config.is_done(MoveResult::CheckpointReached(2), 1, 0, false));
        assert!(!config.is_done(MoveResult::CheckpointReached(2), 50, 0, false));
    }

    #[test]
    fn test_escape_conditions_before_min_steps() {
        let config = EnvironmentConfig::default();
        assert!(!config.is_done(MoveResult::Collision, 5, 15, false));
        assert!(config.is_done(MoveResult::Collision, 5, 16, false));
        assert!(!config.is_done(MoveResult::Success, 15, 0, true));
        assert!(config.is_done(MoveResult::Success, 16, 0, true));
    }

    #[test]
    fn test_limits_after_min_steps() {
        let config = EnvironmentConfig::default();
        assert!(!config.is_done(MoveResult::Success, 20, 9, false));
        assert!(config.is_done(MoveResult::Collision, 20, 10, false));
        assert!(config.is_done(MoveResult::Success, 200, 0, false));
        assert!(config.is_done(MoveResult::Success, 21, 0, true));

        let lenient = EnvironmentConfig {
            min_steps: 0,
            loop_step_threshold: 30,
            ..Default::default()
        };
        assert!(!lenient.is_done(MoveResult::Success, 25, 0, true));
    }
}
