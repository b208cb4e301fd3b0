//! Discrete move execution on top of the continuous drive.

use super::control::{PolarConfig, PolarController};
use super::drive::{DriveConfig, DriveController};
use super::trajectory::{StraightLineMotion, TrajectoryConfig};
use crate::bus::{topics, TickBus};
use crate::error::{Error, Result};
use crate::types::{Bounds, Direction, MoveResult, Pose, Scalar};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How a move is carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Closed-loop control, one iteration per simulator tick.
    Physics,
    /// Probe the target for a collision, then snap to it.
    Fast,
}

/// Settings of the [`MotionExecutor`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    /// Physics or fast execution.
    pub mode: ExecutionMode,
    /// Length of a single grid move in world units.
    pub cell_size: f64,
    /// Control iterations allowed per grid cell of a move.
    pub max_iterations: usize,
    /// Control iterations allowed when backing away from a collision.
    pub max_backup_iterations: usize,
    /// Distance at which a target counts as reached.
    pub target_tolerance: f64,
    /// Duration of the zero-velocity stop tick, in seconds.
    pub stop_tick: f64,
    /// Sleep after every physics control iteration.
    pub control_sleep_ms: u64,
    /// Sleep after each fast-mode publish, giving the simulator time to react.
    pub settle_delay_ms: u64,
    /// Fraction of the way to the target at which fast mode probes.
    pub probe_fraction: f64,
    /// Targets outside this box are rejected as collisions in fast mode.
    pub bounds: Bounds,
    /// Reference profile for forward moves.
    pub trajectory: TrajectoryConfig,
    /// Slower reference profile used when backing away from a collision.
    pub backup_trajectory: TrajectoryConfig,
    /// Heading/velocity controller gains.
    pub polar: PolarConfig,
    /// Drive model parameters, used when the drive is built from config.
    pub drive: DriveConfig,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Physics,
            cell_size: 10.5,
            max_iterations: 900,
            max_backup_iterations: 900,
            target_tolerance: 0.05,
            stop_tick: 0.008,
            control_sleep_ms: 0,
            settle_delay_ms: 0,
            probe_fraction: 0.6,
            bounds: Bounds::default(),
            trajectory: TrajectoryConfig::default(),
            backup_trajectory: TrajectoryConfig::backup(),
            polar: PolarConfig::default(),
            drive: DriveConfig::default(),
        }
    }
}

impl MotionConfig {
    /// Snap-to-target moves.
    pub fn fast() -> Self {
        Self {
            mode: ExecutionMode::Fast,
            ..Default::default()
        }
    }

    /// Sets the execution mode.
    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the box outside which fast-mode targets are rejected.
    pub fn with_bounds(mut self, bounds: Bounds) -> Self {
        self.bounds = bounds;
        self
    }
}

/// Result of one move together with where it left the robot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveOutcome {
    /// How the move ended.
    pub result: MoveResult,
    /// Pose after the move, including any collision recovery.
    pub pose: Pose,
    /// Control iterations spent on the move itself.
    pub iterations: usize,
    /// Control iterations spent backing away from a collision.
    pub backup_iterations: usize,
}

/// Executes grid moves for the robot.
///
/// Owns the bus handle and the drive; these together are the robot context
/// every higher layer reaches through the executor.
pub struct MotionExecutor<B: TickBus, D: DriveController> {
    bus: B,
    drive: D,
    config: MotionConfig,
    controller: PolarController,
    last_checkpoint: u8,
}

impl<B: TickBus, D: DriveController> MotionExecutor<B, D> {
    /// Creates an executor at whatever pose `drive` currently holds.
    pub fn new(bus: B, drive: D, config: MotionConfig) -> Self {
        let controller = PolarController::new(config.polar);
        Self {
            bus,
            drive,
            config,
            controller,
            last_checkpoint: 0,
        }
    }

    /// Active settings.
    pub fn config(&self) -> &MotionConfig {
        &self.config
    }

    /// Current execution mode.
    pub fn mode(&self) -> ExecutionMode {
        self.config.mode
    }

    /// Switches between physics and fast mode for subsequent moves.
    pub fn set_mode(&mut self, mode: ExecutionMode) {
        self.config.mode = mode;
    }

    /// The bus shared with the simulator.
    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Mutable access to the bus.
    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    /// The drive the executor actuates.
    pub fn drive(&self) -> &D {
        &self.drive
    }

    /// Current pose of the robot.
    pub fn pose(&self) -> Pose {
        self.drive.pose()
    }

    /// The last checkpoint id reported by a move, `0` when none.
    pub fn last_checkpoint(&self) -> u8 {
        self.last_checkpoint
    }

    /// Blocks until the simulator produces a tick.
    pub fn wait_for_tick(&mut self) -> Result<f64> {
        self.next_tick()
    }

    /// Moves `times` cells in the named direction.
    pub fn move_named(&mut self, direction: &str, times: u32) -> Result<MoveOutcome> {
        self.move_direction(direction.parse()?, times)
    }

    /// Moves `times` cells in `direction`.
    ///
    /// Every control outcome is reported as `Ok`; only bus failures and an
    /// invalid repeat count are errors. The robot is stopped before returning.
    pub fn move_direction(&mut self, direction: Direction, times: u32) -> Result<MoveOutcome> {
        if times == 0 {
            return Err(Error::InvalidRepeat(times));
        }
        let start = self.drive.pose();
        let (ux, uy) = direction.unit_vector();
        let distance = self.config.cell_size * times as f64;
        let target = start.translated(ux * distance, uy * distance);
        debug!("move {} x{}: {} -> {}", direction, times, start, target);

        let outcome = match self.config.mode {
            ExecutionMode::Physics => self.move_physics(&start, &target, times)?,
            ExecutionMode::Fast => self.move_fast(&start, &target, times)?,
        };
        debug!(
            "move {} finished: {} at {} ({} iterations)",
            direction, outcome.result, outcome.pose, outcome.iterations
        );
        Ok(outcome)
    }

    /// Applies a single minimal tick of zero velocity and republishes the pose.
    pub fn stop_robot(&mut self) -> Result<()> {
        self.drive.evaluate(self.config.stop_tick, 0.0, 0.0);
        let pose = self.drive.pose();
        self.bus.publish_pose(&pose)
    }

    /// Returns the robot to the origin and forgets per-episode state.
    pub fn reset(&mut self) -> Result<()> {
        self.stop_robot()?;
        self.last_checkpoint = 0;
        self.drive.reset();
        self.bus.publish_pose(&Pose::origin())?;
        if self.bus.read_flag(topics::COLLISION) {
            self.clear_collision()?;
        }
        Ok(())
    }

    /// Consumes the executor, returning the bus and drive.
    pub fn into_parts(self) -> (B, D) {
        (self.bus, self.drive)
    }

    fn move_physics(&mut self, start: &Pose, target: &Pose, times: u32) -> Result<MoveOutcome> {
        let mut reference = StraightLineMotion::new(self.config.trajectory);
        reference.start_motion(start, target);
        let bound = self.config.max_iterations.saturating_mul(times as usize);

        let mut iterations = 0;
        let mut arrived = false;
        while iterations < bound {
            let dt = self.next_tick()?;
            iterations += 1;

            if self.bus.read_flag(topics::GOAL_REACHED) {
                self.stop_robot()?;
                return Ok(self.outcome(MoveResult::GoalReached, iterations, 0));
            }
            if self.bus.read_flag(topics::COLLISION) {
                debug!("collision at {} after {} iterations", self.drive.pose(), iterations);
                let backup = self.backup_from_collision(start)?;
                self.clear_collision()?;
                return Ok(self.outcome(MoveResult::Collision, iterations, backup));
            }

            let (x, y) = reference.evaluate(dt);
            self.control_step(dt, x, y)?;

            if self.drive.pose().distance_to(target) < self.config.target_tolerance {
                arrived = true;
                break;
            }
        }

        if !arrived {
            warn!(
                "move timed out after {} iterations at {} ({:.3} from target)",
                iterations,
                self.drive.pose(),
                self.drive.pose().distance_to(target)
            );
            self.stop_robot()?;
            return Ok(self.outcome(MoveResult::Timeout, iterations, 0));
        }
        self.finish_move(iterations)
    }

    fn move_fast(&mut self, start: &Pose, target: &Pose, times: u32) -> Result<MoveOutcome> {
        if !self.config.bounds.contains(target.x, target.y) {
            debug!("target {} outside maze bounds", target);
            return self.reject_fast(start);
        }

        // Every cell passed on the way must be free, as it would be in physics mode.
        let cells = times as f64;
        for k in 1..times {
            let waypoint = start.lerp(target, k as f64 / cells);
            self.bus.publish_pose(&waypoint)?;
            self.pause(self.config.settle_delay_ms);
            if self.bus.read_flag(topics::COLLISION) {
                return self.reject_fast(start);
            }
            if self.bus.read_flag(topics::GOAL_REACHED) {
                self.drive.set_pose(waypoint);
                return self.finish_move(0);
            }
        }

        let probe = start.lerp(target, (cells - 1.0 + self.config.probe_fraction) / cells);
        self.bus.publish_pose(&probe)?;
        self.pause(self.config.settle_delay_ms);
        if self.bus.read_flag(topics::COLLISION) {
            return self.reject_fast(start);
        }

        self.drive.set_pose(*target);
        self.bus.publish_pose(target)?;
        self.pause(self.config.settle_delay_ms);
        if self.bus.read_flag(topics::COLLISION) {
            return self.reject_fast(start);
        }
        self.finish_move(0)
    }

    /// Puts the robot back at `start` and reports a fast-mode collision.
    fn reject_fast(&mut self, start: &Pose) -> Result<MoveOutcome> {
        if self.bus.read_flag(topics::COLLISION) {
            self.clear_collision()?;
        }
        self.drive.set_pose(*start);
        self.bus.publish_pose(start)?;
        self.stop_robot()?;
        Ok(self.outcome(MoveResult::Collision, 0, 0))
    }

    /// Drives back toward `start` after a collision. Returns the iterations used.
    fn backup_from_collision(&mut self, start: &Pose) -> Result<usize> {
        let collision_pose = self.drive.pose();
        let mut reference = StraightLineMotion::new(self.config.backup_trajectory);
        reference.start_motion(&collision_pose, start);

        let mut iterations = 0;
        while iterations < self.config.max_backup_iterations {
            if self.drive.pose().distance_to(start) < self.config.target_tolerance {
                break;
            }
            let dt = self.next_tick()?;
            iterations += 1;
            let (x, y) = reference.evaluate(dt);
            self.control_step(dt, x, y)?;
        }

        let remaining = self.drive.pose().distance_to(start);
        if remaining >= self.config.target_tolerance {
            warn!(
                "backup stopped after {} iterations, {:.3} from start",
                iterations, remaining
            );
        }
        self.stop_robot()?;
        Ok(iterations)
    }

    fn finish_move(&mut self, iterations: usize) -> Result<MoveOutcome> {
        self.stop_robot()?;
        if self.bus.read_flag(topics::GOAL_REACHED) {
            return Ok(self.outcome(MoveResult::GoalReached, iterations, 0));
        }
        if let Some(id) = self.take_new_checkpoint() {
            return Ok(self.outcome(MoveResult::CheckpointReached(id), iterations, 0));
        }
        Ok(self.outcome(MoveResult::Success, iterations, 0))
    }

    // A checkpoint is new only if it differs from the last one reported.
    fn take_new_checkpoint(&mut self) -> Option<u8> {
        let id = u8::try_from(self.bus.read_int(topics::CHECKPOINT_REACHED)).ok()?;
        if id == 0 || id == self.last_checkpoint {
            return None;
        }
        self.last_checkpoint = id;
        Some(id)
    }

    fn control_step(&mut self, dt: f64, x: f64, y: f64) -> Result<()> {
        let (v, w) = self.controller.evaluate(&self.drive.pose(), x, y);
        self.drive.evaluate(dt, v, w);
        let pose = self.drive.pose();
        self.bus.publish_pose(&pose)?;
        self.pause(self.config.control_sleep_ms);
        Ok(())
    }

    fn next_tick(&mut self) -> Result<f64> {
        let dt = self.bus.wait_next(topics::TICK)?.as_f64();
        Ok(if dt.is_finite() && dt > 0.0 { dt } else { 0.0 })
    }

    fn clear_collision(&mut self) -> Result<()> {
        self.bus.publish(topics::COLLISION, Scalar::Int(0))
    }

    fn pause(&self, millis: u64) {
        if millis > 0 {
            std::thread::sleep(Duration::from_millis(millis));
        }
    }

    fn outcome(
        &self,
        result: MoveResult,
        iterations: usize,
        backup_iterations: usize,
    ) -> MoveOutcome {
        MoveOutcome {
            result,
            pose: self.drive.pose(),
            iterations,
            backup_iterations,
        }
    }
}
