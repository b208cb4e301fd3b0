//! Integration tests for physics-mode motion in the simulated maze
//!
//! Drives the closed-loop executor through real moves on the built-in layout
//! and checks outcomes, recovery and the signals seen by the environment.

use maze_agents::{
    topics, Config, Direction, Discretizer, EnvironmentConfig, KinematicDrive, MazeEnvironment,
    MazeLayout, MotionConfig, MotionExecutor, MoveResult, RewardConfig, SimulatedMaze, TickBus,
};

const CELL: f64 = 10.5;

fn executor() -> MotionExecutor<SimulatedMaze, KinematicDrive> {
    let sim = SimulatedMaze::new(MazeLayout::builtin().unwrap(), CELL, 1.0 / 60.0);
    let bounds = sim.bounds();
    MotionExecutor::new(
        sim,
        KinematicDrive::ideal(),
        MotionConfig::default().with_bounds(bounds),
    )
}

// ============================================================================
// Single Moves
// ============================================================================

#[test]
fn test_physics_move_reaches_neighbour_cell() {
    let mut exec = executor();
    exec.wait_for_tick().unwrap();

    let outcome = exec.move_direction(Direction::Right, 1).unwrap();
    assert_eq!(outcome.result, MoveResult::Success);
    assert!(outcome.iterations > 1);
    assert!((outcome.pose.x - CELL).abs() < 0.1);
    assert!(outcome.pose.y.abs() < 0.1);

    let discretizer = Discretizer::default();
    assert_eq!(discretizer.discretize(&outcome.pose).x, 1);
}

#[test]
fn test_physics_round_trip() {
    let mut exec = executor();
    exec.wait_for_tick().unwrap();

    assert_eq!(
        exec.move_direction(Direction::Right, 1).unwrap().result,
        MoveResult::Success
    );
    let back = exec.move_direction(Direction::Left, 1).unwrap();
    assert_eq!(back.result, MoveResult::Success);
    assert!(back.pose.distance_to_point(0.0, 0.0) < 0.1);
}

#[test]
fn test_physics_wall_collision_backs_up() {
    let mut exec = executor();
    exec.wait_for_tick().unwrap();

    let outcome = exec.move_direction(Direction::Left, 1).unwrap();
    assert_eq!(outcome.result, MoveResult::Collision);
    assert!(outcome.backup_iterations > 0);
    assert!(outcome.backup_iterations <= exec.config().max_backup_iterations);

    // Back in the start cell with the collision flag cleared.
    assert_eq!(Discretizer::default().discretize(&outcome.pose).x, 0);
    assert!(!exec.bus().read_flag(topics::COLLISION));
    assert_eq!(exec.bus().collisions(), 1);
}

#[test]
fn test_move_named_repeats() {
    let mut exec = executor();
    exec.wait_for_tick().unwrap();

    let outcome = exec.move_named("RIGHT", 2).unwrap();
    assert_eq!(outcome.result, MoveResult::Success);
    assert!((outcome.pose.x - 2.0 * CELL).abs() < 0.1);
    assert!(exec.move_named("NORTH", 1).is_err());
}

// ============================================================================
// Environment in Physics Mode
// ============================================================================

#[test]
fn test_physics_environment_reaches_first_checkpoint() {
    let mut env = MazeEnvironment::new(
        executor(),
        EnvironmentConfig::default(),
        RewardConfig::default(),
    );
    env.wait_for_tick().unwrap();
    env.reset().unwrap();

    // RIGHT, RIGHT, DOWN, DOWN leads onto checkpoint 1 of the built-in maze.
    for action in [3, 3, 1] {
        let step = env.step(action).unwrap();
        assert_eq!(step.info.result, MoveResult::Success);
    }
    let last = env.step(1).unwrap();
    assert_eq!(last.info.result, MoveResult::CheckpointReached(1));
    assert_eq!(last.reward, 50.0);
    assert!(!last.done);

    env.reset_checkpoints().unwrap();
    assert_eq!(
        env.executor().bus().read_int(topics::CHECKPOINT_REACHED),
        0
    );
}

// ============================================================================
// Lagged Drive
// ============================================================================

fn lagged_executor() -> MotionExecutor<SimulatedMaze, KinematicDrive> {
    let config = Config::physics();
    let sim = SimulatedMaze::new(MazeLayout::builtin().unwrap(), CELL, 1.0 / 60.0);
    let bounds = sim.bounds();
    MotionExecutor::new(
        sim,
        KinematicDrive::new(config.motion.drive),
        config.motion.with_bounds(bounds),
    )
}

#[test]
fn test_lagged_drive_move_succeeds() {
    let mut exec = lagged_executor();
    exec.wait_for_tick().unwrap();

    let outcome = exec.move_direction(Direction::Right, 1).unwrap();
    assert_eq!(outcome.result, MoveResult::Success);
    assert!(outcome.iterations < exec.config().max_iterations);
    assert_eq!(Discretizer::default().discretize(&outcome.pose).x, 1);
}

#[test]
fn test_lagged_drive_collision_backup_is_bounded() {
    let mut exec = lagged_executor();
    exec.wait_for_tick().unwrap();

    let outcome = exec.move_direction(Direction::Left, 1).unwrap();
    assert_eq!(outcome.result, MoveResult::Collision);
    assert!(outcome.backup_iterations > 0);
    assert!(outcome.backup_iterations <= exec.config().max_backup_iterations);

    let tolerance = exec.config().target_tolerance;
    assert!(outcome.pose.distance_to_point(0.0, 0.0) < 2.0 * tolerance);
    assert!(!exec.bus().read_flag(topics::COLLISION));
}
