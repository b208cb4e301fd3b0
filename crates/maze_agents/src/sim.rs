//! Simulated maze world.
//!
//! [`SimulatedMaze`] is a [`TickBus`] that plays the simulator's side of the
//! protocol: it produces ticks from a [`SyntheticBus`] clock and reacts to the
//! robot's published poses by raising `Collision`, `GoalReached` and
//! `checkpoint_reached` from an ASCII [`MazeLayout`].
//!
//! Layout characters:
//!
//! | char      | cell                  |
//! |-----------|-----------------------|
//! | `#`       | wall                  |
//! | `S`       | start (the origin)    |
//! | `G`       | goal                  |
//! | `1`..`9`  | checkpoint with an id |
//! | `.`/space | free                  |
//!
//! Rows are read top to bottom; the world y axis points up, so the row above
//! `S` is cell `y = 1`.

use crate::bus::{topics, SyntheticBus, TickBus};
use crate::config::ConfigError;
use crate::error::{Error, Result};
use crate::types::{Bounds, Pose, Scalar};
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// The maze shipped with the binary.
pub const DEFAULT_LAYOUT: &str = "\
###########
#S..#..3..#
###.#.###.#
#..1#.#.#.#
#.###.#.#.#
#...2...#G#
###########";

/// Settings for the simulated world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MazeConfig {
    /// Layout file; the built-in maze when `None`.
    pub layout_path: Option<PathBuf>,
    /// Seconds per simulated frame.
    pub tick_dt: f64,
}

impl Default for MazeConfig {
    fn default() -> Self {
        Self {
            layout_path: None,
            tick_dt: 1.0 / 60.0,
        }
    }
}

/// A single maze cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cell {
    Free,
    Wall,
    Start,
    Goal,
    Checkpoint(u8),
}

impl Cell {
    pub fn is_blocked(&self) -> bool {
        matches!(self, Cell::Wall)
    }
}

/// A parsed maze grid with a single start cell.
#[derive(Debug, Clone, PartialEq)]
pub struct MazeLayout {
    rows: Vec<Vec<Cell>>,
    start_row: usize,
    start_col: usize,
}

impl MazeLayout {
    /// Parses a layout from text.
    pub fn parse(text: &str) -> std::result::Result<Self, ConfigError> {
        let mut rows = Vec::new();
        let mut start = None;

        for (r, line) in text.lines().enumerate() {
            let line = line.trim_end();
            if line.is_empty() {
                continue;
            }
            let mut row = Vec::with_capacity(line.len());
            for (c, ch) in line.chars().enumerate() {
                let cell = match ch {
                    '#' => Cell::Wall,
                    '.' | ' ' => Cell::Free,
                    'G' => Cell::Goal,
                    'S' => {
                        if start.is_some() {
                            return Err(ConfigError::Layout(format!(
                                "second start cell at line {}",
                                r + 1
                            )));
                        }
                        start = Some((rows.len(), c));
                        Cell::Start
                    }
                    '1'..='9' => Cell::Checkpoint(ch as u8 - b'0'),
                    other => {
                        return Err(ConfigError::Layout(format!(
                            "unknown cell '{}' at line {}",
                            other,
                            r + 1
                        )))
                    }
                };
                row.push(cell);
            }
            rows.push(row);
        }

        let (start_row, start_col) =
            start.ok_or_else(|| ConfigError::Layout("no start cell 'S'".to_string()))?;
        if !rows.iter().flatten().any(|c| *c == Cell::Goal) {
            return Err(ConfigError::Layout("no goal cell 'G'".to_string()));
        }

        Ok(Self {
            rows,
            start_row,
            start_col,
        })
    }

    /// The maze shipped with the binary.
    pub fn builtin() -> Result<Self> {
        Ok(Self::parse(DEFAULT_LAYOUT)?)
    }

    /// Reads and parses a layout file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::parse(&text)?)
    }

    /// The cell at grid coordinates relative to the start; outside is wall.
    pub fn cell(&self, x: i32, y: i32) -> Cell {
        let row = self.start_row as i64 - y as i64;
        let col = self.start_col as i64 + x as i64;
        if row < 0 || col < 0 {
            return Cell::Wall;
        }
        self.rows
            .get(row as usize)
            .and_then(|r| r.get(col as usize))
            .copied()
            .unwrap_or(Cell::Wall)
    }

    pub fn width(&self) -> usize {
        self.rows.iter().map(|r| r.len()).max().unwrap_or(0)
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    /// The world-space rectangle covered by the grid.
    pub fn bounds(&self, cell_size: f64) -> Bounds {
        let half = cell_size / 2.0;
        let min_x = -(self.start_col as f64) * cell_size - half;
        let max_x = (self.width() as f64 - 1.0 - self.start_col as f64) * cell_size + half;
        let max_y = self.start_row as f64 * cell_size + half;
        let min_y = -((self.height() as f64 - 1.0 - self.start_row as f64) * cell_size) - half;
        Bounds::new(min_x, max_x, min_y, max_y)
    }
}

impl FromStr for MazeLayout {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(Self::parse(s)?)
    }
}

/// A deterministic maze simulator speaking the tick bus protocol.
#[derive(Debug, Clone)]
pub struct SimulatedMaze {
    bus: SyntheticBus,
    layout: MazeLayout,
    cell_size: f64,
    pose: Pose,
    collisions: u64,
}

impl SimulatedMaze {
    pub fn new(layout: MazeLayout, cell_size: f64, tick_dt: f64) -> Self {
        let mut bus = SyntheticBus::new(tick_dt);
        bus.set(topics::COLLISION, 0i64);
        bus.set(topics::GOAL_REACHED, 0i64);
        bus.set(topics::CHECKPOINT_REACHED, 0i64);
        Self {
            bus,
            layout,
            cell_size,
            pose: Pose::origin(),
            collisions: 0,
        }
    }

    /// Builds the world described by `config`.
    pub fn from_config(config: &MazeConfig, cell_size: f64) -> Result<Self> {
        let layout = match &config.layout_path {
            Some(path) => MazeLayout::from_file(path)?,
            None => MazeLayout::builtin()?,
        };
        Ok(Self::new(layout, cell_size, config.tick_dt))
    }

    pub fn layout(&self) -> &MazeLayout {
        &self.layout
    }

    /// The last pose the robot published.
    pub fn pose(&self) -> Pose {
        self.pose
    }

    /// Number of times the robot has entered a blocked cell.
    pub fn collisions(&self) -> u64 {
        self.collisions
    }

    /// The underlying clock and topic store.
    pub fn bus(&self) -> &SyntheticBus {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut SyntheticBus {
        &mut self.bus
    }

    /// World bounds of the layout.
    pub fn bounds(&self) -> Bounds {
        self.layout.bounds(self.cell_size)
    }

    fn cell_under(&self, pose: &Pose) -> Cell {
        let x = (pose.x / self.cell_size).round();
        let y = (pose.y / self.cell_size).round();
        if !x.is_finite() || !y.is_finite() {
            return Cell::Wall;
        }
        self.layout.cell(x as i32, y as i32)
    }

    // Runs once per pose triple, when the heading arrives.
    fn evaluate(&mut self) {
        let cell = self.cell_under(&self.pose);
        if cell.is_blocked() {
            if !self.bus.read_flag(topics::COLLISION) {
                self.collisions += 1;
                debug!("sim: collision at {}", self.pose);
            }
            self.bus.set(topics::COLLISION, 1i64);
        }
        let at_goal = cell == Cell::Goal;
        self.bus.set(topics::GOAL_REACHED, at_goal as i64);
        if let Cell::Checkpoint(id) = cell {
            if self.bus.read_int(topics::CHECKPOINT_REACHED) != id as i64 {
                debug!("sim: checkpoint {} crossed", id);
                self.bus.set(topics::CHECKPOINT_REACHED, id as i64);
            }
        }
    }
}

impl TickBus for SimulatedMaze {
    fn wait_next(&mut self, topic: &str) -> Result<Scalar> {
        self.bus.wait_next(topic)
    }

    fn read_last(&self, topic: &str) -> Option<Scalar> {
        self.bus.read_last(topic)
    }

    fn publish(&mut self, topic: &str, value: Scalar) -> Result<()> {
        self.bus.publish(topic, value)?;
        match topic {
            topics::X => self.pose.x = value.as_f64(),
            topics::Y => self.pose.y = value.as_f64(),
            topics::THETA => {
                self.pose.theta = value.as_f64();
                self.evaluate();
            }
            topics::RESET_CHECKPOINTS if value.is_set() => {
                self.bus.set(topics::CHECKPOINT_REACHED, 0i64);
            }
            _ => {}
        }
        Ok(())
    }
}
