//! Error types for the Maze Agents crate.
//!
//! Expected control outcomes (collision, timeout, goal, checkpoint) are *not*
//! errors; they are reported through [`MoveResult`](crate::MoveResult). The
//! variants below cover caller mistakes, transport failures, configuration
//! problems and persistence failures.

use crate::config::ConfigError;
use crate::persistence::PersistenceError;

/// A specialized `Result` type for maze agent operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The primary error enum for all operations within the `maze_agents` crate.
#[derive(Debug)]
pub enum Error {
    /// A direction name or index outside `UP/DOWN/LEFT/RIGHT`.
    InvalidDirection(String),
    /// An action index outside `0..4`.
    InvalidAction(usize),
    /// A move was requested with a repeat count of zero.
    InvalidRepeat(u32),
    /// The tick bus failed to deliver or accept a value.
    Bus(String),
    /// An error related to configuration loading or validation.
    Config(ConfigError),
    /// An error while saving or loading a model.
    Persistence(PersistenceError),
    /// No persisted model exists at the given path.
    ModelNotFound(String),
    /// An error from the underlying I/O system.
    Io(std::io::Error),
    /// An unexpected internal error, which may indicate a bug.
    Internal(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidDirection(s) => write!(
                f,
                "Invalid direction: {} (use UP, DOWN, LEFT or RIGHT)",
                s
            ),
            Error::InvalidAction(a) => write!(f, "Invalid action index: {} (expected 0..4)", a),
            Error::InvalidRepeat(t) => write!(f, "Invalid repeat count: {}", t),
            Error::Bus(s) => write!(f, "Bus error: {}", s),
            Error::Config(e) => write!(f, "Configuration error: {}", e),
            Error::Persistence(e) => write!(f, "Persistence error: {}", e),
            Error::ModelNotFound(p) => write!(f, "No trained model found at {}", p),
            Error::Io(e) => write!(f, "IO error: {}", e),
            Error::Internal(s) => write!(f, "Internal error: {}", s),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Config(e) => Some(e),
            Error::Persistence(e) => Some(e),
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Internal(e.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Config(e)
    }
}

impl From<PersistenceError> for Error {
    fn from(e: PersistenceError) -> Self {
        Error::Persistence(e)
    }
}
