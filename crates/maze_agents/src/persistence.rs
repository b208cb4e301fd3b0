//! Model persistence.
//!
//! A trained agent is stored as a single JSON document ([`PersistedModel`])
//! holding the Q-table, the per-action visit counters, the episode history
//! and the exploration strategy's state. Files are written to a temporary
//! sibling first and renamed into place, so an interrupted save never leaves
//! a truncated model behind.
//!
//! [`SnapshotManager`] keeps a bounded series of episode-numbered copies next
//! to the canonical model file.
//!
//! ## Example
//!
//! ```rust,ignore
//! use maze_agents::{AgentConfig, CuriosityStrategy, QLearningAgent};
//!
//! let strategy = Box::new(CuriosityStrategy::default());
//! let mut agent = QLearningAgent::new(AgentConfig::default(), strategy);
//! // ... train ...
//! agent.save_model("models/q_agent.json")?;
//!
//! let mut resumed = QLearningAgent::with_curiosity(AgentConfig::default());
//! assert!(resumed.load_model("models/q_agent.json")?);
//! ```

use crate::learning::{EpisodeHistory, StrategyState};
use crate::types::{DiscreteState, Timestamp, ACTION_COUNT};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

/// Current on-disk model format.
pub const MODEL_FORMAT_VERSION: u32 = 1;

/// Defines errors that can occur while saving or loading a model.
#[derive(Debug)]
pub enum PersistenceError {
    /// An error occurred during file I/O.
    Io(std::io::Error),
    /// The model could not be serialized.
    Serialization(String),
    /// The file content could not be deserialized.
    Deserialization(String),
    /// The file is not a model this version understands.
    InvalidFormat(String),
}

impl std::fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PersistenceError::Io(e) => write!(f, "IO error: {}", e),
            PersistenceError::Serialization(e) => write!(f, "Serialization error: {}", e),
            PersistenceError::Deserialization(e) => write!(f, "Deserialization error: {}", e),
            PersistenceError::InvalidFormat(e) => write!(f, "Invalid format: {}", e),
        }
    }
}

impl std::error::Error for PersistenceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PersistenceError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PersistenceError {
    fn from(e: std::io::Error) -> Self {
        PersistenceError::Io(e)
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(e: serde_json::Error) -> Self {
        PersistenceError::Serialization(e.to_string())
    }
}

/// Action values of one state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QRecord {
    /// Grid cell the values belong to.
    pub state: DiscreteState,
    /// One value per action, in Up, Down, Left, Right order.
    pub values: [f64; ACTION_COUNT],
}

/// Action visit counters of one state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountRecord {
    /// Grid cell the counters belong to.
    pub state: DiscreteState,
    /// Times each action was taken from `state` during training.
    pub counts: [u64; ACTION_COUNT],
}

/// Everything needed to resume training.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedModel {
    /// Format version; newer files are rejected.
    pub version: u32,
    pub saved_at: Timestamp,
    pub learning_rate: f64,
    pub q_table: Vec<QRecord>,
    #[serde(default)]
    pub action_counts: Vec<CountRecord>,
    #[serde(default)]
    pub history: EpisodeHistory,
    #[serde(default)]
    pub strategy: Option<StrategyState>,
}

impl PersistedModel {
    /// Writes the model atomically, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>, pretty: bool) -> Result<(), PersistenceError> {
        write_json_atomic(path.as_ref(), self, pretty)
    }

    /// Reads a model, rejecting newer format versions.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let model: PersistedModel = read_json(path.as_ref())?;
        if model.version > MODEL_FORMAT_VERSION {
            return Err(PersistenceError::InvalidFormat(format!(
                "model version {} is newer than supported version {}",
                model.version, MODEL_FORMAT_VERSION
            )));
        }
        Ok(model)
    }
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

/// Serializes `value` to `path` through a temporary file and a rename.
pub fn write_json_atomic<T: Serialize>(
    path: &Path,
    value: &T,
    pretty: bool,
) -> Result<(), PersistenceError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let bytes = if pretty {
        serde_json::to_vec_pretty(value)?
    } else {
        serde_json::to_vec(value)?
    };
    let tmp = temp_sibling(path);
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Reads and deserializes a JSON file.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, PersistenceError> {
    let bytes = fs::read(path)?;
    serde_json::from_slice(&bytes).map_err(|e| PersistenceError::Deserialization(e.to_string()))
}

/// Keeps a bounded series of episode-numbered model snapshots.
pub struct SnapshotManager {
    /// The directory where snapshot files are stored.
    dir: PathBuf,
    /// Older snapshots beyond this count are deleted.
    max_snapshots: usize,
}

impl SnapshotManager {
    const PREFIX: &'static str = "snapshot_";

    /// Manages snapshots in `dir`, keeping at most `max_snapshots` (at least one).
    pub fn new(dir: impl Into<PathBuf>, max_snapshots: usize) -> Self {
        Self {
            dir: dir.into(),
            max_snapshots: max_snapshots.max(1),
        }
    }

    /// Path of the snapshot for `episode`.
    pub fn path_for(&self, episode: u64) -> PathBuf {
        self.dir.join(format!("{}{:08}.json", Self::PREFIX, episode))
    }

    /// Saves a snapshot for `episode` and prunes old ones.
    pub fn save(
        &self,
        model: &PersistedModel,
        episode: u64,
    ) -> Result<PathBuf, PersistenceError> {
        let path = self.path_for(episode);
        model.save(&path, false)?;
        self.cleanup()?;
        log::info!("Saved snapshot at episode {}", episode);
        Ok(path)
    }

    /// The most recent snapshot, if any.
    pub fn latest(&self) -> Result<Option<PathBuf>, PersistenceError> {
        Ok(self.list()?.pop())
    }

    /// Snapshot files, oldest first.
    pub fn list(&self) -> Result<Vec<PathBuf>, PersistenceError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut snapshots = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let is_json = path.extension().and_then(|s| s.to_str()) == Some("json");
            let is_snapshot = path
                .file_name()
                .and_then(|s| s.to_str())
                .map(|name| name.starts_with(Self::PREFIX))
                .unwrap_or(false);
            if path.is_file() && is_json && is_snapshot {
                snapshots.push(path);
            }
        }

        // Zero-padded episode numbers sort lexically.
        snapshots.sort();
        Ok(snapshots)
    }

    fn cleanup(&self) -> Result<(), PersistenceError> {
        let snapshots = self.list()?;
        let excess = snapshots.len().saturating_sub(self.max_snapshots);
        for old in snapshots.iter().take(excess) {
            fs::remove_file(old)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn sample_model() -> PersistedModel {
        PersistedModel {
            version: MODEL_FORMAT_VERSION,
            saved_at: Timestamp::now(),
            learning_rate: 0.05,
            q_table: vec![QRecord {
                state: DiscreteState::new(1, 0),
                values: [0.5, 1.5, -2.0, 3.25],
            }],
            action_counts: vec![CountRecord {
                state: DiscreteState::new(1, 0),
                counts: [1, 0, 4, 2],
            }],
            history: EpisodeHistory {
                rewards: vec![10.0, -3.0],
                steps: vec![12, 30],
                successes: vec![true, false],
                checkpoint_discoveries: BTreeMap::from([(1, 2)]),
            },
            strategy: Some(StrategyState {
                name: "curiosity".into(),
                epsilon: 0.3,
                novelty_bonus: 3.0,
                state_visits: vec![(DiscreteState::new(1, 0), 7)],
            }),
        }
    }

    #[test]
    fn test_model_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("model.json");
        let model = sample_model();
        model.save(&path, true).unwrap();
        assert!(path.exists());
        assert!(!temp_sibling(&path).exists());
        assert_eq!(PersistedModel::load(&path).unwrap(), model);
    }

    #[test]
    fn test_missing_optional_sections_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("old.json");
        fs::write(
            &path,
            r#"{"version":1,"saved_at":0,"learning_rate":0.1,
               "q_table":[{"state":{"x":0,"y":0},"values":[1.0,2.0,3.0,4.0]}]}"#,
        )
        .unwrap();
        let model = PersistedModel::load(&path).unwrap();
        assert!(model.action_counts.is_empty());
        assert!(model.strategy.is_none());
        assert!(model.history.rewards.is_empty());
    }

    #[test]
    fn test_newer_version_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("future.json");
        let mut model = sample_model();
        model.version = MODEL_FORMAT_VERSION + 1;
        model.save(&path, false).unwrap();
        assert!(matches!(
            PersistedModel::load(&path),
            Err(PersistenceError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_corrupt_file_is_deserialization_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, b"{not json").unwrap();
        assert!(matches!(
            PersistedModel::load(&path),
            Err(PersistenceError::Deserialization(_))
        ));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            PersistedModel::load(dir.path().join("absent.json")),
            Err(PersistenceError::Io(_))
        ));
    }

    #[test]
    fn test_snapshot_retention() {
        let dir = tempfile::tempdir().unwrap();
        let manager = SnapshotManager::new(dir.path().join("snapshots"), 2);
        let model = sample_model();
        for episode in [5, 10, 15] {
            manager.save(&model, episode).unwrap();
        }
        let files = manager.list().unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0], manager.path_for(10));
        assert_eq!(manager.latest().unwrap(), Some(manager.path_for(15)));
    }

    #[test]
    fn test_snapshot_list_on_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let manager = SnapshotManager::new(dir.path().join("none"), 3);
        assert!(manager.list().unwrap().is_empty());
        assert_eq!(manager.latest().unwrap(), None);
    }

    #[test]
    fn test_error_display() {
        let e = PersistenceError::InvalidFormat("bad".into());
        assert_eq!(e.to_string(), "Invalid format: bad");
    }
}
