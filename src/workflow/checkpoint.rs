//! Per-run checkpoints for resuming interrupted runs.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::router::NextAction;
use super::state::{RunId, RunState};

/// The last durably stored position of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub state: RunState,
    pub next: NextAction,
    pub saved_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(state: RunState, next: NextAction) -> Self {
        Self { state, next, saved_at: Utc::now() }
    }
}

/// Checkpoint persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("Checkpoint I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid checkpoint data: {0}")]
    Format(#[from] serde_json::Error),
}

/// Storage for checkpoints, keyed by run id.
pub trait CheckpointStore: Send + Sync {
    fn load(&self, run_id: &RunId) -> Result<Option<Checkpoint>, CheckpointError>;

    /// Replace the stored checkpoint for the run in one step.
    fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError>;

    /// Forget the run; removing an unknown run is not an error.
    fn remove(&self, run_id: &RunId) -> Result<(), CheckpointError>;
}

/// Process-local store, lost on exit.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    checkpoints: Mutex<HashMap<RunId, Checkpoint>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.checkpoints.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkpoints.lock().is_empty()
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn load(&self, run_id: &RunId) -> Result<Option<Checkpoint>, CheckpointError> {
        Ok(self.checkpoints.lock().get(run_id).cloned())
    }

    fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        self.checkpoints.lock().insert(checkpoint.state.run_id().clone(), checkpoint.clone());
        Ok(())
    }

    fn remove(&self, run_id: &RunId) -> Result<(), CheckpointError> {
        self.checkpoints.lock().remove(run_id);
        Ok(())
    }
}

/// One JSON file per run in a directory.
///
/// Writes go to a temporary file in the same directory which is then renamed
/// over the previous checkpoint, so readers never see a partial file.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding the checkpoint of `run_id`.
    pub fn path_for(&self, run_id: &RunId) -> PathBuf {
        let safe = RunId::from_locator(run_id.as_str());
        self.dir.join(format!("{safe}.json"))
    }

    fn io_error(path: &Path, source: std::io::Error) -> CheckpointError {
        CheckpointError::Io { path: path.to_path_buf(), source }
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn load(&self, run_id: &RunId) -> Result<Option<Checkpoint>, CheckpointError> {
        let path = self.path_for(run_id);
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Self::io_error(&path, e)),
        }
    }

    fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        let path = self.path_for(checkpoint.state.run_id());
        std::fs::create_dir_all(&self.dir).map_err(|e| Self::io_error(&self.dir, e))?;

        let json = serde_json::to_vec_pretty(checkpoint)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir).map_err(|e| Self::io_error(&self.dir, e))?;
        tmp.write_all(&json).map_err(|e| Self::io_error(tmp.path(), e))?;
        tmp.as_file().sync_all().map_err(|e| Self::io_error(tmp.path(), e))?;
        tmp.persist(&path).map_err(|e| Self::io_error(&path, e.error))?;

        tracing::debug!(run_id = %checkpoint.state.run_id(), path = %path.display(), "Saved checkpoint");
        Ok(())
    }

    fn remove(&self, run_id: &RunId) -> Result<(), CheckpointError> {
        let path = self.path_for(run_id);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Self::io_error(&path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::state::StepName;

    fn checkpoint(locator: &str, next: NextAction) -> Checkpoint {
        let mut state = RunState::new(locator, "/tmp/repo");
        state.record_decision(StepName::Analyze, "Analyzed repository with 0 sample files");
        state.iterations = 1;
        Checkpoint::new(state, next)
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryCheckpointStore::new();
        let saved = checkpoint("a", NextAction::RunStep(StepName::Draft));
        store.save(&saved).unwrap();

        assert_eq!(store.load(saved.state.run_id()).unwrap(), Some(saved.clone()));
        store.remove(saved.state.run_id()).unwrap();
        assert!(store.is_empty());
        store.remove(saved.state.run_id()).unwrap();
    }

    #[test]
    fn test_file_store_replaces_previous_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path().join("checkpoints"));
        let run_id = RunId::from_locator("https://github.com/acme/widget");

        assert_eq!(store.load(&run_id).unwrap(), None);

        let first = checkpoint("https://github.com/acme/widget", NextAction::RunStep(StepName::Draft));
        store.save(&first).unwrap();
        let second = checkpoint("https://github.com/acme/widget", NextAction::Terminate);
        store.save(&second).unwrap();

        let loaded = store.load(&run_id).unwrap().unwrap();
        assert_eq!(loaded.next, NextAction::Terminate);
        assert_eq!(loaded.state.decisions.len(), 1);

        // only the checkpoint itself, no leftover temp files
        let entries = std::fs::read_dir(store.dir()).unwrap().count();
        assert_eq!(entries, 1);

        store.remove(&run_id).unwrap();
        assert!(!store.path_for(&run_id).exists());
    }

    #[test]
    fn test_file_store_rejects_corrupt_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path());
        let run_id = RunId::new("broken");
        std::fs::write(store.path_for(&run_id), "{ not json").unwrap();

        assert!(matches!(store.load(&run_id), Err(CheckpointError::Format(_))));
    }

    #[test]
    fn test_path_for_sanitizes_run_id() {
        let store = FileCheckpointStore::new("/var/lib/checkpoints");
        let path = store.path_for(&RunId::new("../escape/me"));
        assert_eq!(path, PathBuf::from("/var/lib/checkpoints/___escape_me.json"));
    }
}
