//! Persisted-state storage
//!
//! `FileStateStorage` keeps the snapshot in `state.json` next to a
//! `state.lock` file. Writers take an exclusive lock and replace the file
//! atomically via rename; readers take a shared lock. Two processes writing
//! at once simply race: the last rename wins.

use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use fs2::FileExt;
use tracing::debug;

use crate::domain::result::{Error, Result};
use crate::domain::PersistedState;
use crate::ports::StateStorage;

const STATE_FILE: &str = "state.json";
const LOCK_FILE: &str = "state.lock";

/// JSON file in the data directory
#[derive(Debug, Clone)]
pub struct FileStateStorage {
    dir: PathBuf,
}

impl FileStateStorage {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(STATE_FILE)
    }

    fn open_lock(&self) -> Result<File> {
        fs::create_dir_all(&self.dir)?;
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(self.dir.join(LOCK_FILE))
            .map_err(|e| Error::Storage(format!("Failed to open state lock: {}", e)))
    }
}

impl StateStorage for FileStateStorage {
    fn load(&self) -> Result<Option<PersistedState>> {
        let lock = self.open_lock()?;
        lock.lock_shared()
            .map_err(|e| Error::Storage(format!("Failed to lock state: {}", e)))?;

        let content = match fs::read_to_string(self.path()) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let _ = lock.unlock();

        let state = serde_json::from_str(&content)
            .map_err(|e| Error::Storage(format!("Corrupt state file: {}", e)))?;
        Ok(Some(state))
    }

    fn save(&self, state: &PersistedState) -> Result<()> {
        let content = serde_json::to_string_pretty(state)?;

        let lock = self.open_lock()?;
        lock.lock_exclusive()
            .map_err(|e| Error::Storage(format!("Failed to lock state: {}", e)))?;

        let tmp = self.dir.join(format!("{}.tmp", STATE_FILE));
        fs::write(&tmp, content)?;
        fs::rename(&tmp, self.path())?;
        let _ = lock.unlock();

        debug!(path = %self.path().display(), "persisted state saved");
        Ok(())
    }
}

/// Process-local storage, for tests
#[derive(Debug, Default)]
pub struct MemoryStateStorage {
    state: Mutex<Option<PersistedState>>,
    saves: Mutex<usize>,
}

impl MemoryStateStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with a snapshot already stored
    pub fn with_state(state: PersistedState) -> Self {
        Self {
            state: Mutex::new(Some(state)),
            saves: Mutex::new(0),
        }
    }

    pub fn stored(&self) -> Option<PersistedState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Number of successful `save` calls
    pub fn save_count(&self) -> usize {
        *self.saves.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl StateStorage for MemoryStateStorage {
    fn load(&self) -> Result<Option<PersistedState>> {
        Ok(self.stored())
    }

    fn save(&self, state: &PersistedState) -> Result<()> {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = Some(state.clone());
        *self.saves.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{User, PERSISTED_STATE_VERSION};
    use tempfile::TempDir;

    fn snapshot() -> PersistedState {
        PersistedState {
            version: PERSISTED_STATE_VERSION,
            user: Some(User::new("u1", "a@b.c")),
            recently_viewed: vec!["p1".into()],
            ..Default::default()
        }
    }

    #[test]
    fn test_missing_file_loads_none() {
        let dir = TempDir::new().unwrap();
        let storage = FileStateStorage::new(dir.path());
        assert!(storage.load().unwrap().is_none());
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let storage = FileStateStorage::new(dir.path());
        storage.save(&snapshot()).unwrap();

        assert_eq!(storage.load().unwrap(), Some(snapshot()));
        assert!(!dir.path().join("state.json.tmp").exists());
    }

    #[test]
    fn test_save_replaces_previous_snapshot() {
        let dir = TempDir::new().unwrap();
        let storage = FileStateStorage::new(dir.path());
        storage.save(&snapshot()).unwrap();
        let cleared = PersistedState {
            version: PERSISTED_STATE_VERSION,
            ..Default::default()
        };
        storage.save(&cleared).unwrap();
        assert_eq!(storage.load().unwrap(), Some(cleared));
    }

    #[test]
    fn test_corrupt_file_is_storage_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(STATE_FILE), "{not json").unwrap();
        let err = FileStateStorage::new(dir.path()).load().unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
    }

    #[test]
    fn test_creates_missing_directory() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a").join("b");
        FileStateStorage::new(&nested).save(&snapshot()).unwrap();
        assert!(nested.join(STATE_FILE).exists());
    }

    #[test]
    fn test_memory_storage_counts_saves() {
        let storage = MemoryStateStorage::new();
        storage.save(&snapshot()).unwrap();
        storage.save(&snapshot()).unwrap();
        assert_eq!(storage.save_count(), 2);
        assert_eq!(storage.stored(), Some(snapshot()));
    }
}
