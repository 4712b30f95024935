use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info};

use cubepull_core::{Checkpoint, CheckpointStore};

use crate::error::{StateError, StateResult};

/// Checkpoint kept as a single JSON document.
///
/// Saves go to a temporary file in the same directory which is then renamed
/// over the target, so a crash mid-save leaves the previous checkpoint intact.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Write the initial checkpoint. Refuses to replace an existing one unless `force`.
    pub fn bootstrap(&self, checkpoint: &Checkpoint, force: bool) -> StateResult<()> {
        if self.exists() && !force {
            return Err(StateError::AlreadyExists(self.path.display().to_string()));
        }

        info!(path = %self.path.display(), last_pull = %checkpoint.last_pull, "Bootstrapping checkpoint");
        self.save(checkpoint)
    }

    fn parent_dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}

impl CheckpointStore for JsonFileStore {
    type Error = StateError;

    fn load(&self) -> StateResult<Checkpoint> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StateError::NotFound(self.path.display().to_string()));
            }
            Err(e) => return Err(StateError::io(&self.path, e)),
        };

        serde_json::from_str(&content).map_err(|e| {
            StateError::Serialization(format!("{}: {}", self.path.display(), e))
        })
    }

    fn save(&self, checkpoint: &Checkpoint) -> StateResult<()> {
        let dir = self.parent_dir();
        fs::create_dir_all(&dir).map_err(|e| StateError::io(&dir, e))?;

        let serialized = serde_json::to_string_pretty(checkpoint)
            .map_err(|e| StateError::Serialization(e.to_string()))?;

        let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| StateError::io(&dir, e))?;
        tmp.write_all(serialized.as_bytes())
            .map_err(|e| StateError::io(tmp.path(), e))?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| StateError::io(tmp.path(), e))?;
        tmp.persist(&self.path)
            .map_err(|e| StateError::io(&self.path, e.error))?;

        debug!(
            path = %self.path.display(),
            last_pull = %checkpoint.last_pull,
            missing = checkpoint.missing_dates.len(),
            "Saved checkpoint"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_load_missing_file_fails() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("checkpoint.json"));

        assert!(matches!(store.load(), Err(StateError::NotFound(_))));
    }

    #[test]
    fn test_roundtrip_empty_missing_dates() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("checkpoint.json"));

        let checkpoint = Checkpoint::new(date(2024, 1, 10));
        store.save(&checkpoint).unwrap();

        assert_eq!(store.load().unwrap(), checkpoint);
    }

    #[test]
    fn test_roundtrip_with_missing_dates() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("checkpoint.json"));

        let mut checkpoint = Checkpoint::new(date(2024, 1, 11));
        checkpoint.record_missing(date(2024, 1, 12));
        checkpoint.record_missing(date(2023, 12, 1));
        store.save(&checkpoint).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.last_pull, date(2024, 1, 11));
        assert_eq!(loaded.missing_dates, checkpoint.missing_dates);
    }

    #[test]
    fn test_save_replaces_previous_and_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("checkpoint.json"));

        store.save(&Checkpoint::new(date(2024, 1, 10))).unwrap();
        store.save(&Checkpoint::new(date(2024, 1, 11))).unwrap();

        assert_eq!(store.load().unwrap().last_pull, date(2024, 1, 11));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_save_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("state/nested/checkpoint.json"));

        store.save(&Checkpoint::new(date(2024, 1, 10))).unwrap();
        assert!(store.exists());
    }

    #[test]
    fn test_corrupt_file_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("checkpoint.json");
        fs::write(&path, "{\"last_pull\": ").unwrap();

        let store = JsonFileStore::new(path);
        assert!(matches!(store.load(), Err(StateError::Serialization(_))));
    }

    #[test]
    fn test_bootstrap_refuses_to_overwrite() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("checkpoint.json"));

        store
            .bootstrap(&Checkpoint::new(date(2024, 1, 10)), false)
            .unwrap();
        assert!(matches!(
            store.bootstrap(&Checkpoint::new(date(2020, 1, 1)), false),
            Err(StateError::AlreadyExists(_))
        ));

        store
            .bootstrap(&Checkpoint::new(date(2020, 1, 1)), true)
            .unwrap();
        assert_eq!(store.load().unwrap().last_pull, date(2020, 1, 1));
    }
}
