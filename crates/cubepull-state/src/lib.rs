//! Durable checkpoint storage for cubepull.
//!
//! Two interchangeable backends are provided: a single JSON document written
//! atomically, and a small SQLite database.

mod error;
mod json;
mod lock;
mod sqlite;

use std::path::Path;

use cubepull_core::{Checkpoint, CheckpointStore};

pub use error::{StateError, StateResult};
pub use json::JsonFileStore;
pub use lock::RunLock;
pub use sqlite::SqliteCheckpointStore;

/// A checkpoint store chosen at runtime from configuration.
pub enum CheckpointBackend {
    Json(JsonFileStore),
    Sqlite(SqliteCheckpointStore),
}

impl CheckpointBackend {
    pub fn json(path: impl AsRef<Path>) -> Self {
        CheckpointBackend::Json(JsonFileStore::new(path.as_ref()))
    }

    pub fn sqlite(path: impl AsRef<Path>) -> StateResult<Self> {
        Ok(CheckpointBackend::Sqlite(SqliteCheckpointStore::open(path)?))
    }

    pub fn exists(&self) -> StateResult<bool> {
        match self {
            CheckpointBackend::Json(store) => Ok(store.exists()),
            CheckpointBackend::Sqlite(store) => store.exists(),
        }
    }

    pub fn bootstrap(&self, checkpoint: &Checkpoint, force: bool) -> StateResult<()> {
        match self {
            CheckpointBackend::Json(store) => store.bootstrap(checkpoint, force),
            CheckpointBackend::Sqlite(store) => store.bootstrap(checkpoint, force),
        }
    }
}

impl CheckpointStore for CheckpointBackend {
    type Error = StateError;

    fn load(&self) -> StateResult<Checkpoint> {
        match self {
            CheckpointBackend::Json(store) => store.load(),
            CheckpointBackend::Sqlite(store) => store.load(),
        }
    }

    fn save(&self, checkpoint: &Checkpoint) -> StateResult<()> {
        match self {
            CheckpointBackend::Json(store) => store.save(checkpoint),
            CheckpointBackend::Sqlite(store) => store.save(checkpoint),
        }
    }
}
