use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Mutex;

use chrono::NaiveDate;
use rusqlite::{params, Connection};
use tracing::{debug, info};

use cubepull_core::{Checkpoint, CheckpointStore};

use crate::error::{StateError, StateResult};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS checkpoint (
        id INTEGER PRIMARY KEY CHECK (id = 1),
        last_pull TEXT NOT NULL,
        updated_at TEXT DEFAULT CURRENT_TIMESTAMP
    );
    CREATE TABLE IF NOT EXISTS missing_dates (
        date TEXT PRIMARY KEY
    );
";

/// SQLite-backed checkpoint store.
///
/// The checkpoint is a single row plus one row per missing date; saves replace
/// both inside one transaction.
pub struct SqliteCheckpointStore {
    conn: Mutex<Connection>,
    location: String,
}

impl SqliteCheckpointStore {
    /// Open or create a checkpoint database at the given path.
    pub fn open(path: impl AsRef<Path>) -> StateResult<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Opening checkpoint database");

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StateError::io(parent, e))?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Mutex::new(conn),
            location: path.display().to_string(),
        })
    }

    /// Create an in-memory checkpoint store (for testing).
    pub fn in_memory() -> StateResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Mutex::new(conn),
            location: ":memory:".to_string(),
        })
    }

    pub fn exists(&self) -> StateResult<bool> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM checkpoint", [], |row| row.get(0))?;
        Ok(count > 0)
    }

    /// Write the initial checkpoint. Refuses to replace an existing one unless `force`.
    pub fn bootstrap(&self, checkpoint: &Checkpoint, force: bool) -> StateResult<()> {
        if self.exists()? && !force {
            return Err(StateError::AlreadyExists(self.location.clone()));
        }

        info!(location = %self.location, last_pull = %checkpoint.last_pull, "Bootstrapping checkpoint");
        self.save(checkpoint)
    }
}

impl CheckpointStore for SqliteCheckpointStore {
    type Error = StateError;

    fn load(&self) -> StateResult<Checkpoint> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());

        let last_pull = match conn.query_row(
            "SELECT last_pull FROM checkpoint WHERE id = 1",
            [],
            |row| row.get::<_, String>(0),
        ) {
            Ok(value) => parse_date(&value)?,
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                return Err(StateError::NotFound(self.location.clone()));
            }
            Err(e) => return Err(e.into()),
        };

        let mut stmt = conn.prepare("SELECT date FROM missing_dates ORDER BY date")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut missing_dates = BTreeSet::new();
        for row in rows {
            missing_dates.insert(parse_date(&row?)?);
        }

        Ok(Checkpoint {
            last_pull,
            missing_dates,
        })
    }

    fn save(&self, checkpoint: &Checkpoint) -> StateResult<()> {
        let mut conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO checkpoint (id, last_pull, updated_at)
             VALUES (1, ?1, CURRENT_TIMESTAMP)
             ON CONFLICT(id) DO UPDATE SET
                last_pull = ?1,
                updated_at = CURRENT_TIMESTAMP",
            params![checkpoint.last_pull.to_string()],
        )?;

        tx.execute("DELETE FROM missing_dates", [])?;
        {
            let mut insert = tx.prepare("INSERT INTO missing_dates (date) VALUES (?1)")?;
            for date in &checkpoint.missing_dates {
                insert.execute(params![date.to_string()])?;
            }
        }

        tx.commit()?;

        debug!(
            location = %self.location,
            last_pull = %checkpoint.last_pull,
            missing = checkpoint.missing_dates.len(),
            "Saved checkpoint"
        );
        Ok(())
    }
}

fn parse_date(value: &str) -> StateResult<NaiveDate> {
    value
        .parse()
        .map_err(|e| StateError::Serialization(format!("invalid date '{}': {}", value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_load_without_checkpoint_fails() {
        let store = SqliteCheckpointStore::in_memory().unwrap();

        assert!(!store.exists().unwrap());
        assert!(matches!(store.load(), Err(StateError::NotFound(_))));
    }

    #[test]
    fn test_checkpoint_roundtrip() {
        let store = SqliteCheckpointStore::in_memory().unwrap();

        let mut checkpoint = Checkpoint::new(date(2024, 1, 11));
        checkpoint.record_missing(date(2024, 1, 12));
        checkpoint.record_missing(date(2023, 6, 30));
        store.save(&checkpoint).unwrap();

        assert_eq!(store.load().unwrap(), checkpoint);
    }

    #[test]
    fn test_save_replaces_missing_dates() {
        let store = SqliteCheckpointStore::in_memory().unwrap();

        let mut checkpoint = Checkpoint::new(date(2024, 1, 11));
        checkpoint.record_missing(date(2024, 1, 12));
        store.save(&checkpoint).unwrap();

        checkpoint.resolve_missing(date(2024, 1, 12));
        checkpoint.record_success(date(2024, 1, 13));
        store.save(&checkpoint).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.last_pull, date(2024, 1, 13));
        assert!(loaded.missing_dates.is_empty());
    }

    #[test]
    fn test_bootstrap_refuses_to_overwrite() {
        let store = SqliteCheckpointStore::in_memory().unwrap();

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

    #[test]
    fn test_checkpoint_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state/checkpoint.db");

        {
            let store = SqliteCheckpointStore::open(&path).unwrap();
            store.save(&Checkpoint::new(date(2024, 2, 29))).unwrap();
        }

        let store = SqliteCheckpointStore::open(&path).unwrap();
        assert_eq!(store.load().unwrap().last_pull, date(2024, 2, 29));
    }
}
