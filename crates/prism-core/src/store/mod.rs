//! Durable storage for variant records and the action queue.
//!
//! A single SQLite database holds both tables. Concurrency safety
//! never relies on in-memory locks: independent worker and request
//! processes open their own connections, and every claim is a single
//! conditional statement whose affected-row count is the
//! linearization point.

mod queue;
mod records;

pub use queue::{ActionQueue, Drain};
pub use records::{RecordStore, VariantRecord};

use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::StoreError;

/// Shared handle to the SQLite database.
pub struct Database {
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl Database {
    /// Open (or create) the database at `path` and initialize the
    /// schema.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        // WAL lets concurrent consumers read while one writes; the
        // busy timeout covers short write contention instead of
        // surfacing SQLITE_BUSY to callers.
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;

        let db = Database {
            conn: Mutex::new(conn),
            path: path.to_path_buf(),
        };
        db.init_schema()?;
        tracing::debug!("Database ready at {}", db.path.display());
        Ok(db)
    }

    /// Open an additional independent connection to the same file.
    ///
    /// Used by concurrent consumers; each gets its own connection so
    /// claims race through SQLite, not through a process-local lock.
    pub fn reopen(&self) -> Result<Self, StoreError> {
        Self::open(&self.path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        self.with(|conn| {
            conn.execute(
                "CREATE TABLE IF NOT EXISTS variant_records (
                    id                  BLOB PRIMARY KEY,
                    created_at          TEXT NOT NULL,
                    started_generating  TEXT,
                    storage             TEXT NOT NULL,
                    name                TEXT NOT NULL,
                    args                TEXT NOT NULL,
                    image               TEXT,
                    width               INTEGER,
                    height              INTEGER
                )",
                [],
            )?;
            conn.execute(
                "CREATE INDEX IF NOT EXISTS idx_variant_records_source
                 ON variant_records(storage, name)",
                [],
            )?;
            conn.execute(
                "CREATE TABLE IF NOT EXISTS action_queue (
                    id          INTEGER PRIMARY KEY AUTOINCREMENT,
                    created_at  TEXT NOT NULL,
                    payload     TEXT NOT NULL
                )",
                [],
            )?;
            conn.execute(
                "CREATE INDEX IF NOT EXISTS idx_action_queue_created_at
                 ON action_queue(created_at)",
                [],
            )?;
            Ok(())
        })
    }

    /// Run a closure against the connection.
    pub(crate) fn with<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T, StoreError> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        f(&conn).map_err(StoreError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/prism.db");
        let db = Database::open(&path).unwrap();
        assert!(path.exists());
        assert_eq!(db.path(), path);
    }

    #[test]
    fn test_schema_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prism.db");
        Database::open(&path).unwrap();
        // A second open must not fail on existing tables.
        Database::open(&path).unwrap();
    }

    #[test]
    fn test_reopen_shares_data() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("prism.db")).unwrap();
        db.with(|conn| {
            conn.execute(
                "INSERT INTO action_queue (created_at, payload) VALUES ('now', '{}')",
                [],
            )
        })
        .unwrap();

        let other = db.reopen().unwrap();
        let count: i64 = other
            .with(|conn| {
                conn.query_row("SELECT COUNT(*) FROM action_queue", [], |row| row.get(0))
            })
            .unwrap();
        assert_eq!(count, 1);
    }
}
