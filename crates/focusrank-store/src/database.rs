//! The focusrank SQLite handle.
//!
//! Every constructor migrates the schema before handing the connection out.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use rusqlite::Connection;

use crate::error::{Result, StoreError};
use crate::migrations;

const DB_FILE: &str = "focusrank.db";

pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open `focusrank.db` in the platform data directory, e.g.
    /// `~/.local/share/focusrank/focusrank.db` on Linux.
    pub fn new() -> Result<Self> {
        let dirs =
            ProjectDirs::from("app", "focusrank", "focusrank").ok_or(StoreError::NoDataDir)?;
        Self::open_at(&dirs.data_dir().join(DB_FILE))
    }

    pub fn open_at(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        tracing::info!(path = %path.display(), "Opening usage database");

        let conn = Connection::open(path)?;
        // Readers keep working while an ingest batch writes.
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::prepare(conn)
    }

    /// Throwaway database for tests and dry runs.
    pub fn open_in_memory() -> Result<Self> {
        Self::prepare(Connection::open_in_memory()?)
    }

    fn prepare(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(Duration::from_secs(5))?;
        migrations::run_migrations(&conn)?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// File backing this database; `None` for in-memory ones.
    pub fn path(&self) -> Option<PathBuf> {
        self.conn.path().filter(|p| !p.is_empty()).map(PathBuf::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("test.db");

        let db = Database::open_at(&path).expect("should open");
        assert!(db.path().is_some());
        assert!(path.exists());

        // Reopening runs migrations again as a no-op.
        drop(db);
        Database::open_at(&path).expect("should reopen");
    }

    #[test]
    fn in_memory_is_migrated() {
        let db = Database::open_in_memory().unwrap();
        let version: u32 = db
            .conn()
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert_eq!(version, migrations::CURRENT_VERSION);
    }
}
