//! SQLite-based artifact sink
//!
//! This module provides a sink that records every artifact as a row in a
//! SQLite database, with its producer, tags and payload stored as JSON.

use crate::item::Artifact;
use crate::output::traits::{Sink, SinkError, SinkResult};
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// SQL schema for the artifacts database
pub const SCHEMA_SQL: &str = r#"
-- One row per saved artifact
CREATE TABLE IF NOT EXISTS artifacts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    producer TEXT,
    tags TEXT NOT NULL,
    payload TEXT NOT NULL,
    saved_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_artifacts_producer ON artifacts(producer);
CREATE INDEX IF NOT EXISTS idx_artifacts_name ON artifacts(name);
"#;

/// SQLite-based artifact sink
///
/// The connection sits behind a mutex; the dispatcher only ever calls `save`
/// from this sink's worker, so the lock is uncontended.
pub struct SqliteSink {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl SqliteSink {
    /// Opens or creates the database at `path`
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteSink)` - Database ready with schema applied
    /// * `Err(SinkError)` - Failed to open the database
    pub fn open(path: &Path) -> SinkResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
        ",
        )?;
        conn.execute_batch(SCHEMA_SQL)?;

        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        })
    }

    /// Creates an in-memory sink (for testing)
    pub fn in_memory() -> SinkResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    fn connection(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Number of stored artifacts
    pub fn count(&self) -> SinkResult<u64> {
        let count: i64 = self
            .connection()
            .query_row("SELECT COUNT(*) FROM artifacts", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Stored payloads for `producer`, oldest first
    pub fn payloads_for(&self, producer: &str) -> SinkResult<Vec<serde_json::Value>> {
        let conn = self.connection();
        let mut stmt =
            conn.prepare("SELECT payload FROM artifacts WHERE producer = ?1 ORDER BY id")?;
        let rows = stmt.query_map(params![producer], |row| row.get::<_, String>(0))?;

        let mut payloads = Vec::new();
        for row in rows {
            payloads.push(serde_json::from_str(&row?)?);
        }
        Ok(payloads)
    }
}

impl Sink for SqliteSink {
    fn identity(&self) -> String {
        match &self.path {
            Some(path) => format!("sqlite:{}", path.display()),
            None => "sqlite::memory:".to_string(),
        }
    }

    fn save(&self, artifact: &Artifact) -> SinkResult<()> {
        let tags = serde_json::to_string(&artifact.tags)?;
        let payload = serde_json::to_string(&artifact.payload)?;
        let saved_at = chrono::Utc::now().to_rfc3339();

        let inserted = self.connection().execute(
            "INSERT INTO artifacts (name, producer, tags, payload, saved_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![artifact.name, artifact.producer, tags, payload, saved_at],
        )?;
        if inserted != 1 {
            return Err(SinkError::Write(format!(
                "expected one inserted row, got {}",
                inserted
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for SqliteSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteSink").field("path", &self.path).finish()
    }
}
