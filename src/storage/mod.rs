//! Persisted metadata.
//!
//! A single SQLite database (`<config-dir>/sesh.db`) holds:
//!
//! - project registrations and the time each project was last fetched
//! - the session history stack used by `sesh pop`
//!
//! Nothing here is authoritative for git or session state; the filesystem
//! and the session backend are re-read on every invocation. Several `sesh`
//! processes may run at once, so every multi-statement write runs inside a
//! `BEGIN IMMEDIATE` transaction and connections wait on a busy timeout
//! rather than failing on a locked database.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};
use serde::Serialize;
use tracing::debug;

use crate::{Error, Result};

/// Database file name inside the config directory.
pub const DB_FILE: &str = "sesh.db";

/// How long a writer waits for another process to release the database.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Current schema version, stored in `PRAGMA user_version`.
const SCHEMA_VERSION: i64 = 1;

/// A registered project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectRecord {
    pub name: String,
    pub remote_url: Option<String>,
    pub local_path: Option<PathBuf>,
    pub created_at: DateTime<Utc>,
    pub last_fetched_at: Option<DateTime<Utc>>,
}

/// One entry of the session history stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    pub session_name: String,
    pub project_name: String,
    pub branch: String,
    pub accessed_at: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn new(
        session_name: impl Into<String>,
        project_name: impl Into<String>,
        branch: impl Into<String>,
    ) -> Self {
        Self {
            session_name: session_name.into(),
            project_name: project_name.into(),
            branch: branch.into(),
            accessed_at: Utc::now(),
        }
    }
}

/// Handle to the metadata database.
pub struct Storage {
    path: Option<PathBuf>,
    conn: Connection,
}

impl Storage {
    /// Open (creating if needed) the database in `config_dir`.
    pub fn open_in(config_dir: &Path) -> Result<Self> {
        fs::create_dir_all(config_dir)?;
        Self::open(&config_dir.join(DB_FILE))
    }

    /// Open (creating if needed) the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "opening metadata database");
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })?;
        Self::init_schema(&conn)?;
        Ok(Self {
            path: Some(path.to_path_buf()),
            conn,
        })
    }

    /// Private database that disappears when dropped.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self { path: None, conn })
    }

    /// Location of the database file, `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        let version: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
        if version > SCHEMA_VERSION {
            return Err(Error::Config(format!(
                "metadata database schema version {} is newer than supported version {}",
                version, SCHEMA_VERSION
            )));
        }

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS projects (
                name TEXT PRIMARY KEY,
                remote_url TEXT,
                local_path TEXT,
                created_at TEXT NOT NULL,
                last_fetched_at TEXT
            );

            CREATE TABLE IF NOT EXISTS session_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_name TEXT NOT NULL,
                project_name TEXT NOT NULL,
                branch TEXT NOT NULL,
                accessed_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_history_project ON session_history(project_name);
            "#,
        )?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        Ok(())
    }

    // === Projects ===

    /// Insert or refresh a project registration.
    ///
    /// An existing row keeps its `created_at` and fetch time.
    pub fn register_project(
        &mut self,
        name: &str,
        remote_url: Option<&str>,
        local_path: Option<&Path>,
    ) -> Result<()> {
        let local_path = local_path.map(|p| p.to_string_lossy().into_owned());
        self.conn.execute(
            r#"
            INSERT INTO projects (name, remote_url, local_path, created_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(name) DO UPDATE SET
                remote_url = COALESCE(excluded.remote_url, projects.remote_url),
                local_path = COALESCE(excluded.local_path, projects.local_path)
            "#,
            params![name, remote_url, local_path, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn get_project(&self, name: &str) -> Result<Option<ProjectRecord>> {
        let record = self
            .conn
            .query_row(
                "SELECT name, remote_url, local_path, created_at, last_fetched_at
                 FROM projects WHERE name = ?1",
                [name],
                project_from_row,
            )
            .optional()?;
        Ok(record)
    }

    /// All registered projects, ordered by name.
    pub fn get_all_projects(&self) -> Result<Vec<ProjectRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT name, remote_url, local_path, created_at, last_fetched_at
             FROM projects ORDER BY name",
        )?;
        let projects = stmt
            .query_map([], project_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(projects)
    }

    /// Record a successful fetch now, registering the project if needed.
    pub fn update_project_fetch_time(&mut self, name: &str) -> Result<DateTime<Utc>> {
        let now = Utc::now();
        self.conn.execute(
            r#"
            INSERT INTO projects (name, created_at, last_fetched_at)
            VALUES (?1, ?2, ?2)
            ON CONFLICT(name) DO UPDATE SET last_fetched_at = excluded.last_fetched_at
            "#,
            params![name, now.to_rfc3339()],
        )?;
        Ok(now)
    }

    /// Remove a project and its history. Returns whether it was registered.
    pub fn delete_project(&mut self, name: &str) -> Result<bool> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute(
            "DELETE FROM session_history WHERE project_name = ?1",
            [name],
        )?;
        let removed = tx.execute("DELETE FROM projects WHERE name = ?1", [name])?;
        tx.commit()?;
        Ok(removed > 0)
    }

    // === Session history ===

    /// Push an entry unless the top of the stack is the same session.
    ///
    /// Returns `false` when the push was suppressed.
    pub fn push_history(&mut self, entry: &HistoryEntry) -> Result<bool> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let top: Option<String> = tx
            .query_row(
                "SELECT session_name FROM session_history ORDER BY id DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        if top.as_deref() == Some(entry.session_name.as_str()) {
            return Ok(false);
        }
        tx.execute(
            "INSERT INTO session_history (session_name, project_name, branch, accessed_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                entry.session_name,
                entry.project_name,
                entry.branch,
                entry.accessed_at.to_rfc3339()
            ],
        )?;
        tx.commit()?;
        Ok(true)
    }

    /// Remove and return the top entry.
    pub fn pop_history(&mut self) -> Result<Option<HistoryEntry>> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let top = tx
            .query_row(
                "SELECT id, session_name, project_name, branch, accessed_at
                 FROM session_history ORDER BY id DESC LIMIT 1",
                [],
                |row| Ok((row.get::<_, i64>(0)?, history_from_row(row, 1)?)),
            )
            .optional()?;
        let Some((id, entry)) = top else {
            return Ok(None);
        };
        tx.execute("DELETE FROM session_history WHERE id = ?1", [id])?;
        tx.commit()?;
        Ok(Some(entry))
    }

    /// The session to go back to from `current`: the newest entry for any
    /// other session, or the top entry when there is no current session.
    ///
    /// The stack is not modified. Switching to the returned session pushes
    /// it again, which is what lets two sessions be toggled.
    pub fn previous_session(&self, current: Option<&str>) -> Result<Option<HistoryEntry>> {
        let entry = self
            .conn
            .query_row(
                "SELECT session_name, project_name, branch, accessed_at
                 FROM session_history
                 WHERE ?1 IS NULL OR session_name <> ?1
                 ORDER BY id DESC LIMIT 1",
                [current],
                |row| history_from_row(row, 0),
            )
            .optional()?;
        Ok(entry)
    }

    /// When `session_name` was last switched to, if it is in the history.
    pub fn last_accessed(&self, session_name: &str) -> Result<Option<DateTime<Utc>>> {
        let value: Option<String> = self
            .conn
            .query_row(
                "SELECT accessed_at FROM session_history
                 WHERE session_name = ?1 ORDER BY id DESC LIMIT 1",
                [session_name],
                |row| row.get(0),
            )
            .optional()?;
        value
            .map(|v| parse_time(0, &v).map_err(Error::from))
            .transpose()
    }

    /// Most recent entries first.
    pub fn list_history(&self, limit: usize) -> Result<Vec<HistoryEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT session_name, project_name, branch, accessed_at
             FROM session_history ORDER BY id DESC LIMIT ?1",
        )?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let entries = stmt
            .query_map([limit], |row| history_from_row(row, 0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }
}

fn parse_time(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn project_from_row(row: &Row<'_>) -> rusqlite::Result<ProjectRecord> {
    let created_at: String = row.get(3)?;
    let last_fetched_at: Option<String> = row.get(4)?;
    Ok(ProjectRecord {
        name: row.get(0)?,
        remote_url: row.get(1)?,
        local_path: row.get::<_, Option<String>>(2)?.map(PathBuf::from),
        created_at: parse_time(3, &created_at)?,
        last_fetched_at: last_fetched_at
            .as_deref()
            .map(|t| parse_time(4, t))
            .transpose()?,
    })
}

/// Read a history entry from columns starting at `offset`.
fn history_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<HistoryEntry> {
    let accessed_at: String = row.get(offset + 3)?;
    Ok(HistoryEntry {
        session_name: row.get(offset)?,
        project_name: row.get(offset + 1)?,
        branch: row.get(offset + 2)?,
        accessed_at: parse_time(offset + 3, &accessed_at)?,
    })
}
