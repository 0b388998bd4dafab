//! SQLite-backed local store: the authoritative copy of the app snapshot.

use crate::snapshot::{sanitize_snapshot, Snapshot};
use directories::ProjectDirs;
use log::{debug, warn};
use rusqlite::{Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

const SNAPSHOT_KEY: &str = "snapshot";
const USER_ID_KEY: &str = "user_id";
const DB_PATH_ENV: &str = "FOCUS_GARDEN_DB";

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Failed to create database directory")]
    DirectoryCreation,
}

pub struct Database {
    conn: Connection,
}

impl Database {
    /// Opens the database at the default location, initializing tables if
    /// needed.
    pub fn new() -> Result<Self, DatabaseError> {
        Self::open(&Self::db_path())
    }

    /// Opens (or creates) the database at `path`.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|_| DatabaseError::DirectoryCreation)?;
        }

        let conn = Connection::open(path)?;
        Self::initialize_tables(&conn)?;
        debug!("opened local store at {}", path.display());

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing).
    #[cfg(test)]
    pub fn new_in_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize_tables(&conn)?;
        Ok(Self { conn })
    }

    fn initialize_tables(conn: &Connection) -> Result<(), DatabaseError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS app_state (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
        "#,
        )?;
        Ok(())
    }

    fn db_path() -> PathBuf {
        if let Some(path) = std::env::var_os(DB_PATH_ENV).filter(|p| !p.is_empty()) {
            return PathBuf::from(path);
        }
        ProjectDirs::from("com", "focusgarden", "FocusGarden")
            .map(|dirs| dirs.data_dir().join("focus-garden.db"))
            .unwrap_or_else(|| PathBuf::from("focus-garden.db"))
    }

    fn get(&self, key: &str) -> Result<Option<String>, DatabaseError> {
        Ok(self
            .conn
            .query_row("SELECT value FROM app_state WHERE key = ?", [key], |row| {
                row.get(0)
            })
            .optional()?)
    }

    fn put(&self, key: &str, value: &str) -> Result<(), DatabaseError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO app_state (key, value) VALUES (?, ?)",
            [key, value],
        )?;
        Ok(())
    }

    /// Loads the snapshot. Missing or unparseable data yields defaults, and
    /// each field is recovered on its own.
    pub fn load_snapshot(&self) -> Result<Snapshot, DatabaseError> {
        let Some(raw) = self.get(SNAPSHOT_KEY)? else {
            return Ok(Snapshot::default());
        };

        match serde_json::from_str::<serde_json::Value>(&raw) {
            Ok(value) => Ok(sanitize_snapshot(&value)),
            Err(e) => {
                warn!("stored snapshot is not valid JSON, starting fresh: {}", e);
                Ok(Snapshot::default())
            }
        }
    }

    /// Saves the snapshot, replacing the previous one.
    pub fn save_snapshot(&self, snapshot: &Snapshot) -> Result<(), DatabaseError> {
        let json = serde_json::to_string(snapshot)?;
        self.put(SNAPSHOT_KEY, &json)
    }

    /// Returns the anonymous remote identity, creating it on first use.
    pub fn load_or_create_user_id(&self) -> Result<String, DatabaseError> {
        if let Some(id) = self.get(USER_ID_KEY)?.filter(|id| !id.trim().is_empty()) {
            return Ok(id);
        }
        let id = Uuid::new_v4().to_string();
        self.put(USER_ID_KEY, &id)?;
        Ok(id)
    }

    #[cfg(test)]
    fn put_raw_snapshot(&self, raw: &str) -> Result<(), DatabaseError> {
        self.put(SNAPSHOT_KEY, raw)
    }
}
