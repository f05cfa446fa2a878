//! SQLite storage for the link index, brand records and sitemap import jobs.
//!
//! The database lives at `~/.linkwise/links.db` (override with `LINKWISE_DB`).
//! Table-specific queries live in sibling modules as `impl LinkDb` blocks.

use std::path::PathBuf;

use rusqlite::Connection;

pub mod types;
pub use types::*;

mod brands;
mod jobs;
mod links;

/// Environment variable overriding the database path.
pub const DB_PATH_ENV: &str = "LINKWISE_DB";

pub struct LinkDb {
    conn: Connection,
}

impl LinkDb {
    /// Execute a closure within a SQLite transaction.
    /// Commits on Ok, rolls back on Err.
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T, DbError>
    where
        F: FnOnce(&Self) -> Result<T, DbError>,
    {
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        match f(self) {
            Ok(val) => {
                self.conn.execute_batch("COMMIT")?;
                Ok(val)
            }
            Err(e) => {
                let _ = self.conn.execute_batch("ROLLBACK");
                Err(e)
            }
        }
    }

    /// Open (or create) the database at the default path and apply the schema.
    pub fn open() -> Result<Self, DbError> {
        let path = Self::db_path()?;
        Self::open_at(path)
    }

    /// Open a database at an explicit path. Useful for testing.
    pub fn open_at(path: PathBuf) -> Result<Self, DbError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(DbError::CreateDir)?;
            }
        }

        let conn = Connection::open(&path)?;

        // WAL lets resolution reads proceed while ingestion writes
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;

        crate::migrations::run_migrations(&conn).map_err(DbError::Migration)?;

        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        log::debug!("Opened link database at {}", path.display());
        Ok(Self { conn })
    }

    /// `$LINKWISE_DB`, else `~/.linkwise/links.db`.
    fn db_path() -> Result<PathBuf, DbError> {
        if let Ok(explicit) = std::env::var(DB_PATH_ENV) {
            if !explicit.trim().is_empty() {
                return Ok(PathBuf::from(explicit));
            }
        }
        let home = dirs::home_dir().ok_or(DbError::HomeDirNotFound)?;
        Ok(home.join(".linkwise").join("links.db"))
    }
}

// =============================================================================
// Shared test utilities
// =============================================================================

#[cfg(test)]
pub mod test_utils {
    use super::LinkDb;
    use crate::types::Brand;

    /// Create a temporary database for testing.
    ///
    /// We leak the `TempDir` so the directory persists for the duration of the test.
    pub fn test_db() -> LinkDb {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("test.db");
        std::mem::forget(dir);
        LinkDb::open_at(path).expect("Failed to open test database")
    }

    pub fn seed_brand(db: &LinkDb, id: &str, domain: Option<&str>) -> Brand {
        let brand = Brand {
            id: id.to_string(),
            name: format!("Brand {}", id),
            domain: domain.map(str::to_string),
            last_ingested_at: None,
            preferences: Default::default(),
        };
        db.upsert_brand(&brand).expect("seed brand");
        brand
    }
}
