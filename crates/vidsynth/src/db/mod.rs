//! SQLite persistence for video jobs.
//!
//! A single connection sits behind a mutex; the job registry is the only
//! writer, so contention stays limited to status polls.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use rusqlite::Connection;

pub mod error;
pub mod job_repo;
pub mod migrations;

pub use error::DatabaseError;

/// Shared handle to the jobs database. Clones refer to the same connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    location: Option<PathBuf>,
}

impl Database {
    /// Opens the database file at `path`, creating parent directories and
    /// applying migrations that have not run yet.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|source| DatabaseError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open(path)?;
        // WAL keeps status reads from waiting on a pipeline checkpoint.
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000;")?;

        let db = Self::prepare(conn, Some(path.to_path_buf()))?;
        log::info!("Job database ready at {}", path.display());
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        Self::prepare(Connection::open_in_memory()?, None)
    }

    fn prepare(conn: Connection, location: Option<PathBuf>) -> Result<Self, DatabaseError> {
        migrations::run_all(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            location,
        })
    }

    /// File backing this database, `None` when in memory.
    pub fn location(&self) -> Option<&Path> {
        self.location.as_deref()
    }

    /// Runs `f` while holding the connection lock.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&Connection) -> Result<T, DatabaseError>,
    {
        let guard = self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)?;
        f(&guard)
    }
}

/// `~/.vidsynth/data/vidsynth.db`, or `None` without a home directory.
pub fn default_database_path() -> Option<PathBuf> {
    let home = dirs::home_dir()?;
    Some(home.join(".vidsynth").join("data").join("vidsynth.db"))
}
