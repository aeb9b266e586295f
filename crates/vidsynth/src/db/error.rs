//! Failures raised by the SQLite layer.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The database directory could not be created.
    #[error("cannot create database directory {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("migration {version} failed: {reason}")]
    Migration { version: u32, reason: String },

    /// A stored JSON column could not be decoded.
    #[error("corrupt {column} column for job {job_id}: {reason}")]
    Decode {
        job_id: String,
        column: &'static str,
        reason: String,
    },

    #[error("database connection lock poisoned")]
    LockPoisoned,
}
