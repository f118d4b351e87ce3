//! Errors raised by the SQLite layer.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The directory holding the database file could not be created.
    #[error("cannot create database directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("schema migration v{version} failed: {reason}")]
    Migration { version: u32, reason: String },

    /// A `jobs` row whose columns do not form a valid record.
    #[error("job row {id} is corrupt: {reason}")]
    CorruptRow { id: String, reason: String },

    /// A thread panicked while holding the connection.
    #[error("database connection lock poisoned")]
    LockPoisoned,
}
