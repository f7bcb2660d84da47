use std::path::PathBuf;
use thiserror::Error;

/// Failures of the local mail store.
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The database directory could not be created.
    #[error("Cannot prepare database directory '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Schema migration {version} failed: {reason}")]
    Migration { version: u32, reason: String },

    /// A cursor, address list or timestamp column holds something we did not write.
    #[error("Column '{column}' holds an unreadable value: {reason}")]
    InvalidValue { column: &'static str, reason: String },

    /// Another task panicked while holding the connection.
    #[error("Database connection lock poisoned")]
    LockPoisoned,
}
