use std::path::PathBuf;
use thiserror::Error;

use crate::config::SettingsError;
use crate::connection::{ConnectionError, SessionError};
use crate::db::DatabaseError;
use crate::mail::ParseError;
use crate::store::StoreError;

/// Startup failures of the `mailsync` binary.
#[derive(Error, Debug)]
pub enum MailsyncError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Failed to render response: {0}")]
    Render(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config YAML: {0}")]
    ParseYaml(#[from] serde_yaml::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Invalid account '{id}': {reason}")]
    InvalidAccount { id: String, reason: String },
}

/// Errors that end (or are recorded by) a sync run.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Every ladder attempt failed.
    #[error("Connection failed: {0}")]
    Connection(#[from] ConnectionError),

    /// The server rejected a command, including a missing folder.
    #[error(transparent)]
    Protocol(SessionError),

    /// A single message could not be parsed.
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] StoreError),

    /// The local clock is ahead of the reference clock.
    #[error("Local clock is {skew_secs}s ahead of the reference clock (tolerance {tolerance_secs}s)")]
    TimeSkew { skew_secs: i64, tolerance_secs: u64 },

    /// An IMAP command exceeded the operation timeout.
    #[error("{0}")]
    Timeout(String),

    #[error("Sync cancelled: {0}")]
    Cancelled(String),

    #[error("Account settings unavailable: {0}")]
    Settings(#[from] SettingsError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

impl From<SessionError> for SyncError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Timeout { .. } => SyncError::Timeout(err.to_string()),
            other => SyncError::Protocol(other),
        }
    }
}

impl SyncError {
    /// Short machine-readable kind, used in response details.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::Connection(e) => e.category.as_str(),
            SyncError::Protocol(_) => "protocol",
            SyncError::Parse(_) => "parse",
            SyncError::Persistence(_) => "persistence",
            SyncError::TimeSkew { .. } => "time_skew",
            SyncError::Timeout(_) => "timeout",
            SyncError::Cancelled(_) => "cancelled",
            SyncError::Settings(_) => "settings",
            SyncError::Database(_) => "database",
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
