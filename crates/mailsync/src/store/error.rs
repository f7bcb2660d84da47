//! Record store error types.

use thiserror::Error;

use crate::db::DatabaseError;

/// Errors surfaced by record store implementations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The backing database failed.
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// A record failed validation at the store boundary; the whole request is rejected.
    #[error("Record rejected: {0}")]
    Rejected(String),

    /// The store could not be reached.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// The blocking database task panicked or was aborted.
    #[error("Database task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Result type for record store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
