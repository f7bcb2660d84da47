//! External request and response shapes of the sync engine.

use serde::{Deserialize, Serialize};

pub use crate::connection::{Diagnostics, ServerInfo, TestConnectionResponse};

/// Parameters of one sync run. Missing JSON fields take the defaults below.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncRequest {
    pub account_id: String,
    pub folder: String,
    /// Ignore and reset the stored cursor.
    pub force_refresh: bool,
    /// Cap for unrestricted (first or forced) syncs.
    pub max_emails: u32,
    pub batch_size: u32,
    pub connection_timeout_ms: u64,
    pub retry_attempts: u32,
    /// Keep the newest `max_emails` when truncating, otherwise the oldest.
    pub load_latest: bool,
    /// Resume from the stored cursor when one exists.
    pub incremental_sync: bool,
    /// Only refresh the account's folder list.
    pub folder_sync_only: bool,
    /// Wall-clock budget for the whole run.
    pub deadline_ms: Option<u64>,
}

impl Default for SyncRequest {
    fn default() -> Self {
        Self {
            account_id: String::new(),
            folder: "INBOX".to_string(),
            force_refresh: false,
            max_emails: 100,
            batch_size: 10,
            connection_timeout_ms: 30_000,
            retry_attempts: 2,
            load_latest: true,
            incremental_sync: true,
            folder_sync_only: false,
            deadline_ms: None,
        }
    }
}

impl SyncRequest {
    pub fn new(account_id: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            ..Self::default()
        }
    }

    /// Whether the stored cursor may drive enumeration.
    pub fn uses_cursor(&self) -> bool {
        self.incremental_sync && !self.force_refresh
    }
}

/// Parameters of a connectivity self-test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TestConnectionRequest {
    pub account_id: String,
    pub connection_timeout_ms: u64,
    pub retry_attempts: u32,
}

impl Default for TestConnectionRequest {
    fn default() -> Self {
        Self {
            account_id: String::new(),
            connection_timeout_ms: 30_000,
            retry_attempts: 2,
        }
    }
}

impl TestConnectionRequest {
    pub fn new(account_id: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchProcessing {
    pub total_batches: usize,
    pub completed_batches: usize,
    pub emails_per_batch: usize,
}

/// Outcome of a sync run. Failures are reported here, never as an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    pub success: bool,
    pub message: String,
    /// New messages persisted by this run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emails_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Machine-readable error kind, e.g. `authentication` or `protocol`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Percentage of batches completed, 0-100.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_processing: Option<BatchProcessing>,
}

impl SyncResponse {
    pub fn succeeded(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            emails_count: None,
            folder_count: None,
            error: None,
            details: None,
            progress: None,
            batch_processing: None,
        }
    }

    pub fn failed(message: impl Into<String>, error: &crate::error::SyncError) -> Self {
        Self {
            success: false,
            message: message.into(),
            error: Some(error.to_string()),
            details: Some(error.kind().to_string()),
            ..Self::succeeded("")
        }
    }
}
