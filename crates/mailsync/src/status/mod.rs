//! Per-(account, folder) sync cursor and progress bookkeeping.
//!
//! The status record is the only state that outlives a sync run and is the
//! sole source of resumability. Every operation is an upsert keyed by
//! `(account_id, folder)`, so at most one row exists per key.
//!
//! Cursor writes and message writes are not transactional with each other.
//! A crash after messages were persisted but before the progress update
//! makes the next run fetch those messages again; the pipeline's dedupe
//! step keeps them from being inserted twice.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::Result;

/// Durable sync cursor for one account folder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncCursor {
    pub account_id: String,
    pub folder: String,
    /// When the last successful sync completed.
    pub last_sync_time: Option<DateTime<Utc>>,
    /// Highest UID observed by a successful or partial run.
    pub last_uid: Option<u32>,
    /// UIDVALIDITY of the folder when `last_uid` was recorded.
    pub uid_validity: Option<u32>,
    pub items_synced: u64,
    pub total_items: u64,
    pub in_progress: bool,
    pub last_error: Option<String>,
    /// Stamped by `mark_started` before any network I/O.
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Durable store for [`SyncCursor`] records.
#[async_trait]
pub trait SyncStatusStore: Send + Sync {
    /// Reads the cursor for a folder, if one was ever written.
    async fn read(&self, account_id: &str, folder: &str) -> Result<Option<SyncCursor>>;

    /// Flags the folder as syncing and stamps the attempt time.
    ///
    /// Returns `true` when the record was already marked in progress, which
    /// means either a concurrent run or a previous run that crashed.
    async fn mark_started(&self, account_id: &str, folder: &str) -> Result<bool>;

    /// Records intermediate progress; `last_uid` only ever moves forward.
    async fn update_progress(
        &self,
        account_id: &str,
        folder: &str,
        items_synced: u64,
        last_uid: Option<u32>,
        total_items: u64,
    ) -> Result<()>;

    /// Clears the in-progress flag, stamps `last_sync_time` and advances `last_uid`.
    async fn mark_completed(&self, account_id: &str, folder: &str, last_uid: Option<u32>)
        -> Result<()>;

    /// Clears the in-progress flag and records the error.
    async fn mark_failed(&self, account_id: &str, folder: &str, error: &str) -> Result<()>;

    /// Forgets `last_uid`, `last_sync_time` and `uid_validity` for a full resync.
    async fn reset_cursor(&self, account_id: &str, folder: &str) -> Result<()>;

    /// Stores the folder's current UIDVALIDITY.
    async fn record_uid_validity(
        &self,
        account_id: &str,
        folder: &str,
        uid_validity: u32,
    ) -> Result<()>;
}
