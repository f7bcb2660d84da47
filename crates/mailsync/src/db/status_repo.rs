//! Sync status repository: upserts on the `sync_status` table.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use crate::status::SyncCursor;

use super::{Database, DatabaseError};

/// A raw sync status row from the database.
#[derive(Debug, Clone)]
pub struct SyncStatusRow {
    pub account_id: String,
    pub folder: String,
    pub last_sync_time: Option<String>,
    pub last_uid: Option<u32>,
    pub uid_validity: Option<u32>,
    pub items_synced: u64,
    pub total_items: u64,
    pub in_progress: bool,
    pub last_error: Option<String>,
    pub last_attempt_at: Option<String>,
    pub updated_at: String,
}

impl SyncStatusRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            account_id: row.get("account_id")?,
            folder: row.get("folder")?,
            last_sync_time: row.get("last_sync_time")?,
            last_uid: row.get("last_uid")?,
            uid_validity: row.get("uid_validity")?,
            items_synced: row.get("items_synced")?,
            total_items: row.get("total_items")?,
            in_progress: row.get("in_progress")?,
            last_error: row.get("last_error")?,
            last_attempt_at: row.get("last_attempt_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    /// Converts the raw row into the domain cursor, parsing timestamps.
    pub fn into_cursor(self) -> Result<SyncCursor, DatabaseError> {
        Ok(SyncCursor {
            last_sync_time: parse_optional_time("last_sync_time", self.last_sync_time)?,
            last_attempt_at: parse_optional_time("last_attempt_at", self.last_attempt_at)?,
            updated_at: parse_time("updated_at", &self.updated_at)?,
            account_id: self.account_id,
            folder: self.folder,
            last_uid: self.last_uid,
            uid_validity: self.uid_validity,
            items_synced: self.items_synced,
            total_items: self.total_items,
            in_progress: self.in_progress,
            last_error: self.last_error,
        })
    }
}

pub(crate) fn parse_time(column: &'static str, value: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::InvalidValue {
            column,
            reason: format!("'{}': {}", value, e),
        })
}

pub(crate) fn parse_optional_time(
    column: &'static str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, DatabaseError> {
    value.map(|v| parse_time(column, &v)).transpose()
}

/// Keeps the larger of the stored and incoming UID; NULL never wins over a value.
const MONOTONIC_LAST_UID: &str = "CASE
        WHEN excluded.last_uid IS NULL THEN sync_status.last_uid
        WHEN sync_status.last_uid IS NULL THEN excluded.last_uid
        ELSE MAX(sync_status.last_uid, excluded.last_uid)
    END";

/// Finds the status row for an account folder.
pub fn find(
    db: &Database,
    account_id: &str,
    folder: &str,
) -> Result<Option<SyncStatusRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM sync_status WHERE account_id = ?1 AND folder = ?2",
                params![account_id, folder],
                SyncStatusRow::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

/// Sets `in_progress` and stamps the attempt. Returns the previous `in_progress` value.
pub fn mark_started(
    db: &Database,
    account_id: &str,
    folder: &str,
    now: &str,
) -> Result<bool, DatabaseError> {
    db.with_transaction(|tx| {
        let was_in_progress: bool = tx
            .query_row(
                "SELECT in_progress FROM sync_status WHERE account_id = ?1 AND folder = ?2",
                params![account_id, folder],
                |r| r.get(0),
            )
            .optional()?
            .unwrap_or(false);

        tx.execute(
            "INSERT INTO sync_status (account_id, folder, in_progress, last_error, last_attempt_at, updated_at)
             VALUES (?1, ?2, 1, NULL, ?3, ?3)
             ON CONFLICT(account_id, folder) DO UPDATE SET
                in_progress = 1,
                last_error = NULL,
                last_attempt_at = excluded.last_attempt_at,
                updated_at = excluded.updated_at",
            params![account_id, folder, now],
        )?;

        Ok(was_in_progress)
    })
}

/// Records intermediate progress.
pub fn update_progress(
    db: &Database,
    account_id: &str,
    folder: &str,
    items_synced: u64,
    last_uid: Option<u32>,
    total_items: u64,
    now: &str,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            &format!(
                "INSERT INTO sync_status (account_id, folder, items_synced, total_items, last_uid, in_progress, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6)
                 ON CONFLICT(account_id, folder) DO UPDATE SET
                    items_synced = excluded.items_synced,
                    total_items = excluded.total_items,
                    last_uid = {},
                    updated_at = excluded.updated_at",
                MONOTONIC_LAST_UID
            ),
            params![account_id, folder, items_synced, total_items, last_uid, now],
        )?;
        Ok(())
    })
}

/// Marks a run as finished successfully.
pub fn mark_completed(
    db: &Database,
    account_id: &str,
    folder: &str,
    last_uid: Option<u32>,
    now: &str,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            &format!(
                "INSERT INTO sync_status (account_id, folder, last_uid, last_sync_time, in_progress, updated_at)
                 VALUES (?1, ?2, ?3, ?4, 0, ?4)
                 ON CONFLICT(account_id, folder) DO UPDATE SET
                    last_uid = {},
                    last_sync_time = excluded.last_sync_time,
                    in_progress = 0,
                    last_error = NULL,
                    updated_at = excluded.updated_at",
                MONOTONIC_LAST_UID
            ),
            params![account_id, folder, last_uid, now],
        )?;
        Ok(())
    })
}

/// Marks a run as failed with the given error text.
pub fn mark_failed(
    db: &Database,
    account_id: &str,
    folder: &str,
    error: &str,
    now: &str,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO sync_status (account_id, folder, in_progress, last_error, updated_at)
             VALUES (?1, ?2, 0, ?3, ?4)
             ON CONFLICT(account_id, folder) DO UPDATE SET
                in_progress = 0,
                last_error = excluded.last_error,
                updated_at = excluded.updated_at",
            params![account_id, folder, error, now],
        )?;
        Ok(())
    })
}

/// Clears the resume cursor for a full resync.
pub fn reset_cursor(
    db: &Database,
    account_id: &str,
    folder: &str,
    now: &str,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE sync_status
             SET last_uid = NULL, last_sync_time = NULL, uid_validity = NULL, updated_at = ?3
             WHERE account_id = ?1 AND folder = ?2",
            params![account_id, folder, now],
        )?;
        Ok(())
    })
}

/// Stores the folder's UIDVALIDITY.
pub fn record_uid_validity(
    db: &Database,
    account_id: &str,
    folder: &str,
    uid_validity: u32,
    now: &str,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO sync_status (account_id, folder, uid_validity, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(account_id, folder) DO UPDATE SET
                uid_validity = excluded.uid_validity,
                updated_at = excluded.updated_at",
            params![account_id, folder, uid_validity, now],
        )?;
        Ok(())
    })
}
