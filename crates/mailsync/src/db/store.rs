//! SQLite-backed implementation of the record store and status store traits.

use async_trait::async_trait;
use chrono::Utc;

use crate::status::{SyncCursor, SyncStatusStore};
use crate::store::{
    AttachmentRecord, EmailRecord, FolderRecord, InsertedEmail, KnownMessages, LeadDirectory,
    LeadId, MessageStore, Result,
};

use super::{email_repo, lead_repo, status_repo, Database, DatabaseError};

/// Record store over the local SQLite database.
///
/// rusqlite is synchronous, so every call runs on tokio's blocking pool
/// with a clone of the shared handle. The connection mutex still
/// serializes concurrent runs for different folders.
#[derive(Clone)]
pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Returns the underlying database handle.
    pub fn database(&self) -> &Database {
        &self.db
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Database) -> std::result::Result<T, DatabaseError> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        let value = tokio::task::spawn_blocking(move || f(&db)).await??;
        Ok(value)
    }
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

#[async_trait]
impl SyncStatusStore for SqliteStore {
    async fn read(&self, account_id: &str, folder: &str) -> Result<Option<SyncCursor>> {
        let (account_id, folder) = (account_id.to_string(), folder.to_string());
        let row = self
            .blocking(move |db| status_repo::find(db, &account_id, &folder))
            .await?;
        Ok(row.map(|r| r.into_cursor()).transpose()?)
    }

    async fn mark_started(&self, account_id: &str, folder: &str) -> Result<bool> {
        let (account_id, folder) = (account_id.to_string(), folder.to_string());
        self.blocking(move |db| status_repo::mark_started(db, &account_id, &folder, &now()))
            .await
    }

    async fn update_progress(
        &self,
        account_id: &str,
        folder: &str,
        items_synced: u64,
        last_uid: Option<u32>,
        total_items: u64,
    ) -> Result<()> {
        let (account_id, folder) = (account_id.to_string(), folder.to_string());
        self.blocking(move |db| {
            status_repo::update_progress(
                db,
                &account_id,
                &folder,
                items_synced,
                last_uid,
                total_items,
                &now(),
            )
        })
        .await
    }

    async fn mark_completed(
        &self,
        account_id: &str,
        folder: &str,
        last_uid: Option<u32>,
    ) -> Result<()> {
        let (account_id, folder) = (account_id.to_string(), folder.to_string());
        self.blocking(move |db| {
            status_repo::mark_completed(db, &account_id, &folder, last_uid, &now())
        })
        .await
    }

    async fn mark_failed(&self, account_id: &str, folder: &str, error: &str) -> Result<()> {
        let (account_id, folder, error) =
            (account_id.to_string(), folder.to_string(), error.to_string());
        self.blocking(move |db| status_repo::mark_failed(db, &account_id, &folder, &error, &now()))
            .await
    }

    async fn reset_cursor(&self, account_id: &str, folder: &str) -> Result<()> {
        let (account_id, folder) = (account_id.to_string(), folder.to_string());
        self.blocking(move |db| status_repo::reset_cursor(db, &account_id, &folder, &now()))
            .await
    }

    async fn record_uid_validity(
        &self,
        account_id: &str,
        folder: &str,
        uid_validity: u32,
    ) -> Result<()> {
        let (account_id, folder) = (account_id.to_string(), folder.to_string());
        self.blocking(move |db| {
            status_repo::record_uid_validity(db, &account_id, &folder, uid_validity, &now())
        })
        .await
    }
}

#[async_trait]
impl MessageStore for SqliteStore {
    async fn known_messages(
        &self,
        account_id: &str,
        folder: &str,
        uid_validity: u32,
    ) -> Result<KnownMessages> {
        let (account_id, folder) = (account_id.to_string(), folder.to_string());
        let rows = self
            .blocking(move |db| email_repo::find_known_rows(db, &account_id, &folder))
            .await?;
        Ok(KnownMessages::for_epoch(rows, uid_validity))
    }

    async fn insert_emails(&self, records: &[EmailRecord]) -> Result<Vec<InsertedEmail>> {
        for record in records {
            record.validate()?;
        }
        let records = records.to_vec();
        self.blocking(move |db| email_repo::insert_batch(db, &records))
            .await
    }

    async fn insert_attachments(&self, records: &[AttachmentRecord]) -> Result<usize> {
        for record in records {
            record.validate()?;
        }
        let records = records.to_vec();
        self.blocking(move |db| email_repo::insert_attachments(db, &records))
            .await
    }

    async fn upsert_folders(&self, account_id: &str, folders: &[FolderRecord]) -> Result<usize> {
        let (account_id, folders) = (account_id.to_string(), folders.to_vec());
        self.blocking(move |db| email_repo::replace_folders(db, &account_id, &folders))
            .await
    }
}

#[async_trait]
impl LeadDirectory for SqliteStore {
    async fn find_by_addresses(&self, addresses: &[&str]) -> Result<Option<LeadId>> {
        let addresses: Vec<String> = addresses.iter().map(|a| a.to_string()).collect();
        self.blocking(move |db| {
            let addresses: Vec<&str> = addresses.iter().map(String::as_str).collect();
            lead_repo::find_first_by_addresses(db, &addresses)
        })
        .await
    }
}
