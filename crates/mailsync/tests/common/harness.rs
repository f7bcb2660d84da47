//! Engine wiring for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;

use mailsync::config::{SettingsError, SettingsProvider};
use mailsync::connection::ConnectionConfig;
use mailsync::db::{email_repo, Database, SqliteStore};
use mailsync::status::{SyncCursor, SyncStatusStore};
use mailsync::store::{
    AttachmentRecord, EmailRecord, FolderRecord, InsertedEmail, KnownMessages, MessageStore,
    StoreError,
};
use mailsync::sync::{EngineOptions, SyncEngine, SyncRequest};

use super::stub::{StubConnector, StubMailbox};

pub const ACCOUNT: &str = "acc-1";

/// Settings for the single test account.
pub struct StaticSettings;

#[async_trait]
impl SettingsProvider for StaticSettings {
    async fn imap_settings(&self, account_id: &str) -> Result<ConnectionConfig, SettingsError> {
        if account_id != ACCOUNT {
            return Err(SettingsError::UnknownAccount(account_id.to_string()));
        }
        Ok(ConnectionConfig::new(
            "imap.example.com",
            993,
            true,
            "user@example.com",
            SecretString::from("hunter2"),
        ))
    }
}

/// A sync engine over a stub server and an in-memory database.
pub struct TestEngine {
    pub engine: SyncEngine,
    pub db: Database,
    pub store: Arc<SqliteStore>,
    pub mailbox: StubMailbox,
    pub connector: Arc<StubConnector>,
}

impl TestEngine {
    pub fn new() -> Self {
        Self::with_options(EngineOptions::default())
    }

    pub fn with_options(options: EngineOptions) -> Self {
        Self::build(options, |store| store as Arc<dyn MessageStore>)
    }

    /// Routes message writes through `wrap` while status and leads stay on
    /// the plain store.
    pub fn with_message_store<S>(
        options: EngineOptions,
        wrap: impl FnOnce(Arc<SqliteStore>) -> S,
    ) -> Self
    where
        S: MessageStore + 'static,
    {
        Self::build(options, |store| Arc::new(wrap(store)) as Arc<dyn MessageStore>)
    }

    fn build(
        options: EngineOptions,
        wrap: impl FnOnce(Arc<SqliteStore>) -> Arc<dyn MessageStore>,
    ) -> Self {
        let db = Database::open_in_memory().expect("Failed to open test database");
        let store = Arc::new(SqliteStore::new(db.clone()));
        let mailbox = StubMailbox::new();
        let connector = Arc::new(StubConnector::new(mailbox.clone()));
        let engine = SyncEngine::new(
            Arc::new(StaticSettings),
            store.clone(),
            wrap(store.clone()),
            store.clone(),
            connector.clone(),
        )
        .with_options(options);
        Self {
            engine,
            db,
            store,
            mailbox,
            connector,
        }
    }

    /// A request for the test account's INBOX with the default knobs.
    pub fn request(&self) -> SyncRequest {
        SyncRequest::new(ACCOUNT)
    }

    pub fn stored_uids(&self) -> Vec<u32> {
        email_repo::find_uids(&self.db, ACCOUNT, "INBOX").unwrap()
    }

    pub fn stored_count(&self) -> u64 {
        email_repo::count_by_folder(&self.db, ACCOUNT, "INBOX").unwrap()
    }

    pub async fn cursor(&self) -> Option<SyncCursor> {
        self.store.read(ACCOUNT, "INBOX").await.unwrap()
    }

    pub async fn cursor_for(&self, key: &str) -> Option<SyncCursor> {
        self.store.read(ACCOUNT, key).await.unwrap()
    }
}

/// Message store that rejects the bulk email inserts at the given call
/// indices (0-based) and delegates everything else.
pub struct RejectingInserts {
    inner: Arc<SqliteStore>,
    reject: Vec<usize>,
    calls: AtomicUsize,
}

impl RejectingInserts {
    pub fn new(inner: Arc<SqliteStore>, reject: &[usize]) -> Self {
        Self {
            inner,
            reject: reject.to_vec(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl MessageStore for RejectingInserts {
    async fn known_messages(
        &self,
        account_id: &str,
        folder: &str,
        uid_validity: u32,
    ) -> Result<KnownMessages, StoreError> {
        self.inner.known_messages(account_id, folder, uid_validity).await
    }

    async fn insert_emails(
        &self,
        records: &[EmailRecord],
    ) -> Result<Vec<InsertedEmail>, StoreError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.reject.contains(&call) {
            return Err(StoreError::Unavailable("store is read-only".to_string()));
        }
        self.inner.insert_emails(records).await
    }

    async fn insert_attachments(
        &self,
        records: &[AttachmentRecord],
    ) -> Result<usize, StoreError> {
        self.inner.insert_attachments(records).await
    }

    async fn upsert_folders(
        &self,
        account_id: &str,
        folders: &[FolderRecord],
    ) -> Result<usize, StoreError> {
        self.inner.upsert_folders(account_id, folders).await
    }
}
