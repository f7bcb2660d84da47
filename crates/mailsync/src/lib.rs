pub mod config;
pub mod connection;
pub mod db;
pub mod error;
pub mod mail;
pub mod secrets;
pub mod status;
pub mod store;
pub mod sync;

pub use config::{load_config, EngineConfig, FileSettingsProvider, SettingsProvider};
pub use connection::{ConnectionConfig, ConnectionManager, ImapConnector, MailConnector, MailSession};
pub use db::{Database, SqliteStore};
pub use error::{ConfigError, MailsyncError, Result, SyncError};
pub use secrets::{resolve_secret, SecretError};
pub use status::{SyncCursor, SyncStatusStore};
pub use store::{LeadDirectory, MessageStore, StoreError};
pub use sync::{
    EngineOptions, SyncEngine, SyncHandle, SyncRequest, SyncResponse, SyncState,
    TestConnectionRequest, TestConnectionResponse,
};
