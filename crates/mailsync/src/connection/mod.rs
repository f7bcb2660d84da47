//! Mail connection management.
//!
//! Connections are opened through a fixed escalation ladder of derived
//! configs, each attempt bounded by a hard wall-clock timeout.

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod imap;
pub mod manager;
pub mod session;

pub use config::{AttemptProfile, ConnectionConfig, Credentials, TlsOptions, TlsVersion, Timeouts};
pub use diagnostics::{Diagnostics, ServerInfo, TestConnectionResponse};
pub use error::{ConnectFailure, ConnectionError, FailureCategory, SessionError};
pub use imap::ImapConnector;
pub use manager::{Connected, ConnectionManager};
pub use session::{FetchedMessage, MailConnector, MailSession, MailboxInfo, SearchQuery};
