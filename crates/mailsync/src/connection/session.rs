//! Transport seams between the engine and an IMAP server.
//!
//! The engine only depends on these traits. [`super::imap::ImapConnector`]
//! is the production implementation; tests script their own.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::store::FolderRecord;

use super::config::ConnectionConfig;
use super::error::{ConnectFailure, SessionError};

/// Result of a read-only EXAMINE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MailboxInfo {
    /// Number of messages in the folder.
    pub exists: u32,
    pub uid_validity: Option<u32>,
}

/// UID SEARCH criteria the enumerator issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchQuery {
    All,
    /// `UID {n+1}:*`
    UidAfter(u32),
    /// `SINCE dd-Mon-yyyy`
    Since(NaiveDate),
}

impl SearchQuery {
    /// Renders the IMAP search key.
    pub fn to_imap(&self) -> String {
        match self {
            SearchQuery::All => "ALL".to_string(),
            SearchQuery::UidAfter(last_uid) => format!("UID {}:*", last_uid.saturating_add(1)),
            SearchQuery::Since(date) => format!("SINCE {}", date.format("%d-%b-%Y")),
        }
    }
}

/// One message as returned by a batch fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedMessage {
    pub uid: u32,
    /// Flags rendered as IMAP atoms, e.g. `\Seen`.
    pub flags: Vec<String>,
    pub internal_date: Option<DateTime<Utc>>,
    /// Message-ID from the ENVELOPE, available before parsing the body.
    pub envelope_message_id: Option<String>,
    pub body: Option<Vec<u8>>,
}

impl FetchedMessage {
    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.iter().any(|f| f.eq_ignore_ascii_case(flag))
    }
}

/// An authenticated IMAP session.
#[async_trait]
pub trait MailSession: Send {
    /// Opens a folder read-only.
    async fn examine(&mut self, folder: &str) -> Result<MailboxInfo, SessionError>;

    /// Runs a UID SEARCH in the examined folder.
    async fn uid_search(&mut self, query: SearchQuery) -> Result<Vec<u32>, SessionError>;

    /// Fetches `UID FLAGS INTERNALDATE ENVELOPE BODY.PEEK[]` for all `uids`
    /// in a single round trip.
    async fn fetch_batch(&mut self, uids: &[u32]) -> Result<Vec<FetchedMessage>, SessionError>;

    /// Lists every folder on the server.
    async fn list_folders(&mut self) -> Result<Vec<FolderRecord>, SessionError>;

    async fn logout(&mut self) -> Result<(), SessionError>;
}

/// Opens authenticated sessions.
#[async_trait]
pub trait MailConnector: Send + Sync {
    /// Performs one connection attempt with exactly the given parameters.
    async fn connect(&self, config: &ConnectionConfig)
        -> Result<Box<dyn MailSession>, ConnectFailure>;
}

/// Bounds a session command by the operation timeout.
pub async fn bounded<T, F>(
    operation: &'static str,
    after: Duration,
    fut: F,
) -> Result<T, SessionError>
where
    F: Future<Output = Result<T, SessionError>>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(result) => result,
        Err(_) => Err(SessionError::Timeout { operation, after }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_query_rendering() {
        assert_eq!(SearchQuery::All.to_imap(), "ALL");
        assert_eq!(SearchQuery::UidAfter(200).to_imap(), "UID 201:*");
        let date = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        assert_eq!(SearchQuery::Since(date).to_imap(), "SINCE 05-Jan-2024");
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_times_out() {
        let result: Result<(), _> = bounded("FETCH", Duration::from_millis(50), async {
            std::future::pending::<Result<(), SessionError>>().await
        })
        .await;
        assert!(matches!(
            result,
            Err(SessionError::Timeout {
                operation: "FETCH",
                ..
            })
        ));
    }
}
