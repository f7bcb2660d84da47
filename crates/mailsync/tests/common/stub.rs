//! Scripted in-process IMAP server.
//!
//! `StubMailbox` holds one folder's messages and records what the engine
//! asked for. `StubConnector` hands out sessions over it and can be told to
//! fail or hang specific connection attempts.

#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use mailsync::connection::{
    ConnectFailure, ConnectionConfig, FetchedMessage, MailConnector, MailSession, MailboxInfo,
    SearchQuery, SessionError,
};
use mailsync::store::FolderRecord;

use super::builders::MessageBuilder;

#[derive(Debug, Clone)]
pub struct StubMessage {
    pub raw: Option<Vec<u8>>,
    pub flags: Vec<String>,
    /// INTERNALDATE; `None` means it arrived just now.
    pub internal_date: Option<DateTime<Utc>>,
}

impl StubMessage {
    fn arrived_on_or_after(&self, day: chrono::NaiveDate) -> bool {
        self.internal_date.map_or(true, |date| date.date_naive() >= day)
    }
}

#[derive(Debug, Default)]
pub struct MailboxState {
    pub messages: BTreeMap<u32, StubMessage>,
    pub uid_validity: u32,
    pub folders: Vec<FolderRecord>,
    /// UIDs requested by every fetch, in call order.
    pub fetch_calls: Vec<Vec<u32>>,
    pub searches: Vec<SearchQuery>,
    /// Fetch calls at or after this index never resolve.
    pub hang_fetch_from: Option<usize>,
    pub logouts: usize,
}

/// Shared state behind every session the connector opens.
#[derive(Clone)]
pub struct StubMailbox {
    state: Arc<Mutex<MailboxState>>,
}

impl StubMailbox {
    pub fn new() -> Self {
        let state = MailboxState {
            uid_validity: 1,
            folders: vec![
                FolderRecord {
                    name: "INBOX".to_string(),
                    delimiter: Some("/".to_string()),
                    selectable: true,
                },
                FolderRecord {
                    name: "Sent".to_string(),
                    delimiter: Some("/".to_string()),
                    selectable: true,
                },
            ],
            ..MailboxState::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn with<T>(&self, f: impl FnOnce(&mut MailboxState) -> T) -> T {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    /// Adds standard messages for every UID in `uids`.
    pub fn add_range(&self, uids: impl IntoIterator<Item = u32>) {
        for uid in uids {
            self.add(uid, MessageBuilder::new(uid).build());
        }
    }

    pub fn add(&self, uid: u32, raw: Vec<u8>) {
        self.add_with_flags(uid, raw, &[]);
    }

    pub fn add_with_flags(&self, uid: u32, raw: Vec<u8>, flags: &[&str]) {
        self.with(|s| {
            s.messages.insert(
                uid,
                StubMessage {
                    raw: Some(raw),
                    flags: flags.iter().map(|f| f.to_string()).collect(),
                    internal_date: None,
                },
            )
        });
    }

    /// A message the server returns without a body.
    pub fn add_without_body(&self, uid: u32) {
        self.with(|s| {
            s.messages.insert(
                uid,
                StubMessage {
                    raw: None,
                    flags: vec![],
                    internal_date: None,
                },
            )
        });
    }

    /// A message with an explicit INTERNALDATE, as seen by `SINCE`.
    pub fn add_dated(&self, uid: u32, raw: Vec<u8>, internal_date: DateTime<Utc>) {
        self.with(|s| {
            s.messages.insert(
                uid,
                StubMessage {
                    raw: Some(raw),
                    flags: vec![],
                    internal_date: Some(internal_date),
                },
            )
        });
    }

    /// Expunges every message, as a server does when it rebuilds a folder.
    pub fn clear(&self) {
        self.with(|s| s.messages.clear());
    }

    pub fn set_uid_validity(&self, uid_validity: u32) {
        self.with(|s| s.uid_validity = uid_validity);
    }

    pub fn hang_fetch_from(&self, call: usize) {
        self.with(|s| s.hang_fetch_from = Some(call));
    }

    pub fn fetch_calls(&self) -> Vec<Vec<u32>> {
        self.with(|s| s.fetch_calls.clone())
    }

    pub fn searches(&self) -> Vec<SearchQuery> {
        self.with(|s| s.searches.clone())
    }

    pub fn logouts(&self) -> usize {
        self.with(|s| s.logouts)
    }
}

pub struct StubSession {
    mailbox: StubMailbox,
}

#[async_trait]
impl MailSession for StubSession {
    async fn examine(&mut self, folder: &str) -> Result<MailboxInfo, SessionError> {
        if folder != "INBOX" {
            return Err(SessionError::FolderNotFound(folder.to_string()));
        }
        Ok(self.mailbox.with(|s| MailboxInfo {
            exists: s.messages.len() as u32,
            uid_validity: Some(s.uid_validity),
        }))
    }

    async fn uid_search(&mut self, query: SearchQuery) -> Result<Vec<u32>, SessionError> {
        Ok(self.mailbox.with(|s| {
            s.searches.push(query);
            let all: Vec<u32> = s.messages.keys().copied().collect();
            match query {
                SearchQuery::All => all,
                SearchQuery::Since(day) => s
                    .messages
                    .iter()
                    .filter(|(_, m)| m.arrived_on_or_after(day))
                    .map(|(uid, _)| *uid)
                    .collect(),
                SearchQuery::UidAfter(last) => {
                    let newer: Vec<u32> = all.iter().copied().filter(|uid| *uid > last).collect();
                    // `n:*` still matches the highest UID when nothing is newer.
                    if newer.is_empty() {
                        all.last().copied().into_iter().collect()
                    } else {
                        newer
                    }
                }
            }
        }))
    }

    async fn fetch_batch(&mut self, uids: &[u32]) -> Result<Vec<FetchedMessage>, SessionError> {
        let (hang, fetched) = self.mailbox.with(|s| {
            let call = s.fetch_calls.len();
            s.fetch_calls.push(uids.to_vec());
            let hang = s.hang_fetch_from.is_some_and(|from| call >= from);
            let fetched: Vec<FetchedMessage> = uids
                .iter()
                .filter_map(|uid| {
                    s.messages.get(uid).map(|m| FetchedMessage {
                        uid: *uid,
                        flags: m.flags.clone(),
                        internal_date: m.internal_date,
                        envelope_message_id: None,
                        body: m.raw.clone(),
                    })
                })
                .collect();
            (hang, fetched)
        });
        if hang {
            std::future::pending::<()>().await;
        }
        Ok(fetched)
    }

    async fn list_folders(&mut self) -> Result<Vec<FolderRecord>, SessionError> {
        Ok(self.mailbox.with(|s| s.folders.clone()))
    }

    async fn logout(&mut self) -> Result<(), SessionError> {
        self.mailbox.with(|s| s.logouts += 1);
        Ok(())
    }
}

/// What the connector does on one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    Accept,
    RejectLogin,
    RejectTls,
    Hang,
}

/// Connector that follows a script of attempt outcomes, accepting once the
/// script runs out.
pub struct StubConnector {
    mailbox: StubMailbox,
    script: Mutex<VecDeque<Attempt>>,
    attempts: Mutex<Vec<ConnectionConfig>>,
}

impl StubConnector {
    pub fn new(mailbox: StubMailbox) -> Self {
        Self {
            mailbox,
            script: Mutex::new(VecDeque::new()),
            attempts: Mutex::new(Vec::new()),
        }
    }

    pub fn script(&self, attempts: &[Attempt]) {
        let mut script = self.script.lock().unwrap();
        script.clear();
        script.extend(attempts.iter().copied());
    }

    /// Configs of every attempt made so far.
    pub fn attempts(&self) -> Vec<ConnectionConfig> {
        self.attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailConnector for StubConnector {
    async fn connect(
        &self,
        config: &ConnectionConfig,
    ) -> Result<Box<dyn MailSession>, ConnectFailure> {
        self.attempts.lock().unwrap().push(config.clone());
        let next = self.script.lock().unwrap().pop_front().unwrap_or(Attempt::Accept);
        match next {
            Attempt::Accept => Ok(Box::new(StubSession {
                mailbox: self.mailbox.clone(),
            })),
            Attempt::RejectLogin => Err(ConnectFailure::Authentication(
                "[AUTHENTICATIONFAILED] Invalid credentials".to_string(),
            )),
            Attempt::RejectTls => Err(ConnectFailure::Tls(
                "certificate verify failed: self signed certificate".to_string(),
            )),
            Attempt::Hang => std::future::pending().await,
        }
    }
}
