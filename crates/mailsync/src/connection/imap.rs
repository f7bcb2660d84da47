//! IMAP transport over `async-imap` and `async-native-tls`.

use std::io;

use async_imap::types::{Flag, NameAttribute};
use async_imap::Session;
use async_native_tls::TlsConnector;
use async_trait::async_trait;
use chrono::Utc;
use futures_util::StreamExt;
use log::{debug, info, warn};
use secrecy::ExposeSecret;

use crate::store::FolderRecord;

use super::config::{ConnectionConfig, TlsOptions};
use super::error::{ConnectFailure, SessionError};
use super::session::{FetchedMessage, MailConnector, MailSession, MailboxInfo, SearchQuery};

/// Type alias for the underlying async stream (using async-std compatible TcpStream).
type AsyncTcpStream = async_io::Async<std::net::TcpStream>;

/// Type alias for the TLS stream used by the IMAP session.
type TlsStream = async_native_tls::TlsStream<AsyncTcpStream>;

const FETCH_ITEMS: &str = "(UID FLAGS INTERNALDATE ENVELOPE BODY.PEEK[])";

/// Connects to real IMAP servers.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImapConnector;

impl ImapConnector {
    pub fn new() -> Self {
        Self
    }

    fn tls_connector(options: &TlsOptions) -> TlsConnector {
        TlsConnector::new()
            .danger_accept_invalid_certs(options.accept_invalid_certs)
            .danger_accept_invalid_hostnames(options.accept_invalid_hostnames)
            .min_protocol_version(options.min_protocol.map(Into::into))
    }

    /// Resolves the host and connects to the first reachable address.
    ///
    /// The connect itself is non-blocking so the caller's timeout can win the race.
    async fn open_tcp(host: &str, port: u16) -> Result<AsyncTcpStream, ConnectFailure> {
        let addrs = tokio::net::lookup_host((host, port))
            .await
            .map_err(|e| ConnectFailure::Resolve {
                host: host.to_string(),
                source: e,
            })?;

        let mut last_error = None;
        for addr in addrs {
            debug!("Opening TCP connection to {}", addr);
            match AsyncTcpStream::connect(addr).await {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    debug!("TCP connect to {} failed: {}", addr, e);
                    last_error = Some(e);
                }
            }
        }

        Err(ConnectFailure::Tcp(last_error.unwrap_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no addresses resolved for {}", host),
            )
        })))
    }
}

#[async_trait]
impl MailConnector for ImapConnector {
    async fn connect(
        &self,
        config: &ConnectionConfig,
    ) -> Result<Box<dyn MailSession>, ConnectFailure> {
        info!(
            "Connecting to IMAP server at {}:{} ({})",
            config.host,
            config.port,
            if config.secure { "implicit TLS" } else { "STARTTLS" }
        );

        let tcp_stream = Self::open_tcp(&config.host, config.port).await?;
        let tls = Self::tls_connector(&config.tls);

        let client = if config.secure {
            let tls_stream = tls
                .connect(&config.host, tcp_stream)
                .await
                .map_err(|e| ConnectFailure::Tls(e.to_string()))?;
            let mut client = async_imap::Client::new(tls_stream);
            client
                .read_response()
                .await
                .map_err(|e| ConnectFailure::Handshake(e.to_string()))?
                .ok_or_else(|| ConnectFailure::Handshake("server sent no greeting".to_string()))?;
            client
        } else {
            let mut plain = async_imap::Client::new(tcp_stream);
            plain
                .read_response()
                .await
                .map_err(|e| ConnectFailure::Handshake(e.to_string()))?
                .ok_or_else(|| ConnectFailure::Handshake("server sent no greeting".to_string()))?;
            plain
                .run_command_and_check_ok("STARTTLS", None)
                .await
                .map_err(|e| ConnectFailure::Handshake(format!("STARTTLS rejected: {}", e)))?;

            let tls_stream = tls
                .connect(&config.host, plain.into_inner())
                .await
                .map_err(|e| ConnectFailure::Tls(e.to_string()))?;
            async_imap::Client::new(tls_stream)
        };

        let session = client
            .login(
                &config.credentials.username,
                config.credentials.password.expose_secret(),
            )
            .await
            .map_err(|(e, _)| ConnectFailure::Authentication(e.to_string()))?;

        info!("Successfully authenticated to IMAP server");
        Ok(Box::new(ImapMailSession { session }))
    }
}

/// Authenticated session over TLS.
pub struct ImapMailSession {
    session: Session<TlsStream>,
}

fn flag_atom(flag: &Flag<'_>) -> String {
    match flag {
        Flag::Seen => "\\Seen".to_string(),
        Flag::Answered => "\\Answered".to_string(),
        Flag::Flagged => "\\Flagged".to_string(),
        Flag::Deleted => "\\Deleted".to_string(),
        Flag::Draft => "\\Draft".to_string(),
        Flag::Recent => "\\Recent".to_string(),
        Flag::MayCreate => "\\*".to_string(),
        Flag::Custom(name) => name.to_string(),
    }
}

#[async_trait]
impl MailSession for ImapMailSession {
    /// Opens a folder in read-only mode using EXAMINE (not SELECT).
    /// This ensures the folder is not modified and emails are not marked as read.
    async fn examine(&mut self, folder: &str) -> Result<MailboxInfo, SessionError> {
        info!("Examining folder: {}", folder);

        let mailbox = self.session.examine(folder).await.map_err(|e| match e {
            async_imap::error::Error::No(_) => SessionError::FolderNotFound(folder.to_string()),
            other => {
                let message = other.to_string();
                if message.contains("Mailbox doesn't exist") {
                    SessionError::FolderNotFound(folder.to_string())
                } else {
                    SessionError::Protocol(message)
                }
            }
        })?;

        debug!(
            "Folder '{}' opened with EXISTS={} UIDVALIDITY={:?}",
            folder, mailbox.exists, mailbox.uid_validity
        );
        Ok(MailboxInfo {
            exists: mailbox.exists,
            uid_validity: mailbox.uid_validity,
        })
    }

    async fn uid_search(&mut self, query: SearchQuery) -> Result<Vec<u32>, SessionError> {
        let query = query.to_imap();
        debug!("Searching with query: {}", query);

        let uids = self
            .session
            .uid_search(&query)
            .await
            .map_err(|e| SessionError::Protocol(e.to_string()))?;

        let uid_list: Vec<u32> = uids.into_iter().collect();
        debug!("Found {} messages matching search", uid_list.len());
        Ok(uid_list)
    }

    async fn fetch_batch(&mut self, uids: &[u32]) -> Result<Vec<FetchedMessage>, SessionError> {
        if uids.is_empty() {
            return Ok(Vec::new());
        }

        // Build UID set (e.g., "1,2,5,10")
        let uid_set = uids
            .iter()
            .map(|u| u.to_string())
            .collect::<Vec<_>>()
            .join(",");

        debug!("Fetching {} emails with UIDs: {}", uids.len(), uid_set);

        let mut messages = self
            .session
            .uid_fetch(&uid_set, FETCH_ITEMS)
            .await
            .map_err(|e| SessionError::Protocol(e.to_string()))?;

        let mut results = Vec::with_capacity(uids.len());
        while let Some(message_result) = messages.next().await {
            let message = match message_result {
                Ok(message) => message,
                Err(e) => {
                    warn!("Error fetching message: {}", e);
                    continue;
                }
            };

            let Some(uid) = message.uid else {
                warn!("Fetched message without UID, skipping");
                continue;
            };

            let envelope_message_id = message
                .envelope()
                .and_then(|envelope| envelope.message_id.as_ref())
                .map(|id| String::from_utf8_lossy(id).trim().to_string())
                .filter(|id| !id.is_empty());

            results.push(FetchedMessage {
                uid,
                flags: message.flags().map(|f| flag_atom(&f)).collect(),
                internal_date: message.internal_date().map(|d| d.with_timezone(&Utc)),
                envelope_message_id,
                body: message.body().map(|b| b.to_vec()),
            });
        }

        debug!("Successfully fetched {} emails", results.len());
        Ok(results)
    }

    async fn list_folders(&mut self) -> Result<Vec<FolderRecord>, SessionError> {
        let mut names = self
            .session
            .list(Some(""), Some("*"))
            .await
            .map_err(|e| SessionError::Protocol(e.to_string()))?;

        let mut folders = Vec::new();
        while let Some(name) = names.next().await {
            let name = name.map_err(|e| SessionError::Protocol(e.to_string()))?;
            folders.push(FolderRecord {
                name: name.name().to_string(),
                delimiter: name.delimiter().map(|d| d.to_string()),
                selectable: !name
                    .attributes()
                    .iter()
                    .any(|a| matches!(a, NameAttribute::NoSelect)),
            });
        }

        debug!("Listed {} folders", folders.len());
        Ok(folders)
    }

    async fn logout(&mut self) -> Result<(), SessionError> {
        info!("Disconnecting from IMAP server");
        self.session
            .logout()
            .await
            .map_err(|e| SessionError::Protocol(e.to_string()))
    }
}
