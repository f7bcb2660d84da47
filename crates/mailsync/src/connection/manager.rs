//! Connection escalation ladder with a hard timeout per attempt.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::config::{ConnectionConfig, LADDER_LEN};
use super::diagnostics::{Diagnostics, ServerInfo, TestConnectionResponse};
use super::error::{ConnectFailure, ConnectionError, FailureCategory};
use super::session::{bounded, MailConnector, MailSession};

/// A session opened by the ladder, with the parameters that worked.
pub struct Connected {
    pub session: Box<dyn MailSession>,
    pub config: ConnectionConfig,
    /// 1-based number of attempts it took.
    pub attempts: u32,
}

/// Opens sessions through the escalation ladder.
#[derive(Clone)]
pub struct ConnectionManager {
    connector: Arc<dyn MailConnector>,
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn MailConnector>) -> Self {
        Self { connector }
    }

    /// Number of attempts made for a given retry count.
    pub fn attempt_count(retry_attempts: u32) -> u32 {
        retry_attempts.saturating_add(1).min(LADDER_LEN)
    }

    /// Walks the ladder until one attempt yields a session.
    ///
    /// Each attempt races the connector against its own connect timeout;
    /// a connector that never resolves loses the race.
    pub async fn connect(
        &self,
        base: &ConnectionConfig,
        retry_attempts: u32,
    ) -> Result<Connected, ConnectionError> {
        let max_attempts = Self::attempt_count(retry_attempts);
        let mut last_failure = None;

        for attempt in 0..max_attempts {
            let config = base.for_attempt(attempt);
            info!(
                attempt = attempt + 1,
                max_attempts,
                host = %config.host,
                port = config.port,
                secure = config.secure,
                accept_invalid_certs = config.tls.accept_invalid_certs,
                accept_invalid_hostnames = config.tls.accept_invalid_hostnames,
                min_tls = ?config.tls.min_protocol,
                timeout_ms = config.timeouts.connect.as_millis() as u64,
                "Connecting to IMAP server"
            );

            let outcome =
                tokio::time::timeout(config.timeouts.connect, self.connector.connect(&config))
                    .await;
            let failure = match outcome {
                Ok(Ok(session)) => {
                    info!(attempt = attempt + 1, "IMAP connection established");
                    return Ok(Connected {
                        session,
                        config,
                        attempts: attempt + 1,
                    });
                }
                Ok(Err(failure)) => failure,
                Err(_) => ConnectFailure::TimedOut(config.timeouts.connect),
            };

            warn!(
                attempt = attempt + 1,
                category = %failure.category(),
                error = %failure,
                "IMAP connection attempt failed"
            );
            last_failure = Some(failure);
        }

        let error = match last_failure {
            Some(failure) => ConnectionError::from_failure(&failure, max_attempts),
            None => ConnectionError {
                category: FailureCategory::Network,
                message: "no connection attempts were made".to_string(),
                attempts: 0,
            },
        };
        warn!(category = %error.category, attempts = error.attempts, "IMAP connection ladder exhausted");
        Err(error)
    }

    /// Diagnostic connect: runs the ladder, lists folders and examines INBOX.
    ///
    /// Never touches sync state.
    pub async fn test_connection(
        &self,
        base: &ConnectionConfig,
        retry_attempts: u32,
    ) -> TestConnectionResponse {
        let Connected {
            mut session,
            config,
            attempts,
        } = match self.connect(base, retry_attempts).await {
            Ok(connected) => connected,
            Err(error) => return TestConnectionResponse::from_connection_error(&error),
        };

        let operation = config.timeouts.operation;
        let folders = bounded("LIST", operation, session.list_folders()).await;
        let inbox = bounded("EXAMINE", operation, session.examine("INBOX")).await;

        if let Err(e) = bounded("LOGOUT", operation, session.logout()).await {
            debug!(error = %e, "Logout after connection test failed");
        }

        let folders = match folders {
            Ok(folders) => folders,
            Err(e) => {
                return TestConnectionResponse::failed(
                    format!("Connected, but listing folders failed: {}", e),
                    Diagnostics::default(),
                )
            }
        };
        let inbox = match inbox {
            Ok(inbox) => Some(inbox),
            Err(e) => {
                warn!(error = %e, "INBOX could not be examined during connection test");
                None
            }
        };

        let names: Vec<String> = folders.into_iter().map(|f| f.name).collect();
        TestConnectionResponse {
            success: true,
            message: format!(
                "Connected to {}:{} after {} attempt(s); {} folder(s) found",
                config.host,
                config.port,
                attempts,
                names.len()
            ),
            server_info: Some(ServerInfo {
                connection: config.profile(),
                attempts,
                inbox_messages: inbox.map(|i| i.exists),
                inbox_uid_validity: inbox.and_then(|i| i.uid_validity),
            }),
            folders: Some(names),
            diagnostics: Diagnostics::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attempt_count_is_capped() {
        assert_eq!(ConnectionManager::attempt_count(0), 1);
        assert_eq!(ConnectionManager::attempt_count(1), 2);
        assert_eq!(ConnectionManager::attempt_count(2), 3);
        assert_eq!(ConnectionManager::attempt_count(10), 3);
        assert_eq!(ConnectionManager::attempt_count(u32::MAX), 3);
    }
}
