//! Connection and session error types.

use std::fmt;
use std::io;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Coarse failure bucket reported to callers after the ladder is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureCategory {
    Certificate,
    Authentication,
    Timeout,
    Network,
}

impl FailureCategory {
    /// Substring heuristic over a transport error message.
    ///
    /// Only used when the failure carries no structured signal. A timeout
    /// wins over the phase it happened in ("handshake timed out").
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();
        if ["timeout", "timed out"].iter().any(|needle| lower.contains(needle)) {
            FailureCategory::Timeout
        } else if ["certificate", "cert ", "self signed", "self-signed", "handshake"]
            .iter()
            .any(|needle| lower.contains(needle))
        {
            FailureCategory::Certificate
        } else if ["authenticat", "login", "credentials", "password"]
            .iter()
            .any(|needle| lower.contains(needle))
        {
            FailureCategory::Authentication
        } else {
            FailureCategory::Network
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCategory::Certificate => "certificate",
            FailureCategory::Authentication => "authentication",
            FailureCategory::Timeout => "timeout",
            FailureCategory::Network => "network",
        }
    }
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a single connection attempt failed.
#[derive(Error, Debug)]
pub enum ConnectFailure {
    /// Host name could not be resolved.
    #[error("DNS resolution failed for '{host}': {source}")]
    Resolve {
        host: String,
        #[source]
        source: io::Error,
    },

    /// TCP connect failed.
    #[error("IMAP connection failed: {0}")]
    Tcp(#[source] io::Error),

    /// TLS/SSL error during the handshake.
    #[error("TLS error: {0}")]
    Tls(String),

    /// The server greeting or STARTTLS exchange failed.
    #[error("IMAP handshake failed: {0}")]
    Handshake(String),

    /// The server rejected the credentials.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The attempt did not finish within its connect timeout.
    #[error("Connection attempt timed out after {} ms", .0.as_millis())]
    TimedOut(Duration),
}

impl ConnectFailure {
    /// Structured classification first, message heuristics as fallback.
    pub fn category(&self) -> FailureCategory {
        match self {
            ConnectFailure::Authentication(_) => FailureCategory::Authentication,
            ConnectFailure::TimedOut(_) => FailureCategory::Timeout,
            ConnectFailure::Resolve { .. } => FailureCategory::Network,
            ConnectFailure::Tcp(e) => match e.kind() {
                io::ErrorKind::TimedOut => FailureCategory::Timeout,
                io::ErrorKind::ConnectionRefused
                | io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::AddrNotAvailable => FailureCategory::Network,
                _ => FailureCategory::classify(&e.to_string()),
            },
            ConnectFailure::Tls(message) => match FailureCategory::classify(message) {
                FailureCategory::Authentication => FailureCategory::Certificate,
                other => other,
            },
            ConnectFailure::Handshake(message) => FailureCategory::classify(message),
        }
    }
}

/// Terminal failure after every ladder attempt failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{category} error after {attempts} attempt(s): {message}")]
pub struct ConnectionError {
    pub category: FailureCategory,
    /// Message of the last attempt's failure.
    pub message: String,
    pub attempts: u32,
}

impl ConnectionError {
    pub fn from_failure(failure: &ConnectFailure, attempts: u32) -> Self {
        Self {
            category: failure.category(),
            message: failure.to_string(),
            attempts,
        }
    }
}

/// Errors from commands issued on an authenticated session.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Folder does not exist on the server.
    #[error("IMAP folder '{0}' not found")]
    FolderNotFound(String),

    /// IMAP protocol error.
    #[error("IMAP protocol error: {0}")]
    Protocol(String),

    /// A command exceeded the operation timeout.
    #[error("IMAP {operation} timed out after {} ms", .after.as_millis())]
    Timeout {
        operation: &'static str,
        after: Duration,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_heuristics() {
        assert_eq!(
            FailureCategory::classify("invalid peer certificate: UnknownIssuer"),
            FailureCategory::Certificate
        );
        assert_eq!(
            FailureCategory::classify("NO [AUTHENTICATIONFAILED] Invalid credentials"),
            FailureCategory::Authentication
        );
        assert_eq!(
            FailureCategory::classify("operation timed out"),
            FailureCategory::Timeout
        );
        assert_eq!(
            FailureCategory::classify("connection refused"),
            FailureCategory::Network
        );
    }

    #[test]
    fn test_structured_classification_wins() {
        // Message says "certificate" but the server rejected the login.
        let failure = ConnectFailure::Authentication("certificate user unknown".to_string());
        assert_eq!(failure.category(), FailureCategory::Authentication);

        let timed_out = ConnectFailure::Tcp(io::Error::new(io::ErrorKind::TimedOut, "boom"));
        assert_eq!(timed_out.category(), FailureCategory::Timeout);

        let refused = ConnectFailure::Tcp(io::Error::new(
            io::ErrorKind::ConnectionRefused,
            "certificate",
        ));
        assert_eq!(refused.category(), FailureCategory::Network);

        assert_eq!(
            ConnectFailure::TimedOut(Duration::from_secs(1)).category(),
            FailureCategory::Timeout
        );
    }

    #[test]
    fn test_tls_failures_lean_to_certificate() {
        let failure = ConnectFailure::Tls("certificate verify failed".to_string());
        assert_eq!(failure.category(), FailureCategory::Certificate);

        let reset = ConnectFailure::Tls("connection reset by peer".to_string());
        assert_eq!(reset.category(), FailureCategory::Network);
    }

    #[test]
    fn test_handshake_timeout_is_timeout() {
        assert_eq!(
            FailureCategory::classify("TLS handshake timed out"),
            FailureCategory::Timeout
        );
        assert_eq!(
            ConnectFailure::Tls("handshake timeout".to_string()).category(),
            FailureCategory::Timeout
        );
        assert_eq!(
            ConnectFailure::Handshake("server greeting timed out".to_string()).category(),
            FailureCategory::Timeout
        );
        assert_eq!(
            FailureCategory::classify("handshake failure: bad record mac"),
            FailureCategory::Certificate
        );
    }

    #[test]
    fn test_connection_error_display() {
        let err = ConnectionError::from_failure(
            &ConnectFailure::TimedOut(Duration::from_millis(1500)),
            3,
        );
        assert_eq!(err.category, FailureCategory::Timeout);
        assert_eq!(
            err.to_string(),
            "timeout error after 3 attempt(s): Connection attempt timed out after 1500 ms"
        );
    }
}
