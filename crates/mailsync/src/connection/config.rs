//! Immutable connection parameters and the retry escalation ladder.

use std::fmt;
use std::time::Duration;

use secrecy::SecretString;
use serde::Serialize;

/// Port for IMAP over implicit TLS.
pub const IMPLICIT_TLS_PORT: u16 = 993;

/// Port for plaintext IMAP upgraded with STARTTLS.
pub const STARTTLS_PORT: u16 = 143;

/// Number of distinct rungs on the escalation ladder.
pub const LADDER_LEN: u32 = 3;

/// Default connect timeout when the caller supplies none.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(30_000);

/// Default bound for a single IMAP command after login.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(60);

/// Minimum TLS protocol version accepted during the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TlsVersion {
    Tls10,
    Tls11,
    Tls12,
}

impl From<TlsVersion> for async_native_tls::Protocol {
    fn from(version: TlsVersion) -> Self {
        match version {
            TlsVersion::Tls10 => async_native_tls::Protocol::Tlsv10,
            TlsVersion::Tls11 => async_native_tls::Protocol::Tlsv11,
            TlsVersion::Tls12 => async_native_tls::Protocol::Tlsv12,
        }
    }
}

/// Certificate and protocol checks applied to the TLS handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TlsOptions {
    pub accept_invalid_certs: bool,
    pub accept_invalid_hostnames: bool,
    pub min_protocol: Option<TlsVersion>,
}

impl Default for TlsOptions {
    fn default() -> Self {
        Self {
            accept_invalid_certs: false,
            accept_invalid_hostnames: false,
            min_protocol: Some(TlsVersion::Tls12),
        }
    }
}

/// Per-attempt time bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Wall-clock bound on TCP connect, TLS handshake and login together.
    pub connect: Duration,
    /// Bound on each IMAP command issued after login.
    pub operation: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: DEFAULT_CONNECT_TIMEOUT,
            operation: DEFAULT_OPERATION_TIMEOUT,
        }
    }
}

/// Login credentials. `Debug` never prints the password.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Everything needed for one connection attempt.
///
/// Values are never mutated between attempts; [`ConnectionConfig::for_attempt`]
/// derives a fresh config from the base for each rung of the ladder.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    /// Implicit TLS when true, STARTTLS upgrade when false.
    pub secure: bool,
    pub credentials: Credentials,
    pub tls: TlsOptions,
    pub timeouts: Timeouts,
}

/// The credential-free part of a config, used for logs and reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptProfile {
    pub host: String,
    pub port: u16,
    pub secure: bool,
    pub tls: TlsOptions,
    pub connect_timeout_ms: u64,
}

impl ConnectionConfig {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        secure: bool,
        username: impl Into<String>,
        password: SecretString,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            secure,
            credentials: Credentials {
                username: username.into(),
                password,
            },
            tls: TlsOptions::default(),
            timeouts: Timeouts::default(),
        }
    }

    /// Returns a copy with a different connect timeout.
    pub fn with_connect_timeout(&self, connect: Duration) -> Self {
        let mut config = self.clone();
        config.timeouts.connect = connect;
        config
    }

    /// Returns a copy with a different per-command timeout.
    pub fn with_operation_timeout(&self, operation: Duration) -> Self {
        let mut config = self.clone();
        config.timeouts.operation = operation;
        config
    }

    /// Derives the config for the given ladder rung.
    ///
    /// - 0: the base config unchanged.
    /// - 1: `secure` toggled (993 implicit TLS vs 143 STARTTLS), invalid
    ///   certificates accepted, connect timeout x1.5.
    /// - 2 and above: implicit TLS on 993, invalid certificates and
    ///   hostnames accepted, no minimum TLS version, connect timeout x2.
    pub fn for_attempt(&self, attempt: u32) -> Self {
        let mut config = self.clone();
        match attempt {
            0 => {}
            1 => {
                config.secure = !self.secure;
                config.port = if config.secure {
                    IMPLICIT_TLS_PORT
                } else {
                    STARTTLS_PORT
                };
                config.tls.accept_invalid_certs = true;
                config.timeouts.connect = self.timeouts.connect.mul_f64(1.5);
            }
            _ => {
                config.secure = true;
                config.port = IMPLICIT_TLS_PORT;
                config.tls = TlsOptions {
                    accept_invalid_certs: true,
                    accept_invalid_hostnames: true,
                    min_protocol: None,
                };
                config.timeouts.connect = self.timeouts.connect * 2;
            }
        }
        config
    }

    pub fn profile(&self) -> AttemptProfile {
        AttemptProfile {
            host: self.host.clone(),
            port: self.port,
            secure: self.secure,
            tls: self.tls,
            connect_timeout_ms: self.timeouts.connect.as_millis() as u64,
        }
    }
}
