use serde::{Deserialize, Serialize};

use crate::mail::parser::DEFAULT_MAX_ATTACHMENT_SIZE;

/// Top-level engine configuration, loaded from YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// SQLite database file; defaults to `~/.mailsync/data/mailsync.db`.
    #[serde(default)]
    pub database_path: Option<String>,
    #[serde(default)]
    pub time_check: TimeCheckConfig,
    /// Parsed messages buffered before one bulk insert.
    #[serde(default = "default_flush_threshold")]
    pub flush_threshold: usize,
    /// Bound on each IMAP command after login.
    #[serde(default = "default_operation_timeout_ms")]
    pub operation_timeout_ms: u64,
    #[serde(default)]
    pub attachments: AttachmentLimits,
    #[serde(default)]
    pub accounts: Vec<AccountSettings>,
}

fn default_flush_threshold() -> usize {
    50
}

fn default_operation_timeout_ms() -> u64 {
    60_000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            time_check: TimeCheckConfig::default(),
            flush_threshold: default_flush_threshold(),
            operation_timeout_ms: default_operation_timeout_ms(),
            attachments: AttachmentLimits::default(),
            accounts: Vec::new(),
        }
    }
}

/// Clock-skew pre-flight against an HTTP `Date` header.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeCheckConfig {
    /// Reference URL; the check is skipped when unset.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_tolerance_secs")]
    pub tolerance_secs: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_tolerance_secs() -> u64 {
    300
}

fn default_request_timeout_ms() -> u64 {
    5_000
}

impl Default for TimeCheckConfig {
    fn default() -> Self {
        Self {
            url: None,
            tolerance_secs: default_tolerance_secs(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentLimits {
    /// Larger attachments are dropped; the message is still stored.
    #[serde(default = "default_max_attachment_size")]
    pub max_size: u64,
}

fn default_max_attachment_size() -> u64 {
    DEFAULT_MAX_ATTACHMENT_SIZE
}

impl Default for AttachmentLimits {
    fn default() -> Self {
        Self {
            max_size: default_max_attachment_size(),
        }
    }
}

/// IMAP settings for one CRM email account.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSettings {
    pub id: String,
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Implicit TLS when true, STARTTLS when false.
    #[serde(default = "default_true")]
    pub secure: bool,
    pub username: String,
    /// Direct password value (insecure, for local testing).
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    /// Path to a file containing the password.
    #[serde(default)]
    pub password_file: Option<String>,
    /// Environment variable holding the password.
    #[serde(default)]
    pub password_env_var: Option<String>,
}

fn default_port() -> u16 {
    993
}

fn default_true() -> bool {
    true
}
