//! Account settings lookup.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::connection::ConnectionConfig;
use crate::secrets::{resolve_secret, SecretError};

use super::schema::{AccountSettings, EngineConfig};

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Unknown account '{0}'")]
    UnknownAccount(String),

    #[error("Credentials for account '{account}' unavailable: {source}")]
    Credentials {
        account: String,
        #[source]
        source: SecretError,
    },
}

/// Supplies the IMAP connection parameters of an account.
#[async_trait]
pub trait SettingsProvider: Send + Sync {
    async fn imap_settings(&self, account_id: &str) -> Result<ConnectionConfig, SettingsError>;
}

/// Settings from the accounts of a loaded [`EngineConfig`].
///
/// Passwords are resolved on every lookup, so rotated secret files are
/// picked up without a restart.
#[derive(Debug, Clone)]
pub struct FileSettingsProvider {
    accounts: HashMap<String, AccountSettings>,
    operation_timeout: Duration,
}

impl FileSettingsProvider {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            accounts: config
                .accounts
                .iter()
                .map(|a| (a.id.clone(), a.clone()))
                .collect(),
            operation_timeout: Duration::from_millis(config.operation_timeout_ms),
        }
    }
}

#[async_trait]
impl SettingsProvider for FileSettingsProvider {
    async fn imap_settings(&self, account_id: &str) -> Result<ConnectionConfig, SettingsError> {
        let account = self
            .accounts
            .get(account_id)
            .ok_or_else(|| SettingsError::UnknownAccount(account_id.to_string()))?;

        if account.password.as_deref().is_some_and(|p| !p.is_empty()) {
            log::warn!(
                "Account '{}' uses a direct password value. \
                 Consider using passwordEnvVar or passwordFile instead.",
                account.id
            );
        }

        let password = resolve_secret(
            account.password.as_deref(),
            account.password_file.as_deref(),
            account.password_env_var.as_deref(),
        )
        .map_err(|source| SettingsError::Credentials {
            account: account.id.clone(),
            source,
        })?;

        Ok(ConnectionConfig::new(
            account.host.clone(),
            account.port,
            account.secure,
            account.username.clone(),
            password,
        )
        .with_operation_timeout(self.operation_timeout))
    }
}
