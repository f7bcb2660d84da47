use std::collections::HashSet;
use std::path::Path;

use crate::config::schema::{AccountSettings, EngineConfig};
use crate::error::ConfigError;
use crate::secrets::has_secret_source;

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<EngineConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<EngineConfig, ConfigError> {
    let config: EngineConfig = serde_yaml::from_str(content)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_config(config: &EngineConfig) -> Result<(), ConfigError> {
    if config.flush_threshold == 0 {
        return Err(ConfigError::Validation {
            message: "flushThreshold must be at least 1".to_string(),
        });
    }

    if config.operation_timeout_ms == 0 {
        return Err(ConfigError::Validation {
            message: "operationTimeoutMs must be at least 1".to_string(),
        });
    }

    if let Some(url) = &config.time_check.url {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ConfigError::Validation {
                message: format!("timeCheck.url must be an http(s) URL, got '{}'", url),
            });
        }
    }

    let mut account_ids = HashSet::new();
    for account in &config.accounts {
        if !account_ids.insert(account.id.as_str()) {
            return Err(ConfigError::InvalidAccount {
                id: account.id.clone(),
                reason: "Duplicate account ID".to_string(),
            });
        }
        validate_account(account)?;
    }

    Ok(())
}

fn validate_account(account: &AccountSettings) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidAccount {
        id: account.id.clone(),
        reason: reason.to_string(),
    };

    if account.id.trim().is_empty() {
        return Err(invalid("Account ID must not be empty"));
    }
    if account.host.trim().is_empty() {
        return Err(invalid("Host must not be empty"));
    }
    if account.port == 0 {
        return Err(invalid("Port must not be 0"));
    }
    if account.username.trim().is_empty() {
        return Err(invalid("Username must not be empty"));
    }
    if !has_secret_source(
        account.password.as_deref(),
        account.password_file.as_deref(),
        account.password_env_var.as_deref(),
    ) {
        return Err(invalid(
            "One of password, passwordFile or passwordEnvVar is required",
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_valid_config() {
        let config_yaml = r#"
databasePath: /tmp/mailsync.db
flushThreshold: 25
timeCheck:
  url: https://www.google.com
accounts:
  - id: sales
    host: imap.example.com
    username: sales@example.com
    passwordEnvVar: SALES_IMAP_PASSWORD
  - id: support
    host: mail.example.org
    port: 143
    secure: false
    username: support
    passwordFile: /run/secrets/support
"#;

        let config = load_config_from_str(config_yaml).unwrap();
        assert_eq!(config.database_path.as_deref(), Some("/tmp/mailsync.db"));
        assert_eq!(config.flush_threshold, 25);
        assert_eq!(config.operation_timeout_ms, 60_000);
        assert_eq!(config.time_check.tolerance_secs, 300);
        assert_eq!(config.accounts.len(), 2);
        assert_eq!(config.accounts[0].port, 993);
        assert!(config.accounts[0].secure);
        assert_eq!(config.accounts[1].port, 143);
        assert!(!config.accounts[1].secure);
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = load_config_from_str("{}").unwrap();
        assert_eq!(config.flush_threshold, 50);
        assert!(config.accounts.is_empty());
        assert!(config.time_check.url.is_none());
    }

    #[test]
    fn test_duplicate_account_ids() {
        let config_yaml = r#"
accounts:
  - { id: a, host: h, username: u, password: p }
  - { id: a, host: h2, username: u2, password: p2 }
"#;
        let result = load_config_from_str(config_yaml);
        assert!(matches!(result, Err(ConfigError::InvalidAccount { .. })));
    }

    #[test]
    fn test_empty_host_rejected() {
        let config_yaml = r#"
accounts:
  - { id: a, host: "", username: u, password: p }
"#;
        assert!(load_config_from_str(config_yaml).is_err());
    }

    #[test]
    fn test_missing_secret_source_rejected() {
        let config_yaml = r#"
accounts:
  - { id: a, host: h, username: u }
"#;
        assert!(load_config_from_str(config_yaml).is_err());
    }

    #[test]
    fn test_zero_flush_threshold_rejected() {
        let result = load_config_from_str("flushThreshold: 0");
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_invalid_time_check_url() {
        let result = load_config_from_str("timeCheck:\n  url: ftp://clock");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "operationTimeoutMs: 1500").unwrap();
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.operation_timeout_ms, 1500);

        let missing = load_config("/definitely/not/here.yaml");
        assert!(matches!(missing, Err(ConfigError::ReadFile { .. })));
    }
}
