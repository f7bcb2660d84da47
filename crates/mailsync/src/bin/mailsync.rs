//! Command-line entry point for the mailbox sync engine.
//!
//! Responses are printed as JSON. A failed sync still exits with 0; the
//! body carries the status. Only startup errors exit non-zero.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use mailsync::config::{load_config, EngineConfig, FileSettingsProvider};
use mailsync::db::{default_database_path, Database, SqliteStore};
use mailsync::error::{ConfigError, MailsyncError};
use mailsync::sync::{
    EngineOptions, HttpDateClock, SyncEngine, SyncRequest, TestConnectionRequest,
};
use mailsync::ImapConnector;

#[derive(Debug, Parser)]
#[command(name = "mailsync", version, about = "Incremental IMAP mailbox sync")]
struct Cli {
    /// Engine configuration file (YAML)
    #[arg(long, short)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Sync one folder of an account into the local store
    Sync(SyncArgs),
    /// Check that an account's server is reachable and the login works
    TestConnection {
        #[arg(long)]
        account: String,
        /// Connection timeout per attempt, in milliseconds
        #[arg(long, default_value_t = 30_000)]
        timeout_ms: u64,
        /// Extra ladder attempts after the first
        #[arg(long, default_value_t = 2)]
        retries: u32,
    },
}

#[derive(Debug, clap::Args)]
struct SyncArgs {
    #[arg(long)]
    account: String,
    #[arg(long, default_value = "INBOX")]
    folder: String,
    /// Reset the stored cursor and resync from scratch
    #[arg(long)]
    force_refresh: bool,
    #[arg(long, default_value_t = 100)]
    max_emails: u32,
    #[arg(long, default_value_t = 10)]
    batch_size: u32,
    #[arg(long, default_value_t = 30_000)]
    timeout_ms: u64,
    #[arg(long, default_value_t = 2)]
    retries: u32,
    /// Keep the oldest messages when truncating
    #[arg(long)]
    oldest_first: bool,
    /// Ignore the stored cursor for this run
    #[arg(long)]
    full: bool,
    /// Only refresh the folder list
    #[arg(long)]
    folders_only: bool,
    /// Wall-clock budget for the whole run, in milliseconds
    #[arg(long)]
    deadline_ms: Option<u64>,
}

impl SyncArgs {
    fn into_request(self) -> SyncRequest {
        SyncRequest {
            account_id: self.account,
            folder: self.folder,
            force_refresh: self.force_refresh,
            max_emails: self.max_emails,
            batch_size: self.batch_size,
            connection_timeout_ms: self.timeout_ms,
            retry_attempts: self.retries,
            load_latest: !self.oldest_first,
            incremental_sync: !self.full,
            folder_sync_only: self.folders_only,
            deadline_ms: self.deadline_ms,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), MailsyncError> {
    let cli = Cli::parse();

    if let Err(e) = tracing_log::LogTracer::init() {
        eprintln!("log bridge unavailable: {}", e);
    }
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&cli.config)?;
    let engine = build_engine(&config)?;

    let body = match cli.command {
        Commands::Sync(args) => {
            let response = engine.sync(args.into_request()).await;
            serde_json::to_string_pretty(&response)?
        }
        Commands::TestConnection {
            account,
            timeout_ms,
            retries,
        } => {
            let request = TestConnectionRequest {
                account_id: account,
                connection_timeout_ms: timeout_ms,
                retry_attempts: retries,
            };
            let response = engine.test_connection(request).await;
            serde_json::to_string_pretty(&response)?
        }
    };
    println!("{}", body);
    Ok(())
}

fn build_engine(config: &EngineConfig) -> Result<SyncEngine, MailsyncError> {
    let db_path = match &config.database_path {
        Some(path) => PathBuf::from(path),
        None => default_database_path().ok_or_else(|| ConfigError::Validation {
            message: "databasePath is not set and no home directory was found".to_string(),
        })?,
    };
    let store = Arc::new(SqliteStore::new(Database::open(&db_path)?));

    let mut engine = SyncEngine::new(
        Arc::new(FileSettingsProvider::new(config)),
        store.clone(),
        store.clone(),
        store,
        Arc::new(ImapConnector::default()),
    )
    .with_options(EngineOptions {
        flush_threshold: config.flush_threshold,
        max_attachment_size: config.attachments.max_size,
        clock_tolerance: Duration::from_secs(config.time_check.tolerance_secs),
    });

    if let Some(url) = &config.time_check.url {
        let timeout = Duration::from_millis(config.time_check.request_timeout_ms);
        match HttpDateClock::new(url.clone(), timeout) {
            Ok(clock) => engine = engine.with_clock(Arc::new(clock)),
            Err(e) => warn!(error = %e, "Clock check disabled"),
        }
    }
    Ok(engine)
}
