//! Top-level sync driver.
//!
//! One run walks `Connecting → Enumerating → FetchingBatch(n) → Flushing →
//! Completing → Idle`, or ends in `Failed`. The session is logged out on
//! every exit path once connected, and every outcome is reported as a
//! [`SyncResponse`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};

use crate::config::SettingsProvider;
use crate::connection::session::bounded;
use crate::connection::{
    ConnectionManager, Diagnostics, MailConnector, MailSession, TestConnectionResponse,
};
use crate::error::SyncError;
use crate::mail::EmailParser;
use crate::mail::parser::DEFAULT_MAX_ATTACHMENT_SIZE;
use crate::status::{SyncCursor, SyncStatusStore};
use crate::store::{LeadDirectory, MessageStore};

use super::clock::{check_clock_skew, ClockReference};
use super::enumerator::{enumerate, EnumerateOptions};
use super::leads::LeadResolver;
use super::pipeline::{Pipeline, PipelineConfig, PipelineOutcome, PipelineStop, StopSignal};
use super::progress::{percent, BatchProgress, ProgressSink, SyncState};
use super::request::{BatchProcessing, SyncRequest, SyncResponse, TestConnectionRequest};
use super::writer::BatchWriter;

/// Status key under which folder-list refreshes record their bookkeeping,
/// so they never touch a real folder's cursor.
pub const FOLDER_LIST_KEY: &str = "[folders]";

/// Engine-wide tunables, usually taken from the config file.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub flush_threshold: usize,
    pub max_attachment_size: u64,
    pub clock_tolerance: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            flush_threshold: 50,
            max_attachment_size: DEFAULT_MAX_ATTACHMENT_SIZE,
            clock_tolerance: Duration::from_secs(300),
        }
    }
}

/// Handle to a spawned sync run.
pub struct SyncHandle {
    cancel: CancellationToken,
    state: watch::Receiver<SyncState>,
    task: JoinHandle<SyncResponse>,
}

impl SyncHandle {
    /// Requests a cooperative stop; the run flushes and reports a partial result.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn state(&self) -> SyncState {
        *self.state.borrow()
    }

    /// A receiver that observes every state change.
    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.state.clone()
    }

    pub async fn join(self) -> SyncResponse {
        match self.task.await {
            Ok(response) => response,
            Err(e) => {
                error!(error = %e, "Sync task did not complete");
                let err = SyncError::Cancelled(format!("sync task aborted: {}", e));
                SyncResponse::failed("Sync task aborted", &err)
            }
        }
    }
}

/// Mailbox synchronization engine.
#[derive(Clone)]
pub struct SyncEngine {
    settings: Arc<dyn SettingsProvider>,
    status: Arc<dyn SyncStatusStore>,
    messages: Arc<dyn MessageStore>,
    leads: Arc<dyn LeadDirectory>,
    connections: ConnectionManager,
    clock: Option<Arc<dyn ClockReference>>,
    options: EngineOptions,
}

enum RunResult {
    Folders(usize),
    Empty { folder_total: u32 },
    Pipeline(PipelineOutcome, usize),
}

/// Forwards pipeline progress to the status store and the state channel.
struct StatusProgress<'a> {
    status: &'a dyn SyncStatusStore,
    state: &'a watch::Sender<SyncState>,
    account_id: &'a str,
    folder: &'a str,
}

#[async_trait]
impl ProgressSink for StatusProgress<'_> {
    fn on_state(&self, state: SyncState) {
        self.state.send_replace(state);
    }

    async fn on_batch(&self, progress: &BatchProgress) {
        info!(
            batch = progress.batch_index,
            completed = progress.batches_completed,
            total = progress.total_batches,
            inserted = progress.inserted,
            percent = progress.percent(),
            "Batch complete"
        );
        if let Err(e) = self
            .status
            .update_progress(
                self.account_id,
                self.folder,
                progress.processed,
                progress.checkpoint_uid,
                progress.total_items,
            )
            .await
        {
            warn!(error = %e, "Failed to record sync progress");
        }
    }
}

impl SyncEngine {
    pub fn new(
        settings: Arc<dyn SettingsProvider>,
        status: Arc<dyn SyncStatusStore>,
        messages: Arc<dyn MessageStore>,
        leads: Arc<dyn LeadDirectory>,
        connector: Arc<dyn MailConnector>,
    ) -> Self {
        Self {
            settings,
            status,
            messages,
            leads,
            connections: ConnectionManager::new(connector),
            clock: None,
            options: EngineOptions::default(),
        }
    }

    /// Enables the clock-skew pre-flight.
    pub fn with_clock(mut self, clock: Arc<dyn ClockReference>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    /// Runs one sync to completion.
    pub async fn sync(&self, request: SyncRequest) -> SyncResponse {
        let (state, _) = watch::channel(SyncState::Idle);
        self.run(request, CancellationToken::new(), state).await
    }

    /// Runs a sync on a background task.
    pub fn spawn(&self, request: SyncRequest) -> SyncHandle {
        let cancel = CancellationToken::new();
        let (state_tx, state_rx) = watch::channel(SyncState::Idle);
        let engine = self.clone();
        let token = cancel.clone();
        let task = tokio::spawn(async move { engine.run(request, token, state_tx).await });
        SyncHandle {
            cancel,
            state: state_rx,
            task,
        }
    }

    /// Connectivity self-test. Never touches sync state.
    pub async fn test_connection(&self, request: TestConnectionRequest) -> TestConnectionResponse {
        let span = info_span!("test_connection", account = %request.account_id);
        async {
            let base = match self.settings.imap_settings(&request.account_id).await {
                Ok(base) => base,
                Err(e) => {
                    warn!(error = %e, "Account settings unavailable");
                    return TestConnectionResponse::failed(
                        format!("Account settings unavailable: {}", e),
                        Diagnostics::default(),
                    );
                }
            };
            let base =
                base.with_connect_timeout(Duration::from_millis(request.connection_timeout_ms));
            self.connections
                .test_connection(&base, request.retry_attempts)
                .await
        }
        .instrument(span)
        .await
    }

    async fn run(
        &self,
        request: SyncRequest,
        cancel: CancellationToken,
        state: watch::Sender<SyncState>,
    ) -> SyncResponse {
        let span = info_span!(
            "mailbox_sync",
            account = %request.account_id,
            folder = %request.folder
        );
        let stop = StopSignal::new(
            cancel,
            request
                .deadline_ms
                .map(|ms| Instant::now() + Duration::from_millis(ms)),
        );
        let response = self.run_inner(&request, &stop, &state).instrument(span).await;
        state.send_replace(SyncState::Idle);
        response
    }

    async fn run_inner(
        &self,
        request: &SyncRequest,
        stop: &StopSignal,
        state: &watch::Sender<SyncState>,
    ) -> SyncResponse {
        let account_id = request.account_id.as_str();
        let status_key = if request.folder_sync_only {
            FOLDER_LIST_KEY
        } else {
            request.folder.as_str()
        };

        state.send_replace(SyncState::Connecting);
        match self.status.mark_started(account_id, status_key).await {
            Ok(true) => warn!("Previous sync is still marked in progress (concurrent run or crash)"),
            Ok(false) => {}
            Err(e) => {
                state.send_replace(SyncState::Failed);
                return SyncResponse::failed("Failed to record sync start", &e.into());
            }
        }

        if let Err(e) = self.prepare(request, status_key).await {
            return self.fail(request, status_key, state, e, None).await;
        }

        let base = match self.settings.imap_settings(account_id).await {
            Ok(base) => base,
            Err(e) => return self.fail(request, status_key, state, e.into(), None).await,
        };
        let base = base.with_connect_timeout(Duration::from_millis(request.connection_timeout_ms));
        let operation_timeout = base.timeouts.operation;

        let connected = match self.connections.connect(&base, request.retry_attempts).await {
            Ok(connected) => connected,
            Err(e) => return self.fail(request, status_key, state, e.into(), None).await,
        };
        let mut session = connected.session;

        let result = self
            .drive(request, session.as_mut(), operation_timeout, stop, state)
            .await;

        // Released on every path once connected.
        if let Err(e) = bounded("LOGOUT", operation_timeout, session.logout()).await {
            warn!(error = %e, "Logout failed");
        }
        drop(session);

        match result {
            Ok(outcome) => self.finish(request, status_key, state, outcome).await,
            Err(e) => self.fail(request, status_key, state, e, None).await,
        }
    }

    /// Resets for forced resyncs and runs the clock pre-flight.
    async fn prepare(&self, request: &SyncRequest, status_key: &str) -> Result<(), SyncError> {
        if request.force_refresh && !request.folder_sync_only {
            info!("Forced refresh, resetting sync cursor");
            self.status
                .reset_cursor(&request.account_id, status_key)
                .await?;
        }
        if let Some(clock) = &self.clock {
            check_clock_skew(clock.as_ref(), self.options.clock_tolerance).await?;
        }
        Ok(())
    }

    async fn drive(
        &self,
        request: &SyncRequest,
        session: &mut dyn MailSession,
        operation_timeout: Duration,
        stop: &StopSignal,
        state: &watch::Sender<SyncState>,
    ) -> Result<RunResult, SyncError> {
        let account_id = request.account_id.as_str();
        let folder = request.folder.as_str();

        if request.folder_sync_only {
            let folders = bounded("LIST", operation_timeout, session.list_folders()).await?;
            let count = self.messages.upsert_folders(account_id, &folders).await?;
            info!(folders = count, "Folder list refreshed");
            return Ok(RunResult::Folders(count));
        }

        state.send_replace(SyncState::Enumerating);
        let cursor: Option<SyncCursor> = self.status.read(account_id, folder).await?;
        let options = EnumerateOptions {
            max_emails: request.max_emails,
            load_latest: request.load_latest,
            use_cursor: request.uses_cursor(),
            operation_timeout,
        };
        let enumeration = enumerate(session, folder, cursor.as_ref(), &options).await?;

        if enumeration.uid_validity_changed {
            self.status.reset_cursor(account_id, folder).await?;
        }
        if let Some(current) = enumeration.uid_validity {
            let stored = cursor.as_ref().and_then(|c| c.uid_validity);
            if enumeration.uid_validity_changed || stored != Some(current) {
                self.status
                    .record_uid_validity(account_id, folder, current)
                    .await?;
            }
        }

        if enumeration.uids.is_empty() {
            return Ok(RunResult::Empty {
                folder_total: enumeration.folder_total,
            });
        }

        let uid_validity = enumeration.uid_validity.unwrap_or(0);
        let known = self
            .messages
            .known_messages(account_id, folder, uid_validity)
            .await?;
        let batch_size = request.batch_size.max(1) as usize;
        let mut pipeline = Pipeline::new(
            PipelineConfig {
                account_id: account_id.to_string(),
                folder: folder.to_string(),
                uid_validity,
                batch_size,
                operation_timeout,
            },
            EmailParser::new(self.options.max_attachment_size),
            LeadResolver::new(self.leads.clone()),
            BatchWriter::new(self.messages.clone(), self.options.flush_threshold),
            known,
        );
        let sink = StatusProgress {
            status: self.status.as_ref(),
            state,
            account_id,
            folder,
        };
        let outcome = pipeline
            .run(session, &enumeration.uids, &sink, stop)
            .await;
        Ok(RunResult::Pipeline(outcome, batch_size))
    }

    async fn finish(
        &self,
        request: &SyncRequest,
        status_key: &str,
        state: &watch::Sender<SyncState>,
        result: RunResult,
    ) -> SyncResponse {
        let account_id = request.account_id.as_str();
        state.send_replace(SyncState::Completing);

        match result {
            RunResult::Folders(count) => {
                if let Err(e) = self.status.mark_completed(account_id, status_key, None).await {
                    return self.fail(request, status_key, state, e.into(), None).await;
                }
                SyncResponse {
                    folder_count: Some(count),
                    ..SyncResponse::succeeded(format!("Synced {} folders", count))
                }
            }
            RunResult::Empty { folder_total } => {
                if let Err(e) = self.status.mark_completed(account_id, status_key, None).await {
                    return self.fail(request, status_key, state, e.into(), None).await;
                }
                info!(folder_total, "No new messages");
                SyncResponse {
                    emails_count: Some(0),
                    progress: Some(100),
                    ..SyncResponse::succeeded("No new emails to sync")
                }
            }
            RunResult::Pipeline(mut outcome, batch_size) => {
                let batch_processing = BatchProcessing {
                    total_batches: outcome.total_batches,
                    completed_batches: outcome.batches_completed,
                    emails_per_batch: batch_size,
                };
                let progress = percent(outcome.batches_completed, outcome.total_batches);

                let err = match outcome.stopped.take() {
                    None => {
                        if let Err(e) = self
                            .status
                            .update_progress(
                                account_id,
                                status_key,
                                outcome.processed,
                                outcome.checkpoint_uid,
                                outcome.total_items,
                            )
                            .await
                        {
                            warn!(error = %e, "Failed to record final progress");
                        }
                        if let Err(e) = self
                            .status
                            .mark_completed(account_id, status_key, outcome.checkpoint_uid)
                            .await
                        {
                            return self.fail(request, status_key, state, e.into(), Some(&outcome)).await;
                        }
                        info!(
                            inserted = outcome.inserted,
                            skipped = outcome.skipped,
                            failed = outcome.failed,
                            last_uid = ?outcome.checkpoint_uid,
                            "Sync completed"
                        );
                        return SyncResponse {
                            emails_count: Some(outcome.inserted),
                            progress: Some(progress),
                            batch_processing: Some(batch_processing),
                            ..SyncResponse::succeeded(format!(
                                "Synced {} new emails ({} skipped, {} failed to parse)",
                                outcome.inserted, outcome.skipped, outcome.failed
                            ))
                        };
                    }
                    Some(PipelineStop::Cancelled(reason)) => SyncError::Cancelled(reason),
                    Some(PipelineStop::Failed(e)) => e,
                };

                if let Err(e) = self
                    .status
                    .update_progress(
                        account_id,
                        status_key,
                        outcome.processed,
                        outcome.checkpoint_uid,
                        outcome.total_items,
                    )
                    .await
                {
                    warn!(error = %e, "Failed to record partial progress");
                }
                let mut response = self
                    .fail(request, status_key, state, err, Some(&outcome))
                    .await;
                response.progress = Some(progress);
                response.batch_processing = Some(batch_processing);
                response
            }
        }
    }

    async fn fail(
        &self,
        request: &SyncRequest,
        status_key: &str,
        state: &watch::Sender<SyncState>,
        err: SyncError,
        outcome: Option<&PipelineOutcome>,
    ) -> SyncResponse {
        state.send_replace(SyncState::Failed);
        error!(error = %err, kind = err.kind(), "Sync failed");

        if let Err(e) = self
            .status
            .mark_failed(&request.account_id, status_key, &err.to_string())
            .await
        {
            warn!(error = %e, "Failed to record sync failure");
        }

        let message = match (&err, outcome) {
            (SyncError::Cancelled(_), Some(outcome)) => format!(
                "Sync stopped early after {} new emails",
                outcome.inserted
            ),
            (SyncError::Cancelled(_), None) => "Sync stopped early".to_string(),
            _ => "Sync failed".to_string(),
        };
        SyncResponse {
            emails_count: outcome.map(|o| o.inserted),
            ..SyncResponse::failed(message, &err)
        }
    }
}
