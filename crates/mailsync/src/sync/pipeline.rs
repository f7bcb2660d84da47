//! Batch fetch, dedupe, parse and persist.
//!
//! UIDs are processed in consecutive batches with one fetch round trip per
//! batch, so at most one batch of raw bodies is alive at a time. Known
//! messages are skipped on their UID or envelope Message-ID before the body
//! is parsed.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::connection::session::bounded;
use crate::connection::{FetchedMessage, MailSession};
use crate::error::SyncError;
use crate::mail::{normalize_message_id, EmailParser};
use crate::store::{EmailRecord, KnownMessages};

use super::leads::LeadResolver;
use super::progress::{BatchProgress, ProgressSink, SyncState};
use super::writer::{BatchWriter, FlushReport, PendingEmail};

/// Cooperative stop conditions checked between batches and raced against fetches.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl StopSignal {
    pub fn new(token: CancellationToken, deadline: Option<Instant>) -> Self {
        Self { token, deadline }
    }

    /// Why the run must stop now, if it must.
    pub fn check(&self) -> Option<String> {
        if self.token.is_cancelled() {
            Some("cancelled by caller".to_string())
        } else if self.deadline.is_some_and(|d| Instant::now() >= d) {
            Some("deadline exceeded".to_string())
        } else {
            None
        }
    }

    /// Resolves once the token is cancelled or the deadline passes.
    pub async fn triggered(&self) -> String {
        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            _ = self.token.cancelled() => "cancelled by caller".to_string(),
            _ = deadline => "deadline exceeded".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub account_id: String,
    pub folder: String,
    /// Epoch the fetched UIDs belong to; 0 when the server reported none.
    pub uid_validity: u32,
    pub batch_size: usize,
    pub operation_timeout: Duration,
}

/// Why a pipeline ended before its last batch.
#[derive(Debug)]
pub enum PipelineStop {
    Cancelled(String),
    Failed(SyncError),
}

#[derive(Debug, Default)]
pub struct PipelineOutcome {
    pub total_items: u64,
    /// Messages returned by fetches.
    pub processed: u64,
    pub inserted: u64,
    /// Already known, by UID or Message-ID.
    pub skipped: u64,
    /// Could not be parsed.
    pub failed: u64,
    /// Messages lost to a rejected bulk insert.
    pub dropped: u64,
    pub attachments: u64,
    /// Highest fetched UID, counted before any filtering.
    pub max_uid_seen: Option<u32>,
    /// Highest UID below which every message is settled; the cursor value.
    pub checkpoint_uid: Option<u32>,
    pub batches_completed: usize,
    pub total_batches: usize,
    pub stopped: Option<PipelineStop>,
}

pub struct Pipeline {
    config: PipelineConfig,
    parser: EmailParser,
    leads: LeadResolver,
    writer: BatchWriter,
    known: KnownMessages,
    lowest_dropped_uid: Option<u32>,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        parser: EmailParser,
        leads: LeadResolver,
        writer: BatchWriter,
        known: KnownMessages,
    ) -> Self {
        Self {
            config,
            parser,
            leads,
            writer,
            known,
            lowest_dropped_uid: None,
        }
    }

    /// Runs every batch of `uids` (ascending) unless stopped.
    ///
    /// The buffer is always flushed before returning, also when stopped.
    pub async fn run(
        &mut self,
        session: &mut dyn MailSession,
        uids: &[u32],
        sink: &dyn ProgressSink,
        stop: &StopSignal,
    ) -> PipelineOutcome {
        let batch_size = self.config.batch_size.max(1);
        let mut outcome = PipelineOutcome {
            total_items: uids.len() as u64,
            total_batches: uids.len().div_ceil(batch_size),
            ..PipelineOutcome::default()
        };

        info!(
            total_items = outcome.total_items,
            total_batches = outcome.total_batches,
            batch_size,
            "Starting batch pipeline"
        );

        for (index, chunk) in uids.chunks(batch_size).enumerate() {
            if let Some(reason) = stop.check() {
                outcome.stopped = Some(PipelineStop::Cancelled(reason));
                break;
            }

            sink.on_state(SyncState::FetchingBatch(index));
            let fetch = bounded(
                "FETCH",
                self.config.operation_timeout,
                session.fetch_batch(chunk),
            );
            let fetched = tokio::select! {
                reason = stop.triggered() => {
                    outcome.stopped = Some(PipelineStop::Cancelled(reason));
                    break;
                }
                result = fetch => match result {
                    Ok(fetched) => fetched,
                    Err(e) => {
                        warn!(batch = index, error = %e, "Batch fetch failed");
                        outcome.stopped = Some(PipelineStop::Failed(e.into()));
                        break;
                    }
                },
            };

            debug!(batch = index, requested = chunk.len(), fetched = fetched.len(), "Fetched batch");
            self.process_batch(fetched, sink, &mut outcome).await;

            outcome.batches_completed += 1;
            outcome.checkpoint_uid = self.checkpoint(outcome.max_uid_seen);
            sink.on_batch(&BatchProgress {
                batch_index: index,
                batches_completed: outcome.batches_completed,
                total_batches: outcome.total_batches,
                total_items: outcome.total_items,
                processed: outcome.processed,
                inserted: outcome.inserted,
                skipped: outcome.skipped,
                failed: outcome.failed,
                checkpoint_uid: outcome.checkpoint_uid,
            })
            .await;
        }

        if !self.writer.is_empty() {
            sink.on_state(SyncState::Flushing);
            let report = self.writer.flush().await;
            self.apply_flush(report, &mut outcome);
        }
        outcome.checkpoint_uid = self.checkpoint(outcome.max_uid_seen);

        info!(
            processed = outcome.processed,
            inserted = outcome.inserted,
            skipped = outcome.skipped,
            failed = outcome.failed,
            dropped = outcome.dropped,
            checkpoint_uid = ?outcome.checkpoint_uid,
            "Batch pipeline finished"
        );
        outcome
    }

    async fn process_batch(
        &mut self,
        fetched: Vec<FetchedMessage>,
        sink: &dyn ProgressSink,
        outcome: &mut PipelineOutcome,
    ) {
        for message in fetched {
            outcome.processed += 1;
            outcome.max_uid_seen = outcome.max_uid_seen.max(Some(message.uid));

            let envelope_id = message
                .envelope_message_id
                .as_deref()
                .map(normalize_message_id);
            if self.known.contains(message.uid, envelope_id.as_deref()) {
                debug!(uid = message.uid, "Skipping known message");
                outcome.skipped += 1;
                continue;
            }

            let parsed = match self.parser.parse(
                &self.config.account_id,
                &self.config.folder,
                &message,
            ) {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!(uid = message.uid, error = %e, "Skipping unparseable message");
                    outcome.failed += 1;
                    continue;
                }
            };
            // Raw body is no longer needed.
            drop(message);

            let mut email = parsed.message;
            if self.known.contains(email.uid, Some(&email.message_id)) {
                debug!(uid = email.uid, message_id = %email.message_id, "Skipping known Message-ID");
                outcome.skipped += 1;
                continue;
            }
            self.known.insert(email.uid, &email.message_id);

            email.lead_id = self
                .leads
                .resolve(email.from_email.as_deref(), email.to_email.as_deref())
                .await;

            let record = EmailRecord::from_parsed(
                &self.config.account_id,
                &self.config.folder,
                self.config.uid_validity,
                email,
            );
            let full = self.writer.push(PendingEmail {
                record,
                attachments: parsed.attachments,
            });
            if full {
                sink.on_state(SyncState::Flushing);
                let report = self.writer.flush().await;
                self.apply_flush(report, outcome);
            }
        }
    }

    fn apply_flush(&mut self, report: FlushReport, outcome: &mut PipelineOutcome) {
        outcome.inserted += report.inserted as u64;
        outcome.attachments += report.attachments_written as u64;
        outcome.dropped += report.dropped_uids.len() as u64;
        if let Some(lowest) = report.dropped_uids.iter().copied().min() {
            self.lowest_dropped_uid =
                Some(self.lowest_dropped_uid.map_or(lowest, |d| d.min(lowest)));
        }
    }

    /// The cursor may not pass a buffered or dropped message, so the next
    /// run picks those up again. `Some(0)` is a real cursor meaning
    /// "resume from UID 1".
    fn checkpoint(&self, max_uid_seen: Option<u32>) -> Option<u32> {
        let blockers = [self.writer.lowest_pending_uid(), self.lowest_dropped_uid];
        let limit = blockers
            .into_iter()
            .flatten()
            .min()
            .map(|blocker| blocker.saturating_sub(1));
        let checkpoint = match (max_uid_seen, limit) {
            (Some(seen), Some(limit)) => Some(seen.min(limit)),
            (seen, None) => seen,
            (None, Some(_)) => None,
        };
        checkpoint
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::db::{Database, SqliteStore};

    fn pipeline() -> Pipeline {
        let store = Arc::new(SqliteStore::new(Database::open_in_memory().unwrap()));
        Pipeline::new(
            PipelineConfig {
                account_id: "acc".to_string(),
                folder: "INBOX".to_string(),
                uid_validity: 1,
                batch_size: 10,
                operation_timeout: Duration::from_secs(5),
            },
            EmailParser::new(1024),
            LeadResolver::new(store.clone()),
            BatchWriter::new(store, 10),
            KnownMessages::default(),
        )
    }

    #[test]
    fn test_checkpoint_held_below_dropped_uid() {
        let mut pipeline = pipeline();
        assert_eq!(pipeline.checkpoint(None), None);
        assert_eq!(pipeline.checkpoint(Some(9)), Some(9));

        pipeline.lowest_dropped_uid = Some(4);
        assert_eq!(pipeline.checkpoint(Some(9)), Some(3));
    }

    #[test]
    fn test_checkpoint_zero_when_first_uid_dropped() {
        let mut pipeline = pipeline();
        pipeline.lowest_dropped_uid = Some(1);
        assert_eq!(pipeline.checkpoint(Some(9)), Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_signal_deadline() {
        let signal = StopSignal::new(
            CancellationToken::new(),
            Some(Instant::now() + Duration::from_millis(100)),
        );
        assert!(signal.check().is_none());
        assert_eq!(signal.triggered().await, "deadline exceeded");
        assert_eq!(signal.check().as_deref(), Some("deadline exceeded"));
    }

    #[tokio::test]
    async fn test_stop_signal_cancel() {
        let token = CancellationToken::new();
        let signal = StopSignal::new(token.clone(), None);
        token.cancel();
        assert_eq!(signal.check().as_deref(), Some("cancelled by caller"));
        assert_eq!(signal.triggered().await, "cancelled by caller");
    }
}
