//! Buffered bulk persistence of parsed messages.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::mail::ExtractedAttachment;
use crate::store::{AttachmentRecord, EmailRecord, MessageStore};

/// A parsed message waiting for the next flush.
#[derive(Debug, Clone)]
pub struct PendingEmail {
    pub record: EmailRecord,
    pub attachments: Vec<ExtractedAttachment>,
}

/// What one flush did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub attempted: usize,
    /// Rows the store actually created.
    pub inserted: usize,
    pub attachments_written: usize,
    /// UIDs of a buffer the store rejected.
    pub dropped_uids: Vec<u32>,
}

/// Buffers records and writes them with one bulk insert per flush.
pub struct BatchWriter {
    store: Arc<dyn MessageStore>,
    threshold: usize,
    buffer: Vec<PendingEmail>,
}

impl BatchWriter {
    pub fn new(store: Arc<dyn MessageStore>, threshold: usize) -> Self {
        let threshold = threshold.max(1);
        Self {
            store,
            threshold,
            buffer: Vec::with_capacity(threshold),
        }
    }

    /// Buffers a record; returns `true` once the flush threshold is reached.
    pub fn push(&mut self, pending: PendingEmail) -> bool {
        self.buffer.push(pending);
        self.buffer.len() >= self.threshold
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Lowest UID still waiting in the buffer.
    pub fn lowest_pending_uid(&self) -> Option<u32> {
        self.buffer.iter().map(|p| p.record.uid).min()
    }

    /// Writes the buffer.
    ///
    /// A rejected insert drops the whole buffer without retry. Attachments
    /// are written in a second call once their parent ids are known; their
    /// failure does not affect the message rows.
    pub async fn flush(&mut self) -> FlushReport {
        if self.buffer.is_empty() {
            return FlushReport::default();
        }

        let pending = std::mem::take(&mut self.buffer);
        let mut report = FlushReport {
            attempted: pending.len(),
            ..FlushReport::default()
        };

        let mut records = Vec::with_capacity(pending.len());
        let mut attachments_by_uid: HashMap<u32, Vec<ExtractedAttachment>> = HashMap::new();
        for item in pending {
            if !item.attachments.is_empty() {
                attachments_by_uid.insert(item.record.uid, item.attachments);
            }
            records.push(item.record);
        }

        let inserted = match self.store.insert_emails(&records).await {
            Ok(inserted) => inserted,
            Err(e) => {
                report.dropped_uids = records.iter().map(|r| r.uid).collect();
                error!(
                    error = %e,
                    dropped = report.dropped_uids.len(),
                    uids = ?report.dropped_uids,
                    "Bulk insert rejected, dropping buffered messages"
                );
                return report;
            }
        };
        report.inserted = inserted.len();
        if inserted.len() < records.len() {
            debug!(
                ignored = records.len() - inserted.len(),
                "Store ignored rows that already exist"
            );
        }

        let attachment_rows: Vec<AttachmentRecord> = inserted
            .iter()
            .filter_map(|row| {
                attachments_by_uid
                    .remove(&row.uid)
                    .map(|attachments| (row.id, attachments))
            })
            .flat_map(|(email_id, attachments)| {
                attachments
                    .into_iter()
                    .map(move |a| AttachmentRecord::from_extracted(email_id, a))
            })
            .collect();

        if !attachment_rows.is_empty() {
            match self.store.insert_attachments(&attachment_rows).await {
                Ok(written) => report.attachments_written = written,
                Err(e) => warn!(
                    error = %e,
                    attachments = attachment_rows.len(),
                    "Attachment insert failed, messages are kept without attachments"
                ),
            }
        }

        debug!(
            attempted = report.attempted,
            inserted = report.inserted,
            attachments = report.attachments_written,
            "Flushed message buffer"
        );
        report
    }
}
