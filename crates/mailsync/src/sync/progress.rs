//! Run state and per-batch progress reporting.

use async_trait::async_trait;
use serde::Serialize;

/// Orchestrator state, observable through `SyncHandle::state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "batch", rename_all = "camelCase")]
pub enum SyncState {
    Idle,
    Connecting,
    Enumerating,
    /// Zero-based index of the batch being fetched.
    FetchingBatch(usize),
    Flushing,
    Completing,
    Failed,
}

/// Snapshot emitted after every batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchProgress {
    pub batch_index: usize,
    pub batches_completed: usize,
    pub total_batches: usize,
    /// Fixed at pipeline start.
    pub total_items: u64,
    pub processed: u64,
    pub inserted: u64,
    pub skipped: u64,
    pub failed: u64,
    /// Highest UID whose fate is settled (stored, skipped or unparseable).
    pub checkpoint_uid: Option<u32>,
}

impl BatchProgress {
    pub fn percent(&self) -> u8 {
        percent(self.batches_completed, self.total_batches)
    }
}

pub(crate) fn percent(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((completed.min(total) * 100) / total) as u8
}

/// Receives pipeline progress.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    fn on_state(&self, _state: SyncState) {}

    async fn on_batch(&self, progress: &BatchProgress);
}

/// Discards all progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

#[async_trait]
impl ProgressSink for NoopProgress {
    async fn on_batch(&self, _progress: &BatchProgress) {}
}
