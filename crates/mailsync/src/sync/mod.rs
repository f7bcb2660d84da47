//! Incremental mailbox synchronization.

pub mod clock;
pub mod enumerator;
pub mod leads;
pub mod orchestrator;
pub mod pipeline;
pub mod progress;
pub mod request;
pub mod writer;

pub use clock::{check_clock_skew, ClockError, ClockReference, HttpDateClock};
pub use enumerator::{enumerate, EnumerateOptions, Enumeration};
pub use leads::LeadResolver;
pub use orchestrator::{EngineOptions, SyncEngine, SyncHandle, FOLDER_LIST_KEY};
pub use pipeline::{Pipeline, PipelineConfig, PipelineOutcome, PipelineStop, StopSignal};
pub use progress::{BatchProgress, NoopProgress, ProgressSink, SyncState};
pub use request::{
    BatchProcessing, SyncRequest, SyncResponse, TestConnectionRequest, TestConnectionResponse,
};
pub use writer::{BatchWriter, FlushReport, PendingEmail};
