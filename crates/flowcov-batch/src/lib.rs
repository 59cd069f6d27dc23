//! Batch execution over the scenario catalog.
//!
//! Pairs with `flowcov-core`: the core derives what the suite covers,
//! this crate runs it. Hash-gated execution against a persistent run
//! store, progress narration as JSONL events, post-pass recording
//! capture, and the on-demand recording trigger live here, together
//! with the `flowcov` command-line binary.

pub mod batch;
pub mod events;
pub mod recording;
pub mod runner;
pub mod store;

pub use batch::{
    human_age, BatchConfig, BatchMode, BatchOrchestrator, BatchSummary, BATCH_SCHEMA_VERSION,
};
pub use events::{
    BatchPhase, BatchProgressEvent, EventStatus, JsonlSink, NullSink, ProgressSink, VecSink,
    BATCH_PROGRESS_EVENT_TYPE,
};
pub use recording::{recording_filename, sanitize_segment, trigger_recording, RecordingConfig};
pub use runner::{
    detect_runner_version, extract_error_line, FlowRunner, ProcessRunner, RunnerConfig,
    ToolOutcome,
};
pub use store::{
    now_ms, MemoryRunStore, RecordingMeta, RunStatus, RunStore, SqliteRunStore, TestRunMeta,
};
