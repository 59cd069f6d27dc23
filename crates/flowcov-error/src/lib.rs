//! Shared error types for the flowcov workspace.
//!
//! One enum covers both sides of the system: the static derivation
//! pipeline, which almost never errors because callers treat unreadable
//! inputs as "contributes nothing", and the batch execution side, where
//! store failures and batch preconditions propagate to the caller.

use std::path::PathBuf;

/// Convenience result type used across the workspace.
pub type FlowcovResult<T> = Result<T, FlowcovError>;

/// Errors surfaced to callers of the flowcov crates.
///
/// Scenario-level problems (a failing check run, a missing test file
/// inside a batch) are recorded as run data, not raised through this type.
#[derive(Debug, thiserror::Error)]
pub enum FlowcovError {
    // === Infrastructure ===
    /// I/O failure (file read, directory walk, recording output).
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failure.
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    /// Run-store access failure.
    #[error("run store: {0}")]
    Store(#[from] rusqlite::Error),

    // === Batch preconditions ===
    /// A second batch was started while one is still in flight.
    #[error("a batch run is already in progress")]
    BatchAlreadyRunning,

    // === Recording trigger ===
    /// No scenario binds a test file to the requested path id.
    #[error("no test-file mapping for path `{path_id}`")]
    NoTestFileMapping {
        /// The graph-path id the caller asked to record.
        path_id: String,
    },

    /// The mapped test file does not exist on disk.
    #[error("test file not found: {}", path.display())]
    TestFileMissing {
        /// Resolved path that was checked.
        path: PathBuf,
    },

    /// The external recorder failed or produced no output file.
    #[error("recording failed: {0}")]
    RecordingFailed(String),
}
