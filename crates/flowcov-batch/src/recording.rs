//! On-demand flow recording.
//!
//! Captures a demonstration video for one graph path outside any batch:
//! the path's cataloged flow script is replayed under the tool's record
//! mode and the capture is registered in the run store. Unlike the
//! post-pass capture inside a batch, failures here are the caller's
//! problem and surface as errors.

use std::fs;
use std::path::PathBuf;

use flowcov_core::catalog;
use flowcov_error::{FlowcovError, FlowcovResult};

use crate::runner::FlowRunner;
use crate::store::{now_ms, RecordingMeta, RunStore};

/// Where scripts are read from and captures are written to.
#[derive(Debug, Clone)]
pub struct RecordingConfig {
    /// Directory holding the flow scripts named by the catalog.
    pub suite_dir: PathBuf,
    /// Directory captures are written into, created on demand.
    pub recordings_dir: PathBuf,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            suite_dir: PathBuf::from("e2e/flows"),
            recordings_dir: PathBuf::from("e2e/recordings"),
        }
    }
}

/// Record the flow demonstrating `path_id` and register the capture.
///
/// # Errors
///
/// Returns [`FlowcovError::NoTestFileMapping`] when no cataloged
/// scenario binds a script to the path, [`FlowcovError::TestFileMissing`]
/// when the bound script is absent on disk, and
/// [`FlowcovError::RecordingFailed`] when the tool fails or produces no
/// output file. Store and directory failures propagate.
pub fn trigger_recording<S: RunStore, R: FlowRunner>(
    config: &RecordingConfig,
    runner: &R,
    store: &mut S,
    path_id: &str,
) -> FlowcovResult<RecordingMeta> {
    let Some(rel_file) = catalog::test_file_for_path(path_id) else {
        return Err(FlowcovError::NoTestFileMapping {
            path_id: path_id.to_owned(),
        });
    };
    let script = config.suite_dir.join(&rel_file);
    if !script.is_file() {
        return Err(FlowcovError::TestFileMissing { path: script });
    }
    fs::create_dir_all(&config.recordings_dir)?;

    let filename = recording_filename(path_id);
    let output = config.recordings_dir.join(&filename);
    let outcome = runner.record(&script, &output);
    if !outcome.success {
        let detail = if outcome.detail.is_empty() {
            format!("exit code {}", outcome.exit_code)
        } else {
            outcome.detail
        };
        return Err(FlowcovError::RecordingFailed(detail));
    }
    if !output.is_file() {
        return Err(FlowcovError::RecordingFailed(format!(
            "recorder wrote no output at {}",
            output.display()
        )));
    }

    let meta = RecordingMeta {
        path_id: path_id.to_owned(),
        filename,
        duration_ms: outcome.duration_ms,
        step_timestamps: Vec::new(),
    };
    store.upsert_recording(&meta)?;
    tracing::info!(path_id = %path_id, file = %meta.filename, "recording captured");
    Ok(meta)
}

/// Collision-resistant capture file name: the sanitized identifier
/// (scenario id inside a batch, path id for the on-demand trigger)
/// plus the capture timestamp.
#[must_use]
pub fn recording_filename(stem: &str) -> String {
    format!("{}-{}.mp4", sanitize_segment(stem), now_ms())
}

/// Replace anything outside `[A-Za-z0-9_-]` with `_`.
#[must_use]
pub fn sanitize_segment(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

// ── Tests ────────────────────────────────────────────────────────────────
