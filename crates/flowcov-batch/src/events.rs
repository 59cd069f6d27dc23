//! Batch progress events.
//!
//! The orchestrator narrates a batch as a stream of per-scenario
//! events. Consumers subscribe through [`ProgressSink`]; the CLI wires
//! a JSONL sink so dashboards can tail the stream, tests capture into
//! a vector.

use std::io::Write;

use serde::{Deserialize, Serialize};

/// Discriminator carried in every event's `type` field.
pub const BATCH_PROGRESS_EVENT_TYPE: &str = "batch-progress";

/// Where a scenario currently is inside the batch pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BatchPhase {
    /// Hashing the flow script and consulting the run cache.
    HashCheck,
    /// The flow tool is executing the script.
    Testing,
    /// Capturing a recording after a pass.
    Recording,
    /// The scenario reached a terminal state.
    Done,
}

/// Outcome dimension of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    /// Work in progress.
    Running,
    /// Scenario finished successfully.
    Passed,
    /// Scenario finished unsuccessfully.
    Failed,
    /// Scenario was served from the run cache without executing.
    Cached,
}

/// One progress observation for one scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchProgressEvent {
    /// Always [`BATCH_PROGRESS_EVENT_TYPE`].
    #[serde(rename = "type")]
    pub event_type: String,
    /// Batch the scenario belongs to.
    pub batch_id: String,
    /// Scenario being narrated.
    pub scenario_id: String,
    /// Pipeline phase.
    pub phase: BatchPhase,
    /// Outcome dimension.
    pub status: EventStatus,
    /// Optional human-readable detail (cache provenance, failure text).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Overall batch progress in `0.0..=1.0`, monotonically
    /// non-decreasing across the event stream.
    pub progress: f64,
}

impl BatchProgressEvent {
    /// Event with no message.
    #[must_use]
    pub fn new(
        batch_id: &str,
        scenario_id: &str,
        phase: BatchPhase,
        status: EventStatus,
        progress: f64,
    ) -> Self {
        Self {
            event_type: BATCH_PROGRESS_EVENT_TYPE.to_owned(),
            batch_id: batch_id.to_owned(),
            scenario_id: scenario_id.to_owned(),
            phase,
            status,
            message: None,
            progress,
        }
    }

    /// Attach a detail message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

// ── Sinks ────────────────────────────────────────────────────────────────

/// Consumer of the progress stream.
pub trait ProgressSink {
    /// Deliver one event. Delivery is best-effort; failures must not
    /// interrupt the batch.
    fn emit(&mut self, event: &BatchProgressEvent);
}

/// Writes one JSON object per line, flushing after each event so
/// tailing consumers see it immediately.
#[derive(Debug)]
pub struct JsonlSink<W: Write> {
    out: W,
}

impl<W: Write> JsonlSink<W> {
    /// Sink writing to `out`.
    pub fn new(out: W) -> Self {
        Self { out }
    }
}

impl<W: Write> ProgressSink for JsonlSink<W> {
    fn emit(&mut self, event: &BatchProgressEvent) {
        let Ok(line) = serde_json::to_string(event) else {
            return;
        };
        if let Err(err) = writeln!(self.out, "{line}").and_then(|()| self.out.flush()) {
            tracing::debug!(error = %err, "progress emit failed");
        }
    }
}

/// Captures events in memory, for tests.
#[derive(Debug, Default)]
pub struct VecSink {
    events: Vec<BatchProgressEvent>,
}

impl VecSink {
    /// Empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything emitted so far, in order.
    #[must_use]
    pub fn events(&self) -> &[BatchProgressEvent] {
        &self.events
    }
}

impl ProgressSink for VecSink {
    fn emit(&mut self, event: &BatchProgressEvent) {
        self.events.push(event.clone());
    }
}

/// Discards every event.
#[derive(Debug, Default)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn emit(&mut self, _event: &BatchProgressEvent) {}
}

// ── Tests ────────────────────────────────────────────────────────────────
