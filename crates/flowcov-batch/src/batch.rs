//! Batch orchestration.
//!
//! Runs the scenario catalog end to end: hash the flow script, consult
//! the run cache, execute on a miss, capture a recording after a pass,
//! and narrate everything through the progress sink. One orchestrator
//! instance admits one batch at a time; a second call while a batch is
//! in flight is rejected up front.
//!
//! Scenario-level problems (missing script, failing run) become run
//! records and summary counts. Only the in-flight precondition, script
//! hashing, and store access propagate as errors.

use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use rand::Rng;
use serde::{Deserialize, Serialize};

use flowcov_core::catalog::{self, ScenarioConfig};
use flowcov_core::content_hash;
use flowcov_error::{FlowcovError, FlowcovResult};

use crate::events::{BatchPhase, BatchProgressEvent, EventStatus, ProgressSink};
use crate::recording;
use crate::runner::{self, FlowRunner};
use crate::store::{now_ms, RecordingMeta, RunStatus, RunStore, TestRunMeta};

/// Schema tag carried by every serialized batch summary.
pub const BATCH_SCHEMA_VERSION: &str = "flowcov.batch.v1";

// ── Configuration ────────────────────────────────────────────────────────

/// Which scenarios a batch selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatchMode {
    /// Every scenario with a flow script.
    #[default]
    All,
    /// Only scenarios whose latest recorded run failed.
    FailedOnly,
}

/// Batch inputs and locations.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Scenarios considered for execution.
    pub scenarios: Vec<ScenarioConfig>,
    /// Directory holding the flow scripts named by the scenarios.
    pub suite_dir: PathBuf,
    /// Directory recordings are written into.
    pub recordings_dir: PathBuf,
    /// Selection mode.
    pub mode: BatchMode,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            scenarios: catalog::scenario_catalog(),
            suite_dir: PathBuf::from("e2e/flows"),
            recordings_dir: PathBuf::from("e2e/recordings"),
            mode: BatchMode::All,
        }
    }
}

/// Terminal counts for one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    /// Schema tag for downstream compatibility checks.
    #[serde(default)]
    pub schema_version: String,
    /// Batch this summary describes.
    pub batch_id: String,
    /// Scenarios selected for the batch.
    pub total: usize,
    /// Scenarios that executed and passed.
    pub passed: usize,
    /// Scenarios that failed, including missing scripts.
    pub failed: usize,
    /// Scenarios served from the run cache.
    pub cached: usize,
    /// Wall-clock batch duration in milliseconds.
    pub duration_ms: u64,
}

impl BatchSummary {
    /// Whether nothing failed.
    #[must_use]
    pub fn all_green(&self) -> bool {
        self.failed == 0
    }

    /// Compact single-line JSON.
    ///
    /// # Errors
    ///
    /// Returns `Err` if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Markdown block for logs and job summaries.
    #[must_use]
    pub fn render_summary(&self) -> String {
        let mut out = String::new();
        out.push_str("## Batch summary\n\n");
        out.push_str(&format!("- batch: `{}`\n", self.batch_id));
        out.push_str(&format!("- duration: {}\n", human_age(self.duration_ms)));
        out.push_str("\n| total | passed | failed | cached |\n");
        out.push_str("|------:|-------:|-------:|-------:|\n");
        out.push_str(&format!(
            "| {} | {} | {} | {} |\n",
            self.total, self.passed, self.failed, self.cached
        ));
        out
    }
}

// ── Orchestrator ─────────────────────────────────────────────────────────

/// A scenario the batch will actually process.
#[derive(Debug, Clone)]
struct RunnableScenario {
    id: String,
    path_id: String,
    rel_file: String,
}

/// Drives one batch at a time over a [`FlowRunner`].
#[derive(Debug)]
pub struct BatchOrchestrator<R: FlowRunner> {
    config: BatchConfig,
    runner: R,
    running: AtomicBool,
}

/// Clears the in-flight flag when a batch leaves scope, on every exit
/// path including propagated errors.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl<R: FlowRunner> BatchOrchestrator<R> {
    /// Orchestrator over `runner` with `config`.
    #[must_use]
    pub fn new(config: BatchConfig, runner: R) -> Self {
        Self {
            config,
            runner,
            running: AtomicBool::new(false),
        }
    }

    /// Run one batch to completion.
    ///
    /// # Errors
    ///
    /// Returns [`FlowcovError::BatchAlreadyRunning`] when a batch is
    /// already in flight on this instance, and propagates script
    /// hashing and store failures.
    pub fn run_batch<S: RunStore>(
        &self,
        store: &mut S,
        sink: &mut dyn ProgressSink,
    ) -> FlowcovResult<BatchSummary> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(FlowcovError::BatchAlreadyRunning);
        }
        let _guard = RunningGuard(&self.running);

        let start = Instant::now();
        let batch_id = new_batch_id();
        let runnable = self.select_scenarios(store)?;
        let total = runnable.len();
        tracing::info!(
            batch_id = %batch_id,
            scenarios = total,
            mode = ?self.config.mode,
            "batch started"
        );

        let mut passed = 0usize;
        let mut failed = 0usize;
        let mut cached = 0usize;
        for (index, scenario) in runnable.iter().enumerate() {
            let progress = |fraction: f64| phase_progress(index, total, fraction);
            sink.emit(&BatchProgressEvent::new(
                &batch_id,
                &scenario.id,
                BatchPhase::HashCheck,
                EventStatus::Running,
                progress(0.05),
            ));

            let script = self.config.suite_dir.join(&scenario.rel_file);
            if !script.is_file() {
                let message = format!("test file not found: {}", scenario.rel_file);
                store.upsert_run(&TestRunMeta {
                    scenario_id: scenario.id.clone(),
                    flow_file: scenario.rel_file.clone(),
                    flow_hash: String::new(),
                    status: RunStatus::Failed,
                    duration_ms: None,
                    error_message: Some(message.clone()),
                    batch_id: batch_id.clone(),
                    created_at_ms: now_ms(),
                })?;
                sink.emit(
                    &BatchProgressEvent::new(
                        &batch_id,
                        &scenario.id,
                        BatchPhase::Done,
                        EventStatus::Failed,
                        progress(1.0),
                    )
                    .with_message(message),
                );
                failed += 1;
                continue;
            }

            let flow_hash = content_hash::hash_file(&script)?;
            if let Some(hit) = store.get_run_by_hash(&scenario.id, &flow_hash)? {
                let age = human_age(now_ms().saturating_sub(hit.created_at_ms));
                sink.emit(
                    &BatchProgressEvent::new(
                        &batch_id,
                        &scenario.id,
                        BatchPhase::Done,
                        EventStatus::Cached,
                        progress(1.0),
                    )
                    .with_message(format!("cached (last passed {age} ago)")),
                );
                cached += 1;
                continue;
            }

            store.upsert_run(&TestRunMeta {
                scenario_id: scenario.id.clone(),
                flow_file: scenario.rel_file.clone(),
                flow_hash: flow_hash.clone(),
                status: RunStatus::Running,
                duration_ms: None,
                error_message: None,
                batch_id: batch_id.clone(),
                created_at_ms: now_ms(),
            })?;
            sink.emit(&BatchProgressEvent::new(
                &batch_id,
                &scenario.id,
                BatchPhase::Testing,
                EventStatus::Running,
                progress(0.25),
            ));

            let outcome = self.runner.check(&script);
            if !outcome.success {
                store.upsert_run(&TestRunMeta {
                    scenario_id: scenario.id.clone(),
                    flow_file: scenario.rel_file.clone(),
                    flow_hash: flow_hash.clone(),
                    status: RunStatus::Failed,
                    duration_ms: Some(outcome.duration_ms),
                    error_message: Some(outcome.detail.clone()),
                    batch_id: batch_id.clone(),
                    created_at_ms: now_ms(),
                })?;
                sink.emit(
                    &BatchProgressEvent::new(
                        &batch_id,
                        &scenario.id,
                        BatchPhase::Done,
                        EventStatus::Failed,
                        progress(1.0),
                    )
                    .with_message(outcome.detail),
                );
                failed += 1;
                continue;
            }

            sink.emit(&BatchProgressEvent::new(
                &batch_id,
                &scenario.id,
                BatchPhase::Recording,
                EventStatus::Running,
                progress(0.75),
            ));
            self.attempt_recording(store, scenario, &script);

            store.upsert_run(&TestRunMeta {
                scenario_id: scenario.id.clone(),
                flow_file: scenario.rel_file.clone(),
                flow_hash,
                status: RunStatus::Passed,
                duration_ms: Some(outcome.duration_ms),
                error_message: None,
                batch_id: batch_id.clone(),
                created_at_ms: now_ms(),
            })?;
            sink.emit(&BatchProgressEvent::new(
                &batch_id,
                &scenario.id,
                BatchPhase::Done,
                EventStatus::Passed,
                progress(1.0),
            ));
            passed += 1;
        }

        let summary = BatchSummary {
            schema_version: BATCH_SCHEMA_VERSION.to_owned(),
            batch_id,
            total,
            passed,
            failed,
            cached,
            duration_ms: runner::elapsed_ms(start),
        };
        tracing::info!(
            batch_id = %summary.batch_id,
            passed,
            failed,
            cached,
            "batch finished"
        );
        Ok(summary)
    }

    fn select_scenarios<S: RunStore>(&self, store: &S) -> FlowcovResult<Vec<RunnableScenario>> {
        let failed_before: Option<BTreeSet<String>> = match self.config.mode {
            BatchMode::All => None,
            BatchMode::FailedOnly => Some(
                store
                    .list_latest_runs()?
                    .into_iter()
                    .filter(|r| r.status == RunStatus::Failed)
                    .map(|r| r.scenario_id)
                    .collect(),
            ),
        };
        let mut out = Vec::new();
        for scenario in &self.config.scenarios {
            let Some(rel_file) = scenario.test_file.clone() else {
                tracing::debug!(scenario = %scenario.id, "no flow script, skipped");
                continue;
            };
            if let Some(failed) = &failed_before {
                if !failed.contains(&scenario.id) {
                    continue;
                }
            }
            out.push(RunnableScenario {
                id: scenario.id.clone(),
                path_id: scenario.parent_path_id.clone(),
                rel_file,
            });
        }
        Ok(out)
    }

    /// Capture a recording after a pass. Best-effort: any failure is
    /// logged and the scenario still counts as passed.
    fn attempt_recording<S: RunStore>(
        &self,
        store: &mut S,
        scenario: &RunnableScenario,
        script: &std::path::Path,
    ) {
        if let Err(err) = fs::create_dir_all(&self.config.recordings_dir) {
            tracing::debug!(error = %err, "recordings dir unavailable");
            return;
        }
        let filename = recording::recording_filename(&scenario.id);
        let output = self.config.recordings_dir.join(&filename);
        let outcome = self.runner.record(script, &output);
        if !outcome.success {
            tracing::debug!(
                scenario = %scenario.id,
                detail = %outcome.detail,
                "recording skipped"
            );
            return;
        }
        if !output.is_file() {
            tracing::debug!(scenario = %scenario.id, "recorder wrote no output");
            return;
        }
        let meta = RecordingMeta {
            path_id: scenario.path_id.clone(),
            filename,
            duration_ms: outcome.duration_ms,
            step_timestamps: Vec::new(),
        };
        if let Err(err) = store.upsert_recording(&meta) {
            tracing::debug!(error = %err, "recording row not stored");
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────

fn new_batch_id() -> String {
    format!("batch-{}-{:04x}", now_ms(), rand::thread_rng().gen::<u16>())
}

#[allow(clippy::cast_precision_loss)]
fn phase_progress(index: usize, total: usize, fraction: f64) -> f64 {
    if total == 0 {
        return 1.0;
    }
    (index as f64 + fraction) / total as f64
}

/// Rough age rendering for cache provenance messages.
#[must_use]
pub fn human_age(ms: u64) -> String {
    const SECOND: u64 = 1000;
    const MINUTE: u64 = 60 * SECOND;
    const HOUR: u64 = 60 * MINUTE;
    const DAY: u64 = 24 * HOUR;
    if ms >= DAY {
        format!("{}d {}h", ms / DAY, (ms % DAY) / HOUR)
    } else if ms >= HOUR {
        format!("{}h {}m", ms / HOUR, (ms % HOUR) / MINUTE)
    } else if ms >= MINUTE {
        format!("{}m {}s", ms / MINUTE, (ms % MINUTE) / SECOND)
    } else {
        format!("{}s", ms / SECOND)
    }
}

// ── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::mpsc;
    use std::sync::{Arc, Mutex};

    use crate::events::VecSink;
    use crate::runner::ToolOutcome;
    use crate::store::MemoryRunStore;

    // ── Fakes ────────────────────────────────────────────────────────

    struct FakeRunner {
        fail_names: Vec<String>,
        write_output: bool,
        check_calls: Mutex<Vec<PathBuf>>,
        record_calls: Mutex<Vec<PathBuf>>,
    }

    impl FakeRunner {
        fn passing() -> Self {
            Self {
                fail_names: Vec::new(),
                write_output: true,
                check_calls: Mutex::new(Vec::new()),
                record_calls: Mutex::new(Vec::new()),
            }
        }

        fn failing(names: &[&str]) -> Self {
            Self {
                fail_names: names.iter().map(|n| (*n).to_owned()).collect(),
                ..Self::passing()
            }
        }

        fn checked(&self) -> Vec<PathBuf> {
            self.check_calls.lock().unwrap().clone()
        }

        fn recorded(&self) -> Vec<PathBuf> {
            self.record_calls.lock().unwrap().clone()
        }
    }

    impl FlowRunner for FakeRunner {
        fn check(&self, script: &Path) -> ToolOutcome {
            self.check_calls.lock().unwrap().push(script.to_owned());
            let name = script
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            if self.fail_names.iter().any(|f| name.contains(f.as_str())) {
                ToolOutcome {
                    success: false,
                    exit_code: 1,
                    duration_ms: 40,
                    detail: "element not found: pay-now".to_owned(),
                    timed_out: false,
                }
            } else {
                ToolOutcome {
                    success: true,
                    exit_code: 0,
                    duration_ms: 120,
                    detail: String::new(),
                    timed_out: false,
                }
            }
        }

        fn record(&self, _script: &Path, output: &Path) -> ToolOutcome {
            self.record_calls.lock().unwrap().push(output.to_owned());
            if self.write_output {
                let _ = fs::write(output, b"video");
            }
            ToolOutcome {
                success: true,
                exit_code: 0,
                duration_ms: 80,
                detail: String::new(),
                timed_out: false,
            }
        }
    }

    // ── Fixtures ─────────────────────────────────────────────────────

    fn scenario(id: &str, path_id: &str, file: Option<&str>) -> ScenarioConfig {
        ScenarioConfig {
            id: id.to_owned(),
            label: id.to_owned(),
            description: String::new(),
            parent_path_id: path_id.to_owned(),
            step_indices: vec![0],
            test_file: file.map(str::to_owned),
        }
    }

    fn setup(root: &Path, scenarios: &[ScenarioConfig]) -> BatchConfig {
        let suite = root.join("flows");
        fs::create_dir_all(&suite).unwrap();
        for s in scenarios {
            if let Some(file) = &s.test_file {
                let body = format!("- tapOn:\n    id: \"{}\"\n", s.id);
                fs::write(suite.join(file), body).unwrap();
            }
        }
        BatchConfig {
            scenarios: scenarios.to_vec(),
            suite_dir: suite,
            recordings_dir: root.join("recordings"),
            mode: BatchMode::All,
        }
    }

    fn seed_passed(store: &mut MemoryRunStore, id: &str, file: &Path, age_ms: u64) {
        store
            .upsert_run(&TestRunMeta {
                scenario_id: id.to_owned(),
                flow_file: file
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                flow_hash: content_hash::hash_file(file).unwrap(),
                status: RunStatus::Passed,
                duration_ms: Some(1000),
                error_message: None,
                batch_id: "seed".to_owned(),
                created_at_ms: now_ms().saturating_sub(age_ms),
            })
            .unwrap();
    }

    // ── Batch behaviour ──────────────────────────────────────────────

    #[test]
    fn test_summary_counts_mixed_outcomes() {
        let dir = tempfile::tempdir().unwrap();
        let scenarios = [
            scenario("fresh-pass", "flow:p2p-trade", Some("fresh-pass.yaml")),
            scenario("broken", "flow:onboarding", Some("broken.yaml")),
            scenario("warm", "flow:wallet-topup", Some("warm.yaml")),
        ];
        let config = setup(dir.path(), &scenarios);
        let mut store = MemoryRunStore::new();
        seed_passed(&mut store, "warm", &config.suite_dir.join("warm.yaml"), 60_000);

        let orchestrator = BatchOrchestrator::new(config, FakeRunner::failing(&["broken"]));
        let mut sink = VecSink::new();
        let summary = orchestrator.run_batch(&mut store, &mut sink).unwrap();

        assert_eq!(summary.total, 3);
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.cached, 1);
        assert!(!summary.all_green());
        assert_eq!(summary.schema_version, BATCH_SCHEMA_VERSION);
    }

    #[test]
    fn test_cache_hit_skips_the_tool() {
        let dir = tempfile::tempdir().unwrap();
        let scenarios = [scenario("warm", "flow:p2p-trade", Some("warm.yaml"))];
        let config = setup(dir.path(), &scenarios);
        let mut store = MemoryRunStore::new();
        seed_passed(
            &mut store,
            "warm",
            &config.suite_dir.join("warm.yaml"),
            7_800_000,
        );

        let orchestrator = BatchOrchestrator::new(config, FakeRunner::passing());
        let mut sink = VecSink::new();
        let summary = orchestrator.run_batch(&mut store, &mut sink).unwrap();

        assert_eq!(summary.cached, 1);
        assert!(orchestrator.runner.checked().is_empty(), "tool must not run");
        let done = sink
            .events()
            .iter()
            .find(|e| e.phase == BatchPhase::Done)
            .unwrap();
        assert_eq!(done.status, EventStatus::Cached);
        let message = done.message.as_deref().unwrap();
        assert!(
            message.starts_with("cached (last passed") && message.ends_with("ago)"),
            "message: {message}"
        );
    }

    #[test]
    fn test_edited_script_invalidates_cache() {
        let dir = tempfile::tempdir().unwrap();
        let scenarios = [scenario("warm", "flow:p2p-trade", Some("warm.yaml"))];
        let config = setup(dir.path(), &scenarios);
        let script = config.suite_dir.join("warm.yaml");
        let mut store = MemoryRunStore::new();
        seed_passed(&mut store, "warm", &script, 60_000);

        // One appended comment is enough to change the content hash.
        let mut body = fs::read_to_string(&script).unwrap();
        body.push_str("# retimed\n");
        fs::write(&script, body).unwrap();

        let orchestrator = BatchOrchestrator::new(config, FakeRunner::passing());
        let summary = orchestrator
            .run_batch(&mut store, &mut VecSink::new())
            .unwrap();

        assert_eq!(summary.cached, 0);
        assert_eq!(summary.passed, 1);
        assert_eq!(orchestrator.runner.checked().len(), 1);
    }

    #[test]
    fn test_missing_script_fails_without_running_tool() {
        let dir = tempfile::tempdir().unwrap();
        let scenarios = [scenario("ghost", "flow:p2p-trade", Some("ghost.yaml"))];
        let config = setup(dir.path(), &scenarios);
        fs::remove_file(config.suite_dir.join("ghost.yaml")).unwrap();

        let mut store = MemoryRunStore::new();
        let orchestrator = BatchOrchestrator::new(config, FakeRunner::passing());
        let mut sink = VecSink::new();
        let summary = orchestrator.run_batch(&mut store, &mut sink).unwrap();

        assert_eq!(summary.failed, 1);
        assert!(orchestrator.runner.checked().is_empty());
        assert!(orchestrator.runner.recorded().is_empty());

        let latest = store.list_latest_runs().unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].status, RunStatus::Failed);
        assert_eq!(latest[0].flow_hash, "");
        assert_eq!(
            latest[0].error_message.as_deref(),
            Some("test file not found: ghost.yaml")
        );
    }

    #[test]
    fn test_store_sees_running_then_passed() {
        struct StoreSpy {
            inner: MemoryRunStore,
            statuses: Vec<RunStatus>,
        }
        impl RunStore for StoreSpy {
            fn get_run_by_hash(
                &self,
                scenario_id: &str,
                flow_hash: &str,
            ) -> FlowcovResult<Option<TestRunMeta>> {
                self.inner.get_run_by_hash(scenario_id, flow_hash)
            }
            fn upsert_run(&mut self, meta: &TestRunMeta) -> FlowcovResult<()> {
                self.statuses.push(meta.status);
                self.inner.upsert_run(meta)
            }
            fn list_latest_runs(&self) -> FlowcovResult<Vec<TestRunMeta>> {
                self.inner.list_latest_runs()
            }
            fn upsert_recording(&mut self, meta: &RecordingMeta) -> FlowcovResult<()> {
                self.inner.upsert_recording(meta)
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let scenarios = [scenario("fresh", "flow:p2p-trade", Some("fresh.yaml"))];
        let config = setup(dir.path(), &scenarios);
        let mut store = StoreSpy {
            inner: MemoryRunStore::new(),
            statuses: Vec::new(),
        };

        let orchestrator = BatchOrchestrator::new(config, FakeRunner::passing());
        orchestrator
            .run_batch(&mut store, &mut VecSink::new())
            .unwrap();

        assert_eq!(store.statuses, vec![RunStatus::Running, RunStatus::Passed]);
        assert_eq!(store.inner.runs().len(), 1, "lifecycle updates one row");
    }

    #[test]
    fn test_failed_only_mode_reruns_only_failures() {
        let dir = tempfile::tempdir().unwrap();
        let scenarios = [
            scenario("flaky", "flow:p2p-trade", Some("flaky.yaml")),
            scenario("stable", "flow:onboarding", Some("stable.yaml")),
        ];
        let mut config = setup(dir.path(), &scenarios);
        config.mode = BatchMode::FailedOnly;

        let mut store = MemoryRunStore::new();
        store
            .upsert_run(&TestRunMeta {
                scenario_id: "flaky".to_owned(),
                flow_file: "flaky.yaml".to_owned(),
                flow_hash: "old".to_owned(),
                status: RunStatus::Failed,
                duration_ms: Some(50),
                error_message: Some("boom".to_owned()),
                batch_id: "b0".to_owned(),
                created_at_ms: now_ms().saturating_sub(5000),
            })
            .unwrap();
        seed_passed(
            &mut store,
            "stable",
            &config.suite_dir.join("stable.yaml"),
            5000,
        );

        let orchestrator = BatchOrchestrator::new(config, FakeRunner::passing());
        let summary = orchestrator
            .run_batch(&mut store, &mut VecSink::new())
            .unwrap();

        assert_eq!(summary.total, 1);
        assert_eq!(summary.passed, 1);
        let checked = orchestrator.runner.checked();
        assert_eq!(checked.len(), 1);
        assert!(checked[0].ends_with("flaky.yaml"));
    }

    #[test]
    fn test_scenarios_without_script_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let scenarios = [
            scenario("automated", "flow:p2p-trade", Some("automated.yaml")),
            scenario("curated-only", "flow:p2p-trade", None),
        ];
        let config = setup(dir.path(), &scenarios);

        let orchestrator = BatchOrchestrator::new(config, FakeRunner::passing());
        let mut sink = VecSink::new();
        let summary = orchestrator
            .run_batch(&mut MemoryRunStore::new(), &mut sink)
            .unwrap();

        assert_eq!(summary.total, 1);
        assert!(sink
            .events()
            .iter()
            .all(|e| e.scenario_id == "automated"));
    }

    #[test]
    fn test_second_batch_rejected_while_first_in_flight() {
        struct BlockingRunner {
            started: mpsc::Sender<()>,
            gate: Mutex<mpsc::Receiver<()>>,
        }
        impl FlowRunner for BlockingRunner {
            fn check(&self, _script: &Path) -> ToolOutcome {
                self.started.send(()).ok();
                self.gate.lock().unwrap().recv().ok();
                ToolOutcome {
                    success: true,
                    exit_code: 0,
                    duration_ms: 10,
                    detail: String::new(),
                    timed_out: false,
                }
            }
            fn record(&self, _script: &Path, _output: &Path) -> ToolOutcome {
                // Writes nothing, so the recording attempt is dropped.
                ToolOutcome {
                    success: true,
                    exit_code: 0,
                    duration_ms: 10,
                    detail: String::new(),
                    timed_out: false,
                }
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let scenarios = [scenario("slow", "flow:p2p-trade", Some("slow.yaml"))];
        let config = setup(dir.path(), &scenarios);

        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let orchestrator = Arc::new(BatchOrchestrator::new(
            config,
            BlockingRunner {
                started: started_tx,
                gate: Mutex::new(release_rx),
            },
        ));

        let first = {
            let orchestrator = Arc::clone(&orchestrator);
            std::thread::spawn(move || {
                let mut store = MemoryRunStore::new();
                orchestrator.run_batch(&mut store, &mut VecSink::new())
            })
        };
        started_rx.recv().unwrap();

        // First batch is parked inside the tool; a second must bounce.
        let mut other_store = MemoryRunStore::new();
        let mut other_sink = VecSink::new();
        let rejected = orchestrator.run_batch(&mut other_store, &mut other_sink);
        assert!(matches!(rejected, Err(FlowcovError::BatchAlreadyRunning)));
        assert!(other_store.runs().is_empty());
        assert!(other_sink.events().is_empty());

        release_tx.send(()).unwrap();
        let summary = first.join().unwrap().unwrap();
        assert_eq!(summary.passed, 1);
    }

    #[test]
    fn test_guard_clears_after_batch_completes() {
        let dir = tempfile::tempdir().unwrap();
        let scenarios = [scenario("broken", "flow:p2p-trade", Some("broken.yaml"))];
        let config = setup(dir.path(), &scenarios);
        let mut store = MemoryRunStore::new();

        let orchestrator = BatchOrchestrator::new(config, FakeRunner::failing(&["broken"]));
        let first = orchestrator
            .run_batch(&mut store, &mut VecSink::new())
            .unwrap();
        assert_eq!(first.failed, 1);

        // Everything failed, but the instance must accept the next batch.
        let second = orchestrator.run_batch(&mut store, &mut VecSink::new());
        assert!(second.is_ok());
    }

    #[test]
    fn test_event_order_and_monotonic_progress() {
        let dir = tempfile::tempdir().unwrap();
        let scenarios = [
            scenario("one", "flow:p2p-trade", Some("one.yaml")),
            scenario("two", "flow:onboarding", Some("two.yaml")),
        ];
        let config = setup(dir.path(), &scenarios);

        let orchestrator = BatchOrchestrator::new(config, FakeRunner::passing());
        let mut sink = VecSink::new();
        orchestrator
            .run_batch(&mut MemoryRunStore::new(), &mut sink)
            .unwrap();

        let events = sink.events();
        assert_eq!(events.len(), 8);
        let phases: Vec<BatchPhase> = events.iter().take(4).map(|e| e.phase).collect();
        assert_eq!(
            phases,
            vec![
                BatchPhase::HashCheck,
                BatchPhase::Testing,
                BatchPhase::Recording,
                BatchPhase::Done
            ]
        );
        let mut last = 0.0f64;
        for event in events {
            assert!(
                event.progress >= last,
                "progress went backwards: {} < {last}",
                event.progress
            );
            last = event.progress;
        }
        assert!((last - 1.0).abs() < 1e-9, "final progress: {last}");
    }

    #[test]
    fn test_pass_captures_recording() {
        let dir = tempfile::tempdir().unwrap();
        let scenarios = [scenario("fresh", "flow:p2p-trade", Some("fresh.yaml"))];
        let config = setup(dir.path(), &scenarios);
        let recordings_dir = config.recordings_dir.clone();
        let mut store = MemoryRunStore::new();

        let orchestrator = BatchOrchestrator::new(config, FakeRunner::passing());
        orchestrator
            .run_batch(&mut store, &mut VecSink::new())
            .unwrap();

        assert_eq!(store.recordings().len(), 1);
        let recording = &store.recordings()[0];
        assert_eq!(recording.path_id, "flow:p2p-trade");
        assert!(recording.filename.starts_with("fresh-"));
        assert!(recording.filename.ends_with(".mp4"));
        assert!(recordings_dir.join(&recording.filename).is_file());
    }

    #[test]
    fn test_recording_failure_leaves_scenario_passed() {
        let dir = tempfile::tempdir().unwrap();
        let scenarios = [scenario("fresh", "flow:p2p-trade", Some("fresh.yaml"))];
        let config = setup(dir.path(), &scenarios);
        let mut store = MemoryRunStore::new();

        let mut runner = FakeRunner::passing();
        runner.write_output = false;
        let orchestrator = BatchOrchestrator::new(config, runner);
        let summary = orchestrator
            .run_batch(&mut store, &mut VecSink::new())
            .unwrap();

        assert_eq!(summary.passed, 1);
        assert_eq!(orchestrator.runner.recorded().len(), 1);
        assert!(store.recordings().is_empty(), "no output file, no row");
        let latest = store.list_latest_runs().unwrap();
        assert_eq!(latest[0].status, RunStatus::Passed);
    }

    // ── Helpers ──────────────────────────────────────────────────────

    #[test]
    fn test_human_age_formats() {
        assert_eq!(human_age(5_000), "5s");
        assert_eq!(human_age(65_000), "1m 5s");
        assert_eq!(human_age(3 * 3_600_000 + 10 * 60_000), "3h 10m");
        assert_eq!(human_age(2 * 86_400_000 + 5 * 3_600_000), "2d 5h");
        assert_eq!(human_age(0), "0s");
    }

    #[test]
    fn test_batch_ids_are_prefixed_and_distinct() {
        let first = new_batch_id();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let second = new_batch_id();
        assert!(first.starts_with("batch-"));
        assert!(second.starts_with("batch-"));
        assert_ne!(first, second);

        let suffix = first.rsplit('-').next().unwrap();
        assert_eq!(suffix.len(), 4);
        assert!(u16::from_str_radix(suffix, 16).is_ok());
    }

    #[test]
    fn test_render_summary_is_markdown() {
        let summary = BatchSummary {
            schema_version: BATCH_SCHEMA_VERSION.to_owned(),
            batch_id: "batch-1-00ff".to_owned(),
            total: 3,
            passed: 1,
            failed: 1,
            cached: 1,
            duration_ms: 61_000,
        };
        let text = summary.render_summary();
        assert!(text.contains("## Batch summary"));
        assert!(text.contains("| 3 | 1 | 1 | 1 |"));
        assert!(text.contains("1m 1s"));
    }

    #[test]
    fn test_summary_wire_shape() {
        let summary = BatchSummary {
            schema_version: BATCH_SCHEMA_VERSION.to_owned(),
            batch_id: "batch-1-00ff".to_owned(),
            total: 2,
            passed: 2,
            failed: 0,
            cached: 0,
            duration_ms: 1234,
        };
        let value: serde_json::Value =
            serde_json::from_str(&summary.to_json().unwrap()).unwrap();
        assert_eq!(value["schemaVersion"], "flowcov.batch.v1");
        assert_eq!(value["batchId"], "batch-1-00ff");
        assert_eq!(value["durationMs"], 1234);
        assert!(summary.all_green());
    }
}
