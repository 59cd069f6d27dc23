//! Persistent run cache.
//!
//! One row per scenario execution, keyed by scenario id and flow-script
//! content hash, so an unchanged script whose last run passed can be
//! served from cache instead of re-executed. Backed by SQLite for the
//! CLI and by an in-memory mirror for tests; both sit behind
//! [`RunStore`].

use std::collections::BTreeMap;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use flowcov_error::FlowcovResult;

// ── Types ────────────────────────────────────────────────────────────────

/// Lifecycle state of one scenario run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Execution started and has not finished.
    Running,
    /// The flow tool exited successfully.
    Passed,
    /// The flow tool failed, timed out, or never started.
    Failed,
}

impl RunStatus {
    /// Stable text form used in the store.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Passed => "passed",
            Self::Failed => "failed",
        }
    }

    /// Inverse of [`RunStatus::as_str`].
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "running" => Some(Self::Running),
            "passed" => Some(Self::Passed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// One scenario execution record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRunMeta {
    /// Scenario this run executed.
    pub scenario_id: String,
    /// Flow script path relative to the suite directory.
    pub flow_file: String,
    /// Content hash of the script at execution time. Empty when the
    /// script was missing.
    pub flow_hash: String,
    /// Current lifecycle state.
    pub status: RunStatus,
    /// Wall-clock duration, absent while still running.
    pub duration_ms: Option<u64>,
    /// Failure detail, absent on success.
    pub error_message: Option<String>,
    /// Batch this run belongs to.
    pub batch_id: String,
    /// Unix milliseconds at record time.
    pub created_at_ms: u64,
}

/// One captured flow recording.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingMeta {
    /// Graph path the recording demonstrates.
    pub path_id: String,
    /// Output file name inside the recordings directory.
    pub filename: String,
    /// Capture duration in milliseconds.
    pub duration_ms: u64,
    /// Millisecond offsets of step boundaries, when known.
    pub step_timestamps: Vec<u64>,
}

/// Unix time in milliseconds, `0` if the clock is before the epoch.
#[must_use]
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

// ── Store trait ──────────────────────────────────────────────────────────

/// Persistence seam for run and recording records.
pub trait RunStore {
    /// Newest passed run of `scenario_id` whose script hashed to
    /// `flow_hash`, if any. Failed and running rows never match.
    ///
    /// # Errors
    ///
    /// Returns `Err` when the backing store cannot be read.
    fn get_run_by_hash(
        &self,
        scenario_id: &str,
        flow_hash: &str,
    ) -> FlowcovResult<Option<TestRunMeta>>;

    /// Insert or update a run record, keyed by scenario id and batch id.
    /// Within one batch a scenario's record moves through its lifecycle
    /// in place; a new batch always gets a fresh row.
    ///
    /// # Errors
    ///
    /// Returns `Err` when the backing store cannot be written.
    fn upsert_run(&mut self, meta: &TestRunMeta) -> FlowcovResult<()>;

    /// Newest run per scenario, sorted by scenario id.
    ///
    /// # Errors
    ///
    /// Returns `Err` when the backing store cannot be read.
    fn list_latest_runs(&self) -> FlowcovResult<Vec<TestRunMeta>>;

    /// Insert or replace a recording record, keyed by filename.
    ///
    /// # Errors
    ///
    /// Returns `Err` when the backing store cannot be written.
    fn upsert_recording(&mut self, meta: &RecordingMeta) -> FlowcovResult<()>;
}

// ── In-memory store ──────────────────────────────────────────────────────

/// Vec-backed [`RunStore`] used by tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryRunStore {
    runs: Vec<TestRunMeta>,
    recordings: Vec<RecordingMeta>,
}

impl MemoryRunStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All run records in insertion order.
    #[must_use]
    pub fn runs(&self) -> &[TestRunMeta] {
        &self.runs
    }

    /// All recording records in insertion order.
    #[must_use]
    pub fn recordings(&self) -> &[RecordingMeta] {
        &self.recordings
    }
}

impl RunStore for MemoryRunStore {
    fn get_run_by_hash(
        &self,
        scenario_id: &str,
        flow_hash: &str,
    ) -> FlowcovResult<Option<TestRunMeta>> {
        // max_by_key keeps the last maximal element, so insertion order
        // breaks created-at ties in favour of the newest record.
        Ok(self
            .runs
            .iter()
            .filter(|r| {
                r.scenario_id == scenario_id
                    && r.flow_hash == flow_hash
                    && r.status == RunStatus::Passed
            })
            .max_by_key(|r| r.created_at_ms)
            .cloned())
    }

    fn upsert_run(&mut self, meta: &TestRunMeta) -> FlowcovResult<()> {
        match self
            .runs
            .iter_mut()
            .find(|r| r.scenario_id == meta.scenario_id && r.batch_id == meta.batch_id)
        {
            Some(existing) => *existing = meta.clone(),
            None => self.runs.push(meta.clone()),
        }
        Ok(())
    }

    fn list_latest_runs(&self) -> FlowcovResult<Vec<TestRunMeta>> {
        let mut latest: BTreeMap<&str, &TestRunMeta> = BTreeMap::new();
        for run in &self.runs {
            match latest.get(run.scenario_id.as_str()) {
                Some(existing) if existing.created_at_ms > run.created_at_ms => {}
                _ => {
                    latest.insert(&run.scenario_id, run);
                }
            }
        }
        Ok(latest.into_values().cloned().collect())
    }

    fn upsert_recording(&mut self, meta: &RecordingMeta) -> FlowcovResult<()> {
        match self
            .recordings
            .iter_mut()
            .find(|r| r.filename == meta.filename)
        {
            Some(existing) => *existing = meta.clone(),
            None => self.recordings.push(meta.clone()),
        }
        Ok(())
    }
}

// ── SQLite store ─────────────────────────────────────────────────────────

/// SQLite-backed [`RunStore`].
///
/// The schema is created on open and is additive-only; opening an
/// existing database never drops rows.
#[derive(Debug)]
pub struct SqliteRunStore {
    conn: Connection,
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS flow_runs (
    id            INTEGER PRIMARY KEY,
    scenario_id   TEXT NOT NULL,
    flow_file     TEXT NOT NULL,
    flow_hash     TEXT NOT NULL,
    status        TEXT NOT NULL,
    duration_ms   INTEGER,
    error_message TEXT,
    batch_id      TEXT NOT NULL,
    created_at_ms INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_flow_runs_scenario_hash
    ON flow_runs (scenario_id, flow_hash, status);
CREATE TABLE IF NOT EXISTS flow_recordings (
    filename        TEXT PRIMARY KEY,
    path_id         TEXT NOT NULL,
    duration_ms     INTEGER NOT NULL,
    step_timestamps TEXT NOT NULL
);
";

const RUN_COLUMNS: &str = "scenario_id, flow_file, flow_hash, status, \
                           duration_ms, error_message, batch_id, created_at_ms";

impl SqliteRunStore {
    /// Open (creating if needed) the database at `path`.
    ///
    /// # Errors
    ///
    /// Returns `Err` when the file cannot be opened or the schema
    /// cannot be applied.
    pub fn open(path: &Path) -> FlowcovResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns `Err` when the schema cannot be applied.
    pub fn in_memory() -> FlowcovResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }
}

fn run_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TestRunMeta> {
    let status_text: String = row.get(3)?;
    let status = RunStatus::parse(&status_text).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            format!("unknown run status `{status_text}`").into(),
        )
    })?;
    let duration: Option<i64> = row.get(4)?;
    let created: i64 = row.get(7)?;
    Ok(TestRunMeta {
        scenario_id: row.get(0)?,
        flow_file: row.get(1)?,
        flow_hash: row.get(2)?,
        status,
        duration_ms: duration.map(|v| u64::try_from(v).unwrap_or(0)),
        error_message: row.get(5)?,
        batch_id: row.get(6)?,
        created_at_ms: u64::try_from(created).unwrap_or(0),
    })
}

fn ms_to_sql(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

impl RunStore for SqliteRunStore {
    fn get_run_by_hash(
        &self,
        scenario_id: &str,
        flow_hash: &str,
    ) -> FlowcovResult<Option<TestRunMeta>> {
        let sql = format!(
            "SELECT {RUN_COLUMNS} FROM flow_runs \
             WHERE scenario_id = ?1 AND flow_hash = ?2 AND status = 'passed' \
             ORDER BY created_at_ms DESC, id DESC LIMIT 1"
        );
        let run = self
            .conn
            .query_row(&sql, params![scenario_id, flow_hash], run_from_row)
            .optional()?;
        Ok(run)
    }

    fn upsert_run(&mut self, meta: &TestRunMeta) -> FlowcovResult<()> {
        let duration = meta.duration_ms.map(ms_to_sql);
        let updated = self.conn.execute(
            "UPDATE flow_runs SET flow_file = ?3, flow_hash = ?4, status = ?5, \
             duration_ms = ?6, error_message = ?7, created_at_ms = ?8 \
             WHERE scenario_id = ?1 AND batch_id = ?2",
            params![
                meta.scenario_id,
                meta.batch_id,
                meta.flow_file,
                meta.flow_hash,
                meta.status.as_str(),
                duration,
                meta.error_message,
                ms_to_sql(meta.created_at_ms),
            ],
        )?;
        if updated == 0 {
            self.conn.execute(
                &format!("INSERT INTO flow_runs ({RUN_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"),
                params![
                    meta.scenario_id,
                    meta.flow_file,
                    meta.flow_hash,
                    meta.status.as_str(),
                    duration,
                    meta.error_message,
                    meta.batch_id,
                    ms_to_sql(meta.created_at_ms),
                ],
            )?;
        }
        Ok(())
    }

    fn list_latest_runs(&self) -> FlowcovResult<Vec<TestRunMeta>> {
        let sql = format!(
            "SELECT {RUN_COLUMNS} FROM flow_runs AS r \
             WHERE id = (SELECT id FROM flow_runs \
                         WHERE scenario_id = r.scenario_id \
                         ORDER BY created_at_ms DESC, id DESC LIMIT 1) \
             ORDER BY scenario_id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], run_from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn upsert_recording(&mut self, meta: &RecordingMeta) -> FlowcovResult<()> {
        let timestamps = serde_json::to_string(&meta.step_timestamps)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO flow_recordings \
             (filename, path_id, duration_ms, step_timestamps) \
             VALUES (?1, ?2, ?3, ?4)",
            params![
                meta.filename,
                meta.path_id,
                ms_to_sql(meta.duration_ms),
                timestamps,
            ],
        )?;
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────────────
