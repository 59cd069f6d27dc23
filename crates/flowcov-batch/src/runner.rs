//! Flow tool invocation.
//!
//! Wraps the external flow runner binary behind [`FlowRunner`] so the
//! orchestrator and tests never touch `std::process` directly. The
//! process path captures both output streams on reader threads (the
//! child must never block on a full pipe), polls for exit, and kills
//! the child at the deadline.

use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

/// Longest failure detail kept from tool output.
const MAX_DETAIL_CHARS: usize = 300;

/// How often the child is polled for exit.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

// ── Configuration ────────────────────────────────────────────────────────

/// Which binary to run and how long to wait for it.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Flow tool binary name or path.
    pub binary: String,
    /// Deadline for one `test` invocation.
    pub check_timeout: Duration,
    /// Deadline for one `record` invocation.
    pub record_timeout: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            binary: "maestro".to_owned(),
            check_timeout: Duration::from_secs(240),
            record_timeout: Duration::from_secs(300),
        }
    }
}

/// Result of one tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutcome {
    /// Whether the tool exited zero within the deadline.
    pub success: bool,
    /// Exit code, `-1` when the tool was killed or never started.
    pub exit_code: i32,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
    /// Failure detail extracted from tool output; empty on success.
    pub detail: String,
    /// Whether the deadline fired.
    pub timed_out: bool,
}

// ── Runner trait ─────────────────────────────────────────────────────────

/// Execution seam for the flow tool.
pub trait FlowRunner {
    /// Run one flow script in check mode.
    fn check(&self, script: &Path) -> ToolOutcome;

    /// Run one flow script while capturing a recording to `output`.
    fn record(&self, script: &Path, output: &Path) -> ToolOutcome;
}

/// [`FlowRunner`] that shells out to the configured binary.
#[derive(Debug)]
pub struct ProcessRunner {
    config: RunnerConfig,
}

impl ProcessRunner {
    /// Runner using `config`.
    #[must_use]
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    fn invoke(&self, subcommand: &str, paths: &[&Path], timeout: Duration) -> ToolOutcome {
        let start = Instant::now();
        let mut command = Command::new(&self.config.binary);
        command.arg(subcommand);
        for path in paths {
            command.arg(path);
        }
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(err) => {
                return ToolOutcome {
                    success: false,
                    exit_code: -1,
                    duration_ms: elapsed_ms(start),
                    detail: format!("failed to start `{}`: {err}", self.config.binary),
                    timed_out: false,
                }
            }
        };
        let stdout = spawn_reader(child.stdout.take());
        let stderr = spawn_reader(child.stderr.take());

        let deadline = start + timeout;
        let mut timed_out = false;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break Some(status),
                Ok(None) => {
                    if Instant::now() >= deadline {
                        timed_out = true;
                        let _ = child.kill();
                        let _ = child.wait();
                        break None;
                    }
                    thread::sleep(POLL_INTERVAL);
                }
                Err(err) => {
                    tracing::debug!(error = %err, "child poll failed");
                    let _ = child.kill();
                    let _ = child.wait();
                    break None;
                }
            }
        };
        let stdout = stdout.join().unwrap_or_default();
        let stderr = stderr.join().unwrap_or_default();

        let exit_code = status.and_then(|s| s.code()).unwrap_or(-1);
        let success = !timed_out && status.is_some() && exit_code == 0;
        let detail = if timed_out {
            format!("timed out after {}s", timeout.as_secs())
        } else if success {
            String::new()
        } else {
            extract_error_line(&stdout, &stderr)
                .unwrap_or_else(|| format!("exit code {exit_code}"))
        };
        let duration_ms = elapsed_ms(start);
        tracing::debug!(
            binary = %self.config.binary,
            subcommand,
            exit_code,
            timed_out,
            duration_ms,
            "flow tool finished"
        );
        ToolOutcome {
            success,
            exit_code,
            duration_ms,
            detail,
            timed_out,
        }
    }
}

impl FlowRunner for ProcessRunner {
    fn check(&self, script: &Path) -> ToolOutcome {
        self.invoke("test", &[script], self.config.check_timeout)
    }

    fn record(&self, script: &Path, output: &Path) -> ToolOutcome {
        self.invoke("record", &[script, output], self.config.record_timeout)
    }
}

// ── Output handling ──────────────────────────────────────────────────────

fn spawn_reader<R: Read + Send + 'static>(source: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut text = String::new();
        if let Some(mut source) = source {
            let _ = source.read_to_string(&mut text);
        }
        text
    })
}

/// Last meaningful line of tool output, stderr first.
///
/// Usage banners and help hints are skipped; the survivor is truncated
/// to a displayable length.
#[must_use]
pub fn extract_error_line(stdout: &str, stderr: &str) -> Option<String> {
    for source in [stderr, stdout] {
        let found = source.lines().rev().map(str::trim).find(|line| {
            !line.is_empty()
                && !line.starts_with("Usage:")
                && !line.starts_with("usage:")
                && !line.starts_with("Try ")
                && !line.contains("--help")
        });
        if let Some(line) = found {
            return Some(truncate_line(line, MAX_DETAIL_CHARS));
        }
    }
    None
}

fn truncate_line(line: &str, max: usize) -> String {
    if line.len() <= max {
        return line.to_owned();
    }
    let mut end = max;
    while end > 0 && !line.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...[truncated]", &line[..end])
}

/// First line of `<binary> --version`, if the binary runs and prints one.
#[must_use]
pub fn detect_runner_version(binary: &str) -> Option<String> {
    let output = Command::new(binary).arg("--version").output().ok()?;
    let text = String::from_utf8_lossy(&output.stdout);
    let line = text.lines().next()?.trim();
    if line.is_empty() {
        return None;
    }
    Some(line.to_owned())
}

pub(crate) fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

// ── Tests ────────────────────────────────────────────────────────────────
