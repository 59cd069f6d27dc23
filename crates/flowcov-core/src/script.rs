//! Flow-script parsing: which identifiers does a test touch?
//!
//! Flow scripts are declarative YAML-like files whose steps reference UI
//! elements through indented `id: "<identifier>"` lines, whatever the
//! step verb. A script can pull in shared sub-scripts with `runFlow:`
//! directives; parsing follows those includes recursively, guarded by a
//! visited set so cycles and duplicate includes terminate.
//!
//! An unreadable script yields the empty list. One corrupt file must
//! never abort a whole derivation run.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Collect every identifier a script references, includes followed.
///
/// The script's own identifiers come first in document order, then each
/// include's identifiers in directive order. `visited` holds canonical
/// paths already parsed; a path found there returns the empty list, which
/// both breaks include cycles and de-duplicates shared sub-scripts that
/// are included twice.
#[must_use]
pub fn parse_script_identifiers(
    script_path: &Path,
    visited: &mut BTreeSet<PathBuf>,
) -> Vec<String> {
    let canonical = fs::canonicalize(script_path).unwrap_or_else(|_| script_path.to_path_buf());
    if !visited.insert(canonical.clone()) {
        return Vec::new();
    }
    let Ok(text) = fs::read_to_string(&canonical) else {
        return Vec::new();
    };

    let mut ids = extract_step_ids(&text);
    for include in extract_includes(&text) {
        let base = canonical.parent().unwrap_or_else(|| Path::new("."));
        ids.extend(parse_script_identifiers(&base.join(include), visited));
    }
    ids
}

/// Extract identifiers from indented `id:` lines, in document order.
///
/// Values may be double-quoted, single-quoted, or bare. Top-level keys
/// (no indentation) are script configuration, not element references,
/// and are ignored.
#[must_use]
pub fn extract_step_ids(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for line in text.lines() {
        let trimmed = line.trim_start();
        if trimmed.len() == line.len() {
            continue; // Not indented.
        }
        let item = trimmed.strip_prefix("- ").unwrap_or(trimmed);
        let Some(raw) = item.strip_prefix("id:") else {
            continue;
        };
        let value = unquote(raw.trim());
        if !value.is_empty() {
            out.push(value.to_owned());
        }
    }
    out
}

/// Extract `runFlow:` include targets, in document order.
#[must_use]
pub fn extract_includes(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for line in text.lines() {
        let trimmed = line.trim_start();
        let item = trimmed.strip_prefix("- ").unwrap_or(trimmed);
        let Some(raw) = item.strip_prefix("runFlow:") else {
            continue;
        };
        let value = unquote(raw.trim());
        if !value.is_empty() {
            out.push(value.to_owned());
        }
    }
    out
}

fn unquote(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let first = bytes[0];
        if (first == b'"' || first == b'\'') && bytes[bytes.len() - 1] == first {
            return &value[1..value.len() - 1];
        }
    }
    value
}

// ── Tests ────────────────────────────────────────────────────────────────
