//! Reverse identifier index: test identifier to route segment.
//!
//! Seeds the index from the structural identifier table (tab-bar entries
//! that never appear in a component file), then scans every resolved
//! component file for `testID` occurrences. Insertion is strictly
//! first-writer-wins: structural entries are never overridden, and an
//! identifier appearing in two component files stays bound to the first
//! segment scanned. All iteration is over sorted structures so the
//! winner is the same on every platform.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::PathBuf;

const KEY: &str = "testID";

/// Build the identifier index from resolved route components.
///
/// `structural` pairs of (identifier, segment) are inserted first, in
/// slice order. Component files that cannot be read contribute nothing.
#[must_use]
pub fn build_identifier_index(
    route_components: &BTreeMap<String, Vec<PathBuf>>,
    structural: &[(String, String)],
) -> BTreeMap<String, String> {
    let mut index: BTreeMap<String, String> = BTreeMap::new();
    for (identifier, segment) in structural {
        index
            .entry(identifier.clone())
            .or_insert_with(|| segment.clone());
    }

    for (segment, files) in route_components {
        for file in files {
            let Ok(text) = fs::read_to_string(file) else {
                continue;
            };
            let mut seen = BTreeSet::new();
            let mut ids = extract_attribute_ids(&text);
            ids.extend(extract_object_ids(&text));
            for id in ids {
                if !seen.insert(id.clone()) {
                    continue;
                }
                index.entry(id).or_insert_with(|| segment.clone());
            }
        }
    }
    index
}

/// Extract JSX attribute identifiers: `testID="x"` or `testID={'x'}`.
#[must_use]
pub fn extract_attribute_ids(text: &str) -> Vec<String> {
    scan_ids(text, '=')
}

/// Extract object-literal identifiers: `testID: 'x'`.
#[must_use]
pub fn extract_object_ids(text: &str) -> Vec<String> {
    scan_ids(text, ':')
}

fn scan_ids(text: &str, sep: char) -> Vec<String> {
    let mut out = Vec::new();
    let bytes = text.as_bytes();
    let mut start = 0;
    while let Some(found) = text[start..].find(KEY) {
        let at = start + found;
        start = at + KEY.len();
        if at > 0 {
            let prev = bytes[at - 1];
            if prev.is_ascii_alphanumeric() || prev == b'_' {
                continue; // Part of a longer identifier, e.g. `myTestID`.
            }
        }
        let after_key = text[at + KEY.len()..].trim_start();
        let Some(after_sep) = after_key.strip_prefix(sep) else {
            continue;
        };
        let mut value_part = after_sep.trim_start();
        if sep == '=' {
            if let Some(inner) = value_part.strip_prefix('{') {
                value_part = inner.trim_start();
            }
        }
        let Some(value) = leading_quoted(value_part) else {
            continue;
        };
        if !value.is_empty() {
            out.push(value.to_owned());
        }
    }
    out
}

/// Quoted string at the very start of `text`, if any.
fn leading_quoted(text: &str) -> Option<&str> {
    let mut chars = text.chars();
    let quote = chars.next()?;
    if quote != '"' && quote != '\'' {
        return None;
    }
    let rest = chars.as_str();
    let close = rest.find(quote)?;
    Some(&rest[..close])
}

// ── Tests ────────────────────────────────────────────────────────────────
