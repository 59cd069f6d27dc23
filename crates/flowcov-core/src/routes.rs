//! Route to component resolution.
//!
//! Walks the file-system routing tree (one source file per route), reads
//! each route file's import statements, and resolves feature-scoped
//! imports to the component files that implement the route. Barrel files
//! (feature `index.ts` re-export hubs) are followed one hop.
//!
//! Everything here is text-pattern scanning over raw source, not a
//! language parser. Anything that does not match or does not resolve is
//! skipped silently; this is lenient static analysis, not a
//! build-blocking check.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

// ── Configuration ────────────────────────────────────────────────────────

/// Where routes and features live and how imports reference them.
#[derive(Debug, Clone)]
pub struct RoutesConfig {
    /// Root directory containing one file per route.
    pub routes_root: PathBuf,
    /// Root directory containing feature implementations.
    pub features_root: PathBuf,
    /// Module-path prefix that marks a feature-scoped import.
    pub feature_alias: String,
    /// Shared layout filename, excluded from route scanning.
    pub layout_file: String,
    /// Source extensions tried in order when resolving imports.
    pub extensions: Vec<String>,
}

impl Default for RoutesConfig {
    fn default() -> Self {
        Self {
            routes_root: PathBuf::from("app"),
            features_root: PathBuf::from("features"),
            feature_alias: "@features/".to_owned(),
            layout_file: "_layout.tsx".to_owned(),
            extensions: vec![".tsx".to_owned(), ".ts".to_owned()],
        }
    }
}

// ── Import extraction ────────────────────────────────────────────────────

/// One symbol imported by a route file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportBinding {
    /// Exported name of the symbol (the name before any `as` rename).
    pub symbol: String,
    /// Module path as written in the source.
    pub module: String,
    /// Whether the symbol came from a `{ ... }` named list.
    pub named: bool,
}

/// Extract import bindings from source text, in document order.
///
/// Handles single-line `import X from 'm'`, `import { A, B } from 'm'`,
/// and the mixed `import X, { A } from 'm'` form. Type-only imports are
/// treated like value imports; star imports are ignored.
#[must_use]
pub fn extract_imports(text: &str) -> Vec<ImportBinding> {
    let mut out = Vec::new();
    for line in text.lines() {
        let t = line.trim();
        let Some(rest) = t.strip_prefix("import ") else {
            continue;
        };
        let Some(from_pos) = rest.find(" from ") else {
            continue;
        };
        let Some(module) = first_quoted(&rest[from_pos..]) else {
            continue;
        };
        let clause = rest[..from_pos].trim();
        let clause = clause.strip_prefix("type ").unwrap_or(clause);

        let (default_part, named_part) = match clause.find('{') {
            Some(open) => {
                let inner = match clause[open..].find('}') {
                    Some(close) => &clause[open + 1..open + close],
                    None => &clause[open + 1..],
                };
                (&clause[..open], Some(inner))
            }
            None => (clause, None),
        };

        let default_name = default_part.trim().trim_end_matches(',').trim();
        if !default_name.is_empty() && !default_name.contains('*') {
            out.push(ImportBinding {
                symbol: default_name.to_owned(),
                module: module.to_owned(),
                named: false,
            });
        }
        if let Some(inner) = named_part {
            for raw in inner.split(',') {
                let mut name = raw.trim();
                if let Some(stripped) = name.strip_prefix("type ") {
                    name = stripped.trim();
                }
                if let Some(pos) = name.find(" as ") {
                    name = name[..pos].trim();
                }
                if !name.is_empty() {
                    out.push(ImportBinding {
                        symbol: name.to_owned(),
                        module: module.to_owned(),
                        named: true,
                    });
                }
            }
        }
    }
    out
}

/// Find the relative path a barrel file re-exports `symbol` from.
///
/// Matches lines of the form
/// `export { default as Symbol } from './relative/path';` with an exact
/// symbol-name boundary, so `Card` never matches `CardList`.
#[must_use]
pub fn find_barrel_reexport(barrel_text: &str, symbol: &str) -> Option<String> {
    let needle = format!("default as {symbol}");
    for line in barrel_text.lines() {
        let t = line.trim();
        if !t.starts_with("export") {
            continue;
        }
        let Some(pos) = t.find(&needle) else {
            continue;
        };
        let after = &t[pos + needle.len()..];
        if after
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            continue;
        }
        let Some(from_pos) = after.find(" from ") else {
            continue;
        };
        return first_quoted(&after[from_pos..]).map(str::to_owned);
    }
    None
}

/// First single- or double-quoted string in `text`.
fn first_quoted(text: &str) -> Option<&str> {
    let open = text.find(['\'', '"'])?;
    let quote = char::from(text.as_bytes()[open]);
    let rest = &text[open + 1..];
    let close = rest.find(quote)?;
    Some(&rest[..close])
}

// ── Resolution ───────────────────────────────────────────────────────────

/// Resolve every route to the component files implementing it.
///
/// Returns route segment to absolute component paths, sorted by segment.
/// Routes with no resolvable feature import contribute no entry.
#[must_use]
pub fn resolve_route_components(config: &RoutesConfig) -> BTreeMap<String, Vec<PathBuf>> {
    let mut map: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    let mut route_files = Vec::new();
    collect_route_files(&config.routes_root, config, &mut route_files);
    route_files.sort();

    for file in route_files {
        let Ok(text) = fs::read_to_string(&file) else {
            continue;
        };
        let mut components: Vec<PathBuf> = Vec::new();
        for import in extract_imports(&text) {
            let Some(sub) = import.module.strip_prefix(config.feature_alias.as_str()) else {
                continue;
            };
            let resolved = if sub.contains('/') {
                resolve_direct_import(config, sub)
            } else {
                resolve_barrel_import(config, sub, &import.symbol)
            };
            let Some(path) = resolved else {
                continue;
            };
            let path = fs::canonicalize(&path).unwrap_or(path);
            if !components.contains(&path) {
                components.push(path);
            }
        }
        if components.is_empty() {
            continue;
        }
        let Some(segment) = route_segment(&config.routes_root, &file, config) else {
            continue;
        };
        tracing::debug!(segment = %segment, files = components.len(), "route resolved");
        let entry = map.entry(segment).or_default();
        for component in components {
            if !entry.contains(&component) {
                entry.push(component);
            }
        }
    }
    map
}

/// Derive the route segment key for a route file.
///
/// The key is the path relative to the routes root, slash-joined, with
/// the source extension stripped; an `index` leaf stands for its parent
/// directory and is dropped.
#[must_use]
pub fn route_segment(routes_root: &Path, file: &Path, config: &RoutesConfig) -> Option<String> {
    let rel = file.strip_prefix(routes_root).ok()?;
    let mut parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    let last = parts.pop()?;
    let stem = config
        .extensions
        .iter()
        .find_map(|ext| last.strip_suffix(ext.as_str()))
        .unwrap_or(last.as_str());
    if stem != "index" {
        parts.push(stem.to_owned());
    }
    Some(parts.join("/"))
}

fn collect_route_files(dir: &Path, config: &RoutesConfig, out: &mut Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return; // Missing or unreadable root: no routes.
    };
    for entry in entries {
        let Ok(entry) = entry else { continue };
        let path = entry.path();
        if path.is_dir() {
            collect_route_files(&path, config, out);
        } else if path.is_file() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name == config.layout_file {
                continue;
            }
            if config.extensions.iter().any(|ext| name.ends_with(ext.as_str())) {
                out.push(path);
            }
        }
    }
}

fn resolve_direct_import(config: &RoutesConfig, sub_path: &str) -> Option<PathBuf> {
    for ext in &config.extensions {
        let candidate = config.features_root.join(format!("{sub_path}{ext}"));
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

fn resolve_barrel_import(config: &RoutesConfig, feature: &str, symbol: &str) -> Option<PathBuf> {
    let feature_dir = config.features_root.join(feature);
    let barrel_text = config.extensions.iter().find_map(|ext| {
        let barrel = feature_dir.join(format!("index{ext}"));
        fs::read_to_string(barrel).ok()
    })?;
    let rel = find_barrel_reexport(&barrel_text, symbol)?;
    let rel = rel.strip_prefix("./").unwrap_or(&rel);
    for ext in &config.extensions {
        let candidate = feature_dir.join(format!("{rel}{ext}"));
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

// ── Tests ────────────────────────────────────────────────────────────────
