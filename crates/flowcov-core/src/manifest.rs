//! Derived coverage manifest.
//!
//! Runs the whole derivation chain over a flow-script suite: resolve
//! routes once, build the identifier index once, then parse every
//! top-level script and fold its identifiers into per-script and
//! per-path coverage. The manifest is a pure function of the current
//! file tree; it is rebuilt on demand and never persisted.
//!
//! All grouping uses ordered maps and sets, so two runs over unchanged
//! inputs serialize to byte-identical JSON.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::routes::RoutesConfig;
use crate::{catalog, identifiers, paths, routes, script};

/// Schema tag carried by every serialized manifest.
pub const MANIFEST_SCHEMA_VERSION: &str = "flowcov.manifest.v1";

// ── Types ────────────────────────────────────────────────────────────────

/// Coverage of one graph path by one test script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedPathEntry {
    /// Covered graph-path id.
    pub path_id: String,
    /// Distinct step indices the script reaches. Never empty: the entry
    /// only exists once at least one identifier resolved.
    pub steps: BTreeSet<u32>,
    /// Identifiers that produced those steps.
    pub derived_from: BTreeSet<String>,
}

/// Everything derived from one test script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCoverage {
    /// Script path relative to the suite directory, slash-joined.
    pub file: String,
    /// One entry per covered graph path.
    pub paths: Vec<DerivedPathEntry>,
}

/// Path-level rollup across all scripts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathCoverage {
    /// Graph-path id.
    pub path_id: String,
    /// Number of distinct scripts covering this path.
    pub test_count: usize,
    /// The covering scripts, sorted.
    pub files: Vec<String>,
}

/// Complete derived coverage manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedManifest {
    /// Schema tag for downstream compatibility checks.
    #[serde(default)]
    pub schema_version: String,
    /// Per-script coverage, sorted by file.
    pub tests: Vec<TestCoverage>,
    /// Per-path rollup, sorted by path id.
    pub coverage: Vec<PathCoverage>,
    /// Left empty by the builder; callers fill it by diffing against the
    /// full known-path set (see [`fill_uncovered`]).
    #[serde(default)]
    pub uncovered_paths: Vec<String>,
}

impl DerivedManifest {
    /// Serialize to pretty, deterministic JSON.
    ///
    /// # Errors
    ///
    /// Returns `Err` if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize from JSON.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the JSON is malformed.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Where the suite lives and how routes are resolved.
#[derive(Debug, Clone)]
pub struct ManifestConfig {
    /// Directory holding top-level flow scripts.
    pub suite_dir: PathBuf,
    /// Reserved subdirectory of shared sub-scripts, excluded from
    /// enumeration; its files are reachable only via `runFlow` includes.
    pub subflow_dir: String,
    /// Route and feature scanning configuration.
    pub routes: RoutesConfig,
}

impl Default for ManifestConfig {
    fn default() -> Self {
        Self {
            suite_dir: PathBuf::from("e2e/flows"),
            subflow_dir: "subflows".to_owned(),
            routes: RoutesConfig::default(),
        }
    }
}

// ── Building ─────────────────────────────────────────────────────────────

/// Build the derived coverage manifest for the configured suite.
///
/// Pure with respect to the file tree: no caching, no persistence, no
/// mutation. Unreadable scripts or components contribute nothing.
#[must_use]
pub fn build_manifest(config: &ManifestConfig) -> DerivedManifest {
    let route_components = routes::resolve_route_components(&config.routes);
    let structural = catalog::structural_identifiers();
    let index = identifiers::build_identifier_index(&route_components, &structural);
    let table = catalog::route_path_table();

    let mut files = Vec::new();
    collect_flow_files(&config.suite_dir, &config.subflow_dir, &mut files);
    files.sort();

    let mut tests = Vec::new();
    let mut contributors: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for file in &files {
        let rel = rel_display(&config.suite_dir, file);
        let mut visited = BTreeSet::new();
        let ids = script::parse_script_identifiers(file, &mut visited);

        let mut entries: BTreeMap<String, DerivedPathEntry> = BTreeMap::new();
        for id in &ids {
            for step in paths::resolve_identifier(id, &index, &table) {
                let entry = entries
                    .entry(step.path_id.clone())
                    .or_insert_with(|| DerivedPathEntry {
                        path_id: step.path_id.clone(),
                        steps: BTreeSet::new(),
                        derived_from: BTreeSet::new(),
                    });
                entry.steps.insert(step.step_index);
                entry.derived_from.insert(id.clone());
            }
        }
        for path_id in entries.keys() {
            contributors
                .entry(path_id.clone())
                .or_default()
                .insert(rel.clone());
        }
        tests.push(TestCoverage {
            file: rel,
            paths: entries.into_values().collect(),
        });
    }

    let coverage = contributors
        .into_iter()
        .map(|(path_id, covering)| PathCoverage {
            path_id,
            test_count: covering.len(),
            files: covering.into_iter().collect(),
        })
        .collect();

    tracing::debug!(tests = tests.len(), "derived manifest built");
    DerivedManifest {
        schema_version: MANIFEST_SCHEMA_VERSION.to_owned(),
        tests,
        coverage,
        uncovered_paths: Vec::new(),
    }
}

/// Fill `uncovered_paths` by diffing coverage against `known_path_ids`.
///
/// The result is sorted and de-duplicated.
pub fn fill_uncovered(manifest: &mut DerivedManifest, known_path_ids: &[String]) {
    let covered: BTreeSet<&str> = manifest
        .coverage
        .iter()
        .map(|c| c.path_id.as_str())
        .collect();
    let uncovered: BTreeSet<String> = known_path_ids
        .iter()
        .filter(|p| !covered.contains(p.as_str()))
        .cloned()
        .collect();
    manifest.uncovered_paths = uncovered.into_iter().collect();
}

fn collect_flow_files(dir: &Path, reserved: &str, out: &mut Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return; // Missing or unreadable suite: no tests.
    };
    for entry in entries {
        let Ok(entry) = entry else { continue };
        let path = entry.path();
        if path.is_dir() {
            if entry.file_name().to_string_lossy() == reserved {
                continue;
            }
            collect_flow_files(&path, reserved, out);
        } else if path.is_file() {
            let ext = path.extension().map(|e| e.to_string_lossy().to_lowercase());
            if matches!(ext.as_deref(), Some("yaml" | "yml")) {
                out.push(path);
            }
        }
    }
}

fn rel_display(root: &Path, file: &Path) -> String {
    file.strip_prefix(root)
        .unwrap_or(file)
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

// ── Tests ────────────────────────────────────────────────────────────────
