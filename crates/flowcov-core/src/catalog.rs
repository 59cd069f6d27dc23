//! Static registries: graph paths, route bindings, scenarios.
//!
//! Everything in this module is hand-authored, build-time data. Graph
//! paths name the logical application flows coverage is measured against;
//! the route table pins file-system route segments onto flow steps; the
//! scenario catalog curates runnable sub-traversals of those flows.
//!
//! Registries are returned as owned values from plain constructor
//! functions so call sites (and tests) can take and modify their own
//! copies. Iteration-order-sensitive consumers get ordered maps.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Graph-path id for the peer-to-peer trade flow.
pub const PATH_P2P_TRADE: &str = "flow:p2p-trade";
/// Graph-path id for the first-run onboarding flow.
pub const PATH_ONBOARDING: &str = "flow:onboarding";
/// Graph-path id for the wallet top-up flow.
pub const PATH_WALLET_TOPUP: &str = "flow:wallet-topup";
/// Graph-path id for the order-history flow.
pub const PATH_ORDER_HISTORY: &str = "flow:order-history";

// ── Types ────────────────────────────────────────────────────────────────

/// A named logical application flow with ordered, labelled steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphPathSpec {
    /// Stable flow id (`flow:...`).
    pub id: String,
    /// Human-readable flow name.
    pub label: String,
    /// Step labels; the index in this list is the step index.
    pub steps: Vec<String>,
}

/// Binds one route segment to one step of one graph path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutePathMapping {
    /// What reaching this route means within the flow.
    pub label: String,
    /// Owning graph-path id.
    pub path_id: String,
    /// Zero-based step index within the graph path.
    pub step_index: u32,
}

/// A curated, runnable sub-traversal of one graph path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioConfig {
    /// Stable scenario id, used as the run-cache key.
    pub id: String,
    /// Human-readable scenario name.
    pub label: String,
    /// One-line description for listings.
    pub description: String,
    /// Graph path this scenario traverses.
    pub parent_path_id: String,
    /// Subset of the parent path's step indices this scenario covers.
    pub step_indices: Vec<u32>,
    /// Executable flow script, relative to the suite directory. `None`
    /// means the scenario is curated but not yet automated; the batch
    /// orchestrator skips it entirely.
    pub test_file: Option<String>,
}

// ── Registries ───────────────────────────────────────────────────────────

/// All known graph paths.
#[must_use]
pub fn graph_paths() -> Vec<GraphPathSpec> {
    vec![
        path(
            PATH_P2P_TRADE,
            "Peer-to-peer trade",
            &[
                "Open discover tab",
                "Open listing",
                "Start trade",
                "Confirm trade",
                "Review in orders",
            ],
        ),
        path(
            PATH_ONBOARDING,
            "First-run onboarding",
            &["Welcome screen", "Create account", "Verify email"],
        ),
        path(
            PATH_WALLET_TOPUP,
            "Wallet top-up",
            &["Open wallet tab", "Choose amount", "Confirm payment"],
        ),
        path(
            PATH_ORDER_HISTORY,
            "Order history",
            &["Open orders tab", "Open order detail"],
        ),
    ]
}

/// Ids of all known graph paths, in registry order.
#[must_use]
pub fn known_path_ids() -> Vec<String> {
    graph_paths().into_iter().map(|p| p.id).collect()
}

/// Route segment to graph-path step bindings.
///
/// Routes absent from this table are dead ends for coverage purposes
/// (the `(profile)` tab is one, intentionally). A route participating in
/// several flows carries one mapping per flow.
#[must_use]
pub fn route_path_table() -> BTreeMap<String, Vec<RoutePathMapping>> {
    let mut table: BTreeMap<String, Vec<RoutePathMapping>> = BTreeMap::new();
    let mut bind = |segment: &str, label: &str, path_id: &str, step_index: u32| {
        table
            .entry(segment.to_owned())
            .or_default()
            .push(RoutePathMapping {
                label: label.to_owned(),
                path_id: path_id.to_owned(),
                step_index,
            });
    };

    bind("(discover)", "Open discover tab", PATH_P2P_TRADE, 0);
    bind("(discover)/listing/[id]", "Open listing", PATH_P2P_TRADE, 1);
    bind("trade/start", "Start trade", PATH_P2P_TRADE, 2);
    bind("trade/confirm", "Confirm trade", PATH_P2P_TRADE, 3);
    bind("(orders)", "Open orders tab", PATH_ORDER_HISTORY, 0);
    bind("(orders)", "Review in orders", PATH_P2P_TRADE, 4);
    bind("(orders)/order/[id]", "Open order detail", PATH_ORDER_HISTORY, 1);
    bind("(wallet)", "Open wallet tab", PATH_WALLET_TOPUP, 0);
    bind("(wallet)/topup", "Choose amount", PATH_WALLET_TOPUP, 1);
    bind("(wallet)/topup/confirm", "Confirm payment", PATH_WALLET_TOPUP, 2);
    bind("onboarding/welcome", "Welcome screen", PATH_ONBOARDING, 0);
    bind("onboarding/create-account", "Create account", PATH_ONBOARDING, 1);
    bind("onboarding/verify-email", "Verify email", PATH_ONBOARDING, 2);

    table
}

/// Structural test identifiers that never appear in a component file.
///
/// Tab-bar entries are declared in the navigator, not in the screens
/// themselves, so they are seeded into the identifier index directly.
/// Seeded entries are inserted first and are never overridden by a
/// same-named scanned identifier.
#[must_use]
pub fn structural_identifiers() -> Vec<(String, String)> {
    [
        ("tab-discover", "(discover)"),
        ("tab-orders", "(orders)"),
        ("tab-wallet", "(wallet)"),
        ("tab-profile", "(profile)"),
    ]
    .into_iter()
    .map(|(id, segment)| (id.to_owned(), segment.to_owned()))
    .collect()
}

/// The curated scenario catalog, in batch execution order.
#[must_use]
pub fn scenario_catalog() -> Vec<ScenarioConfig> {
    vec![
        scenario(
            "p2p-trade-happy-path",
            "P2P trade happy path",
            "Full trade from discovery through confirmation",
            PATH_P2P_TRADE,
            &[0, 1, 2, 3],
            Some("p2p-trade.yaml"),
        ),
        scenario(
            "onboarding-first-login",
            "Onboarding first login",
            "Account creation and email verification",
            PATH_ONBOARDING,
            &[0, 1, 2],
            Some("onboarding.yaml"),
        ),
        scenario(
            "wallet-topup-card",
            "Wallet top-up by card",
            "Top up the wallet with a saved card",
            PATH_WALLET_TOPUP,
            &[0, 1, 2],
            Some("wallet-topup.yaml"),
        ),
        scenario(
            "order-history-review",
            "Order history review",
            "Browse past orders and open a detail view",
            PATH_ORDER_HISTORY,
            &[0, 1],
            Some("order-history.yaml"),
        ),
        scenario(
            "trade-dispute-draft",
            "Trade dispute draft",
            "Curated dispute flow, not yet automated",
            PATH_P2P_TRADE,
            &[2, 3],
            None,
        ),
    ]
}

/// Flow script bound to a graph path, for on-demand recording.
///
/// Returns the first cataloged scenario of that path that declares a
/// test file. `None` means the path has no executable flow.
#[must_use]
pub fn test_file_for_path(path_id: &str) -> Option<String> {
    scenario_catalog()
        .into_iter()
        .filter(|s| s.parent_path_id == path_id)
        .find_map(|s| s.test_file)
}

// ── Validation ───────────────────────────────────────────────────────────

/// Cross-check the static registries against each other.
///
/// Returns human-readable problems; an empty list means the registries
/// are consistent. Run by the CLI listing and by tests.
#[must_use]
pub fn validate_catalog() -> Vec<String> {
    let mut problems = Vec::new();

    let step_counts: BTreeMap<String, usize> = graph_paths()
        .into_iter()
        .map(|p| (p.id, p.steps.len()))
        .collect();

    for (segment, mappings) in route_path_table() {
        for m in mappings {
            match step_counts.get(&m.path_id) {
                None => problems.push(format!(
                    "route `{segment}` maps to unknown path `{}`",
                    m.path_id
                )),
                Some(&count) => {
                    if m.step_index as usize >= count {
                        problems.push(format!(
                            "route `{segment}` maps to step {} of `{}` which has {count} steps",
                            m.step_index, m.path_id
                        ));
                    }
                }
            }
        }
    }

    let mut seen_scenarios = std::collections::BTreeSet::new();
    for s in scenario_catalog() {
        if !seen_scenarios.insert(s.id.clone()) {
            problems.push(format!("duplicate scenario id `{}`", s.id));
        }
        match step_counts.get(&s.parent_path_id) {
            None => problems.push(format!(
                "scenario `{}` references unknown path `{}`",
                s.id, s.parent_path_id
            )),
            Some(&count) => {
                for idx in &s.step_indices {
                    if *idx as usize >= count {
                        problems.push(format!(
                            "scenario `{}` covers step {idx} of `{}` which has {count} steps",
                            s.id, s.parent_path_id
                        ));
                    }
                }
            }
        }
        if s.step_indices.is_empty() {
            problems.push(format!("scenario `{}` covers no steps", s.id));
        }
        if matches!(s.test_file.as_deref(), Some("")) {
            problems.push(format!("scenario `{}` declares an empty test file", s.id));
        }
    }

    let mut seen_ids = std::collections::BTreeSet::new();
    for (identifier, segment) in structural_identifiers() {
        if !seen_ids.insert(identifier.clone()) {
            problems.push(format!("duplicate structural identifier `{identifier}`"));
        }
        if segment.is_empty() {
            problems.push(format!(
                "structural identifier `{identifier}` maps to an empty segment"
            ));
        }
    }

    problems
}

// ── Helpers ──────────────────────────────────────────────────────────────

fn path(id: &str, label: &str, steps: &[&str]) -> GraphPathSpec {
    GraphPathSpec {
        id: id.to_owned(),
        label: label.to_owned(),
        steps: steps.iter().map(|s| (*s).to_owned()).collect(),
    }
}

fn scenario(
    id: &str,
    label: &str,
    description: &str,
    parent_path_id: &str,
    step_indices: &[u32],
    test_file: Option<&str>,
) -> ScenarioConfig {
    ScenarioConfig {
        id: id.to_owned(),
        label: label.to_owned(),
        description: description.to_owned(),
        parent_path_id: parent_path_id.to_owned(),
        step_indices: step_indices.to_vec(),
        test_file: test_file.map(str::to_owned),
    }
}

// ── Tests ────────────────────────────────────────────────────────────────
