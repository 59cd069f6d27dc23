//! Identifier to graph-path resolution.
//!
//! Composes the identifier index with the static route table: identifier
//! to route segment, route segment to flow steps. Both lookups miss
//! silently; an identifier nobody mapped simply contributes no coverage.

use std::collections::BTreeMap;

use crate::catalog::RoutePathMapping;

/// One (graph path, step) coordinate reached by a test identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedStep {
    /// Graph-path id.
    pub path_id: String,
    /// Zero-based step index within the path.
    pub step_index: u32,
    /// Step label from the route table.
    pub label: String,
}

/// Resolve an identifier to every flow step its route participates in.
///
/// Returns the empty vector when the identifier is unknown or its route
/// segment is absent from the path table (a dead-end route). A route on
/// several flows yields one element per flow, in table order.
#[must_use]
pub fn resolve_identifier(
    identifier: &str,
    index: &BTreeMap<String, String>,
    table: &BTreeMap<String, Vec<RoutePathMapping>>,
) -> Vec<ResolvedStep> {
    let Some(segment) = index.get(identifier) else {
        return Vec::new();
    };
    let Some(mappings) = table.get(segment) else {
        return Vec::new();
    };
    mappings
        .iter()
        .map(|m| ResolvedStep {
            path_id: m.path_id.clone(),
            step_index: m.step_index,
            label: m.label.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{self, PATH_ORDER_HISTORY, PATH_P2P_TRADE};

    fn structural_index() -> BTreeMap<String, String> {
        catalog::structural_identifiers().into_iter().collect()
    }

    #[test]
    fn test_single_flow_identifier() {
        let steps =
            resolve_identifier("tab-discover", &structural_index(), &catalog::route_path_table());
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].path_id, PATH_P2P_TRADE);
        assert_eq!(steps[0].step_index, 0);
        assert_eq!(steps[0].label, "Open discover tab");
    }

    #[test]
    fn test_multi_flow_identifier_yields_one_step_per_flow() {
        let steps =
            resolve_identifier("tab-orders", &structural_index(), &catalog::route_path_table());
        let coords: Vec<(&str, u32)> = steps
            .iter()
            .map(|s| (s.path_id.as_str(), s.step_index))
            .collect();
        assert_eq!(coords, vec![(PATH_ORDER_HISTORY, 0), (PATH_P2P_TRADE, 4)]);
    }

    #[test]
    fn test_unknown_identifier_misses() {
        let steps =
            resolve_identifier("no-such-id", &structural_index(), &catalog::route_path_table());
        assert!(steps.is_empty());
    }

    #[test]
    fn test_dead_end_route_misses() {
        // `tab-profile` maps to `(profile)`, which the path table
        // intentionally omits.
        let steps =
            resolve_identifier("tab-profile", &structural_index(), &catalog::route_path_table());
        assert!(steps.is_empty());
    }
}
