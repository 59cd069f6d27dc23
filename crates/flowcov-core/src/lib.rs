//! Coverage derivation core.
//!
//! Chains the static-analysis stages that turn an application source
//! tree and a flow-script suite into a derived coverage manifest: route
//! resolution, identifier indexing, script parsing, identifier to
//! path-step resolution, and manifest aggregation. The registries the
//! chain resolves against (graph paths, route bindings, the scenario
//! catalog) live in [`catalog`].
//!
//! Everything is synchronous and deterministic, and the pipeline itself
//! is infallible: unreadable inputs degrade to absent coverage rather
//! than errors.

pub mod catalog;
pub mod content_hash;
pub mod identifiers;
pub mod manifest;
pub mod paths;
pub mod routes;
pub mod script;

pub use catalog::{
    graph_paths, known_path_ids, route_path_table, scenario_catalog, structural_identifiers,
    test_file_for_path, validate_catalog, GraphPathSpec, RoutePathMapping, ScenarioConfig,
};
pub use content_hash::{hash_bytes, hash_file};
pub use identifiers::build_identifier_index;
pub use manifest::{
    build_manifest, fill_uncovered, DerivedManifest, DerivedPathEntry, ManifestConfig,
    PathCoverage, TestCoverage, MANIFEST_SCHEMA_VERSION,
};
pub use paths::{resolve_identifier, ResolvedStep};
pub use routes::{resolve_route_components, RoutesConfig};
pub use script::parse_script_identifiers;
