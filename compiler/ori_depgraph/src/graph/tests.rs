#![allow(clippy::unwrap_used, clippy::expect_used)]

use pretty_assertions::assert_eq;

use super::*;
use crate::fs::VirtualFileSystem;
use crate::key::ExternalDependency;

const MATH: &str = "/lib/math.orim";
const IO: &str = "/lib/io.orim";

fn source(name: &str) -> DependencySource {
    DependencySource::new(format!("/build/{name}.deps"))
}

fn unit(name: &str) -> PathBuf {
    PathBuf::from(format!("/src/{name}.ori"))
}

fn node(key: DeclKey, name: &str) -> NodeKey {
    NodeKey::new(key, Some(source(name)))
}

fn units(names: &[&str]) -> FxHashSet<PathBuf> {
    names.iter().map(|name| unit(name)).collect()
}

/// `a` defines `area` and uses math; `b` uses `area`; `c` uses io only.
fn three_units(fs: &VirtualFileSystem, check: &ExternalCheck<'_>) -> ModuleDependencyGraph {
    let mut graph = ModuleDependencyGraph::new(GraphPhase::BuildingFromSummaries);
    for name in ["a", "b", "c"] {
        graph.add_unit(unit(name), source(name));
    }
    let a = DependencySummary::new()
        .provide(DeclKey::top_level("area"), Fingerprint::new(1))
        .depend_from(DeclKey::top_level("sqrt"), DeclKey::top_level("area"))
        .external(ExternalDependency::new(MATH));
    let b = DependencySummary::new()
        .provide(DeclKey::top_level("main"), Fingerprint::new(2))
        .depend_from(DeclKey::top_level("area"), DeclKey::top_level("main"));
    let c = DependencySummary::new()
        .provide(DeclKey::top_level("log"), Fingerprint::new(3))
        .external(ExternalDependency::new(IO));

    fs.insert(MATH, "", Timestamp::from_secs(5));
    fs.insert(IO, "", Timestamp::from_secs(5));
    graph.integrate(&source("a"), &a, check);
    graph.integrate(&source("b"), &b, check);
    graph.integrate(&source("c"), &c, check);
    graph
}

#[test]
fn fresh_integration_marks_everything_changed() {
    let fs = VirtualFileSystem::new();
    let check = ExternalCheck::new(&fs, Timestamp::from_secs(10));
    let mut graph = ModuleDependencyGraph::new(GraphPhase::BuildingFromSummaries);
    let summary = DependencySummary::new().provide(DeclKey::top_level("area"), Fingerprint::new(1));

    let integration = graph.integrate(&source("a"), &summary, &check);

    let expected: FxHashSet<NodeKey> = [
        node(DeclKey::top_level("area"), "a"),
        NodeKey::source_file(&source("a")),
    ]
    .into_iter()
    .collect();
    assert_eq!(integration.changed_nodes, expected);
    assert!(integration.invalidated_by_externals.is_empty());
}

#[test]
fn reintegration_reports_only_differences() {
    let fs = VirtualFileSystem::new();
    let check = ExternalCheck::new(&fs, Timestamp::from_secs(10));
    let mut graph = ModuleDependencyGraph::new(GraphPhase::BuildingFromSummaries);
    let before = DependencySummary::new()
        .provide(DeclKey::top_level("keep"), Fingerprint::new(1))
        .provide(DeclKey::top_level("edit"), Fingerprint::new(2))
        .provide(DeclKey::top_level("drop"), Fingerprint::new(3));
    let after = DependencySummary::new()
        .provide(DeclKey::top_level("keep"), Fingerprint::new(1))
        .provide(DeclKey::top_level("edit"), Fingerprint::new(20))
        .provide(DeclKey::top_level("new"), Fingerprint::new(4));
    graph.integrate(&source("a"), &before, &check);

    let integration = graph.integrate(&source("a"), &after, &check);

    let expected: FxHashSet<NodeKey> = [
        node(DeclKey::top_level("edit"), "a"),
        node(DeclKey::top_level("drop"), "a"),
        node(DeclKey::top_level("new"), "a"),
        NodeKey::source_file(&source("a")),
    ]
    .into_iter()
    .collect();
    assert_eq!(integration.changed_nodes, expected);
    assert!(!graph.contains(&node(DeclKey::top_level("drop"), "a")));
}

#[test]
fn identical_reintegration_changes_nothing() {
    let fs = VirtualFileSystem::new();
    let check = ExternalCheck::new(&fs, Timestamp::from_secs(10));
    let mut graph = ModuleDependencyGraph::new(GraphPhase::BuildingFromSummaries);
    let summary = DependencySummary::new()
        .provide(DeclKey::top_level("area"), Fingerprint::new(1))
        .depend(DeclKey::top_level("sqrt"));
    graph.integrate(&source("a"), &summary, &check);

    let integration = graph.integrate(&source("a"), &summary, &check);
    assert_eq!(integration, Integration::default());
}

#[test]
fn reintegration_replaces_old_uses() {
    let fs = VirtualFileSystem::new();
    let check = ExternalCheck::new(&fs, Timestamp::from_secs(10));
    let mut graph = ModuleDependencyGraph::new(GraphPhase::BuildingFromSummaries);
    graph.integrate(
        &source("a"),
        &DependencySummary::new().depend(DeclKey::top_level("old")),
        &check,
    );
    graph.integrate(
        &source("a"),
        &DependencySummary::new().depend(DeclKey::top_level("new")),
        &check,
    );

    assert_eq!(graph.users_of(&DeclKey::top_level("old")).count(), 0);
    assert_eq!(
        graph.users_of(&DeclKey::top_level("new")).collect::<Vec<_>>(),
        vec![&NodeKey::source_file(&source("a"))]
    );
}

#[test]
fn changed_external_invalidates_only_its_users() {
    let fs = VirtualFileSystem::new();
    let check = ExternalCheck::new(&fs, Timestamp::from_secs(10));
    let mut graph = three_units(&fs, &check);

    fs.set_modification_time(Path::new(MATH), Timestamp::from_secs(12));
    let a = DependencySummary::new()
        .provide(DeclKey::top_level("area"), Fingerprint::new(1))
        .external(ExternalDependency::new(MATH));
    let integration = graph.integrate(&source("a"), &a, &check);

    let invalidated = graph
        .collect_units_using_invalidated(&integration.invalidated_by_externals)
        .unwrap();
    assert_eq!(invalidated, units(&["a"]));
}

#[test]
fn added_externals_are_ignored_while_integrating() {
    let fs = VirtualFileSystem::new();
    let check = ExternalCheck::new(&fs, Timestamp::from_secs(10));
    let graph = three_units(&fs, &check);
    assert!(graph.externals().any(|path| path == Path::new(MATH)));
    assert!(graph.externals().any(|path| path == Path::new(IO)));
}

#[test]
fn unstatable_external_counts_as_changed() {
    let fs = VirtualFileSystem::new();
    let check = ExternalCheck::new(&fs, Timestamp::from_secs(10));
    assert!(check.has_changed(Path::new("/lib/gone.orim")));

    fs.insert("/lib/old.orim", "", Timestamp::from_secs(9));
    fs.insert("/lib/tie.orim", "", Timestamp::from_secs(10));
    assert!(!check.has_changed(Path::new("/lib/old.orim")));
    assert!(check.has_changed(Path::new("/lib/tie.orim")));
}

#[test]
fn collecting_externals_is_idempotent() {
    let fs = VirtualFileSystem::new();
    let check = ExternalCheck::new(&fs, Timestamp::from_secs(10));
    let mut graph = three_units(&fs, &check);

    assert!(graph
        .collect_nodes_invalidated_by_changed_or_added_externals(&check)
        .is_empty());
    assert!(graph
        .collect_nodes_invalidated_by_changed_or_added_externals(&check)
        .is_empty());
}

#[test]
fn use_edge_only_external_counts_as_added_once() {
    let fs = VirtualFileSystem::new();
    let check = ExternalCheck::new(&fs, Timestamp::from_secs(10));
    let mut graph = ModuleDependencyGraph::new(GraphPhase::UpdatingFromPrior);
    graph.add_unit(unit("a"), source("a"));
    fs.insert("/lib/net.orim", "", Timestamp::from_secs(1));
    graph.integrate(
        &source("a"),
        &DependencySummary::new().depend(DeclKey::external(Path::new("/lib/net.orim"))),
        &check,
    );

    let first = graph.collect_nodes_invalidated_by_changed_or_added_externals(&check);
    assert_eq!(first.len(), 1);
    assert!(first.contains(&NodeKey::source_file(&source("a"))));
    assert!(graph
        .collect_nodes_invalidated_by_changed_or_added_externals(&check)
        .is_empty());
}

#[test]
fn changed_external_found_on_collect() {
    let fs = VirtualFileSystem::new();
    let check = ExternalCheck::new(&fs, Timestamp::from_secs(10));
    let mut graph = three_units(&fs, &check);

    fs.set_modification_time(Path::new(IO), Timestamp::from_secs(11));
    let nodes = graph.collect_nodes_invalidated_by_changed_or_added_externals(&check);
    assert_eq!(
        graph.collect_units_using_invalidated(&nodes).unwrap(),
        units(&["c"])
    );
}

#[test]
fn changed_external_named_by_a_use_invalidates_while_integrating() {
    let fs = VirtualFileSystem::new();
    let check = ExternalCheck::new(&fs, Timestamp::from_secs(10));
    let external = DeclKey::external(Path::new("/lib/e.orim"));
    let summary = DependencySummary::new()
        .provide(DeclKey::top_level("area"), Fingerprint::new(1))
        .depend_from(external, DeclKey::top_level("area"));
    fs.insert("/lib/e.orim", "", Timestamp::from_secs(50));

    let mut fresh = ModuleDependencyGraph::new(GraphPhase::BuildingFromSummaries);
    fresh.add_unit(unit("a"), source("a"));
    let integration = fresh.integrate(&source("a"), &summary, &check);
    let from_fresh = fresh
        .collect_units_using_invalidated(&integration.invalidated_by_externals)
        .unwrap();
    assert_eq!(from_fresh, units(&["a"]));

    // The same summary read back as a prior graph reaches the same unit.
    let mut prior = ModuleDependencyGraph::new(GraphPhase::UpdatingFromPrior);
    prior.add_unit(unit("a"), source("a"));
    prior.integrate(
        &source("a"),
        &summary,
        &ExternalCheck::new(&fs, Timestamp::DISTANT_FUTURE),
    );
    let nodes = prior.collect_nodes_invalidated_by_changed_or_added_externals(&check);
    assert_eq!(prior.collect_units_using_invalidated(&nodes).unwrap(), from_fresh);
}

#[test]
fn closure_follows_use_edges_transitively() {
    let fs = VirtualFileSystem::new();
    let check = ExternalCheck::new(&fs, Timestamp::from_secs(10));
    let graph = three_units(&fs, &check);

    let start: FxHashSet<NodeKey> = [node(DeclKey::top_level("area"), "a")].into_iter().collect();
    assert_eq!(
        graph.collect_units_using_invalidated(&start).unwrap(),
        units(&["a", "b"])
    );
}

#[test]
fn closure_fails_on_unmapped_source() {
    let fs = VirtualFileSystem::new();
    let check = ExternalCheck::new(&fs, Timestamp::from_secs(10));
    let mut graph = ModuleDependencyGraph::new(GraphPhase::BuildingFromSummaries);
    graph.integrate(
        &source("orphan"),
        &DependencySummary::new().provide(DeclKey::top_level("x"), Fingerprint::new(1)),
        &check,
    );

    let start: FxHashSet<NodeKey> = [node(DeclKey::top_level("x"), "orphan")].into_iter().collect();
    let err = graph.collect_units_using_invalidated(&start).unwrap_err();
    assert!(matches!(err, IntegrationError::UnmappedSource(s) if s == source("orphan")));
}

#[test]
fn found_by_compiling_excludes_the_compiled_unit() {
    let fs = VirtualFileSystem::new();
    let check = ExternalCheck::new(&fs, Timestamp::from_secs(10));
    let mut graph = three_units(&fs, &check);

    let a = DependencySummary::new()
        .provide(DeclKey::top_level("area"), Fingerprint::new(1))
        .external(ExternalDependency::new(MATH))
        .external(ExternalDependency::new(IO));
    a.write(&fs, &source("a")).unwrap();
    fs.set_modification_time(Path::new(IO), Timestamp::from_secs(11));

    let found = graph
        .collect_units_requiring_compilation_from_externals_found_by_compiling(&unit("a"), &fs, &check)
        .unwrap();
    assert_eq!(found, units(&["c"]));
}

#[test]
fn found_by_compiling_needs_a_mapped_unit() {
    let fs = VirtualFileSystem::new();
    let check = ExternalCheck::new(&fs, Timestamp::from_secs(10));
    let mut graph = ModuleDependencyGraph::new(GraphPhase::UpdatingAfterCompilation);

    let err = graph
        .collect_units_requiring_compilation_from_externals_found_by_compiling(&unit("a"), &fs, &check)
        .unwrap_err();
    assert!(matches!(err, IntegrationError::MissingSource(_)));

    graph.add_unit(unit("a"), source("a"));
    let err = graph
        .collect_units_requiring_compilation_from_externals_found_by_compiling(&unit("a"), &fs, &check)
        .unwrap_err();
    assert!(matches!(err, IntegrationError::Summary(_)));
}

#[test]
fn verify_accepts_integrated_graph() {
    let fs = VirtualFileSystem::new();
    let check = ExternalCheck::new(&fs, Timestamp::from_secs(10));
    three_units(&fs, &check).verify().unwrap();
}

#[test]
fn verify_rejects_unmapped_source() {
    let fs = VirtualFileSystem::new();
    let check = ExternalCheck::new(&fs, Timestamp::from_secs(10));
    let mut graph = three_units(&fs, &check);
    graph.integrate(&source("d"), &DependencySummary::new(), &check);

    assert_eq!(graph.verify(), Err(VerifyError::UnmappedSource(source("d"))));
}

#[test]
fn dot_output_is_deterministic() {
    let fs = VirtualFileSystem::new();
    let check = ExternalCheck::new(&fs, Timestamp::from_secs(10));
    let dot = three_units(&fs, &check).to_dot();

    assert_eq!(dot, three_units(&fs, &check).to_dot());
    assert!(dot.starts_with("digraph \"dependencies\" {\n"));
    assert!(dot.contains("top-level `area` in /build/a.deps"));
    assert!(dot.contains("style=dashed"));
    assert!(dot.ends_with("}\n"));
}

#[test]
fn compiling_everything_follows_phase() {
    let mut graph = ModuleDependencyGraph::new(GraphPhase::BuildingFromSummaries);
    assert!(!graph.is_compiling_everything());
    graph.set_phase(GraphPhase::BuildingAfterEachCompilation);
    assert!(graph.is_compiling_everything());
}
