#![allow(clippy::unwrap_used, clippy::expect_used)]

use pretty_assertions::assert_eq;

use super::*;
use crate::fingerprint::Fingerprint;
use crate::fs::VirtualFileSystem;
use crate::graph::ExternalCheck;
use crate::key::{DeclKey, DependencySource, ExternalDependency, NodeKey};
use crate::summary::DependencySummary;

const PRIORS: &str = "/build/main.priors";

fn populated(fs: &VirtualFileSystem) -> ModuleDependencyGraph {
    let mut graph = ModuleDependencyGraph::new(GraphPhase::BuildingFromSummaries);
    let check = ExternalCheck::new(fs, Timestamp::DISTANT_PAST);
    let summary = DependencySummary::new()
        .provide(DeclKey::top_level("area"), Fingerprint::new(3))
        .depend(DeclKey::top_level("sqrt"))
        .external(ExternalDependency::new("/lib/math.orim"));
    graph.integrate(&DependencySource::new("/build/a.deps"), &summary, &check);
    graph
}

#[test]
fn round_trip_preserves_nodes() {
    let fs = VirtualFileSystem::new();
    let graph = populated(&fs);
    graph
        .write(&fs, Path::new(PRIORS), Timestamp::from_secs(20))
        .unwrap();

    let back = ModuleDependencyGraph::read(&fs, Path::new(PRIORS), Timestamp::from_secs(10)).unwrap();
    assert_eq!(back.phase(), GraphPhase::UpdatingFromPrior);
    assert_eq!(back.len(), graph.len());
    assert_eq!(back.to_dot(), graph.to_dot());
    let area = NodeKey::new(
        DeclKey::top_level("area"),
        Some(DependencySource::new("/build/a.deps")),
    );
    assert_eq!(back.fingerprint(&area), Some(Fingerprint::new(3)));
    assert_eq!(back.source_for(Path::new("/src/a.ori")), None);
}

#[test]
fn saved_at_build_start_is_accepted() {
    let fs = VirtualFileSystem::new();
    populated(&fs)
        .write(&fs, Path::new(PRIORS), Timestamp::from_secs(10))
        .unwrap();
    assert!(ModuleDependencyGraph::read(&fs, Path::new(PRIORS), Timestamp::from_secs(10)).is_ok());
}

#[test]
fn saved_before_build_start_is_time_travelling() {
    let fs = VirtualFileSystem::new();
    populated(&fs)
        .write(&fs, Path::new(PRIORS), Timestamp::from_secs(9))
        .unwrap();

    let err = ModuleDependencyGraph::read(&fs, Path::new(PRIORS), Timestamp::from_secs(10)).unwrap_err();
    assert!(matches!(
        err,
        GraphReadError::TimeTravelling { saved_at, build_start }
            if saved_at == Timestamp::from_secs(9) && build_start == Timestamp::from_secs(10)
    ));
}

#[test]
fn other_version_is_rejected() {
    let fs = VirtualFileSystem::new();
    let header = GraphHeader {
        version: SERIALIZED_GRAPH_VERSION + 1,
        saved_at: Timestamp::from_secs(50),
    };
    let mut bytes = bincode::serialize(&header).unwrap();
    bincode::serialize_into(&mut bytes, &ModuleDependencyGraph::default()).unwrap();
    fs.write(Path::new(PRIORS), &bytes).unwrap();

    let err = ModuleDependencyGraph::read(&fs, Path::new(PRIORS), Timestamp::DISTANT_PAST).unwrap_err();
    assert!(matches!(
        err,
        GraphReadError::MismatchedVersion { expected, found }
            if expected == SERIALIZED_GRAPH_VERSION && found == SERIALIZED_GRAPH_VERSION + 1
    ));
}

#[test]
fn time_travelling_wins_over_other_version() {
    let fs = VirtualFileSystem::new();
    let header = GraphHeader {
        version: SERIALIZED_GRAPH_VERSION + 1,
        saved_at: Timestamp::from_secs(9),
    };
    fs.write(Path::new(PRIORS), &bincode::serialize(&header).unwrap())
        .unwrap();

    let err = ModuleDependencyGraph::read(&fs, Path::new(PRIORS), Timestamp::from_secs(10)).unwrap_err();
    assert!(matches!(
        err,
        GraphReadError::TimeTravelling { saved_at, .. } if saved_at == Timestamp::from_secs(9)
    ));
}

#[test]
fn missing_file_is_io_error() {
    let fs = VirtualFileSystem::new();
    let err = ModuleDependencyGraph::read(&fs, Path::new(PRIORS), Timestamp::DISTANT_PAST).unwrap_err();
    assert!(matches!(err, GraphReadError::Io { .. }));
}

#[test]
fn truncated_body_is_decode_error() {
    let fs = VirtualFileSystem::new();
    let header = GraphHeader {
        version: SERIALIZED_GRAPH_VERSION,
        saved_at: Timestamp::from_secs(50),
    };
    let mut bytes = bincode::serialize(&header).unwrap();
    bytes.extend_from_slice(&[0xff, 0xff, 0xff]);
    fs.write(Path::new(PRIORS), &bytes).unwrap();

    let err = ModuleDependencyGraph::read(&fs, Path::new(PRIORS), Timestamp::DISTANT_PAST).unwrap_err();
    assert!(matches!(err, GraphReadError::Decode { .. }));
}
