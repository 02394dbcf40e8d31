#![allow(clippy::unwrap_used, clippy::expect_used)]

use pretty_assertions::assert_eq;

use super::*;
use crate::inter_module::{ModuleInfo, ModuleKind, OriModuleDetails, PrebuiltModuleDetails};
use crate::prescan::SourceImportPrescanner;
use ori_depgraph::VirtualFileSystem;

const MAIN_SOURCE: &str = "/src/main.ori";

struct Fixture {
    fs: VirtualFileSystem,
    prescanner: SourceImportPrescanner,
}

impl Fixture {
    /// `app` imports `std.math` (built from an interface) and `zlib`
    /// (foreign, built from one header). Outputs at t=10, inputs at t=5.
    fn new() -> Self {
        let fs = VirtualFileSystem::new();
        fs.insert(MAIN_SOURCE, "use std.math { sqrt }\nuse zlib { inflate }\n", Timestamp::from_secs(1));
        fs.insert("/lib/std/math.orii", "", Timestamp::from_secs(5));
        fs.insert("/cache/std.math.orim", "", Timestamp::from_secs(10));
        fs.insert("/usr/include/zlib.h", "", Timestamp::from_secs(5));
        fs.insert("/cache/zlib.pcm", "", Timestamp::from_secs(10));
        Self {
            fs,
            prescanner: SourceImportPrescanner::new(vec![MAIN_SOURCE.into()]),
        }
    }

    fn verify(&self, graph: &InterModuleDependencyGraph) -> Result<(), StalenessError> {
        StalenessVerifier::new(&self.fs, &self.prescanner).verify(graph)
    }
}

fn graph() -> InterModuleDependencyGraph {
    InterModuleDependencyGraph::new("app")
        .with_module(
            ModuleId::ori("app"),
            ModuleInfo::new("/build/app.orim", ModuleDetails::Ori(OriModuleDetails::default()))
                .with_dependencies(vec![ModuleId::ori("std.math"), ModuleId::foreign("zlib")]),
        )
        .with_module(
            ModuleId::ori("std.math"),
            ModuleInfo::new(
                "/cache/std.math.orim",
                ModuleDetails::Ori(OriModuleDetails {
                    interface_path: Some("/lib/std/math.orii".into()),
                    ..OriModuleDetails::default()
                }),
            ),
        )
        .with_module(
            ModuleId::foreign("zlib"),
            ModuleInfo::new("/cache/zlib.pcm", ModuleDetails::Foreign)
                .with_source_files(vec!["/usr/include/zlib.h".into()]),
        )
}

#[test]
fn older_inputs_are_fresh() {
    Fixture::new().verify(&graph()).unwrap();
}

#[test]
fn equal_times_are_fresh() {
    let fixture = Fixture::new();
    fixture
        .fs
        .set_modification_time(Path::new("/lib/std/math.orii"), Timestamp::from_secs(10));
    fixture.verify(&graph()).unwrap();
}

#[test]
fn newer_interface_names_module_and_input() {
    let fixture = Fixture::new();
    fixture
        .fs
        .set_modification_time(Path::new("/lib/std/math.orii"), Timestamp::from_secs(11));

    match fixture.verify(&graph()).unwrap_err() {
        StalenessError::OutOfDate {
            module,
            output,
            input,
        } => {
            assert_eq!(module, ModuleId::ori("std.math"));
            assert_eq!(output, PathBuf::from("/cache/std.math.orim"));
            assert_eq!(input, PathBuf::from("/lib/std/math.orii"));
        }
        other => panic!("expected OutOfDate, got {other:?}"),
    }
}

#[test]
fn newer_foreign_source_is_stale() {
    let fixture = Fixture::new();
    fixture
        .fs
        .set_modification_time(Path::new("/usr/include/zlib.h"), Timestamp::from_secs(12));
    let err = fixture.verify(&graph()).unwrap_err();
    assert!(matches!(err, StalenessError::OutOfDate { module, .. } if module == ModuleId::foreign("zlib")));
}

#[test]
fn missing_output_fails() {
    let fixture = Fixture::new();
    fixture.fs.remove_file(Path::new("/cache/zlib.pcm")).unwrap();
    let err = fixture.verify(&graph()).unwrap_err();
    assert!(matches!(err, StalenessError::UnableToStat { path, .. } if path == Path::new("/cache/zlib.pcm")));
}

#[test]
fn missing_input_fails() {
    let fixture = Fixture::new();
    fixture.fs.remove_file(Path::new("/lib/std/math.orii")).unwrap();
    let err = fixture.verify(&graph()).unwrap_err();
    assert!(matches!(err, StalenessError::UnableToStat { .. }));
}

#[test]
fn changed_imports_fail() {
    let fixture = Fixture::new();
    fixture.fs.insert(
        MAIN_SOURCE,
        "use std.math { sqrt }\nuse std.io { read }\n",
        Timestamp::from_secs(1),
    );

    match fixture.verify(&graph()).unwrap_err() {
        StalenessError::ImportSetChanged { added, removed } => {
            assert_eq!(added, vec!["std.io".to_string()]);
            assert_eq!(removed, vec!["zlib".to_string()]);
        }
        other => panic!("expected ImportSetChanged, got {other:?}"),
    }
}

#[test]
fn missing_main_module_fails() {
    let mut graph = graph();
    graph.main_module_name = "other".to_string();
    assert!(matches!(
        Fixture::new().verify(&graph),
        Err(StalenessError::MissingMainModule(name)) if name == "other"
    ));
}

#[test]
fn prebuilt_module_always_fails() {
    let graph = graph().with_module(
        ModuleId::new("blas", ModuleKind::Prebuilt),
        ModuleInfo::new(
            "/cache/blas.orim",
            ModuleDetails::Prebuilt(PrebuiltModuleDetails {
                compiled_module_path: "/opt/blas.orim".into(),
            }),
        ),
    );
    let err = Fixture::new().verify(&graph).unwrap_err();
    assert!(matches!(err, StalenessError::UnverifiablePrebuilt(id) if id.name == "blas"));
}

#[test]
fn placeholder_module_always_fails() {
    let graph = graph().with_module(
        ModuleId::new("pending", ModuleKind::Placeholder),
        ModuleInfo::new("/cache/pending.orim", ModuleDetails::Placeholder),
    );
    let err = Fixture::new().verify(&graph).unwrap_err();
    assert!(matches!(err, StalenessError::Placeholder(id) if id.name == "pending"));
}

#[test]
fn main_module_inputs_are_not_checked() {
    let fixture = Fixture::new();
    let mut graph = graph();
    if let Some(main) = graph.modules.get_mut(&ModuleId::ori("app")) {
        main.details = ModuleDetails::Placeholder;
    }
    fixture.verify(&graph).unwrap();
}
