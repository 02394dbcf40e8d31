#![allow(clippy::unwrap_used, clippy::expect_used)]

use pretty_assertions::assert_eq;

use super::*;
use crate::record::{InputInfo, InputStatus};
use ori_depgraph::Timestamp;

fn record(inputs: &[&str]) -> BuildRecord {
    inputs.iter().fold(
        BuildRecord::new("0.1", "args", Timestamp::from_secs(1), Timestamp::from_secs(2)),
        |record, input| {
            record.with_input(
                *input,
                InputInfo::new(InputStatus::UpToDate, Timestamp::from_secs(1)),
            )
        },
    )
}

fn paths(units: &[CompilationUnit]) -> Vec<&Path> {
    units.iter().map(CompilationUnit::path).collect()
}

#[test]
fn keeps_command_line_order() {
    let set = CompilationUnitSet::partition(["/src/b.ori", "/src/a.ori"], None);

    assert_eq!(
        paths(set.current_in_order()),
        vec![Path::new("/src/b.ori"), Path::new("/src/a.ori")]
    );
    assert_eq!(set.current_in_order()[1].ordinal(), 1);
    assert_eq!(set.current_set().len(), 2);
    assert!(set.disappeared().is_empty());
}

#[test]
fn duplicate_inputs_keep_first_position() {
    let set = CompilationUnitSet::partition(["/src/a.ori", "/src/b.ori", "/src/a.ori"], None);
    assert_eq!(set.len(), 2);
    assert_eq!(set.current_set().len(), 2);
}

#[test]
fn removed_input_disappears() {
    let prior = record(&["/src/a.ori", "/src/b.ori", "/src/c.ori"]);
    let set = CompilationUnitSet::partition(["/src/a.ori", "/src/b.ori"], Some(&prior));

    let disappeared: Vec<_> = set.disappeared_sorted().into_iter().map(CompilationUnit::path).collect();
    assert_eq!(disappeared, vec![Path::new("/src/c.ori")]);
    assert!(!set.contains(Path::new("/src/c.ori")));
}

#[test]
fn added_input_is_not_disappeared() {
    let prior = record(&["/src/a.ori"]);
    let set = CompilationUnitSet::partition(["/src/a.ori", "/src/new.ori"], Some(&prior));
    assert!(set.disappeared().is_empty());
    assert!(set.contains(Path::new("/src/new.ori")));
}

#[test]
fn identity_ignores_ordinal() {
    assert_eq!(CompilationUnit::new("/src/a.ori", 0), CompilationUnit::new("/src/a.ori", 7));
}
