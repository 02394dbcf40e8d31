//! Compilation units of one build and how they relate to the prior build.

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use rustc_hash::FxHashSet;

use crate::record::BuildRecord;

/// A source file compiled by this build.
///
/// Identity is the path alone; `ordinal` is the position on the command line.
#[derive(Clone, Debug)]
pub struct CompilationUnit {
    path: PathBuf,
    ordinal: usize,
}

impl CompilationUnit {
    pub fn new(path: impl Into<PathBuf>, ordinal: usize) -> Self {
        Self {
            path: path.into(),
            ordinal,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn ordinal(&self) -> usize {
        self.ordinal
    }
}

impl PartialEq for CompilationUnit {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for CompilationUnit {}

impl Hash for CompilationUnit {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path.hash(state);
    }
}

impl PartialOrd for CompilationUnit {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CompilationUnit {
    fn cmp(&self, other: &Self) -> Ordering {
        self.path.cmp(&other.path)
    }
}

/// Current units partitioned against the prior build.
///
/// `current_in_order` and `current_set` hold the same units; no disappeared
/// unit is current.
#[derive(Clone, Debug, Default)]
pub struct CompilationUnitSet {
    current_in_order: Vec<CompilationUnit>,
    current_set: FxHashSet<CompilationUnit>,
    disappeared: FxHashSet<CompilationUnit>,
}

impl CompilationUnitSet {
    /// Partition `inputs` against the units the prior build compiled.
    ///
    /// A repeated input keeps its first position.
    pub fn partition<I, P>(inputs: I, record: Option<&BuildRecord>) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let mut current_in_order = Vec::new();
        let mut current_set = FxHashSet::default();
        for path in inputs {
            let unit = CompilationUnit::new(path, current_in_order.len());
            if current_set.insert(unit.clone()) {
                current_in_order.push(unit);
            }
        }

        let disappeared = record
            .into_iter()
            .flat_map(BuildRecord::input_paths)
            .enumerate()
            .map(|(ordinal, path)| CompilationUnit::new(path, ordinal))
            .filter(|unit| !current_set.contains(unit))
            .collect();

        Self {
            current_in_order,
            current_set,
            disappeared,
        }
    }

    /// Current units in command-line order.
    pub fn current_in_order(&self) -> &[CompilationUnit] {
        &self.current_in_order
    }

    pub fn current_set(&self) -> &FxHashSet<CompilationUnit> {
        &self.current_set
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.current_set.contains(&CompilationUnit::new(path, 0))
    }

    pub fn disappeared(&self) -> &FxHashSet<CompilationUnit> {
        &self.disappeared
    }

    /// Disappeared units sorted by path.
    pub fn disappeared_sorted(&self) -> Vec<&CompilationUnit> {
        let mut units: Vec<_> = self.disappeared.iter().collect();
        units.sort();
        units
    }

    pub fn len(&self) -> usize {
        self.current_in_order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.current_in_order.is_empty()
    }
}

#[cfg(test)]
mod tests;
