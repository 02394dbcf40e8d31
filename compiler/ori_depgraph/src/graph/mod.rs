//! The fine-grained intra-module dependency graph.
//!
//! Nodes are declarations as defined by one dependency source, each with an
//! optional fingerprint. Use edges run from a declaration key to the nodes
//! that use it, so invalidation walks from a changed definition to its
//! users. The graph also remembers every external dependency it has seen,
//! which is how it tells a newly added external from a known one.
//!
//! Units and dependency sources are mapped both ways; the mapping comes from
//! the output file map and is never persisted.

mod dot;
mod verify;

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::fingerprint::Fingerprint;
use crate::fs::{FileSystem, Timestamp};
use crate::key::{DeclKey, DeclKind, DependencySource, NodeKey};
use crate::summary::{DependencySummary, SummaryError};

pub use verify::VerifyError;

/// Where the graph is in its lifecycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum GraphPhase {
    /// Constructed from per-unit summaries.
    #[default]
    BuildingFromSummaries,
    /// Read from a prior build and being brought up to date.
    UpdatingFromPrior,
    /// Receiving summaries as jobs finish.
    UpdatingAfterCompilation,
    /// Empty, with every unit scheduled; summaries arrive as jobs finish.
    BuildingAfterEachCompilation,
}

/// Errors turning a unit's summary into invalidated units.
#[derive(Debug, thiserror::Error)]
pub enum IntegrationError {
    #[error("no dependency summary is mapped for unit {}", .0.display())]
    MissingSource(PathBuf),

    #[error(transparent)]
    Summary(#[from] SummaryError),

    #[error("dependency source {0} does not belong to any unit")]
    UnmappedSource(DependencySource),
}

/// Decides whether an external dependency changed since the prior build.
///
/// An external changed iff its modification time is at or after the prior
/// build's start, or it cannot be stat'd.
#[derive(Clone, Copy)]
pub struct ExternalCheck<'a> {
    fs: &'a dyn FileSystem,
    prior_build_start: Timestamp,
}

impl<'a> ExternalCheck<'a> {
    pub fn new(fs: &'a dyn FileSystem, prior_build_start: Timestamp) -> Self {
        Self {
            fs,
            prior_build_start,
        }
    }

    pub fn prior_build_start(&self) -> Timestamp {
        self.prior_build_start
    }

    pub fn has_changed(&self, path: &Path) -> bool {
        match self.fs.last_modification_time(path) {
            Ok(modified) => modified >= self.prior_build_start,
            Err(err) => {
                trace!(path = %path.display(), %err, "external dependency cannot be stat'd");
                true
            }
        }
    }
}

/// What integrating one summary did to the graph.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Integration {
    /// Nodes that appeared, disappeared or changed fingerprint.
    pub changed_nodes: FxHashSet<NodeKey>,
    /// Users of externals that changed since the prior build.
    pub invalidated_by_externals: FxHashSet<NodeKey>,
}

/// The fine-grained dependency graph of the units in one build.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ModuleDependencyGraph {
    /// Every node and its fingerprint.
    nodes: FxHashMap<NodeKey, Option<Fingerprint>>,
    /// Declaration key → nodes using it.
    uses: FxHashMap<DeclKey, FxHashSet<NodeKey>>,
    /// Dependency source → keys it defines.
    provides: FxHashMap<DependencySource, FxHashSet<DeclKey>>,
    /// Dependency source → keys its nodes use.
    used_by: FxHashMap<DependencySource, FxHashSet<DeclKey>>,
    /// External dependencies seen so far, with their last fingerprint.
    externals: FxHashMap<PathBuf, Option<Fingerprint>>,
    #[serde(skip)]
    phase: GraphPhase,
    #[serde(skip)]
    unit_to_source: FxHashMap<PathBuf, DependencySource>,
    #[serde(skip)]
    source_to_unit: FxHashMap<DependencySource, PathBuf>,
}

impl ModuleDependencyGraph {
    /// Create an empty graph in `phase`.
    #[must_use]
    pub fn new(phase: GraphPhase) -> Self {
        Self {
            phase,
            ..Self::default()
        }
    }

    pub fn phase(&self) -> GraphPhase {
        self.phase
    }

    pub fn set_phase(&mut self, phase: GraphPhase) {
        self.phase = phase;
    }

    /// Whether every unit is being compiled regardless of the graph.
    pub fn is_compiling_everything(&self) -> bool {
        self.phase == GraphPhase::BuildingAfterEachCompilation
    }

    /// Map `unit` to the dependency source its summary is written to.
    pub fn add_unit(&mut self, unit: impl Into<PathBuf>, source: DependencySource) {
        let unit = unit.into();
        self.source_to_unit.insert(source.clone(), unit.clone());
        self.unit_to_source.insert(unit, source);
    }

    pub fn source_for(&self, unit: &Path) -> Option<&DependencySource> {
        self.unit_to_source.get(unit)
    }

    pub fn unit_for(&self, source: &DependencySource) -> Option<&Path> {
        self.source_to_unit.get(source).map(PathBuf::as_path)
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, node: &NodeKey) -> bool {
        self.nodes.contains_key(node)
    }

    /// Fingerprint of `node`; `None` if the node is absent or unfingerprinted.
    pub fn fingerprint(&self, node: &NodeKey) -> Option<Fingerprint> {
        self.nodes.get(node).copied().flatten()
    }

    /// Nodes using `key`.
    pub fn users_of(&self, key: &DeclKey) -> impl Iterator<Item = &NodeKey> {
        self.uses.get(key).into_iter().flatten()
    }

    /// Keys defined by `source`.
    pub fn provided_by(&self, source: &DependencySource) -> impl Iterator<Item = &DeclKey> {
        self.provides.get(source).into_iter().flatten()
    }

    /// External dependencies the graph has recorded.
    pub fn externals(&self) -> impl Iterator<Item = &Path> {
        self.externals.keys().map(PathBuf::as_path)
    }

    /// Incorporate the summary stored at `source`.
    ///
    /// Old definitions and uses from `source` are replaced. Externals are
    /// recorded, and users of externals that changed since the prior build
    /// are reported; merely added externals are not, since every external of
    /// `source` is being integrated right now. Externals named only by a use
    /// are checked for change the same way.
    #[tracing::instrument(level = "trace", skip_all, fields(source = %source))]
    pub fn integrate(
        &mut self,
        source: &DependencySource,
        summary: &DependencySummary,
        check: &ExternalCheck<'_>,
    ) -> Integration {
        let mut integration = Integration::default();
        let file_node = NodeKey::source_file(source);

        let provided = provided_fingerprints(&file_node.key, summary);
        let old_keys = self.provides.remove(source).unwrap_or_default();
        for (key, fingerprint) in &provided {
            let node = NodeKey::new(key.clone(), Some(source.clone()));
            match self.nodes.insert(node.clone(), *fingerprint) {
                Some(old) if old == *fingerprint => {}
                _ => {
                    integration.changed_nodes.insert(node);
                }
            }
        }
        for key in old_keys {
            if !provided.contains_key(&key) {
                let node = NodeKey::new(key, Some(source.clone()));
                self.nodes.remove(&node);
                integration.changed_nodes.insert(node);
            }
        }
        self.provides
            .insert(source.clone(), provided.keys().cloned().collect());

        self.remove_uses_from(source);
        let mut used = FxHashSet::default();
        for dep in &summary.depends {
            let user = match &dep.user {
                Some(user) if provided.contains_key(user) => {
                    NodeKey::new(user.clone(), Some(source.clone()))
                }
                _ => file_node.clone(),
            };
            self.add_use(dep.key.clone(), user);
            if dep.key.is_external() {
                self.nodes.entry(NodeKey::new(dep.key.clone(), None)).or_insert(None);
                // Left unrecorded so the prior-graph path still sees it as added.
                if check.has_changed(Path::new(&dep.key.name)) {
                    integration
                        .invalidated_by_externals
                        .extend(self.users_of(&dep.key).cloned());
                }
            }
            used.insert(dep.key.clone());
        }
        for external in &summary.externals {
            let key = external.key();
            self.add_use(key.clone(), file_node.clone());
            let invalidated = self.nodes_invalidated_by_external(&external.path, false, check);
            integration.invalidated_by_externals.extend(invalidated);
            self.externals
                .insert(external.path.clone(), external.fingerprint);
            self.nodes
                .insert(NodeKey::new(key.clone(), None), external.fingerprint);
            used.insert(key);
        }
        self.used_by.insert(source.clone(), used);

        trace!(
            changed = integration.changed_nodes.len(),
            invalidated_by_externals = integration.invalidated_by_externals.len(),
            "integrated summary"
        );
        integration
    }

    /// Read the summary of `unit` and integrate it.
    pub fn integrate_unit(
        &mut self,
        unit: &Path,
        fs: &dyn FileSystem,
        check: &ExternalCheck<'_>,
    ) -> Result<Integration, IntegrationError> {
        let source = self
            .source_for(unit)
            .cloned()
            .ok_or_else(|| IntegrationError::MissingSource(unit.to_path_buf()))?;
        let summary = DependencySummary::read(fs, &source)?;
        Ok(self.integrate(&source, &summary, check))
    }

    /// Integrate the summary `unit` just produced and return the other units
    /// that must now compile because of externals it found changed.
    pub fn collect_units_requiring_compilation_from_externals_found_by_compiling(
        &mut self,
        unit: &Path,
        fs: &dyn FileSystem,
        check: &ExternalCheck<'_>,
    ) -> Result<FxHashSet<PathBuf>, IntegrationError> {
        let integration = self.integrate_unit(unit, fs, check)?;
        let mut units = self.collect_units_using_invalidated(&integration.invalidated_by_externals)?;
        units.remove(unit);
        Ok(units)
    }

    /// Users of every external that changed since the prior build or that
    /// the graph has not recorded before.
    ///
    /// Externals reached only through use edges count as added the first
    /// time they are seen here; afterwards they are recorded.
    pub fn collect_nodes_invalidated_by_changed_or_added_externals(
        &mut self,
        check: &ExternalCheck<'_>,
    ) -> FxHashSet<NodeKey> {
        let mut candidates: Vec<PathBuf> = self.externals.keys().cloned().collect();
        candidates.extend(
            self.uses
                .keys()
                .filter(|key| key.kind == DeclKind::External)
                .map(|key| PathBuf::from(&key.name)),
        );
        candidates.sort();
        candidates.dedup();

        let mut invalidated = FxHashSet::default();
        for path in &candidates {
            invalidated.extend(self.nodes_invalidated_by_external(path, true, check));
        }
        debug!(
            externals = candidates.len(),
            invalidated = invalidated.len(),
            "collected nodes invalidated by externals"
        );
        invalidated
    }

    /// Units reachable from `nodes` through use edges, `nodes` included.
    ///
    /// Fails if a reached node's source does not map to a unit.
    pub fn collect_units_using_invalidated(
        &self,
        nodes: &FxHashSet<NodeKey>,
    ) -> Result<FxHashSet<PathBuf>, IntegrationError> {
        let mut visited: FxHashSet<&NodeKey> = FxHashSet::default();
        let mut queue: VecDeque<&NodeKey> = nodes.iter().collect();
        let mut units = FxHashSet::default();

        while let Some(node) = queue.pop_front() {
            if !visited.insert(node) {
                continue;
            }
            if let Some(source) = &node.source {
                let unit = self
                    .unit_for(source)
                    .ok_or_else(|| IntegrationError::UnmappedSource(source.clone()))?;
                units.insert(unit.to_path_buf());
            }
            for user in self.users_of(&node.key) {
                if !visited.contains(user) {
                    queue.push_back(user);
                }
            }
        }
        Ok(units)
    }

    /// Users of the external at `path` if it changed, or if it is new and
    /// `include_added` is set. Records the external either way.
    fn nodes_invalidated_by_external(
        &mut self,
        path: &Path,
        include_added: bool,
        check: &ExternalCheck<'_>,
    ) -> FxHashSet<NodeKey> {
        let is_new = !self.externals.contains_key(path);
        if is_new {
            self.externals.insert(path.to_path_buf(), None);
        }
        if !(include_added && is_new) && !check.has_changed(path) {
            return FxHashSet::default();
        }
        trace!(path = %path.display(), is_new, "external dependency invalidates its users");
        self.users_of(&DeclKey::external(path)).cloned().collect()
    }

    fn add_use(&mut self, key: DeclKey, user: NodeKey) {
        self.uses.entry(key).or_default().insert(user);
    }

    fn remove_uses_from(&mut self, source: &DependencySource) {
        let Some(old_used) = self.used_by.remove(source) else {
            return;
        };
        for key in old_used {
            let now_empty = match self.uses.get_mut(&key) {
                Some(users) => {
                    users.retain(|user| user.source.as_ref() != Some(source));
                    users.is_empty()
                }
                None => false,
            };
            if now_empty {
                self.uses.remove(&key);
            }
        }
    }
}

/// The keys a summary defines, including the implicit source-file key.
///
/// Unless the summary fingerprints its source-file key itself, that key's
/// fingerprint combines every provided fingerprint in summary order.
fn provided_fingerprints(
    file_key: &DeclKey,
    summary: &DependencySummary,
) -> FxHashMap<DeclKey, Option<Fingerprint>> {
    let mut provided: FxHashMap<DeclKey, Option<Fingerprint>> = FxHashMap::default();
    for decl in &summary.provides {
        provided.insert(decl.key.clone(), decl.fingerprint);
    }
    if !provided.contains_key(file_key) {
        let parts: Vec<Fingerprint> = summary
            .provides
            .iter()
            .map(|decl| decl.fingerprint.unwrap_or(Fingerprint::new(0)))
            .collect();
        provided.insert(file_key.clone(), Some(Fingerprint::combine(&parts)));
    }
    provided
}

#[cfg(test)]
mod tests;
