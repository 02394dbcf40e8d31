//! Dependency-graph acquisition.
//!
//! Decides how this build gets its fine-grained graph and which units that
//! graph says must compile because of external dependencies:
//!
//! - **Fresh**: no usable prior record, or reading priors is disabled. Build
//!   the graph from every unit's summary in command-line order. Only
//!   externals that *changed* invalidate anything; every external is being
//!   integrated right now, so "added" carries no information.
//! - **Prior**: read the serialized graph, then collect users of externals
//!   that changed *or* were added, since a prior graph cannot know whether
//!   a first-seen external affects existing units.
//! - **Empty**: the serialized graph is unusable. Start empty and compile
//!   every unit; summaries fill the graph in as jobs finish.
//!
//! All of it runs inside one [`SharedGraph::blocking_mutation`].

use std::fmt;
use std::path::{Path, PathBuf};

use ori_depgraph::{
    ExternalCheck, FileSystem, GraphPhase, GraphReadError, IntegrationError,
    ModuleDependencyGraph, VerifyError,
};
use rustc_hash::FxHashSet;
use tracing::{debug, warn};

use crate::diagnostics::{Diagnostics, Reporter};
use crate::options::IncrementalOptions;
use crate::output_map::OutputFileMap;
use crate::record::{BuildRecord, BuildRecordInfo, BuildTimeBounds};
use crate::shared::SharedGraph;
use crate::units::CompilationUnitSet;

/// Why acquisition gave up on incrementality.
#[derive(Debug, thiserror::Error)]
pub enum AcquisitionError {
    #[error("{0} input(s) of the prior build disappeared")]
    DisappearedUnits(usize),

    #[error("could not integrate dependency summary: {0}")]
    Integration(#[source] IntegrationError),

    #[error("could not collect units using invalidated nodes: {0}")]
    Closure(#[source] IntegrationError),

    #[error("dependency graph failed verification: {0}")]
    Verify(#[from] VerifyError),
}

/// Units to compile because of external dependencies.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Invalidation {
    /// Exactly these units.
    Units(FxHashSet<PathBuf>),
    /// Every current unit; the graph cannot tell which.
    Everything,
}

impl Invalidation {
    /// Whether `unit` is invalidated.
    pub fn contains(&self, unit: &Path) -> bool {
        match self {
            Invalidation::Units(units) => units.contains(unit),
            Invalidation::Everything => true,
        }
    }

    pub fn is_everything(&self) -> bool {
        matches!(self, Invalidation::Everything)
    }

    /// The explicit set, if there is one.
    pub fn units(&self) -> Option<&FxHashSet<PathBuf>> {
        match self {
            Invalidation::Units(units) => Some(units),
            Invalidation::Everything => None,
        }
    }
}

/// The graph and what it invalidated.
#[derive(Debug)]
pub struct AcquiredGraph {
    pub graph: SharedGraph,
    pub invalidation: Invalidation,
}

/// Everything acquisition reads.
pub struct GraphAcquisition<'a> {
    pub options: IncrementalOptions,
    pub units: &'a CompilationUnitSet,
    pub output_map: &'a OutputFileMap,
    pub record: Option<&'a BuildRecord>,
    pub record_info: &'a BuildRecordInfo,
    pub fs: &'a dyn FileSystem,
    pub reporter: Option<&'a Reporter>,
    pub diagnostics: &'a Diagnostics,
}

impl GraphAcquisition<'_> {
    /// Acquire the graph; `None` means incrementality is off for this build.
    #[tracing::instrument(level = "debug", skip_all, fields(units = self.units.len()))]
    pub fn acquire(&self) -> Option<AcquiredGraph> {
        debug_assert!(
            self.output_map.summaries_only_for_sources(),
            "only source inputs may carry a dependency summary"
        );

        let graph = SharedGraph::new(ModuleDependencyGraph::new(GraphPhase::BuildingFromSummaries));
        match graph.blocking_mutation(|graph| self.compute(graph)) {
            Ok(invalidation) => {
                self.report_invalidation(&invalidation);
                Some(AcquiredGraph {
                    graph,
                    invalidation,
                })
            }
            Err(err) => {
                debug!(%err, "graph acquisition failed");
                if let Some(reporter) = self.reporter {
                    reporter.report_disabling_incremental_build(&err.to_string());
                }
                None
            }
        }
    }

    fn compute(&self, graph: &mut ModuleDependencyGraph) -> Result<Invalidation, AcquisitionError> {
        let disappeared = self.units.disappeared().len();
        if disappeared > 0 {
            return Err(AcquisitionError::DisappearedUnits(disappeared));
        }

        let bounds = BuildTimeBounds::of(self.record);
        let check = ExternalCheck::new(self.fs, bounds.start);
        let Some(record) = self.record.filter(|_| self.options.reads_priors()) else {
            return self.build_fresh(graph, &check).map(Invalidation::Units);
        };

        let path = self.record_info.dependency_graph_path();
        match ModuleDependencyGraph::read(self.fs, &path, record.build_start_time) {
            Ok(prior) => {
                *graph = prior;
                self.map_units(graph);
                if let Some(reporter) = self.reporter {
                    reporter.report_path("Read dependency graph", &path);
                }
                self.after_import(graph, 0)?;
                self.update_from_prior(graph, &check).map(Invalidation::Units)
            }
            Err(err) => {
                warn!(%err, "prior dependency graph unusable");
                self.diagnostics.warning(describe_read_failure(&err, &path));
                Ok(self.build_empty_and_compile_everything(graph))
            }
        }
    }

    /// Build the graph from every unit's summary.
    fn build_fresh(
        &self,
        graph: &mut ModuleDependencyGraph,
        check: &ExternalCheck<'_>,
    ) -> Result<FxHashSet<PathBuf>, AcquisitionError> {
        debug!("building dependency graph from summaries");
        graph.set_phase(GraphPhase::BuildingFromSummaries);
        self.map_units(graph);

        let mut invalidated = FxHashSet::default();
        for (index, unit) in self.units.current_in_order().iter().enumerate() {
            let integration = graph
                .integrate_unit(unit.path(), self.fs, check)
                .map_err(AcquisitionError::Integration)?;
            invalidated.extend(integration.invalidated_by_externals);
            self.after_import(graph, index)?;
        }
        if let Some(reporter) = self.reporter {
            reporter.report("Created dependency graph from dependency summaries");
        }
        graph
            .collect_units_using_invalidated(&invalidated)
            .map_err(AcquisitionError::Closure)
    }

    /// Bring a prior graph up to date with changed or added externals.
    fn update_from_prior(
        &self,
        graph: &mut ModuleDependencyGraph,
        check: &ExternalCheck<'_>,
    ) -> Result<FxHashSet<PathBuf>, AcquisitionError> {
        let nodes = graph.collect_nodes_invalidated_by_changed_or_added_externals(check);
        graph
            .collect_units_using_invalidated(&nodes)
            .map_err(AcquisitionError::Closure)
    }

    fn build_empty_and_compile_everything(&self, graph: &mut ModuleDependencyGraph) -> Invalidation {
        debug!("starting from an empty dependency graph");
        *graph = ModuleDependencyGraph::new(GraphPhase::BuildingAfterEachCompilation);
        self.map_units(graph);
        if let Some(reporter) = self.reporter {
            reporter.report("Compiling everything: prior dependency graph is unusable");
        }
        Invalidation::Everything
    }

    fn map_units(&self, graph: &mut ModuleDependencyGraph) {
        for unit in self.units.current_in_order() {
            if let Some(source) = self.output_map.dependency_summary(unit.path()) {
                graph.add_unit(unit.path(), source);
            }
        }
    }

    /// Optional DOT dump and verification after the `index`-th import.
    fn after_import(&self, graph: &ModuleDependencyGraph, index: usize) -> Result<(), AcquisitionError> {
        if self
            .options
            .contains(IncrementalOptions::EMIT_DEPENDENCY_DOT_FILE_AFTER_EVERY_IMPORT)
        {
            let path = dot_file_path(&self.record_info.dependency_graph_path(), index);
            if let Err(err) = self.fs.write(&path, graph.to_dot().as_bytes()) {
                warn!(path = %path.display(), %err, "could not write dependency graph dump");
            }
        }
        if self
            .options
            .contains(IncrementalOptions::VERIFY_DEPENDENCY_GRAPH_AFTER_EVERY_IMPORT)
        {
            graph.verify()?;
        }
        Ok(())
    }

    fn report_invalidation(&self, invalidation: &Invalidation) {
        let Some(reporter) = self.reporter else {
            return;
        };
        if let Invalidation::Units(units) = invalidation {
            let mut units: Vec<&PathBuf> = units.iter().collect();
            units.sort();
            for unit in units {
                reporter.report_path("Scheduling because of external dependencies", unit);
            }
        }
    }
}

impl fmt::Debug for GraphAcquisition<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphAcquisition")
            .field("options", &self.options)
            .field("units", &self.units.len())
            .field("has_record", &self.record.is_some())
            .finish_non_exhaustive()
    }
}

/// `<priors>.<index>.dot`
pub fn dot_file_path(priors: &Path, index: usize) -> PathBuf {
    let mut path = priors.as_os_str().to_owned();
    path.push(format!(".{index}.dot"));
    PathBuf::from(path)
}

fn describe_read_failure(err: &GraphReadError, path: &Path) -> String {
    let path = path.display();
    match err {
        GraphReadError::MismatchedVersion { expected, found } => format!(
            "Will not do cross-module incremental builds, wrong version of priors; expected {expected} but read {found} at '{path}'"
        ),
        GraphReadError::TimeTravelling {
            saved_at,
            build_start,
        } => format!(
            "Will not do cross-module incremental builds, priors saved at {saved_at}, but the prior build started at {build_start}, at '{path}'"
        ),
        GraphReadError::Io { .. } | GraphReadError::Decode { .. } => {
            format!("Will not do cross-module incremental builds, could not read priors at '{path}': {err}")
        }
    }
}
