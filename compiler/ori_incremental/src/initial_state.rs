//! The result handed to job planning.

use std::path::Path;

use ori_depgraph::Timestamp;

use crate::acquire::{AcquiredGraph, Invalidation};
use crate::inter_module::InterModuleDependencyGraph;
use crate::options::IncrementalOptions;
use crate::record::{BuildRecordInfo, BuildTimeBounds};
use crate::shared::SharedGraph;

/// Everything the planner needs to schedule an incremental build.
///
/// Built once per build invocation and never mutated afterwards. The graph
/// itself keeps changing as jobs finish, but only through [`SharedGraph`].
#[derive(Debug)]
pub struct InitialState {
    graph: SharedGraph,
    record_info: BuildRecordInfo,
    prior_inter_module_graph: Option<InterModuleDependencyGraph>,
    invalidation: Invalidation,
    options: IncrementalOptions,
    bounds: BuildTimeBounds,
}

impl InitialState {
    pub(crate) fn assemble(
        acquired: AcquiredGraph,
        record_info: BuildRecordInfo,
        prior_inter_module_graph: Option<InterModuleDependencyGraph>,
        options: IncrementalOptions,
        bounds: BuildTimeBounds,
    ) -> Self {
        let AcquiredGraph {
            graph,
            invalidation,
        } = acquired;
        Self {
            graph,
            record_info,
            prior_inter_module_graph,
            invalidation,
            options,
            bounds,
        }
    }

    /// A handle on the build's dependency graph.
    pub fn graph(&self) -> &SharedGraph {
        &self.graph
    }

    pub fn record_info(&self) -> &BuildRecordInfo {
        &self.record_info
    }

    /// The prior inter-module graph, present only if it was verified fresh.
    pub fn prior_inter_module_graph(&self) -> Option<&InterModuleDependencyGraph> {
        self.prior_inter_module_graph.as_ref()
    }

    pub fn invalidation(&self) -> &Invalidation {
        &self.invalidation
    }

    pub fn options(&self) -> IncrementalOptions {
        self.options
    }

    /// Start of the prior build, or the distant past if there was none.
    pub fn build_start_time(&self) -> Timestamp {
        self.bounds.start
    }

    /// End of the prior build, or the distant future if there was none.
    pub fn build_end_time(&self) -> Timestamp {
        self.bounds.end
    }

    /// Whether external dependencies force `unit` to compile.
    ///
    /// Units that changed themselves are the planner's business.
    pub fn must_compile(&self, unit: &Path) -> bool {
        self.invalidation.contains(unit)
    }
}
