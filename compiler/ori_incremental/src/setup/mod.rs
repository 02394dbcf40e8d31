//! Top-level entry point: from driver inputs to [`InitialState`].
//!
//! The steps run in a fixed order:
//! 1. Require a build record path and an output file map.
//! 2. Read the prior build record, dropping it if it does not match this
//!    compiler and these arguments.
//! 3. Partition the inputs; any disappeared input disables incrementality.
//! 4. For explicit module builds, trust the prior inter-module graph only if
//!    it is verified fresh.
//! 5. Acquire the fine-grained graph and assemble the result.
//!
//! Whenever the answer is "no incremental state", the serialized graphs are
//! removed so the next build cannot misread them.

use std::path::PathBuf;
use std::sync::Arc;

use ori_depgraph::{FileSystem, LocalFileSystem};
use tracing::debug;

use crate::acquire::GraphAcquisition;
use crate::diagnostics::{DiagnosticSink, Diagnostics, Reporter, TracingSink};
use crate::initial_state::InitialState;
use crate::inter_module::InterModuleDependencyGraph;
use crate::options::IncrementalOptions;
use crate::output_map::OutputFileMap;
use crate::prescan::{ImportPrescanner, SourceImportPrescanner};
use crate::record::{BuildRecord, BuildRecordInfo, BuildTimeBounds};
use crate::staleness::StalenessVerifier;
use crate::units::CompilationUnitSet;

/// Builder for one build's initial incremental state.
pub struct IncrementalSetup {
    inputs: Vec<PathBuf>,
    options: IncrementalOptions,
    record_info: Option<BuildRecordInfo>,
    output_map: Option<OutputFileMap>,
    prescanner: Option<Arc<dyn ImportPrescanner>>,
    sink: Arc<dyn DiagnosticSink>,
    fs: Arc<dyn FileSystem>,
}

impl IncrementalSetup {
    /// Setup for `inputs`, in command-line order.
    pub fn new<I, P>(inputs: I, options: IncrementalOptions) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            inputs: inputs.into_iter().map(Into::into).collect(),
            options,
            record_info: None,
            output_map: None,
            prescanner: None,
            sink: Arc::new(TracingSink),
            fs: Arc::new(LocalFileSystem),
        }
    }

    #[must_use]
    pub fn with_build_record(mut self, info: BuildRecordInfo) -> Self {
        self.record_info = Some(info);
        self
    }

    #[must_use]
    pub fn with_output_file_map(mut self, map: OutputFileMap) -> Self {
        self.output_map = Some(map);
        self
    }

    /// Scanner for the main module's imports. Defaults to scanning the inputs.
    #[must_use]
    pub fn with_prescanner(mut self, prescanner: Arc<dyn ImportPrescanner>) -> Self {
        self.prescanner = Some(prescanner);
        self
    }

    #[must_use]
    pub fn with_diagnostic_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = sink;
        self
    }

    #[must_use]
    pub fn with_file_system(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = fs;
        self
    }

    /// Compute the initial state, or `None` to build everything.
    #[tracing::instrument(level = "debug", skip_all, fields(inputs = self.inputs.len()))]
    pub fn compute_initial_state(self) -> Option<InitialState> {
        let diagnostics = Diagnostics::new(Arc::clone(&self.sink));
        let reporter = self
            .options
            .shows_incremental()
            .then(|| Reporter::new(Arc::clone(&self.sink)));

        let Some(record_info) = &self.record_info else {
            diagnostics.warning("Incremental compilation has been disabled: no build record path was given");
            return None;
        };
        let Some(output_map) = &self.output_map else {
            diagnostics.warning("Incremental compilation has been disabled: it requires an output file map");
            record_info.remove_incremental_artifacts(&*self.fs);
            return None;
        };

        let state = self.assemble(record_info, output_map, reporter.as_ref(), &diagnostics);
        if state.is_none() {
            record_info.remove_incremental_artifacts(&*self.fs);
        }
        state
    }

    fn assemble(
        &self,
        record_info: &BuildRecordInfo,
        output_map: &OutputFileMap,
        reporter: Option<&Reporter>,
        diagnostics: &Diagnostics,
    ) -> Option<InitialState> {
        let fs = &*self.fs;
        let record = record_info.read_out_of_date_build_record(fs, reporter);
        let units = CompilationUnitSet::partition(self.inputs.iter().cloned(), record.as_ref());

        if !units.disappeared().is_empty() {
            debug!(count = units.disappeared().len(), "inputs disappeared since the prior build");
            if let Some(reporter) = reporter {
                for unit in units.disappeared_sorted() {
                    reporter.report_path("Input removed since the prior build", unit.path());
                }
                reporter.report_disabling_incremental_build("inputs were removed since the prior build");
            }
            return None;
        }

        let prior_inter_module_graph = record
            .as_ref()
            .filter(|_| self.options.contains(IncrementalOptions::EXPLICIT_MODULE_BUILD))
            .and_then(|record| self.verified_inter_module_graph(record_info, record, reporter));

        let acquired = GraphAcquisition {
            options: self.options,
            units: &units,
            output_map,
            record: record.as_ref(),
            record_info,
            fs,
            reporter,
            diagnostics,
        }
        .acquire()?;

        Some(InitialState::assemble(
            acquired,
            record_info.clone(),
            prior_inter_module_graph,
            self.options,
            BuildTimeBounds::of(record.as_ref()),
        ))
    }

    fn verified_inter_module_graph(
        &self,
        record_info: &BuildRecordInfo,
        record: &BuildRecord,
        reporter: Option<&Reporter>,
    ) -> Option<InterModuleDependencyGraph> {
        let default_prescanner;
        let prescanner: &dyn ImportPrescanner = match &self.prescanner {
            Some(prescanner) => &**prescanner,
            None => {
                default_prescanner = SourceImportPrescanner::new(self.inputs.clone());
                &default_prescanner
            }
        };

        match StalenessVerifier::new(&*self.fs, prescanner).read_and_verify(record_info, record) {
            Ok(graph) => {
                if let Some(reporter) = reporter {
                    reporter.report_path(
                        "Using prior inter-module dependency graph",
                        &record_info.inter_module_graph_path(),
                    );
                }
                Some(graph)
            }
            Err(err) => {
                debug!(%err, "prior inter-module graph rejected");
                if let Some(reporter) = reporter {
                    reporter.report(&format!("Not all dependencies are up to date: {err}"));
                }
                None
            }
        }
    }
}

impl std::fmt::Debug for IncrementalSetup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IncrementalSetup")
            .field("inputs", &self.inputs)
            .field("options", &self.options)
            .field("record_info", &self.record_info)
            .finish_non_exhaustive()
    }
}
