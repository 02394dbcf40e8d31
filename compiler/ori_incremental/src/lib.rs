//! Initial incremental-build state for the Ori compiler driver.
//!
//! Before any job is planned, the driver asks this crate which parts of the
//! prior build can be trusted:
//!
//! - the prior build record, if it matches this compiler and these arguments
//! - the prior inter-module graph, if explicit module builds are on and every
//!   module it lists is still fresh
//! - the fine-grained dependency graph, read from the prior build or rebuilt
//!   from per-unit dependency summaries
//! - the units that external dependency changes force to compile
//!
//! [`IncrementalSetup::compute_initial_state`] returns all of it as an
//! [`InitialState`], or `None` when this build cannot be incremental. `None`
//! is never an error; it means "compile everything".
//!
//! # Debug Environment Variables
//!
//! - `RUST_LOG=ori_incremental=debug`: Log each decision (fresh, prior, empty).
//! - `RUST_LOG=ori_depgraph=trace`: Follow per-unit summary integration.

mod acquire;
mod diagnostics;
mod initial_state;
mod inter_module;
mod options;
mod output_map;
mod prescan;
mod record;
mod setup;
mod shared;
mod staleness;
mod units;

use std::sync::Once;

pub use acquire::{dot_file_path, AcquiredGraph, AcquisitionError, GraphAcquisition, Invalidation};
pub use diagnostics::{
    CollectingSink, Diagnostic, DiagnosticSink, Diagnostics, Reporter, Severity, TracingSink,
    REPORT_PREFIX,
};
pub use initial_state::InitialState;
pub use inter_module::{
    InterModuleDependencyGraph, InterModuleGraphError, ModuleDetails, ModuleId, ModuleInfo,
    ModuleKind, OriModuleDetails, PrebuiltModuleDetails, INTER_MODULE_GRAPH_VERSION,
};
pub use options::{FeatureToggles, IncrementalOptions};
pub use output_map::{FileType, OutputFileMap, OutputFileMapError, SOURCE_EXTENSION};
pub use prescan::{scan_imports, ImportPrescanner, PrescanError, SourceImportPrescanner};
pub use record::{
    BuildRecord, BuildRecordError, BuildRecordInfo, BuildTimeBounds, InputInfo, InputStatus,
};
pub use setup::IncrementalSetup;
pub use shared::SharedGraph;
pub use staleness::{StalenessError, StalenessVerifier};
pub use units::{CompilationUnit, CompilationUnitSet};

static TRACING_INIT: Once = Once::new();

/// Install a `fmt` subscriber filtered by `RUST_LOG`, for drivers that have
/// none of their own.
///
/// Does nothing when `RUST_LOG` is unset or unparsable, or when a global
/// subscriber is already installed. Repeated calls are no-ops. Both crates
/// log under their own targets, e.g.
/// `RUST_LOG=ori_incremental=debug,ori_depgraph=trace`.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        let Ok(filter) = EnvFilter::try_from_default_env() else {
            return;
        };
        let installed = tracing_subscriber::registry()
            .with(fmt::layer().with_target(true).with_level(true))
            .with(filter)
            .try_init();
        if installed.is_err() {
            tracing::debug!("a global subscriber was already installed");
        }
    });
}
