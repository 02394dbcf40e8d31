//! Incremental build options.
//!
//! The driver hands over raw toggles; [`IncrementalOptions::resolve`]
//! normalizes them into one bitset that the rest of the crate consults.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Raw feature toggles as given to the driver.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureToggles {
    pub always_rebuild_dependents: bool,
    pub show_incremental: bool,
    pub emit_dependency_dot_file_after_every_import: bool,
    pub verify_dependency_graph_after_every_import: bool,
    /// `Some(true)` for the enabling flag, `Some(false)` for the disabling
    /// flag, `None` when neither was given.
    pub cross_module_incremental_build: Option<bool>,
}

bitflags! {
    /// Resolved incremental build capabilities.
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
    pub struct IncrementalOptions: u8 {
        /// Rebuild every dependent of a changed unit.
        const ALWAYS_REBUILD_DEPENDENTS = 1 << 0;
        /// Report incremental decisions to the user.
        const SHOW_INCREMENTAL = 1 << 1;
        /// Write a DOT file after each summary import.
        const EMIT_DEPENDENCY_DOT_FILE_AFTER_EVERY_IMPORT = 1 << 2;
        /// Verify the graph after each summary import.
        const VERIFY_DEPENDENCY_GRAPH_AFTER_EVERY_IMPORT = 1 << 3;
        /// Track dependencies across module boundaries.
        const ENABLE_CROSS_MODULE_INCREMENTAL_BUILD = 1 << 4;
        /// Start from the serialized graph of the prior build.
        const READ_PRIORS_FROM_MODULE_DEPENDENCY_GRAPH = 1 << 5;
        /// Modules are built by explicit jobs planned from the inter-module graph.
        const EXPLICIT_MODULE_BUILD = 1 << 6;
    }
}

impl IncrementalOptions {
    /// Normalize raw toggles.
    ///
    /// Cross-module incrementality and reading priors are enabled together
    /// and default to on when no cross-module flag was given.
    #[must_use]
    pub fn resolve(
        toggles: &FeatureToggles,
        show_job_lifecycle: bool,
        explicit_module_build: bool,
    ) -> Self {
        let mut options = Self::empty();
        options.set(Self::ALWAYS_REBUILD_DEPENDENTS, toggles.always_rebuild_dependents);
        options.set(
            Self::SHOW_INCREMENTAL,
            toggles.show_incremental || show_job_lifecycle,
        );
        options.set(
            Self::EMIT_DEPENDENCY_DOT_FILE_AFTER_EVERY_IMPORT,
            toggles.emit_dependency_dot_file_after_every_import,
        );
        options.set(
            Self::VERIFY_DEPENDENCY_GRAPH_AFTER_EVERY_IMPORT,
            toggles.verify_dependency_graph_after_every_import,
        );
        options.set(
            Self::ENABLE_CROSS_MODULE_INCREMENTAL_BUILD | Self::READ_PRIORS_FROM_MODULE_DEPENDENCY_GRAPH,
            toggles.cross_module_incremental_build.unwrap_or(true),
        );
        options.set(Self::EXPLICIT_MODULE_BUILD, explicit_module_build);
        options
    }

    pub fn reads_priors(self) -> bool {
        self.contains(Self::READ_PRIORS_FROM_MODULE_DEPENDENCY_GRAPH)
    }

    pub fn shows_incremental(self) -> bool {
        self.contains(Self::SHOW_INCREMENTAL)
    }
}
