//! The inter-module dependency graph.
//!
//! Describes the modules the main module depends on: where each module's
//! compiled output lives, what it was built from, and what it depends on.
//! Explicit module builds persist it so a later build can skip re-scanning
//! module dependencies when nothing changed.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use ori_depgraph::{FileSystem, Timestamp};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Version of the serialized inter-module graph format.
pub const INTER_MODULE_GRAPH_VERSION: u32 = 1;

/// Errors reading or writing the inter-module graph.
#[derive(Debug, thiserror::Error)]
pub enum InterModuleGraphError {
    #[error("could not read inter-module graph {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed inter-module graph {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: bincode::Error,
    },

    #[error("inter-module graph has version {found}, expected {expected}")]
    MismatchedVersion { expected: u32, found: u32 },

    #[error("inter-module graph was written at {modified}, before the prior build started at {build_start}")]
    Stale {
        modified: Timestamp,
        build_start: Timestamp,
    },

    #[error("could not encode inter-module graph: {0}")]
    Encode(#[source] bincode::Error),

    #[error("could not write inter-module graph {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// What kind of module an id names.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ModuleKind {
    Ori,
    Foreign,
    Prebuilt,
    Placeholder,
}

/// A module name qualified by its kind.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ModuleId {
    pub name: String,
    pub kind: ModuleKind,
}

impl ModuleId {
    pub fn new(name: impl Into<String>, kind: ModuleKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    pub fn ori(name: impl Into<String>) -> Self {
        Self::new(name, ModuleKind::Ori)
    }

    pub fn foreign(name: impl Into<String>) -> Self {
        Self::new(name, ModuleKind::Foreign)
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            ModuleKind::Ori => "ori",
            ModuleKind::Foreign => "foreign",
            ModuleKind::Prebuilt => "prebuilt",
            ModuleKind::Placeholder => "placeholder",
        };
        write!(f, "{}:{}", kind, self.name)
    }
}

/// Inputs of an Ori module compiled from an interface.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriModuleDetails {
    pub interface_path: Option<PathBuf>,
    pub bridging_header_path: Option<PathBuf>,
    pub bridging_source_files: Option<Vec<PathBuf>>,
}

impl OriModuleDetails {
    /// Every input file present, in a fixed order.
    pub fn inputs(&self) -> impl Iterator<Item = &Path> {
        self.interface_path
            .iter()
            .chain(self.bridging_header_path.iter())
            .chain(self.bridging_source_files.iter().flatten())
            .map(PathBuf::as_path)
    }
}

/// A binary module shipped precompiled.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrebuiltModuleDetails {
    pub compiled_module_path: PathBuf,
}

/// Per-kind module information.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModuleDetails {
    Ori(OriModuleDetails),
    /// Built from `ModuleInfo::source_files`.
    Foreign,
    Prebuilt(PrebuiltModuleDetails),
    /// Awaiting resolution.
    Placeholder,
}

/// One module of the inter-module graph.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleInfo {
    /// The module's compiled output.
    pub module_path: PathBuf,
    pub source_files: Vec<PathBuf>,
    pub direct_dependencies: Vec<ModuleId>,
    pub details: ModuleDetails,
}

impl ModuleInfo {
    pub fn new(module_path: impl Into<PathBuf>, details: ModuleDetails) -> Self {
        Self {
            module_path: module_path.into(),
            source_files: Vec::new(),
            direct_dependencies: Vec::new(),
            details,
        }
    }

    #[must_use]
    pub fn with_source_files(mut self, source_files: Vec<PathBuf>) -> Self {
        self.source_files = source_files;
        self
    }

    #[must_use]
    pub fn with_dependencies(mut self, direct_dependencies: Vec<ModuleId>) -> Self {
        self.direct_dependencies = direct_dependencies;
        self
    }
}

/// Modules keyed by id, with one designated main module.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterModuleDependencyGraph {
    pub main_module_name: String,
    pub modules: BTreeMap<ModuleId, ModuleInfo>,
}

impl InterModuleDependencyGraph {
    pub fn new(main_module_name: impl Into<String>) -> Self {
        Self {
            main_module_name: main_module_name.into(),
            modules: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, id: ModuleId, info: ModuleInfo) {
        self.modules.insert(id, info);
    }

    /// Add a module.
    #[must_use]
    pub fn with_module(mut self, id: ModuleId, info: ModuleInfo) -> Self {
        self.insert(id, info);
        self
    }

    pub fn main_module_id(&self) -> ModuleId {
        ModuleId::ori(self.main_module_name.clone())
    }

    pub fn main_module(&self) -> Option<&ModuleInfo> {
        self.modules.get(&self.main_module_id())
    }

    /// Names of the main module's direct dependencies.
    pub fn main_module_dependency_names(&self) -> Option<BTreeSet<String>> {
        self.main_module().map(|info| {
            info.direct_dependencies
                .iter()
                .map(|id| id.name.clone())
                .collect()
        })
    }

    /// Every module except the main one.
    pub fn dependencies(&self) -> impl Iterator<Item = (&ModuleId, &ModuleInfo)> {
        let main = self.main_module_id();
        self.modules.iter().filter(move |(id, _)| **id != main)
    }

    /// Read a serialized graph written no earlier than `build_start`.
    pub fn read(
        fs: &dyn FileSystem,
        path: &Path,
        build_start: Timestamp,
    ) -> Result<Self, InterModuleGraphError> {
        let read_error = |source| InterModuleGraphError::Read {
            path: path.to_path_buf(),
            source,
        };
        let modified = fs.last_modification_time(path).map_err(read_error)?;
        if modified < build_start {
            return Err(InterModuleGraphError::Stale {
                modified,
                build_start,
            });
        }
        let bytes = fs.read(path).map_err(read_error)?;
        let decode = |source| InterModuleGraphError::Decode {
            path: path.to_path_buf(),
            source,
        };

        let mut reader: &[u8] = &bytes;
        let version: u32 = bincode::deserialize_from(&mut reader).map_err(decode)?;
        if version != INTER_MODULE_GRAPH_VERSION {
            return Err(InterModuleGraphError::MismatchedVersion {
                expected: INTER_MODULE_GRAPH_VERSION,
                found: version,
            });
        }
        let graph: Self = bincode::deserialize_from(&mut reader).map_err(decode)?;
        debug!(path = %path.display(), modules = graph.modules.len(), "read inter-module graph");
        Ok(graph)
    }

    /// Serialize the graph to `path`.
    pub fn write(&self, fs: &dyn FileSystem, path: &Path) -> Result<(), InterModuleGraphError> {
        let bytes = bincode::serialize(&(INTER_MODULE_GRAPH_VERSION, self))
            .map_err(InterModuleGraphError::Encode)?;
        fs.write(path, &bytes)
            .map_err(|source| InterModuleGraphError::Write {
                path: path.to_path_buf(),
                source,
            })
    }
}
