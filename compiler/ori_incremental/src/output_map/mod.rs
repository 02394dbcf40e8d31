//! The output file map: where each input's outputs go.

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use ori_depgraph::{DependencySource, FileSystem};
use serde::{Deserialize, Serialize};

/// Extension of Ori source files.
pub const SOURCE_EXTENSION: &str = "ori";

/// Errors reading an output file map.
#[derive(Debug, thiserror::Error)]
pub enum OutputFileMapError {
    #[error("could not read output file map {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed output file map {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// The kind of an output.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FileType {
    Object,
    DependencySummary,
    ModuleInterface,
    Module,
    Diagnostics,
    LlvmIr,
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FileType::Object => "object",
            FileType::DependencySummary => "dependency-summary",
            FileType::ModuleInterface => "module-interface",
            FileType::Module => "module",
            FileType::Diagnostics => "diagnostics",
            FileType::LlvmIr => "llvm-ir",
        })
    }
}

/// Input path → typed outputs.
///
/// The empty input path holds module-wide outputs.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutputFileMap {
    entries: BTreeMap<PathBuf, BTreeMap<FileType, PathBuf>>,
}

impl OutputFileMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, input: impl Into<PathBuf>, file_type: FileType, output: impl Into<PathBuf>) {
        self.entries
            .entry(input.into())
            .or_default()
            .insert(file_type, output.into());
    }

    /// Add an output.
    #[must_use]
    pub fn with_output(
        mut self,
        input: impl Into<PathBuf>,
        file_type: FileType,
        output: impl Into<PathBuf>,
    ) -> Self {
        self.insert(input, file_type, output);
        self
    }

    pub fn output(&self, input: &Path, file_type: FileType) -> Option<&Path> {
        self.entries
            .get(input)
            .and_then(|outputs| outputs.get(&file_type))
            .map(PathBuf::as_path)
    }

    /// Where the dependency summary of `input` is written.
    pub fn dependency_summary(&self, input: &Path) -> Option<DependencySource> {
        self.output(input, FileType::DependencySummary)
            .map(DependencySource::new)
    }

    /// Whether only source inputs carry a dependency-summary path.
    pub fn summaries_only_for_sources(&self) -> bool {
        self.entries
            .iter()
            .filter(|(_, outputs)| outputs.contains_key(&FileType::DependencySummary))
            .all(|(input, _)| is_source(input))
    }

    pub fn inputs(&self) -> impl Iterator<Item = &Path> {
        self.entries.keys().map(PathBuf::as_path)
    }

    /// Parse from JSON text.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Read a JSON output file map.
    pub fn read(fs: &dyn FileSystem, path: &Path) -> Result<Self, OutputFileMapError> {
        let bytes = fs.read(path).map_err(|source| OutputFileMapError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_slice(&bytes).map_err(|source| OutputFileMapError::Decode {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn is_source(path: &Path) -> bool {
    path.extension().is_some_and(|extension| extension == SOURCE_EXTENSION)
}
