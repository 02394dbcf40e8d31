//! The build record: what the prior build compiled, and when.
//!
//! The record is JSON. The serialized fine-grained graph and the serialized
//! inter-module graph live next to it:
//!
//! ```text
//! build/
//! ├── main.record             # BuildRecord (JSON)
//! ├── main.record.priors      # ModuleDependencyGraph (bincode)
//! └── main.record.moduledeps  # InterModuleDependencyGraph (bincode)
//! ```

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

use ori_depgraph::{FileSystem, Timestamp};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::diagnostics::Reporter;
use crate::inter_module::{InterModuleDependencyGraph, InterModuleGraphError};

/// Errors reading, validating or writing a build record.
#[derive(Debug, thiserror::Error)]
pub enum BuildRecordError {
    #[error("could not read build record at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not decode build record at {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("build record was written by compiler {found}, current is {expected}")]
    CompilerVersionMismatch { expected: String, found: String },

    #[error("build record arguments hash {found} does not match {expected}")]
    ArgsHashMismatch { expected: String, found: String },

    #[error("could not encode build record: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("could not write build record at {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// How an input took part in the prior build.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputStatus {
    UpToDate,
    NeedsCascadingBuild,
    NeedsNonCascadingBuild,
    NewlyAdded,
}

/// One input of the prior build.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputInfo {
    pub status: InputStatus,
    pub previous_modification_time: Timestamp,
}

impl InputInfo {
    pub fn new(status: InputStatus, previous_modification_time: Timestamp) -> Self {
        Self {
            status,
            previous_modification_time,
        }
    }
}

/// The persisted summary of the prior build.
///
/// Missing times default to the sentinels, so a record without them makes
/// every comparison come out conservative.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRecord {
    pub compiler_version: String,
    pub args_hash: String,
    #[serde(default = "Timestamp::distant_past")]
    pub build_start_time: Timestamp,
    #[serde(default = "Timestamp::distant_future")]
    pub build_end_time: Timestamp,
    #[serde(default)]
    pub inputs: BTreeMap<PathBuf, InputInfo>,
}

impl BuildRecord {
    pub fn new(
        compiler_version: impl Into<String>,
        args_hash: impl Into<String>,
        build_start_time: Timestamp,
        build_end_time: Timestamp,
    ) -> Self {
        Self {
            compiler_version: compiler_version.into(),
            args_hash: args_hash.into(),
            build_start_time,
            build_end_time,
            inputs: BTreeMap::new(),
        }
    }

    /// Add an input.
    #[must_use]
    pub fn with_input(mut self, path: impl Into<PathBuf>, info: InputInfo) -> Self {
        self.inputs.insert(path.into(), info);
        self
    }

    /// Paths of every input of the prior build, sorted.
    pub fn input_paths(&self) -> impl Iterator<Item = &Path> {
        self.inputs.keys().map(PathBuf::as_path)
    }

    pub fn input(&self, path: &Path) -> Option<&InputInfo> {
        self.inputs.get(path)
    }
}

/// The time bounds of the prior build.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BuildTimeBounds {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl BuildTimeBounds {
    /// Bounds of `record`, or the widest bounds when there is none.
    pub fn of(record: Option<&BuildRecord>) -> Self {
        match record {
            Some(record) => Self {
                start: record.build_start_time,
                end: record.build_end_time,
            },
            None => Self {
                start: Timestamp::DISTANT_PAST,
                end: Timestamp::DISTANT_FUTURE,
            },
        }
    }
}

/// Where the build record lives and what it must match.
#[derive(Clone, Debug)]
pub struct BuildRecordInfo {
    record_path: PathBuf,
    compiler_version: String,
    args_hash: String,
}

impl BuildRecordInfo {
    pub fn new(
        record_path: impl Into<PathBuf>,
        compiler_version: impl Into<String>,
        args_hash: impl Into<String>,
    ) -> Self {
        Self {
            record_path: record_path.into(),
            compiler_version: compiler_version.into(),
            args_hash: args_hash.into(),
        }
    }

    pub fn record_path(&self) -> &Path {
        &self.record_path
    }

    pub fn compiler_version(&self) -> &str {
        &self.compiler_version
    }

    pub fn args_hash(&self) -> &str {
        &self.args_hash
    }

    /// Path of the serialized fine-grained graph.
    pub fn dependency_graph_path(&self) -> PathBuf {
        self.sibling("priors")
    }

    /// Path of the serialized inter-module graph.
    pub fn inter_module_graph_path(&self) -> PathBuf {
        self.sibling("moduledeps")
    }

    fn sibling(&self, extension: &str) -> PathBuf {
        let mut path = OsString::from(self.record_path.as_os_str());
        path.push(".");
        path.push(extension);
        PathBuf::from(path)
    }

    /// A fresh record for the build starting at `build_start_time`.
    pub fn new_record(&self, build_start_time: Timestamp, build_end_time: Timestamp) -> BuildRecord {
        BuildRecord::new(
            self.compiler_version.clone(),
            self.args_hash.clone(),
            build_start_time,
            build_end_time,
        )
    }

    /// Read the record without validating it.
    pub fn read_build_record(&self, fs: &dyn FileSystem) -> Result<BuildRecord, BuildRecordError> {
        let bytes = fs
            .read(&self.record_path)
            .map_err(|source| BuildRecordError::Read {
                path: self.record_path.clone(),
                source,
            })?;
        serde_json::from_slice(&bytes).map_err(|source| BuildRecordError::Decode {
            path: self.record_path.clone(),
            source,
        })
    }

    /// Check that `record` was written by this compiler with these arguments.
    pub fn validate(&self, record: &BuildRecord) -> Result<(), BuildRecordError> {
        if record.compiler_version != self.compiler_version {
            return Err(BuildRecordError::CompilerVersionMismatch {
                expected: self.compiler_version.clone(),
                found: record.compiler_version.clone(),
            });
        }
        if record.args_hash != self.args_hash {
            return Err(BuildRecordError::ArgsHashMismatch {
                expected: self.args_hash.clone(),
                found: record.args_hash.clone(),
            });
        }
        Ok(())
    }

    /// The prior build's record, if it can be read and matches this build.
    ///
    /// Every rejection is reported.
    pub fn read_out_of_date_build_record(
        &self,
        fs: &dyn FileSystem,
        reporter: Option<&Reporter>,
    ) -> Option<BuildRecord> {
        let result = self
            .read_build_record(fs)
            .and_then(|record| self.validate(&record).map(|()| record));
        match result {
            Ok(record) => {
                debug!(
                    path = %self.record_path.display(),
                    inputs = record.inputs.len(),
                    "read prior build record"
                );
                Some(record)
            }
            Err(err) => {
                debug!(%err, "prior build record unusable");
                if let Some(reporter) = reporter {
                    reporter.report(&format!("Ignoring prior build record: {err}"));
                }
                None
            }
        }
    }

    /// Write `record` to the record path.
    pub fn write_build_record(
        &self,
        fs: &dyn FileSystem,
        record: &BuildRecord,
    ) -> Result<(), BuildRecordError> {
        let text = serde_json::to_string_pretty(record).map_err(BuildRecordError::Encode)?;
        fs.write(&self.record_path, text.as_bytes())
            .map_err(|source| BuildRecordError::Write {
                path: self.record_path.clone(),
                source,
            })
    }

    /// Read the inter-module graph persisted by the build `record` describes.
    pub fn read_prior_inter_module_graph(
        &self,
        fs: &dyn FileSystem,
        record: &BuildRecord,
    ) -> Result<InterModuleDependencyGraph, InterModuleGraphError> {
        let path = self.inter_module_graph_path();
        InterModuleDependencyGraph::read(fs, &path, record.build_start_time)
    }

    /// Delete the serialized graphs so the next build cannot misread them.
    ///
    /// Missing files are fine; other failures are logged.
    pub fn remove_incremental_artifacts(&self, fs: &dyn FileSystem) {
        for path in [self.dependency_graph_path(), self.inter_module_graph_path()] {
            match fs.remove_file(&path) {
                Ok(()) => debug!(path = %path.display(), "removed incremental artifact"),
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => warn!(path = %path.display(), %err, "could not remove incremental artifact"),
            }
        }
    }
}
