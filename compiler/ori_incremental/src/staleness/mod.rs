//! Freshness of a persisted inter-module graph.
//!
//! A persisted graph can stand in for a fresh module-dependency scan only if
//! the main module still imports the same modules and no module's output is
//! older than any of its inputs. The first failed check decides the outcome.

use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};

use ori_depgraph::{FileSystem, Timestamp};
use tracing::{debug, trace};

use crate::inter_module::{InterModuleDependencyGraph, InterModuleGraphError, ModuleDetails, ModuleId};
use crate::prescan::{ImportPrescanner, PrescanError};
use crate::record::{BuildRecord, BuildRecordInfo};

/// Why a persisted inter-module graph cannot be trusted.
#[derive(Debug, thiserror::Error)]
pub enum StalenessError {
    #[error("could not read prior inter-module graph: {0}")]
    Unreadable(#[source] InterModuleGraphError),

    #[error("main module `{0}` is missing from the prior inter-module graph")]
    MissingMainModule(String),

    #[error("import set changed (added: {added:?}, removed: {removed:?})")]
    ImportSetChanged {
        added: Vec<String>,
        removed: Vec<String>,
    },

    #[error("could not scan imports: {0}")]
    Prescan(#[from] PrescanError),

    #[error("unable to stat {} of {module}: {source}", .path.display())]
    UnableToStat {
        module: ModuleId,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("dependency {module} is out of date: {} is newer than {}", .input.display(), .output.display())]
    OutOfDate {
        module: ModuleId,
        output: PathBuf,
        input: PathBuf,
    },

    #[error("cannot verify prebuilt module {0}")]
    UnverifiablePrebuilt(ModuleId),

    #[error("placeholder module {0} in prior inter-module graph")]
    Placeholder(ModuleId),
}

/// Checks a persisted inter-module graph against the filesystem.
pub struct StalenessVerifier<'a> {
    fs: &'a dyn FileSystem,
    prescanner: &'a dyn ImportPrescanner,
}

impl<'a> StalenessVerifier<'a> {
    pub fn new(fs: &'a dyn FileSystem, prescanner: &'a dyn ImportPrescanner) -> Self {
        Self { fs, prescanner }
    }

    /// Read the graph persisted by the build `record` describes and verify it.
    pub fn read_and_verify(
        &self,
        info: &BuildRecordInfo,
        record: &BuildRecord,
    ) -> Result<InterModuleDependencyGraph, StalenessError> {
        let graph = info
            .read_prior_inter_module_graph(self.fs, record)
            .map_err(StalenessError::Unreadable)?;
        self.verify(&graph)?;
        Ok(graph)
    }

    /// Verify `graph`, stopping at the first failure.
    ///
    /// An input is stale only if strictly newer than its module's output;
    /// equal times count as the same build pass.
    #[tracing::instrument(level = "debug", skip_all, fields(modules = graph.modules.len()))]
    pub fn verify(&self, graph: &InterModuleDependencyGraph) -> Result<(), StalenessError> {
        let prior = graph
            .main_module_dependency_names()
            .ok_or_else(|| StalenessError::MissingMainModule(graph.main_module_name.clone()))?;
        let current = self.prescanner.perform_import_prescan(self.fs)?;
        if prior != current {
            return Err(StalenessError::ImportSetChanged {
                added: difference(&current, &prior),
                removed: difference(&prior, &current),
            });
        }

        for (id, info) in graph.dependencies() {
            trace!(module = %id, "checking module freshness");
            match &info.details {
                ModuleDetails::Ori(details) => {
                    self.check_inputs(id, &info.module_path, details.inputs())?;
                }
                ModuleDetails::Foreign => {
                    let inputs = info.source_files.iter().map(PathBuf::as_path);
                    self.check_inputs(id, &info.module_path, inputs)?;
                }
                ModuleDetails::Prebuilt(_) => {
                    return Err(StalenessError::UnverifiablePrebuilt(id.clone()));
                }
                ModuleDetails::Placeholder => {
                    return Err(StalenessError::Placeholder(id.clone()));
                }
            }
        }
        debug!("prior inter-module graph is up to date");
        Ok(())
    }

    fn check_inputs<'p>(
        &self,
        module: &ModuleId,
        output: &Path,
        inputs: impl Iterator<Item = &'p Path>,
    ) -> Result<(), StalenessError> {
        let output_time = self.modification_time(module, output)?;
        for input in inputs {
            if self.modification_time(module, input)? > output_time {
                return Err(StalenessError::OutOfDate {
                    module: module.clone(),
                    output: output.to_path_buf(),
                    input: input.to_path_buf(),
                });
            }
        }
        Ok(())
    }

    fn modification_time(&self, module: &ModuleId, path: &Path) -> Result<Timestamp, StalenessError> {
        self.fs
            .last_modification_time(path)
            .map_err(|source| StalenessError::UnableToStat {
                module: module.clone(),
                path: path.to_path_buf(),
                source,
            })
    }
}

fn difference(left: &BTreeSet<String>, right: &BTreeSet<String>) -> Vec<String> {
    left.difference(right).cloned().collect()
}

#[cfg(test)]
mod tests;
