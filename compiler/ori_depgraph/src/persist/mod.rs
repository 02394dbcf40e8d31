//! Graph persistence.
//!
//! The serialized graph is a bincode [`GraphHeader`] followed by the bincode
//! graph body. The header carries the format version and the time the graph
//! was saved, which is checked against the prior build's start time: a graph
//! saved before the build that supposedly produced it started is stale.

use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::fs::{FileSystem, Timestamp};
use crate::graph::{GraphPhase, ModuleDependencyGraph};

/// Version of the serialized graph format.
///
/// Bump whenever the layout of [`ModuleDependencyGraph`] or its keys changes.
pub const SERIALIZED_GRAPH_VERSION: u32 = 1;

/// Prefix of every serialized graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphHeader {
    pub version: u32,
    pub saved_at: Timestamp,
}

/// Why a serialized graph could not be used.
#[derive(Debug, thiserror::Error)]
pub enum GraphReadError {
    #[error("serialized graph has version {found}, expected {expected}")]
    MismatchedVersion { expected: u32, found: u32 },

    #[error("serialized graph was saved at {saved_at}, before the prior build started at {build_start}")]
    TimeTravelling {
        saved_at: Timestamp,
        build_start: Timestamp,
    },

    #[error("failed to read serialized graph {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed serialized graph {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: bincode::Error,
    },
}

/// Errors writing a serialized graph.
#[derive(Debug, thiserror::Error)]
pub enum GraphWriteError {
    #[error("failed to encode dependency graph: {0}")]
    Encode(#[source] bincode::Error),

    #[error("failed to write serialized graph {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ModuleDependencyGraph {
    /// Serialize the graph to `path`, stamping it with `saved_at`.
    pub fn write(
        &self,
        fs: &dyn FileSystem,
        path: &Path,
        saved_at: Timestamp,
    ) -> Result<(), GraphWriteError> {
        let header = GraphHeader {
            version: SERIALIZED_GRAPH_VERSION,
            saved_at,
        };
        let mut bytes = bincode::serialize(&header).map_err(GraphWriteError::Encode)?;
        bincode::serialize_into(&mut bytes, self).map_err(GraphWriteError::Encode)?;
        fs.write(path, &bytes).map_err(|source| GraphWriteError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), nodes = self.len(), "wrote dependency graph");
        Ok(())
    }

    /// Read a serialized graph saved during the build that started at
    /// `prior_build_start`.
    ///
    /// The graph comes back in [`GraphPhase::UpdatingFromPrior`] with an
    /// empty unit map.
    pub fn read(
        fs: &dyn FileSystem,
        path: &Path,
        prior_build_start: Timestamp,
    ) -> Result<Self, GraphReadError> {
        let bytes = fs.read(path).map_err(|source| GraphReadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let decode = |source| GraphReadError::Decode {
            path: path.to_path_buf(),
            source,
        };

        let mut reader: &[u8] = &bytes;
        let header: GraphHeader = bincode::deserialize_from(&mut reader).map_err(decode)?;
        // A graph older than its own build is stale whatever its version.
        if header.saved_at < prior_build_start {
            return Err(GraphReadError::TimeTravelling {
                saved_at: header.saved_at,
                build_start: prior_build_start,
            });
        }
        if header.version != SERIALIZED_GRAPH_VERSION {
            return Err(GraphReadError::MismatchedVersion {
                expected: SERIALIZED_GRAPH_VERSION,
                found: header.version,
            });
        }

        let mut graph: Self = bincode::deserialize_from(&mut reader).map_err(decode)?;
        graph.set_phase(GraphPhase::UpdatingFromPrior);
        debug!(path = %path.display(), nodes = graph.len(), "read dependency graph");
        Ok(graph)
    }
}

#[cfg(test)]
mod tests;
