//! Per-unit dependency summaries.
//!
//! After compiling a unit, the compiler writes a JSON summary next to the
//! unit's outputs: which declarations the unit provides, which keys it uses,
//! and which external dependencies it read. The graph is built by
//! integrating these summaries one unit at a time.

use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::fingerprint::Fingerprint;
use crate::fs::FileSystem;
use crate::key::{DeclKey, DependencySource, ExternalDependency};

/// Errors reading or writing a dependency summary.
#[derive(Debug, thiserror::Error)]
pub enum SummaryError {
    #[error("failed to read dependency summary {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed dependency summary {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode dependency summary: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to write dependency summary {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A declaration provided by the unit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvidedDecl {
    pub key: DeclKey,
    /// `None` when the compiler could not fingerprint the declaration.
    #[serde(default)]
    pub fingerprint: Option<Fingerprint>,
}

/// A key used by the unit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsedDecl {
    pub key: DeclKey,
    /// The provided declaration doing the using; the unit's source-file node
    /// when absent.
    #[serde(default)]
    pub user: Option<DeclKey>,
}

/// The on-disk summary of one compilation unit.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencySummary {
    #[serde(default)]
    pub provides: Vec<ProvidedDecl>,
    #[serde(default)]
    pub depends: Vec<UsedDecl>,
    #[serde(default)]
    pub externals: Vec<ExternalDependency>,
}

impl DependencySummary {
    /// Create an empty summary.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a provided declaration.
    #[must_use]
    pub fn provide(mut self, key: DeclKey, fingerprint: Fingerprint) -> Self {
        self.provides.push(ProvidedDecl {
            key,
            fingerprint: Some(fingerprint),
        });
        self
    }

    /// Add a provided declaration without a fingerprint.
    #[must_use]
    pub fn provide_unfingerprinted(mut self, key: DeclKey) -> Self {
        self.provides.push(ProvidedDecl {
            key,
            fingerprint: None,
        });
        self
    }

    /// Add a use of `key` by the whole unit.
    #[must_use]
    pub fn depend(mut self, key: DeclKey) -> Self {
        self.depends.push(UsedDecl { key, user: None });
        self
    }

    /// Add a use of `key` by the provided declaration `user`.
    #[must_use]
    pub fn depend_from(mut self, key: DeclKey, user: DeclKey) -> Self {
        self.depends.push(UsedDecl {
            key,
            user: Some(user),
        });
        self
    }

    /// Add an external dependency.
    #[must_use]
    pub fn external(mut self, external: ExternalDependency) -> Self {
        self.externals.push(external);
        self
    }

    /// Parse a summary from JSON text.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Render the summary as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, SummaryError> {
        serde_json::to_string_pretty(self).map_err(SummaryError::Encode)
    }

    /// Read the summary stored at `source`.
    pub fn read(fs: &dyn FileSystem, source: &DependencySource) -> Result<Self, SummaryError> {
        let path = source.path();
        let bytes = fs.read(path).map_err(|source| SummaryError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_slice(&bytes).map_err(|source| SummaryError::Decode {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write the summary to `source`.
    pub fn write(&self, fs: &dyn FileSystem, source: &DependencySource) -> Result<(), SummaryError> {
        let text = self.to_json()?;
        let path = source.path();
        fs.write(path, text.as_bytes())
            .map_err(|source| SummaryError::Write {
                path: path.to_path_buf(),
                source,
            })
    }
}
