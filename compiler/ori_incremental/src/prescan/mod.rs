//! Import pre-scanning.
//!
//! A cheap pass over the primary sources that collects the names of the
//! modules they import, without parsing. Used to check that a persisted
//! inter-module graph still describes the main module's imports.

use std::collections::BTreeSet;
use std::io;
use std::path::PathBuf;

use ori_depgraph::FileSystem;

/// Errors pre-scanning imports.
#[derive(Debug, thiserror::Error)]
pub enum PrescanError {
    #[error("could not read {path} while scanning imports: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{path} is not valid UTF-8")]
    InvalidUtf8 { path: PathBuf },
}

/// Computes the set of module names the main module imports.
pub trait ImportPrescanner: Send + Sync {
    fn perform_import_prescan(&self, fs: &dyn FileSystem) -> Result<BTreeSet<String>, PrescanError>;
}

/// Scans `use` declarations in the primary source files.
///
/// `use std.math { sqrt }` and `use std.net.http as http` import modules;
/// `use './file' { ... }` imports a file of the same module and is skipped.
#[derive(Clone, Debug, Default)]
pub struct SourceImportPrescanner {
    sources: Vec<PathBuf>,
}

impl SourceImportPrescanner {
    pub fn new(sources: Vec<PathBuf>) -> Self {
        Self { sources }
    }
}

impl ImportPrescanner for SourceImportPrescanner {
    #[tracing::instrument(level = "debug", skip_all, fields(sources = self.sources.len()))]
    fn perform_import_prescan(&self, fs: &dyn FileSystem) -> Result<BTreeSet<String>, PrescanError> {
        let mut imports = BTreeSet::new();
        for path in &self.sources {
            let bytes = fs.read(path).map_err(|source| PrescanError::Read {
                path: path.clone(),
                source,
            })?;
            let text = String::from_utf8(bytes)
                .map_err(|_| PrescanError::InvalidUtf8 { path: path.clone() })?;
            imports.extend(scan_imports(&text));
        }
        Ok(imports)
    }
}

/// Module names imported by `text`.
pub fn scan_imports(text: &str) -> impl Iterator<Item = String> + '_ {
    text.lines().filter_map(|line| {
        let line = line.trim_start();
        let line = line.strip_prefix("pub ").unwrap_or(line);
        let rest = line.strip_prefix("use ")?.trim_start();
        if rest.starts_with('\'') || rest.starts_with('"') {
            return None;
        }
        let end = rest
            .find(|c: char| c.is_whitespace() || c == '{')
            .unwrap_or(rest.len());
        let module = &rest[..end];
        (!module.is_empty()).then(|| module.to_string())
    })
}
