//! Fine-grained dependency graph for incremental Ori builds.
//!
//! The compiler writes one dependency summary per compilation unit. This
//! crate integrates those summaries into a declaration-level graph, finds
//! the units reached from changed declarations or changed external
//! dependencies, and persists the graph between builds.
//!
//! # Files
//!
//! ```text
//! build/
//! ├── main.ori.deps       # per-unit summary (JSON)
//! ├── util.ori.deps
//! └── record.json.priors  # serialized graph (bincode, versioned header)
//! ```
//!
//! All file access goes through [`FileSystem`], so tests can run against a
//! [`VirtualFileSystem`] with pinned modification times.

mod fingerprint;
mod fs;
mod graph;
mod key;
mod persist;
mod summary;

pub use fingerprint::Fingerprint;
pub use fs::{FileSystem, LocalFileSystem, Timestamp, VirtualFileSystem};
pub use graph::{
    ExternalCheck, GraphPhase, Integration, IntegrationError, ModuleDependencyGraph, VerifyError,
};
pub use key::{DeclKey, DeclKind, DependencySource, ExternalDependency, NodeKey};
pub use persist::{GraphHeader, GraphReadError, GraphWriteError, SERIALIZED_GRAPH_VERSION};
pub use summary::{DependencySummary, ProvidedDecl, SummaryError, UsedDecl};
