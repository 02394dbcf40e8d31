//! Node identities in the fine-grained graph.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::fingerprint::Fingerprint;

/// What a declaration key designates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclKind {
    /// A top-level function, constant or type alias.
    TopLevel,
    /// A nominal type (struct, enum, trait).
    Nominal,
    /// A member of a nominal type.
    Member,
    /// The interface of a whole source file.
    SourceFile,
    /// A dependency outside the units of this build.
    External,
}

/// A declaration-level key.
///
/// `context` is the enclosing nominal type for members and empty otherwise.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DeclKey {
    pub kind: DeclKind,
    #[serde(default)]
    pub context: String,
    pub name: String,
}

impl DeclKey {
    pub fn top_level(name: impl Into<String>) -> Self {
        Self {
            kind: DeclKind::TopLevel,
            context: String::new(),
            name: name.into(),
        }
    }

    pub fn nominal(name: impl Into<String>) -> Self {
        Self {
            kind: DeclKind::Nominal,
            context: String::new(),
            name: name.into(),
        }
    }

    pub fn member(context: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: DeclKind::Member,
            context: context.into(),
            name: name.into(),
        }
    }

    /// The node standing for a whole dependency source.
    pub fn source_file(source: &DependencySource) -> Self {
        Self {
            kind: DeclKind::SourceFile,
            context: String::new(),
            name: source.path().to_string_lossy().into_owned(),
        }
    }

    pub fn external(path: &Path) -> Self {
        Self {
            kind: DeclKind::External,
            context: String::new(),
            name: path.to_string_lossy().into_owned(),
        }
    }

    pub fn is_external(&self) -> bool {
        self.kind == DeclKind::External
    }
}

impl fmt::Display for DeclKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            DeclKind::TopLevel => write!(f, "top-level `{}`", self.name),
            DeclKind::Nominal => write!(f, "type `{}`", self.name),
            DeclKind::Member => write!(f, "member `{}.{}`", self.context, self.name),
            DeclKind::SourceFile => write!(f, "source file `{}`", self.name),
            DeclKind::External => write!(f, "external `{}`", self.name),
        }
    }
}

/// The on-disk dependency summary a node came from.
///
/// Each compilation unit has exactly one; the graph maps between them.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DependencySource(PathBuf);

impl DependencySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for DependencySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// A node: a declaration key as defined by one source.
///
/// `source` is `None` for expatriates, i.e. keys used in this build but
/// defined nowhere in it.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeKey {
    pub key: DeclKey,
    pub source: Option<DependencySource>,
}

impl NodeKey {
    pub fn new(key: DeclKey, source: Option<DependencySource>) -> Self {
        Self { key, source }
    }

    /// The source-file node of `source`.
    pub fn source_file(source: &DependencySource) -> Self {
        Self {
            key: DeclKey::source_file(source),
            source: Some(source.clone()),
        }
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "{} in {source}", self.key),
            None => write!(f, "{} (expat)", self.key),
        }
    }
}

/// A dependency on something outside this build's own units.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ExternalDependency {
    pub path: PathBuf,
    #[serde(default)]
    pub fingerprint: Option<Fingerprint>,
}

impl ExternalDependency {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            fingerprint: None,
        }
    }

    #[must_use]
    pub fn with_fingerprint(mut self, fingerprint: Fingerprint) -> Self {
        self.fingerprint = Some(fingerprint);
        self
    }

    /// The graph key users of this dependency hang off.
    pub fn key(&self) -> DeclKey {
        DeclKey::external(&self.path)
    }
}
