//! Structural invariants of the graph.

use super::ModuleDependencyGraph;
use crate::key::{DeclKey, DependencySource, NodeKey};

/// A broken structural invariant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    #[error("{user} uses {key} but is not a node of the graph")]
    MissingUser { key: DeclKey, user: NodeKey },

    #[error("{0} is a node but its source does not list it as provided")]
    UnindexedNode(NodeKey),

    #[error("{source_file} provides {key} but has no such node")]
    DanglingProvide {
        source_file: DependencySource,
        key: DeclKey,
    },

    #[error("dependency source {0} does not belong to any unit")]
    UnmappedSource(DependencySource),
}

impl ModuleDependencyGraph {
    /// Check the graph's structural invariants.
    ///
    /// Every user node exists, every sourced node is indexed by its source,
    /// every indexed key has a node, and every source maps to a unit.
    pub fn verify(&self) -> Result<(), VerifyError> {
        let mut keys: Vec<&DeclKey> = self.uses.keys().collect();
        keys.sort();
        for key in keys {
            let mut users: Vec<&NodeKey> = self.users_of(key).collect();
            users.sort();
            if let Some(user) = users.into_iter().find(|user| !self.nodes.contains_key(*user)) {
                return Err(VerifyError::MissingUser {
                    key: key.clone(),
                    user: user.clone(),
                });
            }
        }

        let mut nodes: Vec<&NodeKey> = self.nodes.keys().collect();
        nodes.sort();
        for node in nodes {
            let Some(source) = &node.source else {
                continue;
            };
            let indexed = self
                .provides
                .get(source)
                .is_some_and(|keys| keys.contains(&node.key));
            if !indexed {
                return Err(VerifyError::UnindexedNode(node.clone()));
            }
        }

        let mut sources: Vec<&DependencySource> = self.provides.keys().collect();
        sources.sort();
        for source in sources {
            let mut keys: Vec<&DeclKey> = self.provided_by(source).collect();
            keys.sort();
            for key in keys {
                let node = NodeKey::new(key.clone(), Some(source.clone()));
                if !self.nodes.contains_key(&node) {
                    return Err(VerifyError::DanglingProvide {
                        source_file: source.clone(),
                        key: key.clone(),
                    });
                }
            }
            if self.unit_for(source).is_none() {
                return Err(VerifyError::UnmappedSource(source.clone()));
            }
        }
        Ok(())
    }
}
