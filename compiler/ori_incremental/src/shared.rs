//! The incremental-state serialization domain.
//!
//! The fine-grained graph is built here before any job runs, then handed to
//! the scheduler, whose job-completion callbacks may fire from many threads.
//! Every access before and after the hand-off goes through one mutex.

use std::fmt;
use std::sync::Arc;

use ori_depgraph::ModuleDependencyGraph;
use parking_lot::Mutex;

/// Shared, mutex-guarded handle to the build's dependency graph.
#[derive(Clone)]
pub struct SharedGraph(Arc<Mutex<ModuleDependencyGraph>>);

impl SharedGraph {
    pub fn new(graph: ModuleDependencyGraph) -> Self {
        SharedGraph(Arc::new(Mutex::new(graph)))
    }

    /// Run `f` with shared access to the graph.
    pub fn blocking_access<R>(&self, f: impl FnOnce(&ModuleDependencyGraph) -> R) -> R {
        f(&self.0.lock())
    }

    /// Run `f` with exclusive access to the graph.
    pub fn blocking_mutation<R>(&self, f: impl FnOnce(&mut ModuleDependencyGraph) -> R) -> R {
        f(&mut self.0.lock())
    }
}

impl fmt::Debug for SharedGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.blocking_access(|graph| write!(f, "SharedGraph({} nodes)", graph.len()))
    }
}
