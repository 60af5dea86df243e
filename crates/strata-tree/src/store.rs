use std::sync::Arc;

use strata_store::{InMemoryObjectStore, ObjectStore};

/// The two object stores a tree reads from and exports to.
#[derive(Clone)]
pub struct TreeStore {
    contents: Arc<dyn ObjectStore>,
    nodes: Arc<dyn ObjectStore>,
}

impl TreeStore {
    pub fn new(contents: Arc<dyn ObjectStore>, nodes: Arc<dyn ObjectStore>) -> Self {
        Self { contents, nodes }
    }

    /// Fresh, empty in-memory stores.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(InMemoryObjectStore::new()),
            Arc::new(InMemoryObjectStore::new()),
        )
    }

    pub fn contents(&self) -> &dyn ObjectStore {
        self.contents.as_ref()
    }

    pub fn nodes(&self) -> &dyn ObjectStore {
        self.nodes.as_ref()
    }
}

impl std::fmt::Debug for TreeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeStore").finish_non_exhaustive()
    }
}
