use std::sync::Arc;

use strata_refs::{BranchStore, InMemoryBranchStore};
use strata_store::{CommitObject, InMemoryObjectStore, ObjectStore, TypedStore};
use strata_tree::{default_contents_merge, ContentsMerge, Tree, TreeStore};
use strata_types::{Info, ObjectId};
use tracing::{debug, info};

use crate::commit::Commit;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};

/// The four backends a repository is assembled from.
pub struct Backends {
    pub contents: Arc<dyn ObjectStore>,
    pub nodes: Arc<dyn ObjectStore>,
    pub commits: Arc<dyn ObjectStore>,
    pub branches: Arc<dyn BranchStore>,
}

impl Backends {
    /// Fresh in-memory backends.
    pub fn in_memory() -> Self {
        Self {
            contents: Arc::new(InMemoryObjectStore::new()),
            nodes: Arc::new(InMemoryObjectStore::new()),
            commits: Arc::new(InMemoryObjectStore::new()),
            branches: Arc::new(InMemoryBranchStore::new()),
        }
    }
}

/// A repository: the object stores, the branch store, and the settings that
/// every [`Store`](crate::Store) opened on it shares.
///
/// Cloning is cheap; clones share all backends.
#[derive(Clone)]
pub struct Repository {
    trees: TreeStore,
    commits: Arc<dyn ObjectStore>,
    branches: Arc<dyn BranchStore>,
    config: Arc<EngineConfig>,
    contents_merge: ContentsMerge,
}

impl Repository {
    pub fn new(backends: Backends, config: EngineConfig) -> Self {
        info!(
            default_branch = %config.default_branch,
            retries = config.retries,
            "opening repository"
        );
        Self {
            trees: TreeStore::new(backends.contents, backends.nodes),
            commits: backends.commits,
            branches: backends.branches,
            config: Arc::new(config),
            contents_merge: default_contents_merge(),
        }
    }

    /// A repository on fresh in-memory backends with the default config.
    pub fn in_memory() -> Self {
        Self::new(Backends::in_memory(), EngineConfig::default())
    }

    pub fn in_memory_with_config(config: EngineConfig) -> Self {
        Self::new(Backends::in_memory(), config)
    }

    /// Replace the merge used for conflicting leaves.
    pub fn with_contents_merge(mut self, merge: ContentsMerge) -> Self {
        self.contents_merge = merge;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn trees(&self) -> &TreeStore {
        &self.trees
    }

    pub fn commits(&self) -> &dyn ObjectStore {
        self.commits.as_ref()
    }

    pub fn branch_store(&self) -> &dyn BranchStore {
        self.branches.as_ref()
    }

    pub fn contents_merge(&self) -> &ContentsMerge {
        &self.contents_merge
    }

    /// All branch names, sorted.
    pub fn branches(&self) -> EngineResult<Vec<String>> {
        Ok(self.branches.list()?)
    }

    /// The head commit of every branch, in branch-name order.
    pub fn heads(&self) -> EngineResult<Vec<Commit>> {
        let mut heads = Vec::new();
        for name in self.branches.list()? {
            if let Some(id) = self.branches.find(&name)? {
                heads.push(self.get_commit(&id)?);
            }
        }
        Ok(heads)
    }

    pub fn remove_branch(&self, name: &str) -> EngineResult<()> {
        debug!(branch = name, "removing branch");
        Ok(self.branches.remove(name)?)
    }

    /// Head commit of branch `name`.
    pub fn branch_head(&self, name: &str) -> EngineResult<Option<Commit>> {
        match self.branches.find(name)? {
            Some(id) => Ok(Some(self.get_commit(&id)?)),
            None => Ok(None),
        }
    }

    pub fn commit_of_hash(&self, id: &ObjectId) -> EngineResult<Option<Commit>> {
        Ok(self
            .commits
            .find_value::<CommitObject>(id)?
            .map(|value| Commit::new(*id, value)))
    }

    /// Like [`Repository::commit_of_hash`], but a missing commit is an error.
    pub fn get_commit(&self, id: &ObjectId) -> EngineResult<Commit> {
        Ok(Commit::new(*id, self.commits.get_value::<CommitObject>(id)?))
    }

    /// The stored node at `id` as a lazily loaded tree.
    pub fn tree_of_hash(&self, id: &ObjectId) -> EngineResult<Option<Tree>> {
        if self.trees.nodes().mem(id)? {
            Ok(Some(Tree::of_node_hash(*id)))
        } else {
            Ok(None)
        }
    }

    /// Persist `tree` and record a commit of it.
    ///
    /// The tree must be a node; leaves cannot be commit roots. An empty
    /// author in `info` is replaced by the configured default.
    pub fn new_commit(&self, mut info: Info, parents: &[Commit], tree: &Tree) -> EngineResult<Commit> {
        if let Tree::Contents(_) = tree {
            return Err(EngineError::InvalidArgument(
                "a commit root must be a node".into(),
            ));
        }
        if info.author.is_empty() {
            info.author = self.config.default_author.clone();
        }
        let node = tree.export(&self.trees)?;
        let value = CommitObject::new(node, parents.iter().map(Commit::hash).collect(), info);
        let hash = self.commits.add_value(&value)?;
        debug!(commit = %hash.short_hex(), node = %node.short_hex(), parents = parents.len(), "commit created");
        Ok(Commit::new(hash, value))
    }

    /// Stop watch dispatch. Stores stay readable.
    pub fn close(&self) -> EngineResult<()> {
        info!("closing repository");
        Ok(self.branches.close()?)
    }
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("trees", &self.trees)
            .field("config", &self.config)
            .finish()
    }
}
