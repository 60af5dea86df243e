//! [`Store`]: a cursor on a branch or on a detached head.

use std::sync::{Arc, Mutex, MutexGuard};

use strata_refs::validate_branch_name;
use strata_store::{Contents, EntryKind, Metadata};
use strata_tree::{Tree, TreeStore};
use strata_types::{ObjectId, Path, Step};
use tracing::debug;

use crate::commit::Commit;
use crate::error::{EngineError, EngineResult};
use crate::repository::Repository;

#[derive(Clone)]
pub(crate) enum HeadRef {
    Named(String),
    Detached(Arc<Mutex<Option<Commit>>>),
}

/// What a [`Store`] is pointing at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Status {
    /// A detached store with no commit yet.
    Empty,
    Branch(String),
    /// A detached store at a commit.
    Commit(Commit),
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "empty"),
            Self::Branch(name) => write!(f, "{name}"),
            Self::Commit(commit) => write!(f, "{}", commit.hash().short_hex()),
        }
    }
}

/// A handle on a repository bound to a branch or to a detached head.
///
/// Reads go through the tree of the current head commit; the last head's
/// tree is cached so repeated reads do not reload it. Writes are
/// transactions (see [`Store::set`] and friends). Clones share the head of a
/// detached store.
#[derive(Clone)]
pub struct Store {
    pub(crate) repo: Repository,
    pub(crate) head_ref: HeadRef,
    tree_cache: Arc<Mutex<Option<(ObjectId, Tree)>>>,
    lock: Arc<Mutex<()>>,
}

impl Store {
    fn with_head(repo: &Repository, head_ref: HeadRef) -> Self {
        Self {
            repo: repo.clone(),
            head_ref,
            tree_cache: Arc::new(Mutex::new(None)),
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// A store following branch `name`. The branch need not exist yet.
    pub fn of_branch(repo: &Repository, name: &str) -> EngineResult<Self> {
        validate_branch_name(name)?;
        Ok(Self::with_head(repo, HeadRef::Named(name.to_string())))
    }

    /// A store on the configured default branch.
    pub fn main(repo: &Repository) -> EngineResult<Self> {
        Self::of_branch(repo, &repo.config().default_branch)
    }

    /// A detached store with no commit.
    pub fn empty(repo: &Repository) -> Self {
        Self::with_head(repo, HeadRef::Detached(Arc::new(Mutex::new(None))))
    }

    /// A detached store at `commit`.
    pub fn of_commit(repo: &Repository, commit: Commit) -> Self {
        Self::with_head(repo, HeadRef::Detached(Arc::new(Mutex::new(Some(commit)))))
    }

    pub fn repo(&self) -> &Repository {
        &self.repo
    }

    pub(crate) fn trees(&self) -> &TreeStore {
        self.repo.trees()
    }

    pub fn status(&self) -> Status {
        match &self.head_ref {
            HeadRef::Named(name) => Status::Branch(name.clone()),
            HeadRef::Detached(cell) => match cell.lock().expect("lock poisoned").clone() {
                Some(commit) => Status::Commit(commit),
                None => Status::Empty,
            },
        }
    }

    /// Branch name, if this store follows one.
    pub fn branch(&self) -> Option<&str> {
        match &self.head_ref {
            HeadRef::Named(name) => Some(name),
            HeadRef::Detached(_) => None,
        }
    }

    /// Serializes read-then-swap sequences on a detached head. Branch-bound
    /// stores rely on the branch store's compare-and-set alone.
    pub(crate) fn write_guard(&self) -> Option<MutexGuard<'_, ()>> {
        match self.head_ref {
            HeadRef::Named(_) => None,
            HeadRef::Detached(_) => Some(self.lock.lock().expect("lock poisoned")),
        }
    }

    pub fn head(&self) -> EngineResult<Option<Commit>> {
        match &self.head_ref {
            HeadRef::Named(name) => self.repo.branch_head(name),
            HeadRef::Detached(cell) => Ok(cell.lock().expect("lock poisoned").clone()),
        }
    }

    /// Like [`Store::head`], but an empty head is an error.
    pub fn get_head(&self) -> EngineResult<Commit> {
        self.head()?
            .ok_or_else(|| EngineError::InvalidArgument(format!("{} has no head", self.status())))
    }

    /// Move the head unconditionally.
    pub fn set_head(&self, commit: &Commit) -> EngineResult<()> {
        match &self.head_ref {
            HeadRef::Named(name) => self.repo.branch_store().set(name, commit.hash())?,
            HeadRef::Detached(cell) => *cell.lock().expect("lock poisoned") = Some(commit.clone()),
        }
        debug!(head = %self.status(), commit = %commit.hash().short_hex(), "head set");
        Ok(())
    }

    /// Move the head to `set` only if it currently is `test`.
    pub fn test_and_set_head(&self, test: Option<&Commit>, set: Option<&Commit>) -> EngineResult<bool> {
        match &self.head_ref {
            HeadRef::Named(name) => Ok(self.repo.branch_store().test_and_set(
                name,
                test.map(Commit::hash),
                set.map(Commit::hash),
            )?),
            HeadRef::Detached(cell) => {
                let mut current = cell.lock().expect("lock poisoned");
                if current.as_ref() == test {
                    *current = set.cloned();
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
        }
    }

    /// Tree of the current head; the empty tree when there is none.
    pub fn tree(&self) -> EngineResult<Tree> {
        Ok(self.tree_of(self.head()?.as_ref()))
    }

    /// Tree of `head`, reusing the cached one when the head has not moved.
    pub(crate) fn tree_of(&self, head: Option<&Commit>) -> Tree {
        let Some(head) = head else {
            return Tree::empty();
        };
        let mut cache = self.tree_cache.lock().expect("lock poisoned");
        if let Some((id, tree)) = cache.as_ref() {
            if *id == head.hash() {
                return tree.clone();
            }
        }
        let tree = head.tree();
        *cache = Some((head.hash(), tree.clone()));
        tree
    }

    /// Point branch `name` at this store's head (or delete it when the head
    /// is empty) and return a store following it.
    pub fn clone_to(&self, name: &str) -> EngineResult<Store> {
        validate_branch_name(name)?;
        match self.head()? {
            Some(head) => self.repo.branch_store().set(name, head.hash())?,
            None => self.repo.branch_store().remove(name)?,
        }
        Store::of_branch(&self.repo, name)
    }

    pub fn find(&self, path: &Path) -> EngineResult<Option<Contents>> {
        Ok(self.tree()?.find(self.trees(), path)?)
    }

    pub fn get(&self, path: &Path) -> EngineResult<Contents> {
        self.find(path)?
            .ok_or_else(|| EngineError::PathNotFound(path.clone()))
    }

    pub fn find_all(&self, path: &Path) -> EngineResult<Option<(Contents, Metadata)>> {
        Ok(self.tree()?.find_all(self.trees(), path)?)
    }

    pub fn find_tree(&self, path: &Path) -> EngineResult<Option<Tree>> {
        Ok(self.tree()?.find_tree(self.trees(), path)?)
    }

    pub fn get_tree(&self, path: &Path) -> EngineResult<Tree> {
        self.find_tree(path)?
            .ok_or_else(|| EngineError::PathNotFound(path.clone()))
    }

    pub fn mem(&self, path: &Path) -> EngineResult<bool> {
        Ok(self.tree()?.mem(self.trees(), path)?)
    }

    pub fn mem_tree(&self, path: &Path) -> EngineResult<bool> {
        Ok(self.tree()?.mem_tree(self.trees(), path)?)
    }

    pub fn kind(&self, path: &Path) -> EngineResult<Option<EntryKind>> {
        Ok(self.tree()?.kind_at(self.trees(), path)?)
    }

    pub fn list(&self, path: &Path) -> EngineResult<Vec<(Step, EntryKind)>> {
        Ok(self.tree()?.list(self.trees(), path)?)
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").field("status", &self.status()).finish()
    }
}
