//! Optimistic write transactions.
//!
//! Every write follows the same loop: snapshot the head and its tree, compute
//! the new subtree at the target path, build and persist a commit, then
//! compare-and-set the head from the snapshot to the new commit. Losing the
//! compare-and-set means someone else moved the head, so the loop starts
//! over from a fresh snapshot, up to the configured number of retries.

use std::sync::Arc;

use strata_merge::Promise;
use strata_store::{Contents, Metadata};
use strata_tree::{merge_subtrees, Tree};
use strata_types::{Info, Path};
use tracing::{debug, warn};

use crate::commit::Commit;
use crate::error::{EngineError, EngineResult, WriteError, WriteResult};
use crate::handle::Store;

/// Produces the commit info. Called once per attempt, right before the
/// commit is built.
pub type InfoFn = Arc<dyn Fn() -> Info + Send + Sync>;

/// How [`Store::with_tree`] writes the tree its function returns.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Strategy {
    /// Overwrite whatever is at the path.
    #[default]
    Set,
    /// Write only if the path still holds what the function was given;
    /// otherwise call the function again on the new value.
    TestAndSet,
    /// Three-way merge against what the function was given; on conflict,
    /// call the function again on a fresh read.
    Merge,
}

/// Per-write settings. Unset fields fall back to the repository config.
#[derive(Clone)]
pub struct WriteOptions {
    info: InfoFn,
    retries: Option<u32>,
    allow_empty: Option<bool>,
    parents: Option<Vec<Commit>>,
}

impl WriteOptions {
    pub fn new(info: impl Fn() -> Info + Send + Sync + 'static) -> Self {
        Self {
            info: Arc::new(info),
            retries: None,
            allow_empty: None,
            parents: None,
        }
    }

    /// Commits stamped with the current time and `message`, authored by the
    /// configured default author.
    pub fn message(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(move || Info::now("", message.clone()))
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    pub fn with_allow_empty(mut self, allow_empty: bool) -> Self {
        self.allow_empty = Some(allow_empty);
        self
    }

    /// Record these parents instead of the current head.
    pub fn with_parents(mut self, parents: Vec<Commit>) -> Self {
        self.parents = Some(parents);
        self
    }

    pub(crate) fn info(&self) -> Info {
        (self.info)()
    }
}

impl std::fmt::Debug for WriteOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteOptions")
            .field("retries", &self.retries)
            .field("allow_empty", &self.allow_empty)
            .field("parents", &self.parents.as_ref().map(Vec::len))
            .finish()
    }
}

fn leaf(contents: Option<Contents>) -> Option<Tree> {
    contents.map(|c| Tree::of_contents(c, Metadata::Normal))
}

fn test_and_set_step(
    test: Option<Tree>,
    set: Option<Tree>,
) -> impl FnMut(Option<Tree>) -> WriteResult<Option<Tree>> {
    move |current| {
        if Tree::same_opt(current.as_ref(), test.as_ref())? {
            Ok(set.clone())
        } else {
            Err(WriteError::TestWas(current))
        }
    }
}

fn into_engine_error(err: WriteError) -> EngineError {
    match err {
        WriteError::Engine(e) => e,
        other => EngineError::WriteFailed(other.to_string()),
    }
}

impl Store {
    pub(crate) fn retries(&self, opts: &WriteOptions) -> u32 {
        opts.retries.unwrap_or(self.repo.config().retries)
    }

    /// Run one write transaction. `step` maps the subtree currently at
    /// `path` to the one to write there; it runs again on every retry.
    ///
    /// Returns the new commit, or `None` when the write changed nothing on
    /// an existing head and empty commits are not allowed.
    fn transact<F>(&self, path: &Path, opts: &WriteOptions, step: F) -> WriteResult<Option<Commit>>
    where
        F: FnMut(Option<Tree>) -> WriteResult<Option<Tree>>,
    {
        self.transact_from(path, opts, &mut 0, step)
    }

    /// [`Store::transact`] drawing on a retry budget shared with the caller:
    /// `attempt` counts every lost compare-and-set so far.
    fn transact_from<F>(
        &self,
        path: &Path,
        opts: &WriteOptions,
        attempt: &mut u32,
        mut step: F,
    ) -> WriteResult<Option<Commit>>
    where
        F: FnMut(Option<Tree>) -> WriteResult<Option<Tree>>,
    {
        let retries = self.retries(opts);
        let allow_empty = opts.allow_empty.unwrap_or(self.repo.config().allow_empty);
        let trees = self.trees();
        loop {
            if *attempt > retries {
                warn!(head = %self.status(), path = %path, retries, "giving up after repeated head moves");
                return Err(WriteError::TooManyRetries(retries));
            }
            let _guard = self.write_guard();
            let head = self.head()?;
            let root = self.tree_of(head.as_ref());

            let current = root.find_tree(trees, path)?;
            let new = step(current)?;
            if path.is_root() && matches!(new, Some(Tree::Contents(_))) {
                return Err(EngineError::InvalidArgument(
                    "contents cannot be stored at the root".into(),
                )
                .into());
            }
            let new_root = root.update_tree(trees, path, |_| Ok(new))?;

            if !allow_empty && head.is_some() && new_root.same(&root)? {
                debug!(head = %self.status(), path = %path, "nothing to commit");
                return Ok(None);
            }

            let parents = match &opts.parents {
                Some(parents) => parents.clone(),
                None => head.iter().cloned().collect(),
            };
            let commit = self.repo.new_commit(opts.info(), &parents, &new_root)?;
            if self.test_and_set_head(head.as_ref(), Some(&commit))? {
                debug!(
                    head = %self.status(),
                    commit = %commit.hash().short_hex(),
                    path = %path,
                    attempt = *attempt,
                    "write committed"
                );
                return Ok(Some(commit));
            }
            *attempt += 1;
            debug!(head = %self.status(), path = %path, attempt = *attempt, "head moved, retrying");
        }
    }

    /// Store `contents` at `path`.
    pub fn set(&self, path: &Path, contents: impl Into<Contents>, opts: &WriteOptions) -> WriteResult<()> {
        self.set_tree(path, Tree::of_contents(contents, Metadata::Normal), opts)
    }

    /// Graft `tree` at `path`.
    pub fn set_tree(&self, path: &Path, tree: Tree, opts: &WriteOptions) -> WriteResult<()> {
        self.transact(path, opts, |_| Ok(Some(tree.clone())))?;
        Ok(())
    }

    /// Remove whatever is at `path`.
    pub fn remove(&self, path: &Path, opts: &WriteOptions) -> WriteResult<()> {
        self.transact(path, opts, |_| Ok(None))?;
        Ok(())
    }

    /// Replace the contents at `path` with `set`, provided it currently
    /// holds `test`. `None` means absent on either side.
    pub fn test_and_set(
        &self,
        path: &Path,
        test: Option<Contents>,
        set: Option<Contents>,
        opts: &WriteOptions,
    ) -> WriteResult<()> {
        self.test_and_set_tree(path, leaf(test), leaf(set), opts)
    }

    pub fn test_and_set_tree(
        &self,
        path: &Path,
        test: Option<Tree>,
        set: Option<Tree>,
        opts: &WriteOptions,
    ) -> WriteResult<()> {
        self.test_set_and_get_tree(path, test, set, opts)?;
        Ok(())
    }

    /// [`Store::test_and_set`], returning the commit it created, if any.
    pub fn test_set_and_get(
        &self,
        path: &Path,
        test: Option<Contents>,
        set: Option<Contents>,
        opts: &WriteOptions,
    ) -> WriteResult<Option<Commit>> {
        self.test_set_and_get_tree(path, leaf(test), leaf(set), opts)
    }

    pub fn test_set_and_get_tree(
        &self,
        path: &Path,
        test: Option<Tree>,
        set: Option<Tree>,
        opts: &WriteOptions,
    ) -> WriteResult<Option<Commit>> {
        self.transact(path, opts, test_and_set_step(test, set))
    }

    /// Three-way merge `new` into the contents at `path`, taking `old` as
    /// the common ancestor.
    pub fn merge(
        &self,
        path: &Path,
        old: Option<Contents>,
        new: Option<Contents>,
        opts: &WriteOptions,
    ) -> WriteResult<()> {
        self.merge_tree(path, leaf(old), leaf(new), opts)
    }

    pub fn merge_tree(
        &self,
        path: &Path,
        old: Option<Tree>,
        new: Option<Tree>,
        opts: &WriteOptions,
    ) -> WriteResult<()> {
        self.transact(path, opts, self.merge_step(path, old, new))?;
        Ok(())
    }

    fn merge_step<'a>(
        &'a self,
        path: &'a Path,
        old: Option<Tree>,
        new: Option<Tree>,
    ) -> impl FnMut(Option<Tree>) -> WriteResult<Option<Tree>> + 'a {
        let trees = self.trees();
        let contents_merge = self.repo.contents_merge();
        move |current| {
            let ancestor = Promise::ready(old.clone());
            Ok(merge_subtrees(
                trees,
                path,
                &ancestor,
                current.as_ref(),
                new.as_ref(),
                contents_merge,
            )?)
        }
    }

    /// Read the subtree at `path`, transform it with `f`, and write the
    /// result back following `strategy`.
    ///
    /// With [`Strategy::TestAndSet`] and [`Strategy::Merge`], a concurrent
    /// change to the path makes `f` run again on the new value. Reruns and
    /// lost compare-and-sets draw on one retry budget.
    pub fn with_tree<F>(&self, path: &Path, strategy: Strategy, opts: &WriteOptions, mut f: F) -> WriteResult<()>
    where
        F: FnMut(Option<Tree>) -> EngineResult<Option<Tree>>,
    {
        let retries = self.retries(opts);
        let mut old = self.find_tree(path)?;
        let mut attempt = 0;
        loop {
            if attempt > retries {
                return Err(WriteError::TooManyRetries(retries));
            }
            let new = f(old.clone())?;
            let result = match strategy {
                Strategy::Set => self.transact_from(path, opts, &mut attempt, |_| Ok(new.clone())),
                Strategy::TestAndSet => {
                    self.transact_from(path, opts, &mut attempt, test_and_set_step(old.clone(), new))
                }
                Strategy::Merge => {
                    let step = self.merge_step(path, old.clone(), new);
                    self.transact_from(path, opts, &mut attempt, step)
                }
            };
            match result {
                Err(WriteError::TestWas(current)) if strategy == Strategy::TestAndSet => {
                    old = current;
                }
                Err(WriteError::Conflict(msg)) if strategy == Strategy::Merge => {
                    debug!(path = %path, conflict = %msg, "merge conflict, rereading");
                    old = self.find_tree(path)?;
                }
                other => return other.map(drop),
            }
            attempt += 1;
        }
    }

    pub fn set_exn(&self, path: &Path, contents: impl Into<Contents>, opts: &WriteOptions) -> EngineResult<()> {
        self.set(path, contents, opts).map_err(into_engine_error)
    }

    pub fn set_tree_exn(&self, path: &Path, tree: Tree, opts: &WriteOptions) -> EngineResult<()> {
        self.set_tree(path, tree, opts).map_err(into_engine_error)
    }

    pub fn remove_exn(&self, path: &Path, opts: &WriteOptions) -> EngineResult<()> {
        self.remove(path, opts).map_err(into_engine_error)
    }

    pub fn test_and_set_exn(
        &self,
        path: &Path,
        test: Option<Contents>,
        set: Option<Contents>,
        opts: &WriteOptions,
    ) -> EngineResult<()> {
        self.test_and_set(path, test, set, opts).map_err(into_engine_error)
    }

    pub fn test_and_set_tree_exn(
        &self,
        path: &Path,
        test: Option<Tree>,
        set: Option<Tree>,
        opts: &WriteOptions,
    ) -> EngineResult<()> {
        self.test_and_set_tree(path, test, set, opts).map_err(into_engine_error)
    }

    pub fn merge_exn(
        &self,
        path: &Path,
        old: Option<Contents>,
        new: Option<Contents>,
        opts: &WriteOptions,
    ) -> EngineResult<()> {
        self.merge(path, old, new, opts).map_err(into_engine_error)
    }

    pub fn merge_tree_exn(
        &self,
        path: &Path,
        old: Option<Tree>,
        new: Option<Tree>,
        opts: &WriteOptions,
    ) -> EngineResult<()> {
        self.merge_tree(path, old, new, opts).map_err(into_engine_error)
    }

    pub fn with_tree_exn<F>(&self, path: &Path, strategy: Strategy, opts: &WriteOptions, f: F) -> EngineResult<()>
    where
        F: FnMut(Option<Tree>) -> EngineResult<Option<Tree>>,
    {
        self.with_tree(path, strategy, opts, f).map_err(into_engine_error)
    }
}
