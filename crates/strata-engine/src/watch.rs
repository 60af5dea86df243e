//! Change notifications lifted from branch ids to commits and paths.

use std::sync::Arc;

use strata_refs::{BranchCallback, KeyCallback, WatchHandle};
use strata_tree::Tree;
use strata_types::{Diff, ObjectId, Path};
use tracing::warn;

use crate::commit::Commit;
use crate::error::{EngineError, EngineResult};
use crate::handle::{HeadRef, Store};
use crate::repository::Repository;

fn resolve(repo: &Repository, diff: Diff<ObjectId>) -> EngineResult<Diff<Commit>> {
    Ok(match diff {
        Diff::Added(id) => Diff::Added(repo.get_commit(&id)?),
        Diff::Removed(id) => Diff::Removed(repo.get_commit(&id)?),
        Diff::Updated(old, new) => Diff::Updated(repo.get_commit(&old)?, repo.get_commit(&new)?),
    })
}

fn value_at(repo: &Repository, commit: Option<&Commit>, path: &Path) -> EngineResult<Option<(Commit, Tree)>> {
    let Some(commit) = commit else {
        return Ok(None);
    };
    Ok(commit
        .tree()
        .find_tree(repo.trees(), path)?
        .map(|tree| (commit.clone(), tree)))
}

/// The change at `path` between the two sides of a head change, or `None`
/// when the subtree there did not move.
fn path_diff(repo: &Repository, path: &Path, diff: &Diff<Commit>) -> EngineResult<Option<Diff<(Commit, Tree)>>> {
    let old = value_at(repo, diff.old(), path)?;
    let new = value_at(repo, diff.new_value(), path)?;
    if Tree::same_opt(old.as_ref().map(|(_, t)| t), new.as_ref().map(|(_, t)| t))? {
        return Ok(None);
    }
    Ok(Diff::between(old, new))
}

impl Repository {
    /// Call `f` with every change to any branch head.
    ///
    /// With `init`, `f` is first told how the current heads differ from the
    /// ones given.
    pub fn watch_branches<F>(&self, init: Option<Vec<(String, Commit)>>, f: F) -> EngineResult<WatchHandle>
    where
        F: Fn(&str, Diff<Commit>) + Send + Sync + 'static,
    {
        let repo = self.clone();
        let callback: BranchCallback = Arc::new(move |branch: &str, diff: Diff<ObjectId>| {
            match resolve(&repo, diff) {
                Ok(diff) => f(branch, diff),
                Err(e) => warn!(branch, error = %e, "dropping branch event"),
            }
        });
        let init = init.map(|known| {
            known
                .into_iter()
                .map(|(name, commit)| (name, commit.hash()))
                .collect()
        });
        Ok(self.branch_store().watch(init, callback)?)
    }

    pub fn unwatch(&self, handle: WatchHandle) -> EngineResult<()> {
        Ok(self.branch_store().unwatch(handle)?)
    }
}

impl Store {
    fn watched_branch(&self) -> EngineResult<&str> {
        match &self.head_ref {
            HeadRef::Named(name) => Ok(name),
            HeadRef::Detached(_) => Err(EngineError::InvalidArgument(
                "a detached store cannot be watched".into(),
            )),
        }
    }

    /// Call `f` with every change to this store's branch head. With `init`,
    /// `f` is first told how the head differs from that commit.
    pub fn watch<F>(&self, init: Option<Commit>, f: F) -> EngineResult<WatchHandle>
    where
        F: Fn(Diff<Commit>) + Send + Sync + 'static,
    {
        let branch = self.watched_branch()?.to_string();
        let name = branch.clone();
        let repo = self.repo.clone();
        let callback: KeyCallback = Arc::new(move |diff: Diff<ObjectId>| match resolve(&repo, diff) {
            Ok(diff) => f(diff),
            Err(e) => warn!(branch = %name, error = %e, "dropping head event"),
        });
        Ok(self
            .repo
            .branch_store()
            .watch_key(&branch, init.map(|c| Some(c.hash())), callback)?)
    }

    /// Call `f` whenever the subtree at `path` changes on this store's
    /// branch. Head changes that leave the subtree untouched are skipped.
    pub fn watch_key<F>(&self, path: &Path, init: Option<Commit>, f: F) -> EngineResult<WatchHandle>
    where
        F: Fn(Diff<(Commit, Tree)>) + Send + Sync + 'static,
    {
        let repo = self.repo.clone();
        let path = path.clone();
        self.watch(init, move |diff: Diff<Commit>| match path_diff(&repo, &path, &diff) {
            Ok(Some(change)) => f(change),
            Ok(None) => {}
            Err(e) => warn!(path = %path, error = %e, "dropping path event"),
        })
    }

    pub fn unwatch(&self, handle: WatchHandle) -> EngineResult<()> {
        self.repo.unwatch(handle)
    }
}
