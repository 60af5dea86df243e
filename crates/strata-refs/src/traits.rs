//! The [`BranchStore`] capability.

use std::sync::Arc;

use strata_types::{Diff, ObjectId};

use crate::error::Result;

/// Callback for whole-store watches: receives the branch name and its change.
pub type BranchCallback = Arc<dyn Fn(&str, Diff<ObjectId>) + Send + Sync>;

/// Callback for single-branch watches.
pub type KeyCallback = Arc<dyn Fn(Diff<ObjectId>) + Send + Sync>;

/// Opaque subscription handle returned by [`BranchStore::watch`] and
/// [`BranchStore::watch_key`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WatchHandle(pub(crate) u64);

impl WatchHandle {
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Mutable mapping from branch name to commit id.
///
/// Implementations must be thread-safe and make `test_and_set` atomic: it is
/// the only primitive writers use to advance a branch, and it must stay
/// correct when several processes share one backend.
///
/// Watches deliver each change at most once per subscriber, in commit order
/// per branch. Callbacks run on a dispatcher thread owned by the store, never
/// on the writer's thread.
pub trait BranchStore: Send + Sync {
    /// Current commit of `name`, if the branch exists.
    fn find(&self, name: &str) -> Result<Option<ObjectId>>;

    /// Point `name` at `commit` unconditionally.
    fn set(&self, name: &str, commit: ObjectId) -> Result<()>;

    /// Atomically replace the value of `name` with `set` if it currently
    /// equals `test`. `None` stands for "branch absent" on both sides, so
    /// `set = None` deletes. Returns whether the swap happened.
    fn test_and_set(
        &self,
        name: &str,
        test: Option<ObjectId>,
        set: Option<ObjectId>,
    ) -> Result<bool>;

    /// Delete `name`. Removing a missing branch is not an error.
    fn remove(&self, name: &str) -> Result<()>;

    /// All branch names, sorted.
    fn list(&self) -> Result<Vec<String>>;

    /// Subscribe to changes on every branch.
    ///
    /// With `init`, the subscriber states what it already knows and is first
    /// told how the store differs from it. Without `init`, only changes made
    /// after registration are delivered.
    fn watch(
        &self,
        init: Option<Vec<(String, ObjectId)>>,
        callback: BranchCallback,
    ) -> Result<WatchHandle>;

    /// Subscribe to changes of a single branch.
    ///
    /// `init` works as for [`BranchStore::watch`]: `Some(known)` is the value
    /// the subscriber believes the branch has (`Some(None)` meaning absent).
    fn watch_key(
        &self,
        name: &str,
        init: Option<Option<ObjectId>>,
        callback: KeyCallback,
    ) -> Result<WatchHandle>;

    /// Cancel a subscription. Idempotent; never waits for in-flight
    /// callbacks, so it is safe to call from inside a callback.
    fn unwatch(&self, handle: WatchHandle) -> Result<()>;

    /// Stop watch delivery and release dispatcher resources.
    fn close(&self) -> Result<()>;
}
