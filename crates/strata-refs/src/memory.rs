//! In-memory branch store.
//!
//! [`InMemoryBranchStore`] keeps branches in a `HashMap` behind a `RwLock`.
//! Every successful write bumps a sequence number and reports the change to
//! the store's [`WatchRegistry`] before the lock is released.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use strata_types::{Diff, ObjectId};
use tracing::debug;

use crate::error::Result;
use crate::names::validate_branch_name;
use crate::traits::{BranchCallback, BranchStore, KeyCallback, WatchHandle};
use crate::watch::{BranchState, WatchRegistry};

#[derive(Debug, Default)]
struct State {
    branches: HashMap<String, ObjectId>,
    seq: u64,
}

/// An in-memory implementation of [`BranchStore`].
///
/// Data is lost when the store is dropped.
#[derive(Debug, Default)]
pub struct InMemoryBranchStore {
    state: RwLock<State>,
    watches: WatchRegistry,
}

impl InMemoryBranchStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of branches.
    pub fn len(&self) -> usize {
        self.state.read().expect("lock poisoned").branches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of live watch subscriptions.
    pub fn watch_count(&self) -> usize {
        self.watches.len()
    }

    /// Apply a change under the write lock and report it to watchers.
    fn apply(&self, state: &mut State, name: &str, value: Option<ObjectId>) {
        let old = match value {
            Some(id) => state.branches.insert(name.to_string(), id),
            None => state.branches.remove(name),
        };
        if old == value {
            return;
        }
        state.seq += 1;
        debug!(
            branch = name,
            seq = state.seq,
            commit = value.map(|id| id.short_hex()).unwrap_or_default(),
            "branch updated"
        );
        self.watches.notify(state.seq, name, value);
    }
}

impl BranchStore for InMemoryBranchStore {
    fn find(&self, name: &str) -> Result<Option<ObjectId>> {
        Ok(self
            .state
            .read()
            .expect("lock poisoned")
            .branches
            .get(name)
            .copied())
    }

    fn set(&self, name: &str, commit: ObjectId) -> Result<()> {
        validate_branch_name(name)?;
        let mut state = self.state.write().expect("lock poisoned");
        self.apply(&mut state, name, Some(commit));
        Ok(())
    }

    fn test_and_set(
        &self,
        name: &str,
        test: Option<ObjectId>,
        set: Option<ObjectId>,
    ) -> Result<bool> {
        if set.is_some() {
            validate_branch_name(name)?;
        }
        let mut state = self.state.write().expect("lock poisoned");
        if state.branches.get(name).copied() != test {
            return Ok(false);
        }
        self.apply(&mut state, name, set);
        Ok(true)
    }

    fn remove(&self, name: &str) -> Result<()> {
        let mut state = self.state.write().expect("lock poisoned");
        self.apply(&mut state, name, None);
        Ok(())
    }

    fn list(&self) -> Result<Vec<String>> {
        let state = self.state.read().expect("lock poisoned");
        let mut names: Vec<String> = state.branches.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn watch(
        &self,
        init: Option<Vec<(String, ObjectId)>>,
        callback: BranchCallback,
    ) -> Result<WatchHandle> {
        let state = self.state.read().expect("lock poisoned");
        let init = init.map(|known| known.into_iter().collect::<BranchState>());
        self.watches
            .register(state.seq, None, state.branches.clone(), init, callback)
    }

    fn watch_key(
        &self,
        name: &str,
        init: Option<Option<ObjectId>>,
        callback: KeyCallback,
    ) -> Result<WatchHandle> {
        let state = self.state.read().expect("lock poisoned");
        let current: BranchState = state
            .branches
            .get(name)
            .map(|id| (name.to_string(), *id))
            .into_iter()
            .collect();
        let init = init.map(|known| {
            known
                .map(|id| (name.to_string(), id))
                .into_iter()
                .collect::<BranchState>()
        });
        let wrapped: BranchCallback =
            Arc::new(move |_branch: &str, diff: Diff<ObjectId>| callback(diff));
        self.watches.register(
            state.seq,
            Some(name.to_string()),
            current,
            init,
            wrapped,
        )
    }

    fn unwatch(&self, handle: WatchHandle) -> Result<()> {
        self.watches.unregister(handle);
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.watches.close();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    fn oid(b: u8) -> ObjectId {
        ObjectId::from_hash([b; 32])
    }

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[test]
    fn set_find_remove() {
        let store = InMemoryBranchStore::new();
        assert_eq!(store.find("main").unwrap(), None);
        store.set("main", oid(1)).unwrap();
        assert_eq!(store.find("main").unwrap(), Some(oid(1)));
        store.remove("main").unwrap();
        assert_eq!(store.find("main").unwrap(), None);
        store.remove("main").unwrap();
    }

    #[test]
    fn set_rejects_invalid_names() {
        let store = InMemoryBranchStore::new();
        assert!(store.set("bad..name", oid(1)).is_err());
        assert!(store.test_and_set("bad name", None, Some(oid(1))).is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn test_and_set_semantics() {
        let store = InMemoryBranchStore::new();
        assert!(store.test_and_set("main", None, Some(oid(1))).unwrap());
        assert!(!store.test_and_set("main", None, Some(oid(2))).unwrap());
        assert!(!store.test_and_set("main", Some(oid(3)), Some(oid(2))).unwrap());
        assert!(store.test_and_set("main", Some(oid(1)), Some(oid(2))).unwrap());
        assert_eq!(store.find("main").unwrap(), Some(oid(2)));
        assert!(store.test_and_set("main", Some(oid(2)), None).unwrap());
        assert_eq!(store.find("main").unwrap(), None);
    }

    #[test]
    fn list_is_sorted() {
        let store = InMemoryBranchStore::new();
        store.set("zeta", oid(1)).unwrap();
        store.set("alpha", oid(2)).unwrap();
        store.set("feature/x", oid(3)).unwrap();
        assert_eq!(store.list().unwrap(), vec!["alpha", "feature/x", "zeta"]);
    }

    #[test]
    fn concurrent_test_and_set_has_one_winner() {
        let store = Arc::new(InMemoryBranchStore::new());
        let handles: Vec<_> = (0..8u8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.test_and_set("main", None, Some(oid(i))).unwrap())
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn watch_sees_every_change_in_order() {
        let store = InMemoryBranchStore::new();
        let (tx, rx) = mpsc::channel();
        let tx = std::sync::Mutex::new(tx);
        store
            .watch(
                None,
                Arc::new(move |name: &str, diff: Diff<ObjectId>| {
                    tx.lock().unwrap().send((name.to_string(), diff)).unwrap();
                }),
            )
            .unwrap();

        store.set("main", oid(1)).unwrap();
        store.set("main", oid(2)).unwrap();
        store.set("main", oid(2)).unwrap();
        store.set("dev", oid(3)).unwrap();
        store.remove("main").unwrap();

        let expected = vec![
            ("main".to_string(), Diff::Added(oid(1))),
            ("main".to_string(), Diff::Updated(oid(1), oid(2))),
            ("dev".to_string(), Diff::Added(oid(3))),
            ("main".to_string(), Diff::Removed(oid(2))),
        ];
        for want in expected {
            assert_eq!(rx.recv_timeout(TIMEOUT).unwrap(), want);
        }
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[test]
    fn watch_key_ignores_other_branches() {
        let store = InMemoryBranchStore::new();
        let (tx, rx) = mpsc::channel();
        let tx = std::sync::Mutex::new(tx);
        store
            .watch_key(
                "main",
                None,
                Arc::new(move |diff: Diff<ObjectId>| tx.lock().unwrap().send(diff).unwrap()),
            )
            .unwrap();

        store.set("dev", oid(9)).unwrap();
        store.set("main", oid(1)).unwrap();

        assert_eq!(rx.recv_timeout(TIMEOUT).unwrap(), Diff::Added(oid(1)));
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[test]
    fn watch_with_init_catches_up() {
        let store = InMemoryBranchStore::new();
        store.set("main", oid(2)).unwrap();
        store.set("dev", oid(5)).unwrap();

        let (tx, rx) = mpsc::channel();
        let tx = std::sync::Mutex::new(tx);
        store
            .watch(
                Some(vec![("main".to_string(), oid(1)), ("dev".to_string(), oid(5))]),
                Arc::new(move |name: &str, diff: Diff<ObjectId>| {
                    tx.lock().unwrap().send((name.to_string(), diff)).unwrap();
                }),
            )
            .unwrap();

        assert_eq!(
            rx.recv_timeout(TIMEOUT).unwrap(),
            ("main".to_string(), Diff::Updated(oid(1), oid(2)))
        );
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[test]
    fn watch_key_with_known_absent_reports_added() {
        let store = InMemoryBranchStore::new();
        store.set("main", oid(4)).unwrap();
        let (tx, rx) = mpsc::channel();
        let tx = std::sync::Mutex::new(tx);
        store
            .watch_key(
                "main",
                Some(None),
                Arc::new(move |diff: Diff<ObjectId>| tx.lock().unwrap().send(diff).unwrap()),
            )
            .unwrap();
        assert_eq!(rx.recv_timeout(TIMEOUT).unwrap(), Diff::Added(oid(4)));
    }

    #[test]
    fn unwatch_is_idempotent_and_stops_delivery() {
        let store = InMemoryBranchStore::new();
        let (tx, rx) = mpsc::channel();
        let tx = std::sync::Mutex::new(tx);
        let handle = store
            .watch(
                None,
                Arc::new(move |_: &str, diff: Diff<ObjectId>| tx.lock().unwrap().send(diff).unwrap()),
            )
            .unwrap();
        store.set("main", oid(1)).unwrap();
        assert_eq!(rx.recv_timeout(TIMEOUT).unwrap(), Diff::Added(oid(1)));

        store.unwatch(handle).unwrap();
        store.unwatch(handle).unwrap();
        assert_eq!(store.watch_count(), 0);
        store.set("main", oid(2)).unwrap();
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[test]
    fn unwatch_from_inside_callback_does_not_deadlock() {
        let store = Arc::new(InMemoryBranchStore::new());
        let (tx, rx) = mpsc::channel();
        let tx = std::sync::Mutex::new(tx);
        let other = store
            .watch(None, Arc::new(|_: &str, _: Diff<ObjectId>| {}))
            .unwrap();
        let inner = Arc::clone(&store);
        store
            .watch(
                None,
                Arc::new(move |_: &str, _: Diff<ObjectId>| {
                    inner.unwatch(other).unwrap();
                    tx.lock().unwrap().send(()).unwrap();
                }),
            )
            .unwrap();
        store.set("main", oid(1)).unwrap();
        rx.recv_timeout(TIMEOUT).unwrap();
        assert_eq!(store.watch_count(), 1);
        store.close().unwrap();
    }

    #[test]
    fn close_rejects_new_watches() {
        let store = InMemoryBranchStore::new();
        store.watch(None, Arc::new(|_: &str, _: Diff<ObjectId>| {})).unwrap();
        store.close().unwrap();
        store.close().unwrap();
        assert!(store.watch(None, Arc::new(|_: &str, _: Diff<ObjectId>| {})).is_err());
        store.set("main", oid(1)).unwrap();
    }
}
