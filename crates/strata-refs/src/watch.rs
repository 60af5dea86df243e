//! Watch registry and dispatcher.
//!
//! Backends report every branch change to a [`WatchRegistry`] together with a
//! sequence number taken under their write lock. The registry forwards
//! changes over an unbounded channel to a dedicated dispatcher thread, which
//! invokes subscriber callbacks without holding any store or table lock.
//!
//! Each subscriber remembers the last value it saw per branch, so it is told
//! about a change exactly once, and it ignores changes whose sequence number
//! is not newer than its registration (those are already part of the
//! snapshot it started from).

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::JoinHandle;

use strata_types::{Diff, ObjectId};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, trace, warn};

use crate::error::{RefError, Result};
use crate::traits::{BranchCallback, WatchHandle};

/// Branch name to commit id, as seen by one subscriber.
pub type BranchState = HashMap<String, ObjectId>;

enum Event {
    Update {
        seq: u64,
        branch: String,
        value: Option<ObjectId>,
    },
    Catchup {
        watcher: u64,
        snapshot: BranchState,
    },
}

struct Watcher {
    since: u64,
    key: Option<String>,
    active: AtomicBool,
    seen: Mutex<BranchState>,
    callback: BranchCallback,
}

impl Watcher {
    fn matches(&self, branch: &str) -> bool {
        self.key.as_deref().map_or(true, |key| key == branch)
    }

    fn deliver(&self, branch: &str, diff: Diff<ObjectId>) {
        if self.active.load(Ordering::Acquire) {
            (self.callback)(branch, diff);
        }
    }

    fn update(&self, seq: u64, branch: &str, value: Option<ObjectId>) {
        if seq <= self.since || !self.matches(branch) {
            return;
        }
        let old = {
            let mut seen = self.seen.lock().expect("lock poisoned");
            match value {
                Some(id) => seen.insert(branch.to_string(), id),
                None => seen.remove(branch),
            }
        };
        if old == value {
            return;
        }
        if let Some(diff) = Diff::between(old, value) {
            self.deliver(branch, diff);
        }
    }

    fn catch_up(&self, snapshot: BranchState) {
        let changes: Vec<(String, Diff<ObjectId>)> = {
            let mut seen = self.seen.lock().expect("lock poisoned");
            let names: BTreeSet<&String> = seen.keys().chain(snapshot.keys()).collect();
            let changes = names
                .into_iter()
                .filter(|name| self.matches(name))
                .filter_map(|name| {
                    let old = seen.get(name).copied();
                    let new = snapshot.get(name).copied();
                    if old == new {
                        return None;
                    }
                    Diff::between(old, new).map(|diff| (name.clone(), diff))
                })
                .collect();
            *seen = snapshot;
            changes
        };
        for (branch, diff) in changes {
            self.deliver(&branch, diff);
        }
    }
}

type WatcherTable = Arc<RwLock<HashMap<u64, Arc<Watcher>>>>;

/// Subscriber table plus the dispatcher thread that feeds it.
///
/// The dispatcher starts on the first registration and stops on
/// [`WatchRegistry::close`] or drop.
pub struct WatchRegistry {
    watchers: WatcherTable,
    next_id: AtomicU64,
    closed: AtomicBool,
    sender: Mutex<Option<UnboundedSender<Event>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl WatchRegistry {
    pub fn new() -> Self {
        Self {
            watchers: Arc::new(RwLock::new(HashMap::new())),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            sender: Mutex::new(None),
            dispatcher: Mutex::new(None),
        }
    }

    /// Number of live subscriptions.
    pub fn len(&self) -> usize {
        self.watchers.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Register a subscriber.
    ///
    /// Must be called while the backend excludes writers, with `seq` the
    /// sequence number of the last applied change and `current` the state
    /// at that point. `key` restricts the subscription to one branch.
    pub fn register(
        &self,
        seq: u64,
        key: Option<String>,
        current: BranchState,
        init: Option<BranchState>,
        callback: BranchCallback,
    ) -> Result<WatchHandle> {
        if self.closed.load(Ordering::Acquire) {
            return Err(RefError::Closed);
        }
        let restrict = |state: BranchState| -> BranchState {
            match &key {
                Some(key) => state.into_iter().filter(|(name, _)| name == key).collect(),
                None => state,
            }
        };
        let current = restrict(current);
        let (seen, catchup) = match init {
            Some(init) => (restrict(init), Some(current)),
            None => (current, None),
        };

        let mut sender = self.sender.lock().expect("lock poisoned");
        if sender.is_none() {
            *sender = Some(self.start_dispatcher()?);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let watcher = Arc::new(Watcher {
            since: seq,
            key,
            active: AtomicBool::new(true),
            seen: Mutex::new(seen),
            callback,
        });
        self.watchers
            .write()
            .expect("lock poisoned")
            .insert(id, watcher);

        if let (Some(snapshot), Some(tx)) = (catchup, sender.as_ref()) {
            if tx.send(Event::Catchup { watcher: id, snapshot }).is_err() {
                warn!(watcher = id, "dispatcher gone before catch-up");
            }
        }
        debug!(watcher = id, since = seq, "watch registered");
        Ok(WatchHandle(id))
    }

    /// Remove a subscriber. Unknown handles are ignored.
    pub fn unregister(&self, handle: WatchHandle) {
        let removed = self
            .watchers
            .write()
            .expect("lock poisoned")
            .remove(&handle.0);
        if let Some(watcher) = removed {
            watcher.active.store(false, Ordering::Release);
            debug!(watcher = handle.0, "watch removed");
        }
    }

    /// Report a change. Must be called under the backend's write lock so
    /// that channel order equals sequence order.
    pub fn notify(&self, seq: u64, branch: &str, value: Option<ObjectId>) {
        let sender = self.sender.lock().expect("lock poisoned");
        if let Some(tx) = sender.as_ref() {
            let event = Event::Update {
                seq,
                branch: branch.to_string(),
                value,
            };
            if tx.send(event).is_err() {
                warn!(branch, seq, "watch dispatcher stopped, change not delivered");
            }
        }
    }

    /// Stop the dispatcher and drop every subscription.
    ///
    /// Pending changes already queued are still delivered before the
    /// dispatcher exits. When called from a callback, the dispatcher is not
    /// joined.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.sender.lock().expect("lock poisoned").take();
        let handle = self.dispatcher.lock().expect("lock poisoned").take();
        if let Some(handle) = handle {
            if handle.thread().id() != std::thread::current().id() && handle.join().is_err() {
                warn!("watch dispatcher panicked");
            }
        }
        let mut watchers = self.watchers.write().expect("lock poisoned");
        for watcher in watchers.values() {
            watcher.active.store(false, Ordering::Release);
        }
        watchers.clear();
        debug!("watch registry closed");
    }

    fn start_dispatcher(&self) -> Result<UnboundedSender<Event>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let watchers = Arc::clone(&self.watchers);
        let handle = std::thread::Builder::new()
            .name("strata-watch".into())
            .spawn(move || dispatch(watchers, rx))?;
        *self.dispatcher.lock().expect("lock poisoned") = Some(handle);
        debug!("watch dispatcher started");
        Ok(tx)
    }
}

impl Default for WatchRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for WatchRegistry {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for WatchRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchRegistry")
            .field("watchers", &self.len())
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

fn dispatch(watchers: WatcherTable, mut rx: UnboundedReceiver<Event>) {
    while let Some(event) = rx.blocking_recv() {
        match event {
            Event::Update { seq, branch, value } => {
                let targets: Vec<Arc<Watcher>> = watchers
                    .read()
                    .expect("lock poisoned")
                    .values()
                    .cloned()
                    .collect();
                trace!(branch = %branch, seq, targets = targets.len(), "dispatching change");
                for watcher in targets {
                    watcher.update(seq, &branch, value);
                }
            }
            Event::Catchup { watcher, snapshot } => {
                let target = watchers
                    .read()
                    .expect("lock poisoned")
                    .get(&watcher)
                    .cloned();
                if let Some(target) = target {
                    target.catch_up(snapshot);
                }
            }
        }
    }
    debug!("watch dispatcher exiting");
}
