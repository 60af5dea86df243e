use std::collections::HashMap;
use std::sync::RwLock;

use strata_types::ObjectId;
use tracing::trace;

use crate::error::StoreResult;
use crate::object::StoredObject;
use crate::traits::ObjectStore;

/// In-memory, HashMap-based object store.
///
/// Intended for tests and embedding. Objects live behind a `RwLock` and are
/// cloned on read and write.
pub struct InMemoryObjectStore {
    objects: RwLock<HashMap<ObjectId, StoredObject>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
        }
    }

    /// Number of objects currently stored.
    pub fn len(&self) -> usize {
        self.objects.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().expect("lock poisoned").is_empty()
    }

    /// Total bytes across all stored objects.
    pub fn total_bytes(&self) -> u64 {
        self.objects
            .read()
            .expect("lock poisoned")
            .values()
            .map(|obj| obj.size)
            .sum()
    }

    /// Sorted list of every stored id.
    pub fn ids(&self) -> Vec<ObjectId> {
        let map = self.objects.read().expect("lock poisoned");
        let mut ids: Vec<ObjectId> = map.keys().copied().collect();
        ids.sort();
        ids
    }
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn find(&self, id: &ObjectId) -> StoreResult<Option<StoredObject>> {
        let map = self.objects.read().expect("lock poisoned");
        Ok(map.get(id).cloned())
    }

    fn add(&self, object: &StoredObject) -> StoreResult<ObjectId> {
        let id = object.compute_id();
        let mut map = self.objects.write().expect("lock poisoned");
        map.entry(id).or_insert_with(|| {
            trace!(id = %id.short_hex(), kind = %object.kind, size = object.size, "object added");
            object.clone()
        });
        Ok(id)
    }

    fn mem(&self, id: &ObjectId) -> StoreResult<bool> {
        Ok(self.objects.read().expect("lock poisoned").contains_key(id))
    }
}

impl std::fmt::Debug for InMemoryObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryObjectStore")
            .field("object_count", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::*;
    use crate::traits::TypedStore;
    use proptest::prelude::*;
    use std::sync::Arc;
    use strata_types::Info;

    #[test]
    fn add_and_find_contents() {
        let store = InMemoryObjectStore::new();
        let id = store.add_value(&Contents::from("hello")).unwrap();
        let back: Contents = store.find_value(&id).unwrap().expect("should exist");
        assert_eq!(back.as_str(), Some("hello"));
        assert!(store.mem(&id).unwrap());
    }

    #[test]
    fn add_and_find_node_and_commit() {
        let store = InMemoryObjectStore::new();
        let leaf = Contents::from("x").id();
        let node = Node::new(vec![NodeEntry::contents("x", leaf, Metadata::Normal)]);
        let node_id = store.add_value(&node).unwrap();
        let commit = CommitObject::new(node_id, vec![], Info::new("me", 1, "init"));
        let commit_id = store.add_value(&commit).unwrap();

        assert_eq!(store.get_value::<Node>(&node_id).unwrap(), node);
        assert_eq!(store.get_value::<CommitObject>(&commit_id).unwrap(), commit);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn find_missing_returns_none() {
        let store = InMemoryObjectStore::new();
        let missing = ObjectId::digest(b"missing");
        assert!(store.find(&missing).unwrap().is_none());
        assert!(!store.mem(&missing).unwrap());
        let err = store.get_value::<Node>(&missing).unwrap_err();
        assert!(matches!(
            err,
            crate::StoreError::NotFound {
                kind: ObjectKind::Node,
                ..
            }
        ));
    }

    #[test]
    fn find_value_checks_kind() {
        let store = InMemoryObjectStore::new();
        let id = store.add_value(&Contents::from("{}")).unwrap();
        assert!(store.find_value::<Node>(&id).is_err());
    }

    #[test]
    fn batch_add_matches_single_adds() {
        let store = InMemoryObjectStore::new();
        let objects: Vec<StoredObject> = (0..5)
            .map(|i| Contents::from(format!("obj-{i}")).to_stored_object().unwrap())
            .collect();
        let ids = store.add_batch(&objects).unwrap();
        for (obj, id) in objects.iter().zip(&ids) {
            assert_eq!(obj.compute_id(), *id);
        }
        assert_eq!(store.ids().len(), 5);
        assert_eq!(store.total_bytes(), objects.iter().map(|o| o.size).sum::<u64>());
    }

    #[test]
    fn concurrent_adds_of_same_value_store_once() {
        let store = Arc::new(InMemoryObjectStore::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.add_value(&Contents::from("shared")).unwrap())
            })
            .collect();
        let ids: Vec<ObjectId> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(ids.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(store.len(), 1);
    }

    proptest! {
        #[test]
        fn add_is_idempotent(data in proptest::collection::vec(any::<u8>(), 0..256)) {
            let store = InMemoryObjectStore::new();
            let value = Contents::new(data);
            let first = store.add_value(&value).unwrap();
            let second = store.add_value(&value).unwrap();
            prop_assert_eq!(first, second);
            prop_assert_eq!(store.find_value::<Contents>(&first).unwrap(), Some(value));
            prop_assert_eq!(store.len(), 1);
        }
    }
}
