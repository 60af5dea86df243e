use strata_types::ObjectId;

use crate::error::{StoreError, StoreResult};
use crate::object::{Storable, StoredObject};

/// Content-addressed object store capability.
///
/// All implementations must satisfy these invariants:
/// - `add` is idempotent: the same object always yields the same id, and
///   adding it twice stores it once.
/// - Objects are immutable once added.
/// - Concurrent `add`/`find` calls are safe without external locking.
/// - The store never interprets object contents.
pub trait ObjectStore: Send + Sync {
    /// Look up an object by id. `Ok(None)` if it does not exist.
    fn find(&self, id: &ObjectId) -> StoreResult<Option<StoredObject>>;

    /// Store an object and return its content address.
    fn add(&self, object: &StoredObject) -> StoreResult<ObjectId>;

    /// Whether an object exists.
    fn mem(&self, id: &ObjectId) -> StoreResult<bool> {
        Ok(self.find(id)?.is_some())
    }

    /// Store several objects. Backends may override to batch I/O.
    fn add_batch(&self, objects: &[StoredObject]) -> StoreResult<Vec<ObjectId>> {
        objects.iter().map(|obj| self.add(obj)).collect()
    }
}

/// Typed access to any [`ObjectStore`].
pub trait TypedStore {
    /// Encode and store a value.
    fn add_value<T: Storable>(&self, value: &T) -> StoreResult<ObjectId>;

    /// Load and decode a value. Fails if the stored object has another kind.
    fn find_value<T: Storable>(&self, id: &ObjectId) -> StoreResult<Option<T>>;

    /// Like [`TypedStore::find_value`], but a missing object is an error.
    fn get_value<T: Storable>(&self, id: &ObjectId) -> StoreResult<T> {
        self.find_value(id)?.ok_or(StoreError::NotFound {
            kind: T::KIND,
            id: *id,
        })
    }
}

impl<S: ObjectStore + ?Sized> TypedStore for S {
    fn add_value<T: Storable>(&self, value: &T) -> StoreResult<ObjectId> {
        self.add(&value.to_stored_object()?)
    }

    fn find_value<T: Storable>(&self, id: &ObjectId) -> StoreResult<Option<T>> {
        match self.find(id)? {
            Some(obj) => T::from_stored_object(&obj).map(Some),
            None => Ok(None),
        }
    }
}
