use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use strata_store::CommitObject;
use strata_tree::Tree;
use strata_types::{Info, ObjectId};

/// A commit loaded from the commit store, paired with its address.
///
/// Cheap to clone. Equality and hashing use the address only.
#[derive(Clone)]
pub struct Commit {
    hash: ObjectId,
    value: Arc<CommitObject>,
}

impl Commit {
    pub(crate) fn new(hash: ObjectId, value: CommitObject) -> Self {
        Self {
            hash,
            value: Arc::new(value),
        }
    }

    pub fn hash(&self) -> ObjectId {
        self.hash
    }

    pub fn value(&self) -> &CommitObject {
        &self.value
    }

    pub fn info(&self) -> &Info {
        &self.value.info
    }

    /// Parent addresses, sorted.
    pub fn parents(&self) -> &[ObjectId] {
        &self.value.parents
    }

    /// Address of the root node.
    pub fn node(&self) -> ObjectId {
        self.value.node
    }

    /// The root tree, loaded lazily from the node store.
    pub fn tree(&self) -> Tree {
        Tree::of_node_hash(self.value.node)
    }
}

impl PartialEq for Commit {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}

impl Eq for Commit {}

impl Hash for Commit {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.hash.hash(state);
    }
}

impl fmt::Debug for Commit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Commit")
            .field("hash", &self.hash.short_hex())
            .field("parents", &self.value.parents.len())
            .field("message", &self.value.info.message)
            .finish()
    }
}

impl fmt::Display for Commit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.hash)
    }
}
