use serde::{Deserialize, Serialize};
use strata_types::{ContentHasher, Info, ObjectId, Step};

use crate::error::{StoreError, StoreResult};

/// The kind of object stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    /// Opaque leaf payload.
    Contents,
    /// Directory node: sorted entries mapping steps to child objects.
    Node,
    /// Commit: root node, parents and info.
    Commit,
}

impl ObjectKind {
    fn hasher(self) -> &'static ContentHasher {
        match self {
            Self::Contents => &ContentHasher::CONTENTS,
            Self::Node => &ContentHasher::NODE,
            Self::Commit => &ContentHasher::COMMIT,
        }
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Contents => write!(f, "contents"),
            Self::Node => write!(f, "node"),
            Self::Commit => write!(f, "commit"),
        }
    }
}

/// A stored object: kind tag + canonical bytes + cached size.
///
/// `StoredObject` is the unit of storage. Backends never interpret `data`;
/// they file it under [`StoredObject::compute_id`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredObject {
    pub kind: ObjectKind,
    pub data: Vec<u8>,
    pub size: u64,
}

impl StoredObject {
    pub fn new(kind: ObjectKind, data: Vec<u8>) -> Self {
        let size = data.len() as u64;
        Self { kind, data, size }
    }

    /// Content address of this object under its kind's hash domain.
    pub fn compute_id(&self) -> ObjectId {
        self.kind.hasher().hash(&self.data)
    }
}

/// A value that can be encoded to and decoded from a [`StoredObject`].
pub trait Storable: Sized {
    const KIND: ObjectKind;

    /// Canonical bytes: equal values must encode identically.
    fn encode(&self) -> StoreResult<Vec<u8>>;

    fn decode(data: &[u8]) -> StoreResult<Self>;

    fn to_stored_object(&self) -> StoreResult<StoredObject> {
        Ok(StoredObject::new(Self::KIND, self.encode()?))
    }

    fn from_stored_object(obj: &StoredObject) -> StoreResult<Self> {
        if obj.kind != Self::KIND {
            return Err(StoreError::CorruptObject {
                id: obj.compute_id(),
                reason: format!("expected {}, got {}", Self::KIND, obj.kind),
            });
        }
        Self::decode(&obj.data)
    }

    /// Content address of this value, without storing it.
    fn object_id(&self) -> StoreResult<ObjectId> {
        Ok(self.to_stored_object()?.compute_id())
    }
}

fn to_json<T: Serialize>(value: &T) -> StoreResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn from_json<'a, T: Deserialize<'a>>(data: &'a [u8]) -> StoreResult<T> {
    serde_json::from_slice(data).map_err(|e| StoreError::Serialization(e.to_string()))
}

// ---------------------------------------------------------------------------
// Contents
// ---------------------------------------------------------------------------

/// Opaque leaf value. Its canonical bytes are the payload itself.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Contents {
    pub data: Vec<u8>,
}

impl Contents {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into() }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// The payload as UTF-8, if it is valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.data).ok()
    }

    /// Content address of this payload. Infallible, unlike [`Storable::object_id`].
    pub fn id(&self) -> ObjectId {
        ContentHasher::CONTENTS.hash(&self.data)
    }
}

impl std::fmt::Debug for Contents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.as_str() {
            Some(s) => write!(f, "Contents({s:?})"),
            None => write!(f, "Contents({} bytes)", self.data.len()),
        }
    }
}

impl From<&str> for Contents {
    fn from(s: &str) -> Self {
        Self::new(s.as_bytes())
    }
}

impl From<String> for Contents {
    fn from(s: String) -> Self {
        Self::new(s.into_bytes())
    }
}

impl From<Vec<u8>> for Contents {
    fn from(data: Vec<u8>) -> Self {
        Self { data }
    }
}

impl Storable for Contents {
    const KIND: ObjectKind = ObjectKind::Contents;

    fn encode(&self) -> StoreResult<Vec<u8>> {
        Ok(self.data.clone())
    }

    fn decode(data: &[u8]) -> StoreResult<Self> {
        Ok(Self::new(data))
    }
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// Per-entry metadata carried alongside contents in a node.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Metadata {
    #[default]
    Normal,
    Executable,
    Link,
}

impl std::fmt::Display for Metadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::Executable => write!(f, "exec"),
            Self::Link => write!(f, "link"),
        }
    }
}

/// Whether a node entry points at contents or at another node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryKind {
    Contents,
    Node,
}

/// A single entry in a node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeEntry {
    pub step: Step,
    pub kind: EntryKind,
    pub id: ObjectId,
    /// Only meaningful for contents entries; `Normal` for nodes.
    pub metadata: Metadata,
}

impl NodeEntry {
    pub fn contents(step: impl Into<Step>, id: ObjectId, metadata: Metadata) -> Self {
        Self {
            step: step.into(),
            kind: EntryKind::Contents,
            id,
            metadata,
        }
    }

    pub fn node(step: impl Into<Step>, id: ObjectId) -> Self {
        Self {
            step: step.into(),
            kind: EntryKind::Node,
            id,
            metadata: Metadata::Normal,
        }
    }
}

impl PartialOrd for NodeEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for NodeEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.step.cmp(&other.step)
    }
}

/// Directory object: entries sorted by step, at most one entry per step.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub entries: Vec<NodeEntry>,
}

impl Node {
    /// Build a node. Entries are sorted by step for deterministic hashing;
    /// when a step repeats, the last entry wins.
    pub fn new(mut entries: Vec<NodeEntry>) -> Self {
        entries.reverse();
        entries.sort();
        entries.dedup_by(|a, b| a.step == b.step);
        Self { entries }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get(&self, step: &str) -> Option<&NodeEntry> {
        self.entries
            .binary_search_by(|e| e.step.as_str().cmp(step))
            .ok()
            .map(|i| &self.entries[i])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Storable for Node {
    const KIND: ObjectKind = ObjectKind::Node;

    fn encode(&self) -> StoreResult<Vec<u8>> {
        to_json(self)
    }

    fn decode(data: &[u8]) -> StoreResult<Self> {
        from_json(data)
    }
}

// ---------------------------------------------------------------------------
// CommitObject
// ---------------------------------------------------------------------------

/// A point in history: root node, parent commits and metadata.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitObject {
    pub node: ObjectId,
    /// Sorted and deduplicated, so parent order never changes the hash.
    pub parents: Vec<ObjectId>,
    pub info: Info,
}

impl CommitObject {
    pub fn new(node: ObjectId, mut parents: Vec<ObjectId>, info: Info) -> Self {
        parents.sort();
        parents.dedup();
        Self {
            node,
            parents,
            info,
        }
    }

    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }
}

impl Storable for CommitObject {
    const KIND: ObjectKind = ObjectKind::Commit;

    fn encode(&self) -> StoreResult<Vec<u8>> {
        to_json(self)
    }

    fn decode(data: &[u8]) -> StoreResult<Self> {
        from_json(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oid(b: u8) -> ObjectId {
        ObjectId::from_hash([b; 32])
    }

    #[test]
    fn contents_id_matches_stored_id() {
        let contents = Contents::from("hello");
        assert_eq!(contents.id(), contents.object_id().unwrap());
        assert_eq!(contents.as_str(), Some("hello"));
    }

    #[test]
    fn decode_rejects_kind_mismatch() {
        let stored = StoredObject::new(ObjectKind::Node, b"{}".to_vec());
        let err = Contents::from_stored_object(&stored).unwrap_err();
        assert!(matches!(err, StoreError::CorruptObject { .. }));
    }

    #[test]
    fn node_entries_sorted_and_unique() {
        let node = Node::new(vec![
            NodeEntry::contents("zebra", oid(1), Metadata::Normal),
            NodeEntry::node("alpha", oid(2)),
            NodeEntry::contents("zebra", oid(3), Metadata::Executable),
        ]);
        assert_eq!(node.len(), 2);
        assert_eq!(node.entries[0].step, "alpha");
        assert_eq!(node.get("zebra").unwrap().id, oid(3));
        assert!(node.get("missing").is_none());
    }

    #[test]
    fn node_order_does_not_change_hash() {
        let a = Node::new(vec![
            NodeEntry::node("a", oid(1)),
            NodeEntry::node("b", oid(2)),
        ]);
        let b = Node::new(vec![
            NodeEntry::node("b", oid(2)),
            NodeEntry::node("a", oid(1)),
        ]);
        assert_eq!(a.object_id().unwrap(), b.object_id().unwrap());
    }

    #[test]
    fn node_roundtrip() {
        let node = Node::new(vec![NodeEntry::contents("f", oid(9), Metadata::Link)]);
        let stored = node.to_stored_object().unwrap();
        assert_eq!(Node::from_stored_object(&stored).unwrap(), node);
    }

    #[test]
    fn commit_parents_are_normalized() {
        let info = Info::new("a", 1, "m");
        let c1 = CommitObject::new(oid(0), vec![oid(2), oid(1), oid(2)], info.clone());
        let c2 = CommitObject::new(oid(0), vec![oid(1), oid(2)], info);
        assert_eq!(c1.parents, vec![oid(1), oid(2)]);
        assert_eq!(c1.object_id().unwrap(), c2.object_id().unwrap());
        assert!(!c1.is_root());
    }

    #[test]
    fn kinds_hash_in_separate_domains() {
        let data = b"same".to_vec();
        let contents = StoredObject::new(ObjectKind::Contents, data.clone());
        let node = StoredObject::new(ObjectKind::Node, data);
        assert_ne!(contents.compute_id(), node.compute_id());
    }

    #[test]
    fn display_names() {
        assert_eq!(ObjectKind::Commit.to_string(), "commit");
        assert_eq!(Metadata::Executable.to_string(), "exec");
    }
}
