use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use strata_store::{Contents, EntryKind, Metadata, Node, NodeEntry, Storable, TypedStore};
use strata_types::{ObjectId, Path, Step};
use tracing::trace;

use crate::error::TreeResult;
use crate::store::TreeStore;

/// A contents leaf: the payload's address, its metadata, and the payload
/// itself once loaded.
#[derive(Clone)]
pub struct Leaf {
    id: ObjectId,
    metadata: Metadata,
    value: Arc<OnceLock<Contents>>,
}

impl Leaf {
    pub fn new(contents: Contents, metadata: Metadata) -> Self {
        let id = contents.id();
        Self {
            id,
            metadata,
            value: Arc::new(OnceLock::from(contents)),
        }
    }

    /// A leaf known only by address; the payload is fetched on demand.
    pub fn of_hash(id: ObjectId, metadata: Metadata) -> Self {
        Self {
            id,
            metadata,
            value: Arc::new(OnceLock::new()),
        }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn metadata(&self) -> Metadata {
        self.metadata
    }

    /// The payload, loading it from `store` if needed.
    pub fn contents(&self, store: &TreeStore) -> TreeResult<Contents> {
        if let Some(contents) = self.value.get() {
            return Ok(contents.clone());
        }
        let contents: Contents = store.contents().get_value(&self.id)?;
        let _ = self.value.set(contents.clone());
        Ok(contents)
    }
}

enum Origin {
    Stored(ObjectId),
    Built(BTreeMap<Step, Tree>),
}

struct NodeInner {
    origin: Origin,
    hash: OnceLock<ObjectId>,
    entries: OnceLock<BTreeMap<Step, Tree>>,
}

/// A node: a shared, lazily loaded step-to-subtree mapping.
///
/// A node read from storage knows its hash and loads entries on first use;
/// a node built in memory knows its entries and computes its hash on first
/// use. Either way the result is cached.
#[derive(Clone)]
pub struct NodeRef(Arc<NodeInner>);

impl NodeRef {
    fn with_origin(origin: Origin) -> Self {
        Self(Arc::new(NodeInner {
            origin,
            hash: OnceLock::new(),
            entries: OnceLock::new(),
        }))
    }

    pub fn of_hash(id: ObjectId) -> Self {
        Self::with_origin(Origin::Stored(id))
    }

    pub fn of_entries(entries: BTreeMap<Step, Tree>) -> Self {
        Self::with_origin(Origin::Built(entries))
    }

    /// Children of this node, loading them from `store` if needed.
    pub fn entries(&self, store: &TreeStore) -> TreeResult<&BTreeMap<Step, Tree>> {
        let id = match &self.0.origin {
            Origin::Built(entries) => return Ok(entries),
            Origin::Stored(id) => id,
        };
        if let Some(entries) = self.0.entries.get() {
            return Ok(entries);
        }
        let node: Node = store.nodes().get_value(id)?;
        trace!(node = %id.short_hex(), entries = node.len(), "node loaded");
        let entries = node
            .entries
            .into_iter()
            .map(|entry| {
                let child = match entry.kind {
                    EntryKind::Contents => Tree::Contents(Leaf::of_hash(entry.id, entry.metadata)),
                    EntryKind::Node => Tree::Node(NodeRef::of_hash(entry.id)),
                };
                (entry.step, child)
            })
            .collect();
        Ok(self.0.entries.get_or_init(|| entries))
    }

    /// The node object this tree level serializes to.
    pub fn to_node(&self, store: &TreeStore) -> TreeResult<Node> {
        node_of(self.entries(store)?)
    }

    /// Content address of this node. Never touches storage: built nodes
    /// hash their children, stored nodes already know their hash.
    pub fn hash(&self) -> TreeResult<ObjectId> {
        match &self.0.origin {
            Origin::Stored(id) => Ok(*id),
            Origin::Built(entries) => {
                if let Some(id) = self.0.hash.get() {
                    return Ok(*id);
                }
                let id = node_of(entries)?.object_id()?;
                Ok(*self.0.hash.get_or_init(|| id))
            }
        }
    }

    /// Entries if they are already in memory.
    fn loaded_entries(&self) -> Option<&BTreeMap<Step, Tree>> {
        match &self.0.origin {
            Origin::Built(entries) => Some(entries),
            Origin::Stored(_) => self.0.entries.get(),
        }
    }
}

fn node_of(entries: &BTreeMap<Step, Tree>) -> TreeResult<Node> {
    let entries = entries
        .iter()
        .map(|(step, child)| child.entry(step))
        .collect::<TreeResult<Vec<_>>>()?;
    Ok(Node::new(entries))
}

/// A persistent tree: a contents leaf or a node.
#[derive(Clone)]
pub enum Tree {
    Contents(Leaf),
    Node(NodeRef),
}

impl Tree {
    /// The empty node.
    pub fn empty() -> Self {
        Self::Node(NodeRef::of_entries(BTreeMap::new()))
    }

    pub fn of_contents(contents: impl Into<Contents>, metadata: Metadata) -> Self {
        Self::Contents(Leaf::new(contents.into(), metadata))
    }

    /// A node tree known only by address.
    pub fn of_node_hash(id: ObjectId) -> Self {
        Self::Node(NodeRef::of_hash(id))
    }

    pub fn of_entries(entries: BTreeMap<Step, Tree>) -> Self {
        Self::Node(NodeRef::of_entries(entries))
    }

    pub fn kind(&self) -> EntryKind {
        match self {
            Self::Contents(_) => EntryKind::Contents,
            Self::Node(_) => EntryKind::Node,
        }
    }

    /// Address of the contents or node at the top of this tree.
    pub fn hash(&self) -> TreeResult<ObjectId> {
        match self {
            Self::Contents(leaf) => Ok(leaf.id),
            Self::Node(node) => node.hash(),
        }
    }

    /// Structural equality: same kind, same address and, for leaves, same
    /// metadata.
    pub fn same(&self, other: &Tree) -> TreeResult<bool> {
        Ok(match (self, other) {
            (Self::Contents(a), Self::Contents(b)) => a.id == b.id && a.metadata == b.metadata,
            (Self::Node(a), Self::Node(b)) => Arc::ptr_eq(&a.0, &b.0) || a.hash()? == b.hash()?,
            _ => false,
        })
    }

    /// [`Tree::same`] lifted to optional trees.
    pub fn same_opt(a: Option<&Tree>, b: Option<&Tree>) -> TreeResult<bool> {
        match (a, b) {
            (None, None) => Ok(true),
            (Some(a), Some(b)) => a.same(b),
            _ => Ok(false),
        }
    }

    /// Whether this is a node with no entries.
    pub fn is_empty(&self) -> TreeResult<bool> {
        match self {
            Self::Contents(_) => Ok(false),
            Self::Node(node) => match node.loaded_entries() {
                Some(entries) => Ok(entries.is_empty()),
                None => Ok(node.hash()? == Node::empty().object_id()?),
            },
        }
    }

    fn entry(&self, step: &str) -> TreeResult<NodeEntry> {
        Ok(match self {
            Self::Contents(leaf) => NodeEntry::contents(step, leaf.id, leaf.metadata),
            Self::Node(node) => NodeEntry::node(step, node.hash()?),
        })
    }

    /// Direct child at `step`, if this is a node that has one.
    pub fn child(&self, store: &TreeStore, step: &str) -> TreeResult<Option<Tree>> {
        match self {
            Self::Contents(_) => Ok(None),
            Self::Node(node) => Ok(node.entries(store)?.get(step).cloned()),
        }
    }

    /// Subtree at `path`. The root path returns the tree itself.
    pub fn find_tree(&self, store: &TreeStore, path: &Path) -> TreeResult<Option<Tree>> {
        let mut current = self.clone();
        for step in path.steps() {
            match current.child(store, step)? {
                Some(next) => current = next,
                None => return Ok(None),
            }
        }
        Ok(Some(current))
    }

    /// Contents and metadata of the leaf at `path`.
    pub fn find_all(
        &self,
        store: &TreeStore,
        path: &Path,
    ) -> TreeResult<Option<(Contents, Metadata)>> {
        match self.find_tree(store, path)? {
            Some(Self::Contents(leaf)) => Ok(Some((leaf.contents(store)?, leaf.metadata))),
            _ => Ok(None),
        }
    }

    /// Contents of the leaf at `path`.
    pub fn find(&self, store: &TreeStore, path: &Path) -> TreeResult<Option<Contents>> {
        Ok(self.find_all(store, path)?.map(|(contents, _)| contents))
    }

    /// Whether a leaf exists at `path`.
    pub fn mem(&self, store: &TreeStore, path: &Path) -> TreeResult<bool> {
        Ok(matches!(self.find_tree(store, path)?, Some(Self::Contents(_))))
    }

    /// Whether a node exists at `path`.
    pub fn mem_tree(&self, store: &TreeStore, path: &Path) -> TreeResult<bool> {
        Ok(matches!(self.find_tree(store, path)?, Some(Self::Node(_))))
    }

    /// Kind of whatever sits at `path`.
    pub fn kind_at(&self, store: &TreeStore, path: &Path) -> TreeResult<Option<EntryKind>> {
        Ok(self.find_tree(store, path)?.map(|t| t.kind()))
    }

    /// Immediate children of the node at `path`, sorted by step. Empty for
    /// leaves and missing paths.
    pub fn list(&self, store: &TreeStore, path: &Path) -> TreeResult<Vec<(Step, EntryKind)>> {
        match self.find_tree(store, path)? {
            Some(Self::Node(node)) => Ok(node
                .entries(store)?
                .iter()
                .map(|(step, child)| (step.clone(), child.kind()))
                .collect()),
            _ => Ok(Vec::new()),
        }
    }

    /// Replace the subtree at `path` with `f(old)`.
    ///
    /// Returning `None` (or an empty node) removes the entry, and nodes left
    /// empty by a removal are pruned, except the root. A leaf in the middle
    /// of `path` is replaced by a node. When `f` returns a tree equal to the
    /// old one, the original tree is returned unchanged.
    pub fn update_tree<F>(&self, store: &TreeStore, path: &Path, f: F) -> TreeResult<Tree>
    where
        F: FnOnce(Option<Tree>) -> TreeResult<Option<Tree>>,
    {
        let updated = update_at(store, Some(self), path.steps(), f)?;
        Ok(updated.unwrap_or_else(Tree::empty))
    }

    /// Set the leaf at `path`.
    pub fn add(
        &self,
        store: &TreeStore,
        path: &Path,
        contents: impl Into<Contents>,
        metadata: Metadata,
    ) -> TreeResult<Tree> {
        let leaf = Tree::of_contents(contents, metadata);
        self.update_tree(store, path, |_| Ok(Some(leaf)))
    }

    /// Graft `tree` at `path`.
    pub fn add_tree(&self, store: &TreeStore, path: &Path, tree: Tree) -> TreeResult<Tree> {
        self.update_tree(store, path, |_| Ok(Some(tree)))
    }

    /// Remove whatever sits at `path`.
    pub fn remove(&self, store: &TreeStore, path: &Path) -> TreeResult<Tree> {
        self.update_tree(store, path, |_| Ok(None))
    }

    /// Every leaf below this tree with its path relative to the tree.
    pub fn leaves(&self, store: &TreeStore) -> TreeResult<Vec<(Path, Contents, Metadata)>> {
        let mut out = Vec::new();
        collect_leaves(store, self, Path::root(), &mut out)?;
        Ok(out)
    }

    /// Write every in-memory part of this tree to `store` and return the
    /// address of its top object. Parts loaded from storage are skipped.
    pub fn export(&self, store: &TreeStore) -> TreeResult<ObjectId> {
        match self {
            Self::Contents(leaf) => {
                if let Some(contents) = leaf.value.get() {
                    if !store.contents().mem(&leaf.id)? {
                        store.contents().add_value(contents)?;
                    }
                }
                Ok(leaf.id)
            }
            Self::Node(node) => {
                let entries = match &node.0.origin {
                    Origin::Stored(id) => return Ok(*id),
                    Origin::Built(entries) => entries,
                };
                if let Some(id) = node.0.hash.get() {
                    if store.nodes().mem(id)? {
                        return Ok(*id);
                    }
                }
                for child in entries.values() {
                    child.export(store)?;
                }
                let id = store.nodes().add_value(&node_of(entries)?)?;
                trace!(node = %id.short_hex(), entries = entries.len(), "node exported");
                Ok(*node.0.hash.get_or_init(|| id))
            }
        }
    }
}

fn update_at<F>(
    store: &TreeStore,
    tree: Option<&Tree>,
    steps: &[Step],
    f: F,
) -> TreeResult<Option<Tree>>
where
    F: FnOnce(Option<Tree>) -> TreeResult<Option<Tree>>,
{
    let Some((step, rest)) = steps.split_first() else {
        let new = match f(tree.cloned())? {
            Some(t) if t.is_empty()? => None,
            other => other,
        };
        if Tree::same_opt(tree, new.as_ref())? {
            return Ok(tree.cloned());
        }
        return Ok(new);
    };

    let mut entries = match tree {
        Some(Tree::Node(node)) => node.entries(store)?.clone(),
        _ => BTreeMap::new(),
    };
    let old_child = entries.get(step).cloned();
    let new_child = update_at(store, old_child.as_ref(), rest, f)?;
    if Tree::same_opt(old_child.as_ref(), new_child.as_ref())? {
        return Ok(tree.cloned());
    }
    match new_child {
        Some(child) => {
            entries.insert(step.clone(), child);
        }
        None => {
            entries.remove(step);
        }
    }
    if entries.is_empty() {
        Ok(None)
    } else {
        Ok(Some(Tree::of_entries(entries)))
    }
}

fn collect_leaves(
    store: &TreeStore,
    tree: &Tree,
    at: Path,
    out: &mut Vec<(Path, Contents, Metadata)>,
) -> TreeResult<()> {
    match tree {
        Tree::Contents(leaf) => out.push((at, leaf.contents(store)?, leaf.metadata)),
        Tree::Node(node) => {
            for (step, child) in node.entries(store)? {
                collect_leaves(store, child, at.child(step.clone()), out)?;
            }
        }
    }
    Ok(())
}

impl fmt::Debug for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Contents(leaf) => match leaf.value.get() {
                Some(contents) => write!(f, "Contents({contents:?}, {})", leaf.metadata),
                None => write!(f, "Contents({:?}, {})", leaf.id, leaf.metadata),
            },
            Self::Node(node) => match node.hash() {
                Ok(id) => write!(f, "Node({id:?})"),
                Err(_) => f.write_str("Node(<unhashable>)"),
            },
        }
    }
}
