//! Slices: self-contained bundles of objects for moving history between
//! repositories.
//!
//! # Wire format
//!
//! ```text
//! [4 bytes: magic "STSL"]
//! [4 bytes: format version (big-endian u32)]
//! [4 bytes: CRC32 of the compressed payload (big-endian u32)]
//! [N bytes: zstd-compressed bincode encoding of the Slice]
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use strata_store::{CommitObject, Contents, EntryKind, Node, ObjectStore, Storable, TypedStore};
use strata_types::ObjectId;
use tracing::{debug, info, warn};

use crate::commit::Commit;
use crate::error::{EngineError, EngineResult};
use crate::graph::Vertex;
use crate::repository::Repository;

const MAGIC: &[u8; 4] = b"STSL";
const VERSION: u32 = 1;
const HEADER_LEN: usize = 12;
const ZSTD_LEVEL: i32 = 3;

/// Objects grouped by kind, each with the address it is expected to have.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slice {
    pub contents: Vec<(ObjectId, Contents)>,
    pub nodes: Vec<(ObjectId, Node)>,
    pub commits: Vec<(ObjectId, CommitObject)>,
}

impl Slice {
    /// Total number of objects.
    pub fn len(&self) -> usize {
        self.contents.len() + self.nodes.len() + self.commits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn encode(&self) -> EngineResult<Vec<u8>> {
        let payload = bincode::serialize(self).map_err(|e| EngineError::Slice(e.to_string()))?;
        let compressed = zstd::encode_all(payload.as_slice(), ZSTD_LEVEL)
            .map_err(|e| EngineError::Slice(format!("compression failed: {e}")))?;

        let mut out = Vec::with_capacity(HEADER_LEN + compressed.len());
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&VERSION.to_be_bytes());
        out.extend_from_slice(&crc32fast::hash(&compressed).to_be_bytes());
        out.extend_from_slice(&compressed);
        debug!(objects = self.len(), bytes = out.len(), "slice encoded");
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> EngineResult<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(EngineError::Slice("slice data too short".into()));
        }
        if &bytes[0..4] != MAGIC {
            return Err(EngineError::Slice(format!(
                "bad magic: {}",
                String::from_utf8_lossy(&bytes[0..4])
            )));
        }
        let version = read_u32(&bytes[4..8]);
        if version != VERSION {
            return Err(EngineError::Slice(format!("unsupported version {version}")));
        }
        let compressed = &bytes[HEADER_LEN..];
        let expected = read_u32(&bytes[8..12]);
        let actual = crc32fast::hash(compressed);
        if expected != actual {
            return Err(EngineError::Slice(format!(
                "checksum mismatch: expected {expected:08x}, got {actual:08x}"
            )));
        }
        let payload = zstd::decode_all(compressed)
            .map_err(|e| EngineError::Slice(format!("decompression failed: {e}")))?;
        bincode::deserialize(&payload).map_err(|e| EngineError::Slice(e.to_string()))
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(bytes);
    u32::from_be_bytes(word)
}

/// Upper bound of an export.
#[derive(Clone, Debug, Default)]
pub enum Max {
    /// The heads of every branch.
    #[default]
    Heads,
    Commits(Vec<Commit>),
}

/// What [`Repository::export`] includes.
#[derive(Clone, Debug)]
pub struct ExportOptions {
    /// Include the nodes and contents of every exported commit, not just
    /// the commits.
    pub full: bool,
    /// Only commits at most this many parent links from `max`.
    pub depth: Option<usize>,
    /// Commits the receiver already has. They are left out and the walk
    /// does not go past them; so is everything reachable from their trees.
    pub min: Vec<Commit>,
    pub max: Max,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            full: true,
            depth: None,
            min: Vec::new(),
            max: Max::Heads,
        }
    }
}

fn check_id<T: Storable>(expected: &ObjectId, actual: ObjectId) -> EngineResult<()> {
    if actual != *expected {
        warn!(kind = %T::KIND, expected = %expected.short_hex(), actual = %actual.short_hex(), "slice object does not match its id");
        return Err(EngineError::Integrity {
            kind: T::KIND,
            expected: *expected,
            actual,
        });
    }
    Ok(())
}

fn import_into<T: Storable>(store: &dyn ObjectStore, objects: &[(ObjectId, T)]) -> EngineResult<()> {
    for (id, value) in objects {
        check_id::<T>(id, value.object_id()?)?;
        let stored = store.add_value(value)?;
        check_id::<T>(id, stored)?;
    }
    Ok(())
}

impl Repository {
    /// Collect the commits between `opts.min` and `opts.max`, and with
    /// `opts.full` the nodes and contents they reference.
    pub fn export(&self, opts: &ExportOptions) -> EngineResult<Slice> {
        let max = match &opts.max {
            Max::Heads => self.heads()?,
            Max::Commits(commits) => commits.clone(),
        };
        let max: Vec<Vertex> = max.iter().map(|c| Vertex::Commit(c.hash())).collect();
        let min: Vec<Vertex> = opts.min.iter().map(|c| Vertex::Commit(c.hash())).collect();

        let mut commits: HashMap<ObjectId, CommitObject> = HashMap::new();
        let order = self.closure(&min, &max, opts.depth, |vertex| {
            let commit: CommitObject = self.commits().get_value(&vertex.id())?;
            let parents = commit.parents.iter().copied().map(Vertex::Commit).collect();
            commits.insert(vertex.id(), commit);
            Ok(parents)
        })?;

        let mut slice = Slice::default();
        for vertex in order {
            let id = vertex.id();
            let commit = match commits.remove(&id) {
                Some(commit) => commit,
                None => self.commits().get_value(&id)?,
            };
            slice.commits.push((id, commit));
        }

        if opts.full {
            let roots: Vec<Vertex> = slice.commits.iter().map(|(_, c)| Vertex::Node(c.node)).collect();
            let known_roots: Vec<Vertex> = opts.min.iter().map(|c| Vertex::Node(c.node())).collect();
            let known = self.closure(&[], &known_roots, None, |vertex| self.successors(vertex))?;
            let mut nodes: HashMap<ObjectId, Node> = HashMap::new();
            let reached = self.closure(&known, &roots, None, |vertex| match vertex {
                Vertex::Node(id) => {
                    let node: Node = self.trees().nodes().get_value(&id)?;
                    let children = node
                        .entries
                        .iter()
                        .map(|entry| match entry.kind {
                            EntryKind::Contents => Vertex::Contents(entry.id),
                            EntryKind::Node => Vertex::Node(entry.id),
                        })
                        .collect();
                    nodes.insert(id, node);
                    Ok(children)
                }
                _ => Ok(Vec::new()),
            })?;
            for vertex in reached {
                match vertex {
                    Vertex::Node(id) => {
                        let node = match nodes.remove(&id) {
                            Some(node) => node,
                            None => self.trees().nodes().get_value(&id)?,
                        };
                        slice.nodes.push((id, node));
                    }
                    Vertex::Contents(id) => {
                        slice.contents.push((id, self.trees().contents().get_value(&id)?));
                    }
                    Vertex::Commit(_) => {}
                }
            }
        }

        info!(
            commits = slice.commits.len(),
            nodes = slice.nodes.len(),
            contents = slice.contents.len(),
            "slice exported"
        );
        Ok(slice)
    }

    /// Add every object of `slice`: contents, then nodes, then commits.
    ///
    /// Each object is checked against its stated address first; the first
    /// mismatch aborts the import with [`EngineError::Integrity`]. Objects
    /// added before the mismatch stay in the stores.
    pub fn import(&self, slice: &Slice) -> EngineResult<()> {
        import_into(self.trees().contents(), &slice.contents)?;
        import_into(self.trees().nodes(), &slice.nodes)?;
        import_into(self.commits(), &slice.commits)?;
        info!(objects = slice.len(), "slice imported");
        Ok(())
    }
}
