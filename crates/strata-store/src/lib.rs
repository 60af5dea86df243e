//! Content-addressed object storage for strata.
//!
//! Three kinds of immutable objects make up the history graph, each stored
//! under the domain-separated hash of its canonical bytes:
//!
//! - [`Contents`] -- an opaque leaf payload
//! - [`Node`] -- a directory: sorted entries mapping steps to child objects
//! - [`CommitObject`] -- a root node, its parent commits, and an [`Info`]
//!
//! # Storage Backends
//!
//! All backends implement the [`ObjectStore`] capability (`add`, `find`,
//! `mem`); [`TypedStore`] layers typed encode/decode on top of any backend.
//!
//! - [`InMemoryObjectStore`] -- `HashMap`-based store for tests and embedding
//!
//! # Design Rules
//!
//! 1. Objects are immutable once written; `add` is idempotent.
//! 2. Concurrent writes need no coordination: equal input gives equal id.
//! 3. Deletion is a garbage-collection concern and not part of the capability.
//!
//! [`Info`]: strata_types::Info

pub mod error;
pub mod memory;
pub mod object;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use memory::InMemoryObjectStore;
pub use object::{
    CommitObject, Contents, EntryKind, Metadata, Node, NodeEntry, ObjectKind, Storable,
    StoredObject,
};
pub use traits::{ObjectStore, TypedStore};
