//! The strata store engine.
//!
//! `strata-engine` ties the object stores, the branch store and persistent
//! trees together into a versioned key-value store with Git-like semantics:
//!
//! - a [`Repository`] aggregates the backing stores and walks the object graph
//! - a [`Store`] is a cursor on a branch or a detached head
//! - every update is an optimistic transaction: snapshot, transform, merge,
//!   commit, compare-and-set, retry
//! - branches merge through lowest-common-ancestor search and three-way merge
//! - watches turn branch updates into commit- and path-level change events
//! - [`Slice`]s move closed sub-graphs between repositories
//!
//! # Example
//!
//! ```
//! use strata_engine::{Repository, Store, WriteOptions};
//!
//! let repo = Repository::in_memory();
//! let main = Store::main(&repo).unwrap();
//! let path = "a/b".parse().unwrap();
//! main.set(&path, "hello", &WriteOptions::message("init")).unwrap();
//! assert_eq!(main.get(&path).unwrap().as_str(), Some("hello"));
//! ```

pub mod commit;
pub mod config;
pub mod error;
pub mod graph;
pub mod handle;
pub mod history;
pub mod repository;
pub mod slice;
pub mod transaction;
pub mod watch;

pub use commit::Commit;
pub use config::EngineConfig;
pub use error::{
    EngineError, EngineResult, FastForwardError, LcaError, WriteError, WriteResult,
};
pub use graph::{Vertex, Visitor};
pub use handle::{Status, Store};
pub use history::History;
pub use repository::{Backends, Repository};
pub use slice::{ExportOptions, Max, Slice};
pub use transaction::{InfoFn, Strategy, WriteOptions};

pub use strata_merge::{Conflict, Promise};
pub use strata_refs::WatchHandle;
pub use strata_store::{Contents, EntryKind, Metadata};
pub use strata_tree::{ContentsMerge, Tree};
pub use strata_types::{Diff, Info, ObjectId, Path, Step};
