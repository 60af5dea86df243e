//! Persistent, lazily loaded trees for strata.
//!
//! A [`Tree`] is either a contents leaf or a node mapping steps to subtrees.
//! Trees loaded from storage start as bare hashes and fetch their children
//! on first access; trees built in memory compute their hash on demand.
//! Updates never mutate: they return a new tree sharing every untouched
//! subtree with the original.
//!
//! # Modules
//!
//! - [`tree`]: [`Tree`], path lookup and path updates, export to storage
//! - [`diff`]: leaf-level differences between two trees
//! - [`merge`]: recursive three-way merge with a pluggable [`ContentsMerge`]
//! - [`store`]: [`TreeStore`], the contents and node stores a tree reads from

pub mod diff;
pub mod error;
pub mod merge;
pub mod store;
pub mod tree;

pub use diff::LeafValue;
pub use error::{TreeError, TreeResult};
pub use merge::{default_contents_merge, merge_subtrees, merge_trees, ContentsMerge};
pub use store::TreeStore;
pub use tree::{Leaf, NodeRef, Tree};
