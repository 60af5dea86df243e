//! Foundation types for strata, a branch-consistent content-addressed store.
//!
//! Every other strata crate depends on `strata-types`.
//!
//! # Key Types
//!
//! - [`ObjectId`]: content address of an object (BLAKE3 hash)
//! - [`ContentHasher`]: domain-separated hashing, one domain per object kind
//! - [`Info`]: author, date and message attached to a commit
//! - [`Path`] / [`Step`]: location of a value inside a tree
//! - [`Diff`]: added / removed / updated change between two values

pub mod diff;
pub mod error;
pub mod hasher;
pub mod info;
pub mod object;
pub mod path;

pub use diff::Diff;
pub use error::TypeError;
pub use hasher::ContentHasher;
pub use info::Info;
pub use object::ObjectId;
pub use path::{Path, Step};
