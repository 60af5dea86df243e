//! Branch management for strata.
//!
//! A branch is a mutable, named pointer to a commit. It is the only mutable
//! state in a repository: every other object is immutable and
//! content-addressed. Branches change only through compare-and-set, which is
//! what makes concurrent writers safe without locks spanning processes.
//!
//! # Modules
//!
//! - [`error`]: Error types for branch operations
//! - [`traits`]: The [`BranchStore`] capability and watch callback types
//! - [`names`]: Branch name validation
//! - [`watch`]: Watch registry and dispatcher thread shared by backends
//! - [`memory`]: In-memory [`InMemoryBranchStore`]

pub mod error;
pub mod memory;
pub mod names;
pub mod traits;
pub mod watch;

pub use error::{RefError, Result};
pub use memory::InMemoryBranchStore;
pub use names::validate_branch_name;
pub use traits::{BranchCallback, BranchStore, KeyCallback, WatchHandle};
pub use watch::WatchRegistry;
