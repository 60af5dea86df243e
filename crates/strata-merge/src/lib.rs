//! Three-way merge combinators for strata.
//!
//! A merge function reconciles two divergent values `a` and `b` given their
//! common ancestor `old`. Computing the ancestor can be expensive (it may
//! require a lowest-common-ancestor search over history), so it is passed as
//! a [`Promise`] that is only forced when a merge actually needs it.
//!
//! # Modules
//!
//! - [`error`]: [`Conflict`] and the [`MergeResult`] alias
//! - [`promise`]: memoized lazy values
//! - [`combinators`]: ready-made merge functions

pub mod combinators;
pub mod error;
pub mod promise;

pub use combinators::{counter, idempotent, merge_option, three_way};
pub use error::{Conflict, MergeResult};
pub use promise::Promise;
