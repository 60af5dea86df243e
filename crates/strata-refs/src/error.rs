//! Error types for branch operations.

use thiserror::Error;

/// Errors that can occur during branch operations.
#[derive(Debug, Error)]
pub enum RefError {
    /// The branch name is invalid.
    #[error("invalid branch name: {name}: {reason}")]
    InvalidBranchName { name: String, reason: String },

    /// The store was closed; no further watches can be registered.
    #[error("branch store is closed")]
    Closed,

    /// The watch dispatcher thread could not be started.
    #[error("watch dispatcher failed to start: {0}")]
    Dispatcher(#[from] std::io::Error),
}

/// Convenience type alias for branch operations.
pub type Result<T> = std::result::Result<T, RefError>;
