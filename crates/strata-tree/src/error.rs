use strata_merge::Conflict;
use strata_store::StoreError;

/// Errors from tree operations.
#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    /// A backing store failed or an object was missing.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A merge could not reconcile two subtrees.
    #[error(transparent)]
    Conflict(#[from] Conflict),
}

/// Result alias for tree operations.
pub type TreeResult<T> = Result<T, TreeError>;
