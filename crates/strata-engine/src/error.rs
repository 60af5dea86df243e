//! Error types for the engine.
//!
//! Expected outcomes of concurrent writes (a lost test-and-set, a merge
//! conflict, an exhausted retry budget) are values of [`WriteError`] and
//! similar enums, kept apart from [`EngineError`], which covers failures of
//! the stores themselves and invalid arguments.

use strata_merge::Conflict;
use strata_refs::RefError;
use strata_store::{ObjectKind, StoreError};
use strata_tree::{Tree, TreeError};
use strata_types::{ObjectId, Path};
use thiserror::Error;

/// Failures that are not part of normal concurrent operation.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Ref(#[from] RefError),

    #[error("tree error: {0}")]
    Tree(TreeError),

    /// The caller asked for something the store cannot represent.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Nothing is stored at the path.
    #[error("no value at {0}")]
    PathNotFound(Path),

    /// An imported object does not hash to the id it was shipped under.
    #[error("integrity check failed for {kind}: expected {expected}, got {actual}")]
    Integrity {
        kind: ObjectKind,
        expected: ObjectId,
        actual: ObjectId,
    },

    /// A slice could not be encoded or decoded.
    #[error("slice error: {0}")]
    Slice(String),

    #[error("config error: {0}")]
    Config(String),

    /// A write reported through one of the `_exn` entry points failed.
    #[error("write failed: {0}")]
    WriteFailed(String),
}

impl From<TreeError> for EngineError {
    fn from(err: TreeError) -> Self {
        match err {
            TreeError::Store(store) => Self::Store(store),
            other => Self::Tree(other),
        }
    }
}

/// Result alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Outcome of a failed write transaction.
#[derive(Debug, Error)]
pub enum WriteError {
    /// The write had to merge and the merge did not resolve.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The head kept moving; every attempt lost its compare-and-set.
    #[error("too many retries ({0})")]
    TooManyRetries(u32),

    /// A test-and-set found something other than what it tested for. Carries
    /// the value actually observed at the path.
    #[error("test-and-set failed: found {}", describe(.0))]
    TestWas(Option<Tree>),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

fn describe(found: &Option<Tree>) -> String {
    match found {
        None => "nothing".into(),
        Some(tree) => match tree.hash() {
            Ok(id) => format!("{:?} {}", tree.kind(), id.short_hex()),
            Err(_) => format!("{:?}", tree.kind()),
        },
    }
}

impl From<Conflict> for WriteError {
    fn from(conflict: Conflict) -> Self {
        Self::Conflict(conflict.0)
    }
}

impl From<TreeError> for WriteError {
    fn from(err: TreeError) -> Self {
        match err {
            TreeError::Conflict(conflict) => conflict.into(),
            other => Self::Engine(other.into()),
        }
    }
}

impl From<StoreError> for WriteError {
    fn from(err: StoreError) -> Self {
        Self::Engine(err.into())
    }
}

impl From<RefError> for WriteError {
    fn from(err: RefError) -> Self {
        Self::Engine(err.into())
    }
}

/// Result alias for write transactions.
pub type WriteResult<T> = Result<T, WriteError>;

/// Why a lowest-common-ancestor search stopped.
#[derive(Debug, Error)]
pub enum LcaError {
    #[error("maximum search depth reached")]
    MaxDepthReached,

    #[error("too many lowest common ancestors")]
    TooManyLcas,

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl From<StoreError> for LcaError {
    fn from(err: StoreError) -> Self {
        Self::Engine(err.into())
    }
}

/// Why a fast-forward did not happen.
#[derive(Debug, Error)]
pub enum FastForwardError {
    /// The target does not descend from the current head, or the head moved
    /// during the update.
    #[error("fast-forward rejected")]
    Rejected,

    /// The head already is the target.
    #[error("head already at target")]
    NoChange,

    #[error("maximum search depth reached")]
    MaxDepthReached,

    #[error("too many lowest common ancestors")]
    TooManyLcas,

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl From<LcaError> for FastForwardError {
    fn from(err: LcaError) -> Self {
        match err {
            LcaError::MaxDepthReached => Self::MaxDepthReached,
            LcaError::TooManyLcas => Self::TooManyLcas,
            LcaError::Engine(e) => Self::Engine(e),
        }
    }
}

impl From<RefError> for FastForwardError {
    fn from(err: RefError) -> Self {
        Self::Engine(err.into())
    }
}
