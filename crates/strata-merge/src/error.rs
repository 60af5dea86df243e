use thiserror::Error;

/// Two values could not be reconciled.
///
/// Carries a human-readable description of the collision, usually naming the
/// path and both conflicting values.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("conflict: {0}")]
pub struct Conflict(pub String);

impl Conflict {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    /// Prefix the description with where the conflict happened.
    pub fn context(self, at: impl std::fmt::Display) -> Self {
        Self(format!("{at}: {}", self.0))
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

/// Result of a merge.
pub type MergeResult<T> = Result<T, Conflict>;
