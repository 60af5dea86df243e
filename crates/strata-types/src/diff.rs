use serde::{Deserialize, Serialize};

/// A change between two versions of a value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Diff<T> {
    /// The value appeared.
    Added(T),
    /// The value disappeared.
    Removed(T),
    /// The value changed from the first to the second.
    Updated(T, T),
}

impl<T> Diff<T> {
    /// Classify an `(old, new)` pair. Returns `None` when both are absent.
    ///
    /// Equality is not checked: two present values always give `Updated`.
    pub fn between(old: Option<T>, new: Option<T>) -> Option<Self> {
        match (old, new) {
            (None, None) => None,
            (None, Some(v)) => Some(Self::Added(v)),
            (Some(v), None) => Some(Self::Removed(v)),
            (Some(a), Some(b)) => Some(Self::Updated(a, b)),
        }
    }

    /// Apply `f` to every carried value.
    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> Diff<U> {
        match self {
            Self::Added(v) => Diff::Added(f(v)),
            Self::Removed(v) => Diff::Removed(f(v)),
            Self::Updated(a, b) => Diff::Updated(f(a), f(b)),
        }
    }

    /// The value before the change, if any.
    pub fn old(&self) -> Option<&T> {
        match self {
            Self::Added(_) => None,
            Self::Removed(v) | Self::Updated(v, _) => Some(v),
        }
    }

    /// The value after the change, if any.
    pub fn new_value(&self) -> Option<&T> {
        match self {
            Self::Removed(_) => None,
            Self::Added(v) | Self::Updated(_, v) => Some(v),
        }
    }
}
