//! Paths into a tree.
//!
//! A [`Path`] is a sequence of [`Step`]s from the root node. The empty path
//! addresses the root itself.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// One component of a path: the name of an entry inside a node.
pub type Step = String;

/// A location inside a tree, as a list of steps from the root.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Path(Vec<Step>);

impl Path {
    /// The empty path, addressing the root.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Build a path from steps.
    pub fn new<I, S>(steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Step>,
    {
        Self(steps.into_iter().map(Into::into).collect())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn steps(&self) -> &[Step] {
        &self.0
    }

    /// First step and the remaining path.
    pub fn split_first(&self) -> Option<(&Step, Path)> {
        self.0
            .split_first()
            .map(|(head, rest)| (head, Path(rest.to_vec())))
    }

    /// Parent path and last step.
    pub fn split_last(&self) -> Option<(Path, &Step)> {
        self.0
            .split_last()
            .map(|(last, init)| (Path(init.to_vec()), last))
    }

    /// A new path with `step` appended.
    pub fn child(&self, step: impl Into<Step>) -> Self {
        let mut steps = self.0.clone();
        steps.push(step.into());
        Self(steps)
    }

    /// Concatenate two paths.
    pub fn join(&self, other: &Path) -> Self {
        let mut steps = self.0.clone();
        steps.extend(other.0.iter().cloned());
        Self(steps)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.0.join("/"))
    }
}

impl FromStr for Path {
    type Err = TypeError;

    /// Parse a `/`-separated path. Empty components are skipped, so `"/a//b/"`
    /// is the same as `"a/b"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut steps = Vec::new();
        for step in s.split('/').filter(|s| !s.is_empty()) {
            if step == "." || step == ".." {
                return Err(TypeError::InvalidStep {
                    step: step.to_string(),
                    reason: "relative components are not allowed".into(),
                });
            }
            steps.push(step.to_string());
        }
        Ok(Self(steps))
    }
}

impl<S: Into<Step>> FromIterator<S> for Path {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter)
    }
}

impl<S: Into<Step>, const N: usize> From<[S; N]> for Path {
    fn from(steps: [S; N]) -> Self {
        Self::new(steps)
    }
}
