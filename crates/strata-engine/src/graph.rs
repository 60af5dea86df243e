//! Traversals of the object graph.
//!
//! Commits point at their parents and at their root node; nodes point at
//! their children. Every traversal here is breadth-first from a set of
//! starting vertices, visits each vertex once, and can be bounded below by
//! a set of vertices it must not enter.

use std::collections::{HashSet, VecDeque};

use strata_store::{CommitObject, EntryKind, Node, TypedStore};
use strata_types::ObjectId;

use crate::error::EngineResult;
use crate::repository::Repository;

/// A vertex of the object graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Vertex {
    Contents(ObjectId),
    Node(ObjectId),
    Commit(ObjectId),
}

impl Vertex {
    pub fn id(&self) -> ObjectId {
        match self {
            Self::Contents(id) | Self::Node(id) | Self::Commit(id) => *id,
        }
    }
}

/// Callbacks for [`Repository::iter`]. Every method defaults to doing
/// nothing.
pub trait Visitor {
    fn commit(&mut self, _id: ObjectId, _commit: &CommitObject) -> EngineResult<()> {
        Ok(())
    }

    fn node(&mut self, _id: ObjectId, _node: &Node) -> EngineResult<()> {
        Ok(())
    }

    /// Contents are reported by address only; they are never loaded.
    fn contents(&mut self, _id: ObjectId) -> EngineResult<()> {
        Ok(())
    }

    fn edge(&mut self, _from: Vertex, _to: Vertex) -> EngineResult<()> {
        Ok(())
    }
}

struct Quiet;

impl Visitor for Quiet {}

impl Repository {
    /// Direct successors of `vertex`: parents and root node for a commit,
    /// children for a node, nothing for contents.
    pub fn successors(&self, vertex: Vertex) -> EngineResult<Vec<Vertex>> {
        self.expand(vertex, &mut Quiet)
    }

    fn expand(&self, vertex: Vertex, visitor: &mut dyn Visitor) -> EngineResult<Vec<Vertex>> {
        match vertex {
            Vertex::Commit(id) => {
                let commit: CommitObject = self.commits().get_value(&id)?;
                visitor.commit(id, &commit)?;
                let mut next: Vec<Vertex> =
                    commit.parents.iter().copied().map(Vertex::Commit).collect();
                next.push(Vertex::Node(commit.node));
                Ok(next)
            }
            Vertex::Node(id) => {
                let node: Node = self.trees().nodes().get_value(&id)?;
                visitor.node(id, &node)?;
                Ok(node
                    .entries
                    .iter()
                    .map(|entry| match entry.kind {
                        EntryKind::Contents => Vertex::Contents(entry.id),
                        EntryKind::Node => Vertex::Node(entry.id),
                    })
                    .collect())
            }
            Vertex::Contents(id) => {
                visitor.contents(id)?;
                Ok(Vec::new())
            }
        }
    }

    /// Every vertex reachable from `max` through `pred`, in breadth-first
    /// order.
    ///
    /// Vertices in `min` are neither returned nor expanded. With `depth`,
    /// only vertices at most that many steps from `max` are returned.
    pub fn closure<F>(
        &self,
        min: &[Vertex],
        max: &[Vertex],
        depth: Option<usize>,
        mut pred: F,
    ) -> EngineResult<Vec<Vertex>>
    where
        F: FnMut(Vertex) -> EngineResult<Vec<Vertex>>,
    {
        let mut visited: HashSet<Vertex> = min.iter().copied().collect();
        let mut queue: VecDeque<(Vertex, usize)> = VecDeque::new();
        for vertex in max {
            if visited.insert(*vertex) {
                queue.push_back((*vertex, 0));
            }
        }

        let mut result = Vec::new();
        while let Some((vertex, level)) = queue.pop_front() {
            result.push(vertex);
            if depth.is_some_and(|d| level >= d) {
                continue;
            }
            for next in pred(vertex)? {
                if visited.insert(next) {
                    queue.push_back((next, level + 1));
                }
            }
        }
        Ok(result)
    }

    /// Visit the object graph breadth-first from `max`, calling `f` on each
    /// vertex. A vertex is expanded only when `f` returns `true`.
    pub fn breadth_first_traversal<F>(
        &self,
        max: &[Vertex],
        depth: Option<usize>,
        mut f: F,
    ) -> EngineResult<()>
    where
        F: FnMut(Vertex) -> EngineResult<bool>,
    {
        self.closure(&[], max, depth, |vertex| {
            if f(vertex)? {
                self.successors(vertex)
            } else {
                Ok(Vec::new())
            }
        })?;
        Ok(())
    }

    /// Walk everything reachable from `max` without entering `min`, loading
    /// commits and nodes and reporting them, their contents, and every edge
    /// to `visitor`.
    pub fn iter(&self, min: &[Vertex], max: &[Vertex], visitor: &mut dyn Visitor) -> EngineResult<()> {
        let excluded: HashSet<Vertex> = min.iter().copied().collect();
        self.closure(min, max, None, |vertex| {
            let next = self.expand(vertex, visitor)?;
            for to in &next {
                if !excluded.contains(to) {
                    visitor.edge(vertex, *to)?;
                }
            }
            Ok(next)
        })?;
        Ok(())
    }
}
