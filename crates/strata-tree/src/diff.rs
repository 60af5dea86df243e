//! Leaf-level differences between two trees.
//!
//! Subtrees with equal hashes are skipped without being loaded, so the cost
//! of a diff is proportional to the size of the change, not of the trees.

use std::collections::BTreeSet;

use strata_store::{Contents, Metadata};
use strata_types::{Diff, Path};

use crate::error::TreeResult;
use crate::store::TreeStore;
use crate::tree::Tree;

/// A leaf value together with its metadata.
pub type LeafValue = (Contents, Metadata);

impl Tree {
    /// Every leaf that differs between `self` (old) and `other` (new), in
    /// path order.
    pub fn diff(
        &self,
        store: &TreeStore,
        other: &Tree,
    ) -> TreeResult<Vec<(Path, Diff<LeafValue>)>> {
        let mut out = Vec::new();
        diff_at(store, Path::root(), Some(self), Some(other), &mut out)?;
        Ok(out)
    }
}

fn diff_at(
    store: &TreeStore,
    at: Path,
    old: Option<&Tree>,
    new: Option<&Tree>,
    out: &mut Vec<(Path, Diff<LeafValue>)>,
) -> TreeResult<()> {
    if Tree::same_opt(old, new)? {
        return Ok(());
    }
    match (old, new) {
        (Some(Tree::Node(a)), Some(Tree::Node(b))) => {
            let a = a.entries(store)?;
            let b = b.entries(store)?;
            let steps: BTreeSet<&String> = a.keys().chain(b.keys()).collect();
            for step in steps {
                diff_at(store, at.child(step.clone()), a.get(step), b.get(step), out)?;
            }
        }
        (Some(Tree::Contents(a)), Some(Tree::Contents(b))) => {
            out.push((
                at,
                Diff::Updated(
                    (a.contents(store)?, a.metadata()),
                    (b.contents(store)?, b.metadata()),
                ),
            ));
        }
        (old, new) => {
            if let Some(old) = old {
                for (path, contents, metadata) in old.leaves(store)? {
                    out.push((at.join(&path), Diff::Removed((contents, metadata))));
                }
            }
            if let Some(new) = new {
                for (path, contents, metadata) in new.leaves(store)? {
                    out.push((at.join(&path), Diff::Added((contents, metadata))));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(s: &str) -> Path {
        s.parse().unwrap()
    }

    fn build(store: &TreeStore, leaves: &[(&str, &str)]) -> Tree {
        leaves.iter().fold(Tree::empty(), |tree, (p, v)| {
            tree.add(store, &path(p), *v, Metadata::Normal).unwrap()
        })
    }

    #[test]
    fn identical_trees_have_no_diff() {
        let store = TreeStore::in_memory();
        let a = build(&store, &[("x", "1"), ("y/z", "2")]);
        let b = build(&store, &[("y/z", "2"), ("x", "1")]);
        assert!(a.diff(&store, &b).unwrap().is_empty());
    }

    #[test]
    fn reports_added_removed_updated() {
        let store = TreeStore::in_memory();
        let old = build(&store, &[("keep", "k"), ("gone", "g"), ("dir/change", "1")]);
        let new = build(&store, &[("keep", "k"), ("dir/change", "2"), ("new/leaf", "n")]);
        let diff = old.diff(&store, &new).unwrap();
        let n = |s: &str| (Contents::from(s), Metadata::Normal);
        assert_eq!(
            diff,
            vec![
                (path("dir/change"), Diff::Updated(n("1"), n("2"))),
                (path("gone"), Diff::Removed(n("g"))),
                (path("new/leaf"), Diff::Added(n("n"))),
            ]
        );
    }

    #[test]
    fn node_replaced_by_leaf() {
        let store = TreeStore::in_memory();
        let old = build(&store, &[("a/b", "1"), ("a/c", "2")]);
        let new = build(&store, &[("a", "leaf")]);
        let diff = old.diff(&store, &new).unwrap();
        assert_eq!(diff.len(), 3);
        assert!(matches!(&diff[2], (p, Diff::Added(_)) if *p == path("a")));
    }

    #[test]
    fn metadata_change_is_an_update() {
        let store = TreeStore::in_memory();
        let old = Tree::empty().add(&store, &path("run"), "x", Metadata::Normal).unwrap();
        let new = Tree::empty().add(&store, &path("run"), "x", Metadata::Executable).unwrap();
        let diff = old.diff(&store, &new).unwrap();
        assert_eq!(
            diff,
            vec![(
                path("run"),
                Diff::Updated(
                    (Contents::from("x"), Metadata::Normal),
                    (Contents::from("x"), Metadata::Executable)
                )
            )]
        );
    }
}
