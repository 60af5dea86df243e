//! Recursive three-way tree merge.
//!
//! Two trees are merged position by position against their common ancestor.
//! A side that did not change a position yields to the side that did;
//! positions changed on both sides are merged recursively for nodes and with
//! the [`ContentsMerge`] for leaves. The ancestor is a [`Promise`] and is
//! only loaded for positions where the two sides actually differ.

use std::collections::BTreeSet;
use std::sync::Arc;

use strata_merge::{three_way, Conflict, MergeResult, Promise};
use strata_store::{Contents, Metadata};
use strata_types::Path;
use tracing::trace;

use crate::error::{TreeError, TreeResult};
use crate::store::TreeStore;
use crate::tree::{Leaf, Tree};

/// Merge function for leaf payloads: ancestor, ours, theirs.
pub type ContentsMerge =
    Arc<dyn Fn(&Promise<'_, Contents>, &Contents, &Contents) -> MergeResult<Contents> + Send + Sync>;

/// The merge used when none is configured: plain three-way, conflicting when
/// both sides changed a leaf to different values.
pub fn default_contents_merge() -> ContentsMerge {
    Arc::new(three_way::<Contents>)
}

/// Merge `a` and `b` against the ancestor `old`.
///
/// An ancestor resolving to `None` means the two trees share no history;
/// every position present on both sides must then agree or be mergeable
/// without one. Conflicts surface as [`TreeError::Conflict`] naming the path.
pub fn merge_trees(
    store: &TreeStore,
    old: &Promise<'_, Tree>,
    a: &Tree,
    b: &Tree,
    contents: &ContentsMerge,
) -> TreeResult<Tree> {
    let merged = merge_at(store, &Path::root(), old, Some(a), Some(b), contents)?;
    Ok(merged.unwrap_or_else(Tree::empty))
}

/// Merge two optional subtrees found at `at`. `None` on a side means the
/// position is absent there; the result is `None` when the merge removes it.
/// `at` only prefixes conflict messages.
pub fn merge_subtrees(
    store: &TreeStore,
    at: &Path,
    old: &Promise<'_, Tree>,
    a: Option<&Tree>,
    b: Option<&Tree>,
    contents: &ContentsMerge,
) -> TreeResult<Option<Tree>> {
    merge_at(store, at, old, a, b, contents)
}

fn to_conflict(err: TreeError) -> Conflict {
    match err {
        TreeError::Conflict(conflict) => conflict,
        other => Conflict::new(other.to_string()),
    }
}

fn merge_at(
    store: &TreeStore,
    at: &Path,
    old: &Promise<'_, Tree>,
    a: Option<&Tree>,
    b: Option<&Tree>,
    contents: &ContentsMerge,
) -> TreeResult<Option<Tree>> {
    if Tree::same_opt(a, b)? {
        return Ok(a.cloned());
    }
    let ancestor = old.force()?;
    if Tree::same_opt(ancestor.as_ref(), a)? {
        return Ok(b.cloned());
    }
    if Tree::same_opt(ancestor.as_ref(), b)? {
        return Ok(a.cloned());
    }
    trace!(path = %at, "merging changed position");

    match (a, b) {
        (Some(Tree::Node(na)), Some(Tree::Node(nb))) => {
            let ea = na.entries(store)?;
            let eb = nb.entries(store)?;
            let steps: BTreeSet<&String> = ea.keys().chain(eb.keys()).collect();
            let mut merged = ea.clone();
            for step in steps {
                let child_old = match &ancestor {
                    Some(anc) => Promise::lazy(move || anc.child(store, step).map_err(to_conflict)),
                    None => Promise::none(),
                };
                let child = merge_at(
                    store,
                    &at.child(step.clone()),
                    &child_old,
                    ea.get(step),
                    eb.get(step),
                    contents,
                )?;
                match child {
                    Some(child) => merged.insert(step.clone(), child),
                    None => merged.remove(step),
                };
            }
            if merged.is_empty() {
                Ok(None)
            } else {
                Ok(Some(Tree::of_entries(merged)))
            }
        }
        (Some(Tree::Contents(la)), Some(Tree::Contents(lb))) => {
            let old_leaf = match &ancestor {
                Some(Tree::Contents(leaf)) => Some(leaf),
                _ => None,
            };
            let old_contents = Promise::lazy(|| match old_leaf {
                Some(leaf) => leaf.contents(store).map(Some).map_err(to_conflict),
                None => Ok(None),
            });
            let merged = contents(
                &old_contents,
                &la.contents(store)?,
                &lb.contents(store)?,
            )
            .map_err(|c| c.context(at))?;
            let metadata = merge_metadata(
                at,
                old_leaf.map(Leaf::metadata),
                la.metadata(),
                lb.metadata(),
            )?;
            Ok(Some(Tree::Contents(Leaf::new(merged, metadata))))
        }
        (Some(_), Some(_)) => Err(Conflict::new("a node and a contents leaf collide")
            .context(at)
            .into()),
        _ => Err(Conflict::new("one side removed what the other changed")
            .context(at)
            .into()),
    }
}

fn merge_metadata(
    at: &Path,
    old: Option<Metadata>,
    a: Metadata,
    b: Metadata,
) -> MergeResult<Metadata> {
    if a == b {
        return Ok(a);
    }
    match old {
        Some(o) if o == a => Ok(b),
        Some(o) if o == b => Ok(a),
        _ => Err(Conflict::new(format!("metadata {a} and {b} both changed")).context(at)),
    }
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
    fn disjoint_changes_combine() {
        let store = TreeStore::in_memory();
        let base = build(&store, &[("a", "1"), ("b", "1")]);
        let ours = build(&store, &[("a", "2"), ("b", "1")]);
        let theirs = build(&store, &[("a", "1"), ("b", "1"), ("c/d", "new")]);
        let merged = merge_trees(
            &store,
            &Promise::ready(Some(base)),
            &ours,
            &theirs,
            &default_contents_merge(),
        )
        .unwrap();
        let expected = build(&store, &[("a", "2"), ("b", "1"), ("c/d", "new")]);
        assert!(merged.same(&expected).unwrap());
    }

    #[test]
    fn concurrent_leaf_changes_conflict() {
        let store = TreeStore::in_memory();
        let base = build(&store, &[("x", "0")]);
        let ours = build(&store, &[("x", "1")]);
        let theirs = build(&store, &[("x", "2")]);
        let err = merge_trees(
            &store,
            &Promise::ready(Some(base)),
            &ours,
            &theirs,
            &default_contents_merge(),
        )
        .unwrap_err();
        match err {
            TreeError::Conflict(c) => assert!(c.message().starts_with("/x")),
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn removal_against_unchanged_wins() {
        let store = TreeStore::in_memory();
        let base = build(&store, &[("keep", "k"), ("drop", "d")]);
        let ours = build(&store, &[("keep", "k")]);
        let theirs = build(&store, &[("keep", "k"), ("drop", "d"), ("add", "a")]);
        let merged = merge_trees(
            &store,
            &Promise::ready(Some(base)),
            &ours,
            &theirs,
            &default_contents_merge(),
        )
        .unwrap();
        assert!(merged.same(&build(&store, &[("keep", "k"), ("add", "a")])).unwrap());
    }

    #[test]
    fn removal_against_change_conflicts() {
        let store = TreeStore::in_memory();
        let base = build(&store, &[("f", "1"), ("g", "0")]);
        let ours = build(&store, &[("g", "0")]);
        let theirs = build(&store, &[("f", "2"), ("g", "0")]);
        assert!(merge_trees(
            &store,
            &Promise::ready(Some(base)),
            &ours,
            &theirs,
            &default_contents_merge(),
        )
        .is_err());
    }

    #[test]
    fn custom_contents_merge_is_used() {
        let store = TreeStore::in_memory();
        let concat: ContentsMerge =
            Arc::new(|_old: &Promise<'_, Contents>, a: &Contents, b: &Contents| {
                let mut data = a.data.clone();
                data.extend_from_slice(&b.data);
                Ok(Contents::new(data))
            });
        let base = build(&store, &[("log", "")]);
        let ours = build(&store, &[("log", "a")]);
        let theirs = build(&store, &[("log", "b")]);
        let merged =
            merge_trees(&store, &Promise::ready(Some(base)), &ours, &theirs, &concat).unwrap();
        assert_eq!(
            merged.find(&store, &path("log")).unwrap(),
            Some(Contents::from("ab"))
        );
    }

    #[test]
    fn ancestor_is_not_loaded_for_identical_sides() {
        let store = TreeStore::in_memory();
        let tree = build(&store, &[("a", "1")]);
        let old = Promise::lazy(|| Err(Conflict::new("should not be forced")));
        let merged =
            merge_trees(&store, &old, &tree, &tree.clone(), &default_contents_merge()).unwrap();
        assert!(merged.same(&tree).unwrap());
        assert!(!old.is_forced());
    }

    #[test]
    fn ancestor_loaded_from_storage() {
        let store = TreeStore::in_memory();
        let base = build(&store, &[("dir/a", "1"), ("dir/b", "1")]);
        let base_id = base.export(&store).unwrap();
        let ours = build(&store, &[("dir/a", "2"), ("dir/b", "1")]);
        let theirs = build(&store, &[("dir/a", "1"), ("dir/b", "2")]);
        let merged = merge_trees(
            &store,
            &Promise::ready(Some(Tree::of_node_hash(base_id))),
            &ours,
            &theirs,
            &default_contents_merge(),
        )
        .unwrap();
        assert!(merged
            .same(&build(&store, &[("dir/a", "2"), ("dir/b", "2")]))
            .unwrap());
    }

    #[test]
    fn subtree_added_on_one_side() {
        let store = TreeStore::in_memory();
        let leaf = Tree::of_contents("v", Metadata::Normal);
        let merged = merge_subtrees(
            &store,
            &path("k"),
            &Promise::none(),
            None,
            Some(&leaf),
            &default_contents_merge(),
        )
        .unwrap();
        assert!(Tree::same_opt(merged.as_ref(), Some(&leaf)).unwrap());
    }

    #[test]
    fn subtree_conflict_names_position() {
        let store = TreeStore::in_memory();
        let err = merge_subtrees(
            &store,
            &path("k"),
            &Promise::none(),
            Some(&Tree::of_contents("a", Metadata::Normal)),
            Some(&Tree::of_contents("b", Metadata::Normal)),
            &default_contents_merge(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("/k"));
    }

    #[test]
    fn metadata_three_way() {
        let at = Path::root();
        assert_eq!(
            merge_metadata(&at, Some(Metadata::Normal), Metadata::Normal, Metadata::Executable),
            Ok(Metadata::Executable)
        );
        assert!(
            merge_metadata(&at, Some(Metadata::Normal), Metadata::Link, Metadata::Executable)
                .is_err()
        );
    }
}
