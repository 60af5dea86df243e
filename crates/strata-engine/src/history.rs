//! Commit history: lowest common ancestors, merges between commits and
//! branches, fast-forwards, and history queries.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};

use strata_merge::{Conflict, Promise};
use strata_tree::{merge_trees, Tree};
use strata_types::{ObjectId, Path};
use tracing::{debug, info};

use crate::commit::Commit;
use crate::error::{EngineResult, FastForwardError, LcaError, WriteError, WriteResult};
use crate::graph::Vertex;
use crate::handle::Store;
use crate::repository::Repository;
use crate::transaction::WriteOptions;

const REACHED_A: u8 = 0b001;
const REACHED_B: u8 = 0b010;
const REACHED_BOTH: u8 = REACHED_A | REACHED_B;
const STALE: u8 = 0b100;

/// Walks the commit graph down from two commits, painting every ancestor
/// with the side(s) it is reachable from. A commit painted by both sides is
/// a common ancestor; everything below one is stale.
struct LcaSearch<'r> {
    repo: &'r Repository,
    parents: HashMap<ObjectId, Vec<ObjectId>>,
    flags: HashMap<ObjectId, u8>,
}

impl<'r> LcaSearch<'r> {
    fn new(repo: &'r Repository) -> Self {
        Self {
            repo,
            parents: HashMap::new(),
            flags: HashMap::new(),
        }
    }

    fn parents(&mut self, id: ObjectId) -> EngineResult<Vec<ObjectId>> {
        if let Some(parents) = self.parents.get(&id) {
            return Ok(parents.clone());
        }
        let parents = self.repo.get_commit(&id)?.parents().to_vec();
        self.parents.insert(id, parents.clone());
        Ok(parents)
    }

    fn flag(&self, id: &ObjectId) -> u8 {
        self.flags.get(id).copied().unwrap_or(0)
    }

    fn run(
        &mut self,
        a: ObjectId,
        b: ObjectId,
        max_depth: usize,
    ) -> Result<Vec<ObjectId>, LcaError> {
        self.flags.insert(a, REACHED_A);
        self.flags.insert(b, REACHED_B);
        let mut queue: VecDeque<(ObjectId, usize)> = VecDeque::from([(a, 0), (b, 0)]);
        let mut candidates: Vec<ObjectId> = Vec::new();

        while !queue.iter().all(|(id, _)| self.flag(id) & STALE != 0) {
            let Some((id, depth)) = queue.pop_front() else {
                break;
            };
            let mut paint = self.flag(&id);
            if paint & STALE == 0 && depth > max_depth {
                return Err(LcaError::MaxDepthReached);
            }
            if paint & REACHED_BOTH == REACHED_BOTH {
                if paint & STALE == 0 && !candidates.contains(&id) {
                    candidates.push(id);
                }
                paint |= STALE;
            }
            for parent in self.parents(id)? {
                let old = self.flag(&parent);
                let new = old | paint;
                if new != old {
                    self.flags.insert(parent, new);
                    queue.push_back((parent, depth + 1));
                }
            }
        }

        candidates.retain(|id| self.flag(id) & STALE == 0);
        self.drop_redundant(candidates)
    }

    /// Drop every candidate that is an ancestor of another one.
    fn drop_redundant(&mut self, candidates: Vec<ObjectId>) -> Result<Vec<ObjectId>, LcaError> {
        if candidates.len() < 2 {
            return Ok(candidates);
        }
        let mut redundant = HashSet::new();
        for from in &candidates {
            let mut seen = HashSet::new();
            let mut queue: VecDeque<ObjectId> = self.parents(*from)?.into();
            while let Some(id) = queue.pop_front() {
                if !seen.insert(id) {
                    continue;
                }
                if candidates.contains(&id) {
                    redundant.insert(id);
                }
                queue.extend(self.parents(id)?);
            }
        }
        Ok(candidates
            .into_iter()
            .filter(|id| !redundant.contains(id))
            .collect())
    }
}

fn lca_conflict(err: LcaError) -> WriteError {
    match err {
        LcaError::MaxDepthReached => WriteError::Conflict("max depth reached".into()),
        LcaError::TooManyLcas => WriteError::Conflict("too many lcas".into()),
        LcaError::Engine(e) => WriteError::Engine(e),
    }
}

impl Repository {
    /// Lowest common ancestors of `a` and `b`, sorted by hash.
    ///
    /// Fails with [`LcaError::MaxDepthReached`] when the search must go
    /// deeper than `max_depth` commits below either side, and with
    /// [`LcaError::TooManyLcas`] when more than `max_count` are found.
    pub fn lcas(
        &self,
        a: &Commit,
        b: &Commit,
        max_depth: usize,
        max_count: usize,
    ) -> Result<Vec<Commit>, LcaError> {
        if a == b {
            return Ok(vec![a.clone()]);
        }
        let mut found = LcaSearch::new(self).run(a.hash(), b.hash(), max_depth)?;
        if found.len() > max_count {
            return Err(LcaError::TooManyLcas);
        }
        found.sort();
        debug!(a = %a.hash().short_hex(), b = %b.hash().short_hex(), count = found.len(), "lca search done");
        Ok(found
            .iter()
            .map(|id| self.get_commit(id))
            .collect::<EngineResult<_>>()?)
    }

    fn lcas_with_config(&self, a: &Commit, b: &Commit) -> Result<Vec<Commit>, LcaError> {
        let (max_depth, max_count) = self.config().lca_bounds();
        self.lcas(a, b, max_depth, max_count)
    }

    /// Tree of the merge base of `a` and `b`. Several lowest common
    /// ancestors are merged into a virtual one first; none means the two
    /// histories are unrelated.
    fn merge_base(&self, opts: &WriteOptions, a: &Commit, b: &Commit) -> WriteResult<Option<Tree>> {
        let lcas = self.lcas_with_config(a, b).map_err(lca_conflict)?;
        let mut lcas = lcas.into_iter();
        let Some(mut base) = lcas.next() else {
            return Ok(None);
        };
        for next in lcas {
            debug!(base = %base.hash().short_hex(), next = %next.hash().short_hex(), "merging ancestors");
            base = self.merge_commits(opts, &base, &next)?;
        }
        Ok(Some(base.tree()))
    }

    /// Three-way merge of two commits into a new commit whose parents are
    /// both. The merge base is only computed when the trees differ.
    pub fn merge_commits(&self, opts: &WriteOptions, a: &Commit, b: &Commit) -> WriteResult<Commit> {
        if a == b {
            return Ok(a.clone());
        }
        let ancestor = Promise::lazy(|| {
            self.merge_base(opts, a, b).map_err(|err| match err {
                WriteError::Conflict(msg) => Conflict::new(msg),
                other => Conflict::new(other.to_string()),
            })
        });
        let tree = merge_trees(self.trees(), &ancestor, &a.tree(), &b.tree(), self.contents_merge())?;
        let merged = self.new_commit(opts.info(), &[a.clone(), b.clone()], &tree)?;
        debug!(
            a = %a.hash().short_hex(),
            b = %b.hash().short_hex(),
            merged = %merged.hash().short_hex(),
            "commits merged"
        );
        Ok(merged)
    }
}

/// The commits reachable from a head, with their parent links.
#[derive(Clone, Debug, Default)]
pub struct History {
    commits: Vec<Commit>,
    edges: Vec<(ObjectId, ObjectId)>,
}

impl History {
    /// Commits in breadth-first order from the head.
    pub fn commits(&self) -> &[Commit] {
        &self.commits
    }

    /// `(child, parent)` pairs between commits of this history.
    pub fn edges(&self) -> &[(ObjectId, ObjectId)] {
        &self.edges
    }

    pub fn len(&self) -> usize {
        self.commits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commits.is_empty()
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.commits.iter().any(|c| c.hash() == *id)
    }

    pub fn parents_of(&self, id: &ObjectId) -> Vec<ObjectId> {
        self.edges
            .iter()
            .filter(|(child, _)| child == id)
            .map(|(_, parent)| *parent)
            .collect()
    }
}

impl Store {
    fn lca_limits(&self, max_depth: Option<usize>, n: Option<usize>) -> (usize, usize) {
        let (default_depth, default_count) = self.repo.config().lca_bounds();
        (max_depth.unwrap_or(default_depth), n.unwrap_or(default_count))
    }

    /// Lowest common ancestors of the head and `other`. Empty when this
    /// store has no head.
    pub fn lcas_with_commit(&self, other: &Commit) -> Result<Vec<Commit>, LcaError> {
        match self.head()? {
            Some(head) => self.repo.lcas_with_config(&head, other),
            None => Ok(Vec::new()),
        }
    }

    pub fn lcas_with_branch(&self, name: &str) -> Result<Vec<Commit>, LcaError> {
        match self.repo.branch_head(name)? {
            Some(other) => self.lcas_with_commit(&other),
            None => Ok(Vec::new()),
        }
    }

    /// Lowest common ancestors of the heads of two stores.
    pub fn lcas(&self, other: &Store) -> Result<Vec<Commit>, LcaError> {
        match other.head()? {
            Some(head) => self.lcas_with_commit(&head),
            None => Ok(Vec::new()),
        }
    }

    /// Move the head to `target` if `target` descends from it.
    pub fn fast_forward(
        &self,
        target: &Commit,
        max_depth: Option<usize>,
        n: Option<usize>,
    ) -> Result<(), FastForwardError> {
        let _guard = self.write_guard();
        let Some(head) = self.head()? else {
            return if self.test_and_set_head(None, Some(target))? {
                Ok(())
            } else {
                Err(FastForwardError::Rejected)
            };
        };
        if head == *target {
            return Err(FastForwardError::NoChange);
        }
        let (max_depth, n) = self.lca_limits(max_depth, n);
        let lcas = self.repo.lcas(&head, target, max_depth, n)?;
        if lcas != [head.clone()] {
            debug!(head = %self.status(), target = %target.hash().short_hex(), "not a descendant");
            return Err(FastForwardError::Rejected);
        }
        if self.test_and_set_head(Some(&head), Some(target))? {
            info!(head = %self.status(), target = %target.hash().short_hex(), "fast-forwarded");
            Ok(())
        } else {
            Err(FastForwardError::Rejected)
        }
    }

    /// Merge `other` into the head.
    ///
    /// Nothing happens when `other` is already part of the history; a head
    /// that `other` descends from is fast-forwarded; otherwise a merge
    /// commit is created. The head update retries like any write.
    pub fn merge_with_commit(&self, other: &Commit, opts: &WriteOptions) -> WriteResult<()> {
        let retries = self.retries(opts);
        let mut attempt = 0;
        loop {
            if attempt > retries {
                return Err(WriteError::TooManyRetries(retries));
            }
            let _guard = self.write_guard();
            let head = self.head()?;
            let next = match &head {
                None => other.clone(),
                Some(head) if head == other => return Ok(()),
                Some(head) => {
                    let lcas = self.repo.lcas_with_config(head, other).map_err(lca_conflict)?;
                    if lcas == [other.clone()] {
                        debug!(head = %self.status(), "already merged");
                        return Ok(());
                    }
                    if lcas == [head.clone()] {
                        other.clone()
                    } else {
                        self.repo.merge_commits(opts, head, other)?
                    }
                }
            };
            if self.test_and_set_head(head.as_ref(), Some(&next))? {
                info!(head = %self.status(), commit = %next.hash().short_hex(), "merged");
                return Ok(());
            }
            attempt += 1;
            debug!(head = %self.status(), attempt, "head moved during merge, retrying");
        }
    }

    /// Merge the head of branch `name` into this store. A missing branch
    /// merges nothing.
    pub fn merge_with_branch(&self, name: &str, opts: &WriteOptions) -> WriteResult<()> {
        match self.repo.branch_head(name)? {
            Some(other) => self.merge_with_commit(&other, opts),
            None => Ok(()),
        }
    }

    /// Merge this store's head into `into`.
    pub fn merge_into(&self, into: &Store, opts: &WriteOptions) -> WriteResult<()> {
        match self.head()? {
            Some(head) => into.merge_with_commit(&head, opts),
            None => Ok(()),
        }
    }

    /// Commits reachable from the head, at most `depth` parent links away.
    pub fn history(&self, depth: Option<usize>) -> EngineResult<History> {
        let Some(head) = self.head()? else {
            return Ok(History::default());
        };
        let mut loaded: HashMap<ObjectId, Commit> = HashMap::from([(head.hash(), head.clone())]);
        let order = self.repo.closure(&[], &[Vertex::Commit(head.hash())], depth, |vertex| {
            let commit = match loaded.get(&vertex.id()) {
                Some(commit) => commit.clone(),
                None => {
                    let commit = self.repo.get_commit(&vertex.id())?;
                    loaded.insert(commit.hash(), commit.clone());
                    commit
                }
            };
            Ok(commit.parents().iter().copied().map(Vertex::Commit).collect())
        })?;

        let mut commits = Vec::with_capacity(order.len());
        for vertex in &order {
            match loaded.remove(&vertex.id()) {
                Some(commit) => commits.push(commit),
                None => commits.push(self.repo.get_commit(&vertex.id())?),
            }
        }
        let members: HashSet<ObjectId> = commits.iter().map(Commit::hash).collect();
        let edges = commits
            .iter()
            .flat_map(|c| c.parents().iter().map(move |p| (c.hash(), *p)))
            .filter(|(_, parent)| members.contains(parent))
            .collect();
        Ok(History { commits, edges })
    }

    /// Up to `n` commits that changed the value at `path`, most recent
    /// first.
    ///
    /// A commit changed the path when none of its parents holds a subtree
    /// with the same hash there (a root commit counts when the path exists
    /// in it). Leaf metadata is not part of a leaf's hash, so metadata-only
    /// changes do not count.
    /// With `depth`, commits more than `depth` parent links from the head
    /// are not examined.
    pub fn last_modified(&self, path: &Path, n: usize, depth: Option<usize>) -> EngineResult<Vec<Commit>> {
        let head = self.get_head()?;
        let trees = self.trees();
        let value_at = |commit: &Commit| -> EngineResult<Option<ObjectId>> {
            match commit.tree().find_tree(trees, path)? {
                Some(tree) => Ok(Some(tree.hash()?)),
                None => Ok(None),
            }
        };

        let mut heap = BinaryHeap::from([(head.info().date, Reverse(0usize), head.hash())]);
        let mut visited = HashSet::from([head.hash()]);
        let mut pending = HashMap::from([(head.hash(), head)]);
        let mut found = Vec::new();

        while found.len() < n {
            let Some((_, Reverse(level), id)) = heap.pop() else {
                break;
            };
            let Some(commit) = pending.remove(&id) else {
                continue;
            };
            let value = value_at(&commit)?;
            let parents = commit
                .parents()
                .iter()
                .map(|p| self.repo.get_commit(p))
                .collect::<EngineResult<Vec<_>>>()?;

            let changed = if parents.is_empty() {
                value.is_some()
            } else {
                let mut differs = true;
                for parent in &parents {
                    if value_at(parent)? == value {
                        differs = false;
                        break;
                    }
                }
                differs
            };
            if changed {
                found.push(commit);
            }
            if depth.is_some_and(|d| level >= d) {
                continue;
            }
            for parent in parents {
                if visited.insert(parent.hash()) {
                    heap.push((parent.info().date, Reverse(level + 1), parent.hash()));
                    pending.insert(parent.hash(), parent);
                }
            }
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::Status;
    use std::sync::atomic::{AtomicU64, Ordering};
    use strata_store::{Contents, Metadata};
    use strata_types::Info;

    fn path(s: &str) -> Path {
        s.parse().unwrap()
    }

    fn opts() -> WriteOptions {
        WriteOptions::message("test")
    }

    static SEQ: AtomicU64 = AtomicU64::new(0);

    /// A commit whose tree holds exactly `leaves`, with a unique message so
    /// equal trees with equal parents still get distinct commits.
    fn commit(repo: &Repository, parents: &[&Commit], leaves: &[(&str, &str)]) -> Commit {
        let tree = leaves.iter().fold(Tree::empty(), |tree, (p, v)| {
            tree.add(repo.trees(), &path(p), *v, Metadata::Normal).unwrap()
        });
        let parents: Vec<Commit> = parents.iter().map(|c| (*c).clone()).collect();
        let n = SEQ.fetch_add(1, Ordering::SeqCst);
        repo.new_commit(Info::new("t", n as i64, format!("c{n}")), &parents, &tree)
            .unwrap()
    }

    #[test]
    fn lca_of_ancestor_is_the_ancestor() {
        let repo = Repository::in_memory();
        let c1 = commit(&repo, &[], &[("k", "1")]);
        let c2 = commit(&repo, &[&c1], &[("k", "2")]);
        let c3 = commit(&repo, &[&c2], &[("k", "3")]);
        assert_eq!(repo.lcas_with_config(&c1, &c3).unwrap(), vec![c1.clone()]);
        assert_eq!(repo.lcas_with_config(&c3, &c1).unwrap(), vec![c1.clone()]);
        assert_eq!(repo.lcas_with_config(&c2, &c2).unwrap(), vec![c2]);
    }

    #[test]
    fn lca_of_fork() {
        let repo = Repository::in_memory();
        let base = commit(&repo, &[], &[("k", "0")]);
        let mid = commit(&repo, &[&base], &[("k", "1")]);
        let left = commit(&repo, &[&mid], &[("k", "l")]);
        let right = commit(&repo, &[&mid], &[("k", "r")]);
        let right2 = commit(&repo, &[&right], &[("k", "r2")]);
        assert_eq!(repo.lcas_with_config(&left, &right2).unwrap(), vec![mid]);
    }

    #[test]
    fn unrelated_histories_have_no_lca() {
        let repo = Repository::in_memory();
        let a = commit(&repo, &[], &[("a", "1")]);
        let b = commit(&repo, &[], &[("b", "1")]);
        assert!(repo.lcas_with_config(&a, &b).unwrap().is_empty());
    }

    #[test]
    fn criss_cross_has_two_lcas() {
        let repo = Repository::in_memory();
        let base = commit(&repo, &[], &[("k", "0")]);
        let x1 = commit(&repo, &[&base], &[("k", "0"), ("a", "1")]);
        let y1 = commit(&repo, &[&base], &[("k", "0"), ("b", "1")]);
        let x2 = commit(&repo, &[&x1, &y1], &[("k", "0"), ("a", "1"), ("b", "1")]);
        let y2 = commit(&repo, &[&y1, &x1], &[("k", "0"), ("a", "1"), ("b", "1")]);

        let mut expected = vec![x1, y1];
        expected.sort_by_key(Commit::hash);
        assert_eq!(repo.lcas_with_config(&x2, &y2).unwrap(), expected);
        assert!(matches!(
            repo.lcas(&x2, &y2, usize::MAX, 1),
            Err(LcaError::TooManyLcas)
        ));
    }

    #[test]
    fn lca_depth_is_bounded() {
        let repo = Repository::in_memory();
        let base = commit(&repo, &[], &[("k", "0")]);
        let (mut a, mut b) = (base.clone(), base);
        for i in 0..5 {
            let value = i.to_string();
            a = commit(&repo, &[&a], &[("a", value.as_str())]);
            b = commit(&repo, &[&b], &[("b", value.as_str())]);
        }
        assert!(matches!(repo.lcas(&a, &b, 2, usize::MAX), Err(LcaError::MaxDepthReached)));
        assert_eq!(repo.lcas(&a, &b, 10, usize::MAX).unwrap().len(), 1);
    }

    #[test]
    fn merge_commits_uses_virtual_ancestor() {
        let repo = Repository::in_memory();
        let base = commit(&repo, &[], &[("k", "0")]);
        let x1 = commit(&repo, &[&base], &[("k", "0"), ("a", "1")]);
        let y1 = commit(&repo, &[&base], &[("k", "0"), ("b", "1")]);
        let x2 = commit(&repo, &[&x1, &y1], &[("k", "0"), ("a", "1"), ("b", "1")]);
        let y2 = commit(&repo, &[&y1, &x1], &[("k", "0"), ("a", "1"), ("b", "1")]);
        let x3 = commit(&repo, &[&x2], &[("k", "0"), ("a", "2"), ("b", "1")]);
        let y3 = commit(&repo, &[&y2], &[("k", "0"), ("a", "1"), ("b", "2")]);

        let merged = repo.merge_commits(&opts(), &x3, &y3).unwrap();
        let store = Store::of_commit(&repo, merged.clone());
        assert_eq!(store.get(&path("a")).unwrap(), Contents::from("2"));
        assert_eq!(store.get(&path("b")).unwrap(), Contents::from("2"));
        let mut parents = vec![x3.hash(), y3.hash()];
        parents.sort();
        assert_eq!(merged.parents(), parents.as_slice());
    }

    #[test]
    fn merging_branches() {
        let repo = Repository::in_memory();
        let main = Store::main(&repo).unwrap();
        main.set(&path("shared"), "0", &opts()).unwrap();
        let feature = main.clone_to("feature").unwrap();

        main.set(&path("main-only"), "m", &opts()).unwrap();
        feature.set(&path("feature-only"), "f", &opts()).unwrap();
        main.merge_with_branch("feature", &WriteOptions::message("merge feature")).unwrap();

        assert_eq!(main.get(&path("feature-only")).unwrap(), Contents::from("f"));
        assert_eq!(main.get(&path("main-only")).unwrap(), Contents::from("m"));
        let head = main.get_head().unwrap();
        assert_eq!(head.parents().len(), 2);
        assert_eq!(head.info().message, "merge feature");
    }

    fn parse_counter(contents: &Contents) -> strata_merge::MergeResult<i64> {
        contents
            .as_str()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| Conflict::new("not a counter"))
    }

    #[test]
    fn custom_contents_merge_adds_counters() {
        let counters: strata_tree::ContentsMerge = std::sync::Arc::new(
            |old: &Promise<'_, Contents>, a: &Contents, b: &Contents| {
                let old = old.map(|c: Contents| parse_counter(&c).map(Some));
                let merged = strata_merge::counter(&old, &parse_counter(a)?, &parse_counter(b)?)?;
                Ok(Contents::from(merged.to_string()))
            },
        );
        let repo = Repository::in_memory().with_contents_merge(counters);
        let main = Store::main(&repo).unwrap();
        main.set(&path("hits"), "10", &opts()).unwrap();
        let feature = main.clone_to("feature").unwrap();
        main.set(&path("hits"), "13", &opts()).unwrap();
        feature.set(&path("hits"), "15", &opts()).unwrap();

        main.merge_with_branch("feature", &opts()).unwrap();
        assert_eq!(main.get(&path("hits")).unwrap(), Contents::from("18"));
    }

    #[test]
    fn conflicting_merge_leaves_head_alone() {
        let repo = Repository::in_memory();
        let main = Store::main(&repo).unwrap();
        main.set(&path("k"), "0", &opts()).unwrap();
        let feature = main.clone_to("feature").unwrap();
        main.set(&path("k"), "main", &opts()).unwrap();
        feature.set(&path("k"), "feature", &opts()).unwrap();

        let before = main.get_head().unwrap();
        let err = main.merge_with_branch("feature", &opts()).unwrap_err();
        assert!(matches!(err, WriteError::Conflict(msg) if msg.contains("/k")));
        assert_eq!(main.get_head().unwrap(), before);
    }

    #[test]
    fn merge_into_fast_forwards() {
        let repo = Repository::in_memory();
        let main = Store::main(&repo).unwrap();
        main.set(&path("k"), "0", &opts()).unwrap();
        let feature = main.clone_to("feature").unwrap();
        feature.set(&path("k"), "1", &opts()).unwrap();

        feature.merge_into(&main, &opts()).unwrap();
        assert_eq!(main.get_head().unwrap(), feature.get_head().unwrap());
    }

    #[test]
    fn merging_a_commit_already_in_history_is_a_no_op() {
        let repo = Repository::in_memory();
        let main = Store::main(&repo).unwrap();
        main.set(&path("k"), "0", &opts()).unwrap();
        let first = main.get_head().unwrap();
        main.set(&path("k"), "1", &opts()).unwrap();
        let head = main.get_head().unwrap();

        main.merge_with_commit(&head, &opts()).unwrap();
        main.merge_with_commit(&first, &opts()).unwrap();
        assert_eq!(main.get_head().unwrap(), head);
    }

    #[test]
    fn merge_into_empty_store_takes_commit() {
        let repo = Repository::in_memory();
        let c = commit(&repo, &[], &[("k", "v")]);
        let store = Store::empty(&repo);
        store.merge_with_commit(&c, &opts()).unwrap();
        assert_eq!(store.status(), Status::Commit(c));
    }

    #[test]
    fn fast_forward_rules() {
        let repo = Repository::in_memory();
        let c1 = commit(&repo, &[], &[("k", "1")]);
        let c2 = commit(&repo, &[&c1], &[("k", "2")]);
        let other = commit(&repo, &[&c1], &[("k", "x")]);

        let main = Store::main(&repo).unwrap();
        main.fast_forward(&c1, None, None).unwrap();
        main.fast_forward(&c2, None, None).unwrap();
        assert_eq!(main.get_head().unwrap(), c2);
        assert!(matches!(main.fast_forward(&c2, None, None), Err(FastForwardError::NoChange)));
        assert!(matches!(main.fast_forward(&other, None, None), Err(FastForwardError::Rejected)));
        assert!(matches!(main.fast_forward(&c1, None, None), Err(FastForwardError::Rejected)));
        assert_eq!(main.get_head().unwrap(), c2);
    }

    #[test]
    fn store_level_lcas() {
        let repo = Repository::in_memory();
        let main = Store::main(&repo).unwrap();
        main.set(&path("k"), "0", &opts()).unwrap();
        let fork = main.get_head().unwrap();
        let feature = main.clone_to("feature").unwrap();
        main.set(&path("k"), "1", &opts()).unwrap();
        feature.set(&path("k"), "2", &opts()).unwrap();

        assert_eq!(main.lcas(&feature).unwrap(), vec![fork.clone()]);
        assert_eq!(main.lcas_with_branch("feature").unwrap(), vec![fork]);
        assert!(main.lcas_with_branch("missing").unwrap().is_empty());
        assert!(Store::empty(&repo).lcas(&main).unwrap().is_empty());
    }

    #[test]
    fn history_depth() {
        let repo = Repository::in_memory();
        let main = Store::main(&repo).unwrap();
        for i in 0..5 {
            main.set(&path("k"), i.to_string(), &opts()).unwrap();
        }
        let full = main.history(None).unwrap();
        assert_eq!(full.len(), 5);
        assert_eq!(full.edges().len(), 4);
        let head = main.get_head().unwrap();
        assert_eq!(full.commits()[0], head);
        assert_eq!(full.parents_of(&head.hash()), head.parents().to_vec());

        let shallow = main.history(Some(1)).unwrap();
        assert_eq!(shallow.len(), 2);
        assert_eq!(shallow.edges().len(), 1);
        assert!(Store::empty(&repo).history(None).unwrap().is_empty());
    }

    #[test]
    fn last_modified_finds_changing_commits() {
        let repo = Repository::in_memory();
        let main = Store::main(&repo).unwrap();
        main.set(&path("k"), "1", &opts()).unwrap();
        let c1 = main.get_head().unwrap();
        main.set(&path("other"), "x", &opts()).unwrap();
        main.set(&path("k"), "2", &opts()).unwrap();
        let c3 = main.get_head().unwrap();
        main.set(&path("other"), "y", &opts()).unwrap();

        assert_eq!(main.last_modified(&path("k"), 1, None).unwrap(), vec![c3.clone()]);
        assert_eq!(main.last_modified(&path("k"), 5, None).unwrap(), vec![c3.clone(), c1]);
        assert_eq!(main.last_modified(&path("k"), 5, Some(1)).unwrap(), vec![c3]);
        assert!(main.last_modified(&path("never"), 5, None).unwrap().is_empty());
    }

    #[test]
    fn last_modified_ignores_metadata_only_changes() {
        let repo = Repository::in_memory();
        let main = Store::main(&repo).unwrap();
        main.set(&path("run"), "script", &opts()).unwrap();
        let created = main.get_head().unwrap();
        main.set_tree(&path("run"), Tree::of_contents("script", Metadata::Executable), &opts())
            .unwrap();
        assert_ne!(main.get_head().unwrap(), created);

        assert_eq!(main.last_modified(&path("run"), 5, None).unwrap(), vec![created]);
    }
}
