//! Commit history graphs and the delta resolver.
//!
//! The resolver is pure: it operates on an in-memory [CommitGraph]
//! materialized by the git layer, so the delta properties can be exercised
//! without a repository. The delta is recomputed from a live ancestor-closure
//! comparison every run — upstream history may be force-pushed, so any cached
//! "last synced" sha is only ever a hint, never the source of truth.

use std::collections::{HashMap, HashSet, VecDeque};

/// An immutable view of a single commit, as observed at run start.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CommitInfo {
    /// The full hex sha of the commit.
    pub sha: String,
    /// The shas of the commit's parents, in parent order.
    pub parent_shas: Vec<String>,
    /// The author's name.
    pub author_name: String,
    /// The author's email.
    pub author_email: String,
    /// The commit time, in seconds since the epoch.
    pub timestamp: i64,
    /// The full commit message.
    pub message: String,
}

impl CommitInfo {
    /// Returns the first line of the commit message.
    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or_default()
    }

    /// Returns the abbreviated sha used in user-facing output.
    pub fn short_sha(&self) -> &str {
        let end = self.sha.len().min(8);
        &self.sha[..end]
    }
}

/// The ancestry graph of one branch: every commit reachable from the branch
/// tip, keyed by sha.
#[derive(Debug, Clone)]
pub struct CommitGraph {
    tip: String,
    commits: HashMap<String, CommitInfo>,
}

impl CommitGraph {
    /// Creates a graph from a branch tip and the commits reachable from it.
    pub fn new(tip: String, commits: impl IntoIterator<Item = CommitInfo>) -> Self {
        Self {
            tip,
            commits: commits.into_iter().map(|c| (c.sha.clone(), c)).collect(),
        }
    }

    /// Returns the sha of the branch tip.
    pub fn tip_sha(&self) -> &str {
        &self.tip
    }

    /// Returns the commit with the given sha, if present in the graph.
    pub fn get(&self, sha: &str) -> Option<&CommitInfo> {
        self.commits.get(sha)
    }

    /// Returns the full set of shas reachable from the tip by following
    /// parent links, the tip included.
    pub fn ancestor_closure(&self) -> HashSet<String> {
        let mut closure = HashSet::new();
        let mut frontier = VecDeque::from([self.tip.clone()]);

        while let Some(sha) = frontier.pop_front() {
            if !closure.insert(sha.clone()) {
                continue;
            }
            if let Some(commit) = self.commits.get(&sha) {
                frontier.extend(commit.parent_shas.iter().cloned());
            }
        }

        closure
    }
}

/// Computes the ordered set of commits reachable from the source tip but not
/// reachable from the target tip, oldest-first so the result can be replayed
/// in ancestry order.
///
/// Walking a lineage stops as soon as a commit in the target's ancestor
/// closure is reached — everything further back is already shared. A merge
/// commit expands all parent lineages; a commit is shared only if it is
/// itself in the closure, not merely reachable through one shared path.
pub fn resolve(source: &CommitGraph, target: &CommitGraph) -> Vec<CommitInfo> {
    let shared = target.ancestor_closure();

    // Source tip already reachable from the target tip: nothing to replay.
    if shared.contains(source.tip_sha()) {
        return Vec::new();
    }

    // Iterative depth-first post-order from the source tip, visiting parents
    // before children, which yields a valid replay (topological) order.
    let mut ordered = Vec::new();
    let mut visited = HashSet::new();
    let mut stack = vec![(source.tip_sha().to_string(), false)];

    while let Some((sha, expanded)) = stack.pop() {
        if shared.contains(&sha) {
            continue;
        }
        let Some(commit) = source.get(&sha) else {
            // Parent beyond the fetched history; treat as a shared boundary.
            continue;
        };
        if expanded {
            ordered.push(commit.clone());
            continue;
        }
        if !visited.insert(sha.clone()) {
            continue;
        }
        stack.push((sha, true));
        for parent in commit.parent_shas.iter().rev() {
            stack.push((parent.clone(), false));
        }
    }

    ordered
}
