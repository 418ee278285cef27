//! Identifiers for the repositories and branches involved in one sync run.

use crate::{
    constants::SYNC_BRANCH_PREFIX,
    errors::{SyncError, SyncResult},
};
use serde::{Deserialize, Serialize};
use std::{fmt::Display, str::FromStr};

/// An immutable identifier for one remote repository, in `owner/name` form.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepoRef {
    /// The owner (user or organization) of the repository.
    pub owner: String,
    /// The name of the repository.
    pub name: String,
}

impl RepoRef {
    /// Returns the HTTPS clone URL for the repository.
    pub fn clone_url(&self) -> String {
        format!("https://github.com/{}/{}.git", self.owner, self.name)
    }
}

impl FromStr for RepoRef {
    type Err = SyncError;

    fn from_str(s: &str) -> SyncResult<Self> {
        let (owner, name) = s
            .split_once('/')
            .ok_or_else(|| SyncError::MalformedRepoRef(s.to_string()))?;
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return Err(SyncError::MalformedRepoRef(s.to_string()));
        }
        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }
}

impl Display for RepoRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

impl TryFrom<String> for RepoRef {
    type Error = SyncError;

    fn try_from(value: String) -> SyncResult<Self> {
        value.parse()
    }
}

impl From<RepoRef> for String {
    fn from(value: RepoRef) -> Self {
        value.to_string()
    }
}

/// The (source repo, target repo, source branch, target branch) tuple that
/// identifies one synchronization task.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SyncTuple {
    /// The repository commits are replayed from. Never written to.
    pub source: RepoRef,
    /// The repository commits are replayed into.
    pub target: RepoRef,
    /// The branch of `source` to read from.
    pub source_branch: String,
    /// The branch of `target` to sync into.
    pub target_branch: String,
}

impl SyncTuple {
    /// Returns the deterministic name of the branch the sync result is pushed
    /// to. Stable across runs, so repeated syncs update the same branch and
    /// pull request instead of creating new ones. Branch-qualified when the
    /// source and target branch names differ, so distinct tuples over the
    /// same repository pair cannot collide.
    pub fn sync_branch_name(&self) -> String {
        if self.source_branch == self.target_branch {
            format!(
                "{}/{}-to-{}",
                SYNC_BRANCH_PREFIX, self.source.name, self.target.name
            )
        } else {
            format!(
                "{}/{}-{}-to-{}-{}",
                SYNC_BRANCH_PREFIX,
                self.source.name,
                self.source_branch,
                self.target.name,
                self.target_branch
            )
        }
    }

    /// Returns the stable key under which this tuple's [SyncRecord] is stored.
    ///
    /// [SyncRecord]: crate::state::SyncRecord
    pub fn state_key(&self) -> String {
        format!(
            "{}#{} -> {}#{}",
            self.source, self.source_branch, self.target, self.target_branch
        )
    }
}

impl Display for SyncTuple {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}#{} -> {}#{}",
            self.source, self.source_branch, self.target, self.target_branch
        )
    }
}

#[cfg(test)]
mod test {
    use super::{RepoRef, SyncTuple};

    fn tuple(source: &str, target: &str, source_branch: &str, target_branch: &str) -> SyncTuple {
        SyncTuple {
            source: source.parse().unwrap(),
            target: target.parse().unwrap(),
            source_branch: source_branch.to_string(),
            target_branch: target_branch.to_string(),
        }
    }

    #[test]
    fn parse_repo_ref() {
        let repo: RepoRef = "acme/widgets".parse().unwrap();
        assert_eq!(repo.owner, "acme");
        assert_eq!(repo.name, "widgets");
        assert_eq!(repo.to_string(), "acme/widgets");
        assert_eq!(repo.clone_url(), "https://github.com/acme/widgets.git");
    }

    #[test]
    fn reject_malformed_repo_ref() {
        assert!("acme".parse::<RepoRef>().is_err());
        assert!("/widgets".parse::<RepoRef>().is_err());
        assert!("acme/".parse::<RepoRef>().is_err());
        assert!("acme/widgets/extra".parse::<RepoRef>().is_err());
    }

    #[test]
    fn sync_branch_name_is_stable() {
        let t = tuple("up/source", "down/target", "main", "main");
        assert_eq!(t.sync_branch_name(), "sync/source-to-target");
        // A second derivation yields the same name.
        assert_eq!(t.sync_branch_name(), "sync/source-to-target");
    }

    #[test]
    fn sync_branch_name_qualifies_differing_branches() {
        let t = tuple("up/source", "down/target", "develop", "main");
        assert_eq!(t.sync_branch_name(), "sync/source-develop-to-target-main");
    }

    #[test]
    fn state_key_distinguishes_branch_pairs() {
        let a = tuple("up/source", "down/target", "main", "main");
        let b = tuple("up/source", "down/target", "develop", "develop");
        assert_ne!(a.state_key(), b.state_key());
    }
}
