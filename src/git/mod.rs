//! The git side of the repository accessor: scoped working copies, history
//! materialization, commit replay, and pushes.

use crate::{
    constants::{SOURCE_REMOTE, TARGET_REMOTE},
    delta::{CommitGraph, CommitInfo},
    engine::{Applied, CommitApplier, ConflictDetail},
    errors::{SyncError, SyncResult},
    tuple::SyncTuple,
};
use git2::{
    build::{CheckoutBuilder, RepoBuilder},
    CherrypickOptions, Cred, ErrorClass, ErrorCode, FetchOptions, Oid, PushOptions,
    RemoteCallbacks, Repository, ResetType,
};
use std::cell::RefCell;
use tempfile::TempDir;

/// The credential used for all remote operations: read on the source
/// repository, write and pull-request access on the target.
#[derive(Debug, Clone)]
pub struct Credentials {
    /// A GitHub personal access token.
    pub token: String,
}

/// A working copy of the target repository, checked out into a temporary
/// directory that is deleted on drop — on every exit path, conflict and
/// failure included. Exclusively owned by one sync run.
pub struct GitWorkspace {
    repo: Repository,
    credentials: Credentials,
    source_branch: String,
    target_branch: String,
    // Held for its Drop; removing the directory releases the working copy.
    _dir: TempDir,
}

impl GitWorkspace {
    /// Clones the target repository into a temporary directory, adds the
    /// source repository as the `source` remote, and fetches the source
    /// branch. The source repository is only ever read from.
    pub fn materialize(tuple: &SyncTuple, credentials: &Credentials) -> SyncResult<Self> {
        let dir = TempDir::new()?;

        tracing::info!(repo = %tuple.target, branch = %tuple.target_branch, "Cloning target repository");
        let mut fetch_opts = FetchOptions::new();
        fetch_opts.remote_callbacks(callbacks(credentials));
        let repo = RepoBuilder::new()
            .branch(&tuple.target_branch)
            .fetch_options(fetch_opts)
            .clone(&tuple.target.clone_url(), dir.path())
            .map_err(|e| classify(e, &format!("clone of {}", tuple.target)))?;

        tracing::info!(repo = %tuple.source, branch = %tuple.source_branch, "Fetching source branch");
        {
            let mut remote = repo.remote(SOURCE_REMOTE, &tuple.source.clone_url())?;
            let refspec = format!(
                "refs/heads/{0}:refs/remotes/{1}/{0}",
                tuple.source_branch, SOURCE_REMOTE
            );
            let mut fetch_opts = FetchOptions::new();
            fetch_opts.remote_callbacks(callbacks(credentials));
            remote
                .fetch(&[refspec.as_str()], Some(&mut fetch_opts), None)
                .map_err(|e| classify(e, &format!("fetch of {}", tuple.source)))?;
        }

        Ok(Self {
            repo,
            credentials: credentials.clone(),
            source_branch: tuple.source_branch.clone(),
            target_branch: tuple.target_branch.clone(),
            _dir: dir,
        })
    }

    /// Returns the sha of the target branch tip.
    pub fn target_tip(&self) -> SyncResult<String> {
        self.tip(&format!("refs/heads/{}", self.target_branch))
    }

    /// Returns the sha of the fetched source branch tip.
    pub fn source_tip(&self) -> SyncResult<String> {
        self.tip(&format!(
            "refs/remotes/{}/{}",
            SOURCE_REMOTE, self.source_branch
        ))
    }

    fn tip(&self, refname: &str) -> SyncResult<String> {
        self.repo
            .refname_to_id(refname)
            .map(|oid| oid.to_string())
            .map_err(|e| classify(e, refname))
    }

    /// Walks the full ancestry of `tip_sha` and materializes it as a
    /// [CommitGraph] for the delta resolver.
    pub fn graph(&self, tip_sha: &str) -> SyncResult<CommitGraph> {
        let oid = Oid::from_str(tip_sha)?;
        let mut walk = self.repo.revwalk()?;
        walk.push(oid)?;

        let mut commits = Vec::new();
        for id in walk {
            let commit = self.repo.find_commit(id?)?;
            commits.push(commit_info(&commit));
        }

        Ok(CommitGraph::new(tip_sha.to_string(), commits))
    }

    /// Creates (or resets) the sync branch at the target tip and checks it
    /// out, so replayed commits land on top of the target branch.
    pub fn begin_sync_branch(&self, branch_name: &str) -> SyncResult<()> {
        let tip = self.repo.refname_to_id(&format!(
            "refs/heads/{}",
            self.target_branch
        ))?;
        let tip_commit = self.repo.find_commit(tip)?;
        self.repo.branch(branch_name, &tip_commit, true)?;
        self.repo
            .set_head(&format!("refs/heads/{branch_name}"))?;
        self.repo
            .checkout_head(Some(CheckoutBuilder::new().force()))?;
        Ok(())
    }

    /// Pushes `branch_name` to the target repository.
    ///
    /// Without `force`, a non-fast-forward update is rejected by the remote
    /// and surfaces as [SyncError::PushRejected], leaving the remote branch
    /// unchanged.
    pub fn push(&self, branch_name: &str, force: bool) -> SyncResult<()> {
        let mut remote = self.repo.find_remote(TARGET_REMOTE)?;
        let refspec = if force {
            format!("+refs/heads/{branch_name}:refs/heads/{branch_name}")
        } else {
            format!("refs/heads/{branch_name}:refs/heads/{branch_name}")
        };

        let rejection: RefCell<Option<String>> = RefCell::new(None);
        {
            let mut cbs = callbacks(&self.credentials);
            cbs.push_update_reference(|refname, status| {
                if let Some(message) = status {
                    *rejection.borrow_mut() = Some(format!("{refname}: {message}"));
                }
                Ok(())
            });
            let mut push_opts = PushOptions::new();
            push_opts.remote_callbacks(cbs);

            tracing::info!(branch = %branch_name, force, "Pushing sync branch");
            remote
                .push(&[refspec.as_str()], Some(&mut push_opts))
                .map_err(|e| classify(e, &format!("push of {branch_name}")))?;
        }

        if let Some(message) = rejection.into_inner() {
            return Err(SyncError::PushRejected(message));
        }
        Ok(())
    }
}

impl CommitApplier for GitWorkspace {
    /// Cherry-picks one source commit onto the checked-out sync branch,
    /// preserving the upstream author and committer so replaying the same
    /// delta onto the same base reproduces identical commits.
    ///
    /// On conflict the working copy is unwound to its pre-pick state and the
    /// conflicting paths are reported.
    fn apply(&mut self, commit: &CommitInfo) -> SyncResult<Applied> {
        let oid = Oid::from_str(&commit.sha)?;
        let upstream = self.repo.find_commit(oid)?;

        let mut opts = CherrypickOptions::new();
        if upstream.parent_count() > 1 {
            // Replay merge commits against their first parent.
            opts.mainline(1);
        }
        self.repo.cherrypick(&upstream, Some(&mut opts))?;

        let mut index = self.repo.index()?;
        if index.has_conflicts() {
            let paths = index
                .conflicts()?
                .filter_map(|conflict| {
                    let conflict = conflict.ok()?;
                    let entry = conflict.our.or(conflict.their).or(conflict.ancestor)?;
                    Some(String::from_utf8_lossy(&entry.path).into_owned())
                })
                .collect();

            // Unwind the failed pick so the working copy stays consistent.
            let head = self.repo.head()?.peel_to_commit()?;
            self.repo
                .reset(head.as_object(), ResetType::Hard, None)?;
            self.repo.cleanup_state()?;

            return Ok(Applied::Conflicted(ConflictDetail {
                message: commit.summary().to_string(),
                paths,
            }));
        }

        let tree_oid = index.write_tree()?;
        let tree = self.repo.find_tree(tree_oid)?;
        let head = self.repo.head()?.peel_to_commit()?;
        let message = cherry_pick_message(commit);
        self.repo.commit(
            Some("HEAD"),
            &upstream.author(),
            &upstream.committer(),
            &message,
            &tree,
            &[&head],
        )?;
        self.repo.cleanup_state()?;

        Ok(Applied::Clean)
    }
}

/// Builds remote callbacks that authenticate with the given token over HTTPS.
fn callbacks(credentials: &Credentials) -> RemoteCallbacks<'_> {
    let token = credentials.token.clone();
    let mut cbs = RemoteCallbacks::new();
    cbs.credentials(move |_url, username_from_url, allowed| {
        if allowed.is_user_pass_plaintext() {
            return Cred::userpass_plaintext(
                username_from_url.unwrap_or("x-access-token"),
                &token,
            );
        }
        Cred::default()
    });
    cbs
}

/// Maps a [git2::Error] into the sync error taxonomy.
///
/// A missing repository over HTTPS surfaces from libgit2 as a generic
/// [ErrorClass::Http] error rather than [ErrorCode::NotFound], so the
/// message is inspected for a 404 before falling back to transient.
fn classify(e: git2::Error, context: &str) -> SyncError {
    match (e.class(), e.code()) {
        (_, ErrorCode::Auth) => SyncError::AuthFailure(format!("{context}: {e}")),
        (_, ErrorCode::NotFound) => SyncError::NotFound(format!("{context}: {e}")),
        (ErrorClass::Http, _) if is_http_not_found(e.message()) => {
            SyncError::NotFound(format!("{context}: {e}"))
        }
        (ErrorClass::Net | ErrorClass::Http | ErrorClass::Ssh, _) => {
            SyncError::Transient(format!("{context}: {e}"))
        }
        _ => SyncError::Git(e),
    }
}

fn is_http_not_found(message: &str) -> bool {
    message.contains("404") || message.to_ascii_lowercase().contains("not found")
}

/// Renders the replayed commit message, recording the provenance of the pick
/// the way `git cherry-pick -x` does.
fn cherry_pick_message(commit: &CommitInfo) -> String {
    let mut message = commit.message.clone();
    if !message.ends_with('\n') {
        message.push('\n');
    }
    message.push_str(&format!("\n(cherry picked from commit {})\n", commit.sha));
    message
}

fn commit_info(commit: &git2::Commit<'_>) -> CommitInfo {
    CommitInfo {
        sha: commit.id().to_string(),
        parent_shas: commit.parent_ids().map(|p| p.to_string()).collect(),
        author_name: commit.author().name().unwrap_or_default().to_string(),
        author_email: commit.author().email().unwrap_or_default().to_string(),
        timestamp: commit.time().seconds(),
        message: commit.message().unwrap_or_default().to_string(),
    }
}

#[cfg(test)]
mod test {
    use super::{cherry_pick_message, classify};
    use crate::{delta::CommitInfo, errors::SyncError};
    use git2::{ErrorClass, ErrorCode};

    #[test]
    fn http_404_classifies_as_not_found() {
        let e = git2::Error::new(
            ErrorCode::GenericError,
            ErrorClass::Http,
            "unexpected http status code: 404",
        );
        assert!(matches!(
            classify(e, "clone of acme/gone"),
            SyncError::NotFound(_)
        ));
    }

    #[test]
    fn other_http_errors_stay_transient() {
        let e = git2::Error::new(
            ErrorCode::GenericError,
            ErrorClass::Http,
            "unexpected http status code: 502",
        );
        assert!(matches!(
            classify(e, "fetch of up/source"),
            SyncError::Transient(_)
        ));
    }

    #[test]
    fn auth_rejection_classifies_as_auth_failure() {
        let e = git2::Error::new(
            ErrorCode::Auth,
            ErrorClass::Http,
            "too many redirects or authentication replays",
        );
        assert!(matches!(
            classify(e, "push of sync/source-to-target"),
            SyncError::AuthFailure(_)
        ));
    }

    #[test]
    fn cherry_pick_message_records_provenance() {
        let commit = CommitInfo {
            sha: "abc123".to_string(),
            parent_shas: Vec::new(),
            author_name: "Author".to_string(),
            author_email: "author@example.com".to_string(),
            timestamp: 0,
            message: "Fix the widget".to_string(),
        };
        assert_eq!(
            cherry_pick_message(&commit),
            "Fix the widget\n\n(cherry picked from commit abc123)\n"
        );
    }
}
