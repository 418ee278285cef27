//! The GitHub API side of the repository accessor: opening and updating pull
//! requests on the target repository.

use crate::{errors::SyncResult, tuple::RepoRef};
use octocrab::{params, Octocrab};

/// Whether a run created a fresh pull request or updated an existing one.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum PrState {
    /// A new pull request was opened this run.
    Created,
    /// An open pull request for the same sync branch was updated in place.
    Updated,
}

/// A handle to the pull request that carries a sync result.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PrHandle {
    /// The pull request number on the target repository.
    pub number: u64,
    /// The head branch of the pull request (the sync branch).
    pub branch_name: String,
    /// The browser URL of the pull request.
    pub url: String,
    /// Whether the pull request was created or updated by this run.
    pub state: PrState,
}

/// An authenticated GitHub API client scoped to the target repository.
pub struct GitHubClient {
    inner: Octocrab,
    target: RepoRef,
}

impl GitHubClient {
    /// Builds a client from a personal access token.
    pub fn new(token: &str, target: &RepoRef) -> SyncResult<Self> {
        let inner = Octocrab::builder()
            .personal_token(token.to_string())
            .build()?;
        Ok(Self {
            inner,
            target: target.clone(),
        })
    }

    /// Opens a pull request from `from_branch` into `to_branch`, or updates
    /// the open pull request that already has `from_branch` as its head.
    /// Matching on the head branch is what keeps repeated runs from opening
    /// duplicates for the same sync tuple.
    pub async fn open_or_update_pr(
        &self,
        from_branch: &str,
        to_branch: &str,
        title: &str,
        body: &str,
    ) -> SyncResult<PrHandle> {
        let pulls = self.inner.pulls(&self.target.owner, &self.target.name);

        let open = pulls
            .list()
            .state(params::State::Open)
            .base(to_branch)
            .per_page(100)
            .send()
            .await?;
        let existing = open
            .items
            .into_iter()
            .find(|pr| pr.head.ref_field == from_branch);

        if let Some(pr) = existing {
            tracing::info!(number = pr.number, "Updating existing pull request");
            pulls.update(pr.number).title(title).body(body).send().await?;
            Ok(self.handle(pr.number, from_branch, PrState::Updated))
        } else {
            tracing::info!(head = %from_branch, base = %to_branch, "Opening pull request");
            let pr = pulls
                .create(title, from_branch, to_branch)
                .body(body)
                .send()
                .await?;
            Ok(self.handle(pr.number, from_branch, PrState::Created))
        }
    }

    fn handle(&self, number: u64, branch_name: &str, state: PrState) -> PrHandle {
        PrHandle {
            number,
            branch_name: branch_name.to_string(),
            url: format!(
                "https://github.com/{}/{}/pull/{}",
                self.target.owner, self.target.name, number
            ),
            state,
        }
    }
}
