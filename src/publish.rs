//! The publication controller: pushes the sync branch and opens or updates
//! the pull request that surfaces the run's result.

use crate::{
    constants::CONFLICT_TITLE_PREFIX,
    delta::CommitInfo,
    engine::ApplyReport,
    errors::SyncResult,
    git::GitWorkspace,
    github::{GitHubClient, PrHandle},
    tuple::SyncTuple,
};
use std::fmt::Write;

/// Pushes the replayed branch and opens-or-updates its pull request.
///
/// Called for Clean and Blocked outcomes only; NoOp runs never reach this
/// point, so previously open pull requests are left undisturbed. The sync
/// branch is tool-owned, so the push is forced: after the previous pull
/// request merges, the branch must be rebuilt from the new target tip.
pub async fn publish(
    tuple: &SyncTuple,
    delta: &[CommitInfo],
    report: &ApplyReport,
    workspace: &GitWorkspace,
    github: &GitHubClient,
) -> SyncResult<Option<PrHandle>> {
    if !should_publish(report) {
        if let Some((failing, detail)) = &report.blocked {
            // The very first commit in the delta conflicted, so the sync
            // branch is identical to the target tip and the API would refuse
            // a pull request with no commits. The conflict still reaches the
            // caller through the run's outcome.
            tracing::warn!(
                %tuple,
                failing = %failing.short_sha(),
                paths = ?detail.paths,
                "First commit in the delta conflicts; no reviewable branch to publish"
            );
        }
        return Ok(None);
    }

    let branch = tuple.sync_branch_name();
    workspace.push(&branch, true)?;

    let title = pr_title(tuple, report);
    let body = pr_body(tuple, delta, report);
    let handle = github
        .open_or_update_pr(&branch, &tuple.target_branch, &title, &body)
        .await?;

    tracing::info!(url = %handle.url, "Published sync result");
    Ok(Some(handle))
}

/// Whether the replay produced anything reviewable. A blocked replay that
/// applied no commits leaves the sync branch identical to the target tip,
/// and a pull request without commits between base and head is rejected by
/// the API rather than opened.
pub fn should_publish(report: &ApplyReport) -> bool {
    !report.applied.is_empty()
}

/// Renders the pull request title: applied commit count for clean runs, a
/// conflict marker naming the failing commit for blocked ones.
pub fn pr_title(tuple: &SyncTuple, report: &ApplyReport) -> String {
    match &report.blocked {
        None => format!(
            "Sync {} commit{} from {} `{}`",
            report.applied.len(),
            if report.applied.len() == 1 { "" } else { "s" },
            tuple.source,
            tuple.source_branch
        ),
        Some((failing, _)) => format!(
            "{} Sync from {} `{}` blocked at {}",
            CONFLICT_TITLE_PREFIX,
            tuple.source,
            tuple.source_branch,
            failing.short_sha()
        ),
    }
}

/// Renders the pull request body: the replayed range, the applied commits,
/// and — for blocked runs — the conflict that needs manual resolution.
pub fn pr_body(tuple: &SyncTuple, delta: &[CommitInfo], report: &ApplyReport) -> String {
    let mut body = String::new();

    let applied: Vec<&CommitInfo> = delta
        .iter()
        .filter(|c| report.applied.contains(&c.sha))
        .collect();

    if let (Some(first), Some(last)) = (applied.first(), applied.last()) {
        let _ = writeln!(
            body,
            "Replays {} of {} new commit{} (`{}`..`{}`) from `{}#{}` into `{}#{}`.",
            applied.len(),
            delta.len(),
            if delta.len() == 1 { "" } else { "s" },
            first.short_sha(),
            last.short_sha(),
            tuple.source,
            tuple.source_branch,
            tuple.target,
            tuple.target_branch
        );
        body.push('\n');
        for commit in &applied {
            let _ = writeln!(body, "- `{}` {}", commit.short_sha(), commit.summary());
        }
    }

    if let Some((failing, detail)) = &report.blocked {
        body.push('\n');
        let _ = writeln!(body, "## Conflict\n");
        let _ = writeln!(
            body,
            "Commit `{}` ({}) could not be applied automatically and halted the replay.",
            failing.short_sha(),
            detail.message
        );
        if !detail.paths.is_empty() {
            let _ = writeln!(body, "\nConflicting paths:\n");
            for path in &detail.paths {
                let _ = writeln!(body, "- `{path}`");
            }
        }
        let _ = writeln!(
            body,
            "\nResolve the conflict manually on this branch. Commits after the \
             failing one have not been applied."
        );
    }

    body
}
