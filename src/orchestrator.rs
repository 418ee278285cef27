//! The orchestrator: wires the accessor, resolver, engine, tracker, and
//! publication controller together for one sync tuple, and fans out over
//! multiple tuples with per-tuple failure isolation.

use crate::{
    delta,
    engine::{self, ConflictDetail},
    errors::{SyncError, SyncResult},
    git::{Credentials, GitWorkspace},
    github::{GitHubClient, PrHandle},
    publish,
    state::{RecordedOutcome, SyncTracker},
    tuple::SyncTuple,
};
use chrono::Utc;
use std::{collections::HashSet, future::Future, path::PathBuf};

/// Per-run parameters, passed explicitly rather than read from ambient
/// global state so runs stay independently testable and parallel-safe.
#[derive(Debug, Clone)]
pub struct RunParams {
    /// Credential for the source (read) and target (write + PR) repositories.
    pub credentials: Credentials,
    /// Location of the durable sync state store.
    pub state_file: PathBuf,
}

/// The result of one sync run.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum SyncOutcome {
    /// No commits to sync; nothing was pushed and no pull request touched.
    NoOp,
    /// Every new commit applied cleanly and was published.
    Clean {
        /// Shas applied, in replay order.
        applied: Vec<String>,
    },
    /// Replay blocked on a conflict; the partial branch was published for
    /// manual triage.
    Conflict {
        /// Shas applied before the conflict.
        applied: Vec<String>,
        /// The commit that failed to apply.
        failing_sha: String,
        /// What went wrong.
        detail: ConflictDetail,
    },
    /// The run failed before publishing anything; the target is untouched.
    Failed {
        /// Human-readable failure description.
        error: String,
    },
}

impl SyncOutcome {
    /// Short label for log and summary lines.
    pub fn label(&self) -> &'static str {
        match self {
            Self::NoOp => "no-op",
            Self::Clean { .. } => "clean",
            Self::Conflict { .. } => "conflict",
            Self::Failed { .. } => "failed",
        }
    }
}

/// Everything the caller learns about one run.
#[derive(Debug, Clone)]
pub struct SyncReport {
    /// The tuple that was synchronized.
    pub tuple: SyncTuple,
    /// How the run ended.
    pub outcome: SyncOutcome,
    /// The pull request opened or updated, when one was.
    pub pull_request: Option<PrHandle>,
}

/// Runs one sync tuple end to end: fetch, resolve delta, replay, publish,
/// record. Errors propagate to the caller; [run_all] converts them into
/// [SyncOutcome::Failed] so sibling tuples are unaffected.
pub async fn run(tuple: SyncTuple, params: &RunParams) -> SyncResult<SyncReport> {
    match run_inner(&tuple, params).await {
        Ok(report) => Ok(report),
        Err(e) => {
            // Best-effort audit trail; the error itself is the result.
            if let Ok(mut tracker) = SyncTracker::load(&params.state_file) {
                tracker.record_failure(&tuple, RecordedOutcome::Failed, Utc::now());
                let _ = tracker.write();
            }
            Err(e)
        }
    }
}

async fn run_inner(tuple: &SyncTuple, params: &RunParams) -> SyncResult<SyncReport> {
    let mut tracker = SyncTracker::load(&params.state_file)?;
    let github = GitHubClient::new(&params.credentials.token, &tuple.target)?;

    let mut workspace = GitWorkspace::materialize(tuple, &params.credentials)?;
    let source_tip = workspace.source_tip()?;

    // The recorded sha is only a hint: when it matches the live source tip
    // there is provably nothing new, so skip the graph walk. Anything else
    // (including a force-pushed upstream) falls through to a fresh
    // ancestor-closure comparison.
    let already_synced = tracker
        .last_synced(tuple)
        .and_then(|r| r.last_synced_sha.as_deref())
        == Some(source_tip.as_str());
    if already_synced {
        tracing::info!(%tuple, "Source tip already synced; nothing to do");
        return Ok(SyncReport {
            tuple: tuple.clone(),
            outcome: SyncOutcome::NoOp,
            pull_request: None,
        });
    }

    let target_tip = workspace.target_tip()?;
    let source_graph = workspace.graph(&source_tip)?;
    let target_graph = workspace.graph(&target_tip)?;
    let delta = delta::resolve(&source_graph, &target_graph);

    if delta.is_empty() {
        tracing::info!(%tuple, "No new commits upstream");
        record_advance(
            &mut tracker,
            tuple,
            &source_tip,
            &source_graph.ancestor_closure(),
            RecordedOutcome::NoOp,
        )?;
        tracker.write()?;
        return Ok(SyncReport {
            tuple: tuple.clone(),
            outcome: SyncOutcome::NoOp,
            pull_request: None,
        });
    }

    tracing::info!(%tuple, commits = delta.len(), "Resolved commit delta");
    workspace.begin_sync_branch(&tuple.sync_branch_name())?;
    let report = engine::replay(delta.clone(), &mut workspace)?;
    let pull_request = publish::publish(tuple, &delta, &report, &workspace, &github).await?;

    let outcome = match &report.blocked {
        None => {
            record_advance(
                &mut tracker,
                tuple,
                &source_tip,
                &source_graph.ancestor_closure(),
                RecordedOutcome::Clean,
            )?;
            SyncOutcome::Clean {
                applied: report.applied.clone(),
            }
        }
        Some((failing, detail)) => {
            tracker.record_failure(tuple, RecordedOutcome::Conflict, Utc::now());
            SyncOutcome::Conflict {
                applied: report.applied.clone(),
                failing_sha: failing.sha.clone(),
                detail: detail.clone(),
            }
        }
    };
    tracker.write()?;

    Ok(SyncReport {
        tuple: tuple.clone(),
        outcome,
        pull_request,
    })
}

/// Records a successful advance of the tracker, tolerating a refused
/// regression: the tracker is an audit trail, so a rewritten upstream whose
/// new tip no longer descends from the recorded sha must not turn an
/// already-published run into a failure. The prior record is kept and the
/// refusal logged; `resync reset` re-anchors the tuple.
fn record_advance(
    tracker: &mut SyncTracker,
    tuple: &SyncTuple,
    sha: &str,
    ancestors_of_sha: &HashSet<String>,
    outcome: RecordedOutcome,
) -> SyncResult<()> {
    match tracker.record_success(tuple, sha, ancestors_of_sha, outcome, Utc::now()) {
        Err(SyncError::SyncStateRegression { stored, proposed }) => {
            tracing::warn!(
                %tuple,
                %stored,
                %proposed,
                "Source tip no longer descends from the recorded sha; keeping prior record. \
                 Use `resync reset` to re-anchor the tuple."
            );
            Ok(())
        }
        other => other,
    }
}

/// Processes several tuples in one invocation. Each tuple yields an
/// independent report; a failure in one never aborts the others.
pub async fn run_all<F, Fut>(tuples: Vec<SyncTuple>, mut runner: F) -> Vec<SyncReport>
where
    F: FnMut(SyncTuple) -> Fut,
    Fut: Future<Output = SyncResult<SyncReport>>,
{
    let mut reports = Vec::with_capacity(tuples.len());
    for tuple in tuples {
        let report = match runner(tuple.clone()).await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!(%tuple, error = %e, "Sync run failed");
                SyncReport {
                    tuple,
                    outcome: SyncOutcome::Failed {
                        error: e.to_string(),
                    },
                    pull_request: None,
                }
            }
        };
        reports.push(report);
    }
    reports
}

#[cfg(test)]
mod test {
    use super::{record_advance, run_all, SyncOutcome, SyncReport};
    use crate::{
        errors::SyncError,
        state::{RecordedOutcome, SyncTracker},
        tuple::SyncTuple,
    };
    use std::collections::HashSet;

    fn tuple(source: &str) -> SyncTuple {
        SyncTuple {
            source: source.parse().unwrap(),
            target: "down/target".parse().unwrap(),
            source_branch: "main".to_string(),
            target_branch: "main".to_string(),
        }
    }

    #[tokio::test]
    async fn failure_in_one_tuple_does_not_abort_siblings() {
        let failing = tuple("up/a");
        let healthy = tuple("up/b");

        let reports = run_all(vec![failing, healthy], |t| async move {
            if t.source.name == "a" {
                Err(SyncError::NotFound("fetch of up/a: gone".to_string()))
            } else {
                Ok(SyncReport {
                    tuple: t,
                    outcome: SyncOutcome::Clean {
                        applied: vec!["c1".to_string()],
                    },
                    pull_request: None,
                })
            }
        })
        .await;

        assert_eq!(reports.len(), 2);
        assert!(matches!(reports[0].outcome, SyncOutcome::Failed { .. }));
        assert!(matches!(reports[1].outcome, SyncOutcome::Clean { .. }));

        // The failure carries the taxonomy's description.
        if let SyncOutcome::Failed { error } = &reports[0].outcome {
            assert!(error.contains("Not found"));
        }
    }

    #[tokio::test]
    async fn reports_preserve_tuple_order() {
        let tuples = vec![tuple("up/one"), tuple("up/two"), tuple("up/three")];
        let reports = run_all(tuples.clone(), |t| async move {
            Ok(SyncReport {
                tuple: t,
                outcome: SyncOutcome::NoOp,
                pull_request: None,
            })
        })
        .await;

        let names: Vec<&str> = reports.iter().map(|r| r.tuple.source.name.as_str()).collect();
        assert_eq!(names, vec!["one", "two", "three"]);
    }

    #[test]
    fn regression_refusal_does_not_fail_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let mut tracker = SyncTracker::load(&dir.path().join("state.toml")).unwrap();
        let tuple = tuple("up/source");

        let closure = |shas: &[&str]| -> HashSet<String> {
            shas.iter().map(|s| s.to_string()).collect()
        };

        tracker
            .record_success(
                &tuple,
                "b",
                &closure(&["a", "b"]),
                RecordedOutcome::Clean,
                chrono::Utc::now(),
            )
            .unwrap();

        // Upstream was force-pushed: "c" does not descend from "b". The
        // advance is absorbed, not surfaced as a run failure.
        record_advance(
            &mut tracker,
            &tuple,
            "c",
            &closure(&["a", "c"]),
            RecordedOutcome::Clean,
        )
        .unwrap();

        // The prior record is preserved for the operator to reset.
        let record = tracker.last_synced(&tuple).unwrap();
        assert_eq!(record.last_synced_sha.as_deref(), Some("b"));
    }

    #[test]
    fn record_advance_still_advances_descendants() {
        let dir = tempfile::tempdir().unwrap();
        let mut tracker = SyncTracker::load(&dir.path().join("state.toml")).unwrap();
        let tuple = tuple("up/source");

        let mut closure = HashSet::new();
        closure.insert("a".to_string());
        record_advance(&mut tracker, &tuple, "a", &closure, RecordedOutcome::Clean).unwrap();

        closure.insert("b".to_string());
        record_advance(&mut tracker, &tuple, "b", &closure, RecordedOutcome::Clean).unwrap();

        let record = tracker.last_synced(&tuple).unwrap();
        assert_eq!(record.last_synced_sha.as_deref(), Some("b"));
    }

    #[test]
    fn outcome_labels() {
        assert_eq!(SyncOutcome::NoOp.label(), "no-op");
        assert_eq!(
            SyncOutcome::Failed {
                error: "x".to_string()
            }
            .label(),
            "failed"
        );
    }
}
