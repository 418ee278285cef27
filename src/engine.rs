//! The apply engine: a state machine that replays a resolved commit delta
//! onto the working copy, halting at the first conflict.

use crate::{delta::CommitInfo, errors::SyncResult};
use std::collections::VecDeque;

/// Detail about a commit that failed to apply cleanly.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ConflictDetail {
    /// The summary line of the failing commit.
    pub message: String,
    /// The paths left in a conflicted state, when the applier can name them.
    pub paths: Vec<String>,
}

/// The result of applying a single commit to the working copy.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Applied {
    /// The commit applied cleanly and is now part of the working copy.
    Clean,
    /// The commit could not be applied; the working copy was unwound.
    Conflicted(ConflictDetail),
}

/// The seam between the engine and the git layer. Implemented by
/// [GitWorkspace] in production and by stubs in tests.
///
/// [GitWorkspace]: crate::git::GitWorkspace
pub trait CommitApplier {
    /// Attempts to apply one commit, preserving authorship.
    fn apply(&mut self, commit: &CommitInfo) -> SyncResult<Applied>;
}

/// The states of the replay state machine.
///
/// Replay is strictly ordered: later commits in the delta may assume the
/// changes of earlier ones, so the first conflict transitions to [Blocked]
/// and no further commits are attempted.
///
/// [Blocked]: EngineState::Blocked
#[derive(Debug)]
pub enum EngineState {
    /// Commits remaining to be applied, oldest first.
    Pending(VecDeque<CommitInfo>),
    /// One commit in flight, with the remainder queued behind it.
    Applying(CommitInfo, VecDeque<CommitInfo>),
    /// Terminal: every commit in the delta applied cleanly.
    Applied(Vec<String>),
    /// Terminal: a commit conflicted; replay stopped.
    Blocked {
        /// Shas applied before the conflict, in replay order.
        applied: Vec<String>,
        /// The commit that failed to apply.
        failing: CommitInfo,
        /// What went wrong.
        detail: ConflictDetail,
    },
}

/// The outcome of a full replay.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ApplyReport {
    /// Shas applied cleanly, in replay order.
    pub applied: Vec<String>,
    /// The first failing commit and its conflict detail, if replay blocked.
    pub blocked: Option<(CommitInfo, ConflictDetail)>,
}

impl ApplyReport {
    /// Whether every commit in the delta was applied.
    pub fn is_clean(&self) -> bool {
        self.blocked.is_none()
    }
}

/// Drives the state machine over the delta. An empty delta is trivially
/// [EngineState::Applied].
pub fn replay(delta: Vec<CommitInfo>, applier: &mut dyn CommitApplier) -> SyncResult<ApplyReport> {
    let mut applied = Vec::with_capacity(delta.len());
    let mut state = EngineState::Pending(delta.into());

    loop {
        state = match state {
            EngineState::Pending(mut remaining) => match remaining.pop_front() {
                Some(next) => EngineState::Applying(next, remaining),
                None => EngineState::Applied(std::mem::take(&mut applied)),
            },
            EngineState::Applying(current, remaining) => {
                tracing::info!(sha = %current.sha, summary = %current.summary(), "Applying commit");
                match applier.apply(&current)? {
                    Applied::Clean => {
                        applied.push(current.sha);
                        EngineState::Pending(remaining)
                    }
                    Applied::Conflicted(detail) => {
                        tracing::warn!(sha = %current.sha, "Conflict detected; halting replay");
                        EngineState::Blocked {
                            applied: std::mem::take(&mut applied),
                            failing: current,
                            detail,
                        }
                    }
                }
            }
            EngineState::Applied(applied) => {
                return Ok(ApplyReport {
                    applied,
                    blocked: None,
                })
            }
            EngineState::Blocked {
                applied,
                failing,
                detail,
            } => {
                return Ok(ApplyReport {
                    applied,
                    blocked: Some((failing, detail)),
                })
            }
        };
    }
}
