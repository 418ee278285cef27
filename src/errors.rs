//! Error types for the `resync` application.

use thiserror::Error;

/// Errors that can occur while synchronizing a repository pair.
///
/// Conflicts during commit replay are deliberately *not* part of this enum —
/// a conflict is a reportable outcome ([crate::orchestrator::SyncOutcome::Conflict]),
/// not a failure of the run.
#[derive(Error, Debug)]
pub enum SyncError {
    /// A repository or branch could not be found.
    #[error("Not found: {0}")]
    NotFound(String),
    /// The supplied credential was rejected.
    #[error("Credential rejected: {0}")]
    AuthFailure(String),
    /// A push was rejected because it was not a fast-forward.
    #[error("Push rejected (non-fast-forward): {0}")]
    PushRejected(String),
    /// A network operation failed transiently; the next scheduled run retries.
    #[error("Transient network failure: {0}")]
    Transient(String),
    /// A repository identifier was not of the form `owner/name`.
    #[error("Malformed repository identifier `{0}`, expected `owner/name`")]
    MalformedRepoRef(String),
    /// The state store refused to move a recorded sha backwards.
    #[error(
        "Refusing to regress last-synced sha from `{stored}` to `{proposed}`. \
         Use `resync reset` to clear the record."
    )]
    SyncStateRegression {
        /// The sha currently recorded for the tuple.
        stored: String,
        /// The proposed replacement, which is not a descendant of `stored`.
        proposed: String,
    },
    /// The state store could not be read or written.
    #[error("State store error: {0}")]
    State(String),
    /// A [git2::Error] occurred.
    #[error("libgit2 error: {0}")]
    Git(#[from] git2::Error),
    /// An [octocrab::Error] occurred.
    #[error("GitHub API error: {0}")]
    GitHub(#[from] octocrab::Error),
    /// An [std::io::Error] occurred.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type SyncResult<T> = Result<T, SyncError>;
