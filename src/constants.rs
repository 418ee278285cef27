//! Constants for the `resync` application.

/// Default on-disk location of the sync state store.
pub(crate) const STATE_FILE_NAME: &str = ".resync-state.toml";

/// Name given to the upstream remote in the working copy.
pub(crate) const SOURCE_REMOTE: &str = "source";

/// Name of the remote the working copy was cloned from (the target repository).
pub(crate) const TARGET_REMOTE: &str = "origin";

/// Prefix for deterministically-named sync branches.
pub(crate) const SYNC_BRANCH_PREFIX: &str = "sync";

/// Title prefix for pull requests that carry an unresolved conflict.
pub(crate) const CONFLICT_TITLE_PREFIX: &str = "[conflict]";
