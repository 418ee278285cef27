//! `reset` subcommand.

use crate::{
    constants::STATE_FILE_NAME,
    state::SyncTracker,
    tuple::{RepoRef, SyncTuple},
};
use anyhow::Result;
use clap::Args;
use std::path::PathBuf;

/// CLI arguments for the `reset` subcommand.
///
/// Clearing a tuple's record is the only supported way to move its recorded
/// sha backwards; the tracker itself refuses regressions.
#[derive(Debug, Clone, Eq, PartialEq, Args)]
pub struct ResetCmd {
    /// The target repository of the tuple, as `owner/name`.
    #[arg(long)]
    target: String,
    /// The source repository of the tuple, as `owner/name`.
    #[arg(long)]
    source: String,
    /// The target branch of the tuple.
    #[arg(long)]
    target_branch: String,
    /// The source branch of the tuple.
    #[arg(long)]
    source_branch: String,
    /// Location of the durable sync state store.
    #[arg(long, default_value = STATE_FILE_NAME)]
    state_file: PathBuf,
}

impl ResetCmd {
    /// Run the `reset` subcommand.
    pub fn run(self) -> Result<()> {
        let tuple = SyncTuple {
            source: self.source.parse::<RepoRef>()?,
            target: self.target.parse::<RepoRef>()?,
            source_branch: self.source_branch,
            target_branch: self.target_branch,
        };

        let mut tracker = SyncTracker::load(&self.state_file)?;
        if tracker.reset(&tuple) {
            tracker.write()?;
            println!("Cleared sync state for {tuple}");
        } else {
            println!("No sync state recorded for {tuple}");
        }
        Ok(())
    }
}
