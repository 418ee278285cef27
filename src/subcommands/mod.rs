//! The subcommands for the `resync` application.

use clap::Subcommand;
use reset::ResetCmd;
use run::RunCmd;

mod reset;
mod run;

#[derive(Debug, Clone, Eq, PartialEq, Subcommand)]
pub enum Subcommands {
    /// Synchronize one or more repository pairs and publish the results.
    #[clap(alias = "r")]
    Run(RunCmd),
    /// Clear the recorded sync state for a repository pair (operator reset).
    Reset(ResetCmd),
}

impl Subcommands {
    /// Run the subcommand.
    pub async fn run(self) -> anyhow::Result<()> {
        match self {
            Self::Run(cmd) => cmd.run().await,
            Self::Reset(cmd) => cmd.run(),
        }
    }
}
