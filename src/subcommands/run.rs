//! `run` subcommand.

use crate::{
    constants::STATE_FILE_NAME,
    git::Credentials,
    orchestrator::{self, RunParams, SyncOutcome},
    tuple::{RepoRef, SyncTuple},
};
use anyhow::{anyhow, bail, Result};
use clap::Args;
use serde::Deserialize;
use std::{env, path::PathBuf};

/// CLI arguments for the `run` subcommand.
#[derive(Debug, Clone, Eq, PartialEq, Args)]
pub struct RunCmd {
    /// The repository changes are applied to, as `owner/name`.
    #[arg(long, required_unless_present = "config", conflicts_with = "config")]
    target: Option<String>,
    /// The repository commits are replayed from, as `owner/name`.
    #[arg(long, required_unless_present = "config", conflicts_with = "config")]
    source: Option<String>,
    /// The branch in the target repository to sync into.
    #[arg(long, required_unless_present = "config", conflicts_with = "config")]
    target_branch: Option<String>,
    /// The branch in the source repository to replay from.
    #[arg(long, required_unless_present = "config", conflicts_with = "config")]
    source_branch: Option<String>,
    /// A TOML file with `[[sync]]` entries describing several repository pairs.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Location of the durable sync state store.
    #[arg(long, default_value = STATE_FILE_NAME)]
    state_file: PathBuf,
}

/// The shape of the `--config` file.
#[derive(Debug, Deserialize)]
struct ConfigFile {
    sync: Vec<SyncTuple>,
}

impl RunCmd {
    /// Run the `run` subcommand.
    pub async fn run(self) -> Result<()> {
        let token = env::var("GITHUB_TOKEN")
            .map_err(|_| anyhow!("GITHUB_TOKEN environment variable must be set"))?;

        let tuples = self.tuples()?;
        let params = RunParams {
            credentials: Credentials { token },
            state_file: self.state_file.clone(),
        };

        let reports = orchestrator::run_all(tuples, |tuple| orchestrator::run(tuple, &params)).await;

        let mut failed = 0usize;
        for report in &reports {
            match &report.pull_request {
                Some(pr) => println!("{} [{}] {}", report.tuple, report.outcome.label(), pr.url),
                None => println!("{} [{}]", report.tuple, report.outcome.label()),
            }
            if matches!(report.outcome, SyncOutcome::Failed { .. }) {
                failed += 1;
            }
        }

        if failed > 0 {
            bail!("{failed} of {} sync tuple(s) failed", reports.len());
        }
        Ok(())
    }

    /// Assembles the tuples to process, from the config file or the flags.
    fn tuples(&self) -> Result<Vec<SyncTuple>> {
        if let Some(path) = &self.config {
            let raw = std::fs::read_to_string(path)?;
            let file: ConfigFile = toml::from_str(&raw)?;
            if file.sync.is_empty() {
                bail!("Config file contains no [[sync]] entries.");
            }
            return Ok(file.sync);
        }

        let flag = |value: &Option<String>, name: &str| {
            value
                .clone()
                .ok_or_else(|| anyhow!("--{name} is required without --config"))
        };
        let source: RepoRef = flag(&self.source, "source")?.parse()?;
        let target: RepoRef = flag(&self.target, "target")?.parse()?;
        Ok(vec![SyncTuple {
            source,
            target,
            source_branch: flag(&self.source_branch, "source-branch")?,
            target_branch: flag(&self.target_branch, "target-branch")?,
        }])
    }
}

#[cfg(test)]
mod test {
    use super::ConfigFile;

    #[test]
    fn parses_config_file() {
        let raw = r#"
            [[sync]]
            target = "acme/enterprise-pkgs"
            source = "upstream/pkgs"
            target-branch = "main"
            source-branch = "main"

            [[sync]]
            target = "acme/enterprise-docs"
            source = "upstream/docs"
            target-branch = "stable"
            source-branch = "develop"
        "#;
        let file: ConfigFile = toml::from_str(raw).unwrap();

        assert_eq!(file.sync.len(), 2);
        assert_eq!(file.sync[0].source.to_string(), "upstream/pkgs");
        assert_eq!(file.sync[1].source_branch, "develop");
        assert_eq!(file.sync[1].target_branch, "stable");
    }

    #[test]
    fn rejects_malformed_repo_in_config() {
        let raw = r#"
            [[sync]]
            target = "not-a-repo"
            source = "upstream/pkgs"
            target-branch = "main"
            source-branch = "main"
        "#;
        assert!(toml::from_str::<ConfigFile>(raw).is_err());
    }
}
