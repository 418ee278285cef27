#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

use anyhow::Result;
use clap::Parser;

mod cli;
mod constants;
mod delta;
mod engine;
mod errors;
mod git;
mod github;
mod orchestrator;
mod publish;
mod state;
mod subcommands;
mod tuple;

#[tokio::main]
async fn main() -> Result<()> {
    cli::Cli::parse().run().await
}
