mod cli;
mod commands;
mod manifest;
mod output;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Command};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Apply { policy } => commands::apply(policy, cli.facts, cli.report_db),
        Command::Diff { policy } => commands::diff(policy, cli.facts, cli.report_db),
        Command::Graph { policy } => commands::graph(policy, cli.facts),
        Command::Pack { policy } => commands::pack(policy),
    }
}
