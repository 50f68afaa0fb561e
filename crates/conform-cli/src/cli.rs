use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "conform",
    about = "Declarative host configuration via policy reconciliation",
    version
)]
pub struct Cli {
    /// Facts file (key=value lines) loaded into the run environment.
    #[arg(long, env = "CONFORM_FACTS", global = true)]
    pub facts: Option<PathBuf>,

    /// Persistent report database; without it reports are only printed.
    #[arg(long, env = "CONFORM_REPORT_DB", global = true)]
    pub report_db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Reconcile and apply all changes.
    Apply {
        /// Path to the policy manifest.
        policy: PathBuf,
    },

    /// Show what would change without applying (dry run).
    Diff {
        /// Path to the policy manifest.
        policy: PathBuf,
    },

    /// Print the normalized reconcile order and dependency edges.
    Graph {
        /// Path to the policy manifest.
        policy: PathBuf,
    },

    /// Print the wire encoding of every resource in the policy.
    Pack {
        /// Path to the policy manifest.
        policy: PathBuf,
    },
}
