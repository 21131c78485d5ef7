use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[clap(name = "spotvortex", version, about = "Spot capacity steering agent")]
pub struct Cli {
    /// Decide and log but never mutate cloud or orchestrator state.
    #[clap(
        long,
        global = true,
        action = ArgAction::Set,
        num_args = 0..=1,
        default_value_t = true,
        default_missing_value = "true"
    )]
    pub dry_run: bool,

    /// Lower the default log filter to debug.
    #[clap(long, global = true)]
    pub verbose: bool,

    /// Path to the static configuration document.
    #[clap(long, global = true)]
    pub config: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the controller loop.
    Run,

    /// Run a single forced-dry-run reconcile tick and dump the counters.
    Metrics {
        #[clap(long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}
