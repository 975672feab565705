//! Command-line surface.

use clap::{ArgAction, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "pgit",
    version,
    about = "Keep private files under a co-located git repository the primary repo never sees"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase output verbosity (-v for progress, -vv for debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Initialize private tracking in the current repository
    Init,

    /// Track paths privately: move into storage, link back, exclude from the
    /// primary repository, commit to the private one
    Add {
        /// Paths to track, relative to the repository root
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Restore every tracked path and dismantle the tracking layer
    Reset {
        /// Actually perform the reset (required outside --dry-run)
        #[arg(long)]
        force: bool,

        /// Show what a reset would do without mutating anything
        #[arg(long)]
        dry_run: bool,
    },
}
