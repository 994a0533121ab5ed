//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Mining session analytics for Elite Dangerous.
///
/// Replays journal files through the session tracker and reports prospecting,
/// refining and limpet statistics for each mining session.
#[derive(Debug, Parser)]
#[command(name = "ma", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Replay journal files and summarize each mining session.
    Replay {
        /// Journal files (JSON lines), replayed in the given order.
        #[arg(required_unless_present = "latest")]
        files: Vec<PathBuf>,

        /// Replay the newest journal in the configured journal directory.
        #[arg(long, conflicts_with = "files")]
        latest: bool,

        /// Output as JSON.
        #[arg(long)]
        json: bool,

        /// Store finished sessions in the session history.
        #[arg(long)]
        record: bool,

        /// Look up sell prices for the last session's cargo.
        #[arg(long)]
        prices: bool,
    },

    /// List recorded sessions.
    Sessions {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
}
