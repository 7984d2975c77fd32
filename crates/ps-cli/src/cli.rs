//! Command-line argument definitions.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

/// Syncs bolus, basal, and IOB data from a t:connect pump to Nightscout.
#[derive(Debug, Parser)]
#[command(name = "pumpsync", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Sync a window of pump data to Nightscout.
    Sync(SyncArgs),

    /// Verify that the configured t:connect credentials can log in.
    CheckLogin,

    /// Sync repeatedly at a fixed interval.
    Watch {
        /// Seconds between sync attempts.
        #[arg(long, default_value_t = 300)]
        interval: u64,

        /// Pretend mode: plan and report without uploading.
        #[arg(long)]
        pretend: bool,
    },
}

/// Window selection and mode for one sync run.
#[derive(Debug, Args)]
pub struct SyncArgs {
    /// Pretend mode: plan and report without uploading.
    #[arg(long)]
    pub pretend: bool,

    /// Number of days of pump data to read, ending now.
    #[arg(long, default_value_t = 1, conflicts_with_all = ["start_date", "end_date"])]
    pub days: i64,

    /// Oldest date to process (YYYY-MM-DD). Must be used with --end-date.
    #[arg(long, requires = "end_date")]
    pub start_date: Option<NaiveDate>,

    /// Newest date to process, inclusive (YYYY-MM-DD). Must be used with
    /// --start-date.
    #[arg(long, requires = "start_date")]
    pub end_date: Option<NaiveDate>,
}
