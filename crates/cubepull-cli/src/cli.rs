use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "cubepull")]
#[command(about = "Throttled, resumable per-date pulls from an analytical cube")]
#[command(version)]
pub struct Cli {
    /// Path to cubepull.toml config file
    #[arg(short, long, global = true, default_value = "cubepull.toml")]
    pub config: PathBuf,

    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a template config if absent and bootstrap the checkpoint
    Init {
        /// Last date already pulled (YYYY-MM-DD); the first run starts the day after
        #[arg(long)]
        last_pull: NaiveDate,

        /// Replace an existing checkpoint
        #[arg(long)]
        force: bool,
    },

    /// Pull every date from the checkpoint through yesterday
    Run,

    /// Show the checkpoint, pending range and missing dates
    Status,

    /// Re-attempt dates recorded as missing
    RetryMissing,
}
