use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "archive-retention")]
#[command(about = "Deletes archive files older than a retention window", long_about = None)]
pub struct Cli {
    /// Only print warnings and errors to the terminal
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Scan an archive root and delete (or report) expired files
    Run(RunArgs),
    /// Show who holds the instance lock, if anyone
    LockStatus,
    /// Print configuration values
    PrintConfig,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Archive root to process
    #[arg(long, required_unless_present = "credential_target", conflicts_with = "credential_target")]
    pub path: Option<PathBuf>,

    /// Named network share from the `shares` table in Config.toml
    #[arg(long)]
    pub credential_target: Option<String>,

    /// Files last modified more than this many days ago are expired
    #[arg(long)]
    pub retention_days: u32,

    /// Actually delete; without this flag the run is a dry-run
    #[arg(long)]
    pub execute: bool,

    /// Terminate the recorded lock owner before taking the lock
    #[arg(long, conflicts_with = "force_clear_lock")]
    pub force: bool,

    /// Remove an existing lock file without checking its owner
    #[arg(long)]
    pub force_clear_lock: bool,

    /// Process files one at a time
    #[arg(long, conflicts_with_all = ["parallel", "threads"])]
    pub sequential: bool,

    /// Process files on a worker pool
    #[arg(long)]
    pub parallel: bool,

    /// Worker pool size (implies --parallel)
    #[arg(long)]
    pub threads: Option<usize>,

    /// Draw a live progress spinner
    #[arg(long)]
    pub show_progress: bool,

    /// Seconds between progress log lines (0 disables them)
    #[arg(long)]
    pub progress_interval: Option<u64>,

    /// Write per-file errors to this CSV file
    #[arg(long)]
    pub error_report: Option<PathBuf>,

    /// Exit with a distinct status when more than this many errors occur
    #[arg(long)]
    pub failure_threshold: Option<usize>,
}
