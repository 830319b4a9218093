//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

/// Resumable downloader for generated 3D-model artifacts.
///
/// Interrupted transfers resume from the bytes already on disk, both
/// within one run and across runs.
#[derive(Parser, Debug)]
#[command(name = "asset-fetch")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file to use instead of the default location
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub retry: RetryArgs,

    /// Disable the progress bar
    #[arg(long, global = true)]
    pub no_progress: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Retry tuning shared by all subcommands.
#[derive(ClapArgs, Debug, Clone, Default)]
pub struct RetryArgs {
    /// Total transfer attempts per download (1-20)
    #[arg(long, global = true, value_parser = clap::value_parser!(u32).range(1..=20))]
    pub max_attempts: Option<u32>,

    /// First backoff delay in milliseconds, doubled after each failure (1-60000)
    #[arg(long, global = true, value_parser = clap::value_parser!(u64).range(1..=60000))]
    pub backoff_floor_ms: Option<u64>,

    /// Treat every 4xx/5xx response (except 416) as fatal
    #[arg(long, global = true)]
    pub strict_status: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Download one URL to one file
    Fetch {
        /// HTTP(S) URL to download
        url: String,
        /// Destination file path
        dest: PathBuf,
    },
    /// Download a result file of a finished generation job
    Job {
        /// JSON job record (`-` reads stdin)
        job_file: PathBuf,
        /// Result file index within the job
        #[arg(short, long, default_value_t = 0)]
        index: usize,
        /// Directory for the artifact (defaults to config `download_dir`, then `.`)
        #[arg(short, long, value_name = "DIR")]
        output_dir: Option<PathBuf>,
    },
}
