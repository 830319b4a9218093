//! CLI entry point for asset-fetch.

use std::process::ExitCode;

use clap::Parser;

mod app;
mod app_config;
mod cli;

use cli::Args;

/// Process exit outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProcessExit {
    /// The artifact is on disk.
    Success,
    /// Anything not covered below (config, job file, runtime errors).
    Failure,
    /// Bad URL, unusable destination, or a job that cannot be fetched.
    Precondition,
    /// The server answered the content request with a non-retryable status.
    Fatal,
    /// Every attempt failed.
    Exhausted,
}

impl ProcessExit {
    pub(crate) fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Failure => 1,
            Self::Precondition => 2,
            Self::Fatal => 3,
            Self::Exhausted => 4,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    let outcome = match app::runtime::run(args).await {
        Ok(outcome) => outcome,
        Err(err) => {
            eprintln!("Error: {err:#}");
            app::exit_handler::determine_exit_outcome(&err)
        }
    };
    ExitCode::from(outcome.code())
}
