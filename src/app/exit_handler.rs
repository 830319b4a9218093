//! Exit code logic for the asset-fetch process.
//!
//! Single responsibility: map a run failure to the process exit outcome.

use asset_fetch::{DownloadError, ErrorCategory, JobError};

use crate::ProcessExit;

/// Determines the process exit outcome for an error that ended the run.
pub(crate) fn determine_exit_outcome(error: &anyhow::Error) -> ProcessExit {
    for cause in error.chain() {
        if let Some(download) = cause.downcast_ref::<DownloadError>() {
            return exit_for_download_error(download);
        }
        if let Some(job) = cause.downcast_ref::<JobError>() {
            return match job {
                JobError::Download(download) => exit_for_download_error(download),
                JobError::NotDone { .. }
                | JobError::IndexOutOfRange { .. }
                | JobError::InvalidJobId { .. } => ProcessExit::Precondition,
            };
        }
    }
    ProcessExit::Failure
}

fn exit_for_download_error(error: &DownloadError) -> ProcessExit {
    match error.category() {
        ErrorCategory::Precondition => ProcessExit::Precondition,
        ErrorCategory::Fatal => ProcessExit::Fatal,
        ErrorCategory::Exhausted => ProcessExit::Exhausted,
    }
}
