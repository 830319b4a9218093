//! Generation jobs and their downloadable artifacts.
//!
//! A job is produced by an upstream generation service and, once `DONE`,
//! lists one or more result files by URL. This module names those artifacts
//! on disk and fetches them through the [`DownloadEngine`].
//!
//! # Example
//!
//! ```no_run
//! use asset_fetch::{ArtifactFetcher, DownloadEngine, HttpClient, JobRecord};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let job: JobRecord = serde_json::from_str(&std::fs::read_to_string("job.json")?)?;
//! let fetcher = ArtifactFetcher::new(DownloadEngine::new(Arc::new(HttpClient::new())), "downloads");
//! let report = fetcher.fetch(&job, 0).await?;
//! println!("saved {}", report.path.display());
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument};

use crate::download::{DestinationLocks, DownloadEngine, DownloadError, FetchReport};

/// Extension used when a result file's type tag is empty or unusable.
pub const FALLBACK_EXTENSION: &str = "bin";

/// Lifecycle state of a generation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    /// Queued upstream.
    Wait,
    /// Generating.
    Run,
    /// Finished; result files are available.
    Done,
    /// Failed upstream; see [`JobRecord::error`].
    Fail,
}

impl JobStatus {
    /// Returns the wire representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Wait => "WAIT",
            Self::Run => "RUN",
            Self::Done => "DONE",
            Self::Fail => "FAIL",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One downloadable output of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultFile {
    /// Format tag such as `GLB` or `OBJ`.
    #[serde(rename = "Type", default)]
    pub file_type: String,
    /// Where the artifact can be fetched.
    #[serde(rename = "Url")]
    pub url: String,
    /// Optional thumbnail URL.
    #[serde(
        rename = "PreviewImageUrl",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub preview_image_url: Option<String>,
}

/// A job as recorded by the generation service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: String,
    pub status: JobStatus,
    #[serde(default)]
    pub files: Vec<ResultFile>,
    #[serde(default)]
    pub error: String,
}

/// Errors from job-level artifact operations.
#[derive(Debug, Error)]
pub enum JobError {
    /// The job has not reached `DONE`.
    #[error("job {job_id} is not done (status {status})")]
    NotDone { job_id: String, status: JobStatus },

    /// The requested result file does not exist.
    #[error("index {index} out of range for job {job_id} with {count} file(s)")]
    IndexOutOfRange {
        job_id: String,
        index: usize,
        count: usize,
    },

    /// The job id cannot be used as part of a file name.
    #[error("invalid job id {job_id:?}: only ASCII letters, digits, '-' and '_' are allowed")]
    InvalidJobId { job_id: String },

    /// The download itself failed.
    #[error(transparent)]
    Download(#[from] DownloadError),
}

/// Builds the on-disk name of result file `index` of `job_id`: `<job_id>_<index>.<ext>`.
///
/// # Errors
///
/// Returns [`JobError::InvalidJobId`] if `job_id` is empty or contains
/// anything other than ASCII alphanumerics, `-` and `_`.
pub fn artifact_file_name(
    job_id: &str,
    index: usize,
    file: &ResultFile,
) -> Result<String, JobError> {
    let valid_id = !job_id.is_empty()
        && job_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid_id {
        return Err(JobError::InvalidJobId {
            job_id: job_id.to_string(),
        });
    }

    let tag = file.file_type.trim();
    let ext = if !tag.is_empty() && tag.chars().all(|c| c.is_ascii_alphanumeric()) {
        tag.to_ascii_lowercase()
    } else {
        FALLBACK_EXTENSION.to_string()
    };
    Ok(format!("{job_id}_{index}.{ext}"))
}

/// Fetches job artifacts into one output directory.
///
/// Calls for the same artifact are serialized, so a second concurrent call
/// waits and then finds the destination already complete.
#[derive(Debug, Clone)]
pub struct ArtifactFetcher {
    engine: DownloadEngine,
    output_dir: PathBuf,
    locks: DestinationLocks,
}

impl ArtifactFetcher {
    /// Creates a fetcher writing into `output_dir`.
    #[must_use]
    pub fn new(engine: DownloadEngine, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            engine,
            output_dir: output_dir.into(),
            locks: DestinationLocks::new(),
        }
    }

    /// Returns the output directory.
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Returns where result file `index` of `job` would be stored.
    ///
    /// # Errors
    ///
    /// See [`artifact_file_name`]; also [`JobError::IndexOutOfRange`].
    pub fn destination_for(&self, job: &JobRecord, index: usize) -> Result<PathBuf, JobError> {
        let file = select_file(job, index)?;
        let name = artifact_file_name(&job.job_id, index, file)?;
        Ok(self.output_dir.join(name))
    }

    /// Downloads result file `index` of a finished job.
    ///
    /// # Errors
    ///
    /// - [`JobError::NotDone`] unless the job status is `DONE`.
    /// - [`JobError::IndexOutOfRange`] / [`JobError::InvalidJobId`].
    /// - [`JobError::Download`] when the engine fails.
    #[instrument(skip(self, job), fields(job_id = %job.job_id))]
    pub async fn fetch(&self, job: &JobRecord, index: usize) -> Result<FetchReport, JobError> {
        if job.status != JobStatus::Done {
            return Err(JobError::NotDone {
                job_id: job.job_id.clone(),
                status: job.status,
            });
        }
        let file = select_file(job, index)?;
        let destination = self.output_dir.join(artifact_file_name(&job.job_id, index, file)?);

        let _guard = self.locks.lock(&destination).await;
        let report = self.engine.fetch(&file.url, &destination).await?;
        info!(
            path = %report.path.display(),
            bytes = report.bytes,
            already_complete = report.already_complete,
            "artifact ready"
        );
        Ok(report)
    }
}

fn select_file(job: &JobRecord, index: usize) -> Result<&ResultFile, JobError> {
    job.files.get(index).ok_or_else(|| JobError::IndexOutOfRange {
        job_id: job.job_id.clone(),
        index,
        count: job.files.len(),
    })
}
