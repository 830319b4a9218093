//! asset-fetch core library
//!
//! This library retrieves generated 3D-model artifacts (and other large
//! binaries) from plain HTTP(S) URLs over unreliable networks, resuming
//! partial transfers instead of starting over.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`download`] - Resumable, retrying single-stream download engine
//! - [`job`] - Generation-job records and artifact naming on top of the engine

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod download;
pub mod job;
pub(crate) mod user_agent;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use download::{
    DEFAULT_MAX_ATTEMPTS, DestinationLocks, DownloadEngine, DownloadError, EngineSettings,
    ErrorCategory, FetchReport, HttpClient, ProgressSink, RetryPolicy, Transport,
};
pub use job::{ArtifactFetcher, JobError, JobRecord, JobStatus, ResultFile, artifact_file_name};
