//! Error types for the download module.
//!
//! Every `fetch` call ends in success or exactly one [`DownloadError`]. The
//! [`ErrorCategory`] of an error tells a caller whether retrying at a higher
//! level (for example re-submitting the generation job) can help.

use std::path::PathBuf;

use thiserror::Error;

/// Coarse classification of a terminal download failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad input or unusable local storage; fix the call, not the network.
    Precondition,
    /// The server answered the content request with a permanent error status.
    Fatal,
    /// Transient failures consumed the whole attempt budget.
    Exhausted,
}

impl ErrorCategory {
    /// Returns the stable string label for display output.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Precondition => "precondition",
            Self::Fatal => "fatal",
            Self::Exhausted => "exhausted",
        }
    }
}

/// Errors that can end a download.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The provided URL is malformed or not HTTP(S).
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// The destination cannot be used (missing parent directory, path is a directory, ...).
    #[error("cannot download to {}: {reason}", .path.display())]
    Precondition {
        /// The offending path.
        path: PathBuf,
        /// What is wrong with it.
        reason: String,
    },

    /// File system error while preparing, syncing or publishing the staging file.
    #[error("IO error at {}: {source}", .path.display())]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The content request was answered with a non-retryable error status.
    #[error("HTTP {status} downloading {url}: {body}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
        /// Leading bytes of the response body, for diagnostics.
        body: String,
    },

    /// The attempt budget ran out before the artifact was complete.
    #[error(
        "download of {url} incomplete after {attempts} attempts: got {received} bytes, expected {}",
        .expected.map_or_else(|| "unknown".to_string(), |n| n.to_string())
    )]
    RetriesExhausted {
        /// The URL being downloaded.
        url: String,
        /// Bytes durably staged when the engine gave up.
        received: u64,
        /// Expected total size, if the probe learned it.
        expected: Option<u64>,
        /// Attempts consumed.
        attempts: u32,
        /// Description of the last transient failure, if any.
        last_error: Option<String>,
    },
}

impl DownloadError {
    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates a precondition error.
    pub fn precondition(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Precondition {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a fatal HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
            body: body.into(),
        }
    }

    /// Returns which part of the error taxonomy this error belongs to.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidUrl { .. } | Self::Precondition { .. } | Self::Io { .. } => {
                ErrorCategory::Precondition
            }
            Self::HttpStatus { .. } => ErrorCategory::Fatal,
            Self::RetriesExhausted { .. } => ErrorCategory::Exhausted,
        }
    }
}

// No `From<std::io::Error>`: every IO variant needs the path it happened at,
// so callers go through `DownloadError::io`.
