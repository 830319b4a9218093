//! Download engine: resumable, retrying transfer of one URL to one path.
//!
//! This module provides the `DownloadEngine`, which runs three phases per
//! [`fetch`](DownloadEngine::fetch) call:
//!
//! 1. **Resume planning**: an existing non-empty destination short-circuits
//!    with no network I/O; an existing staging file sets the resume offset.
//! 2. **Size probe**: HEAD, then a one-byte ranged GET; unknown is allowed.
//! 3. **Transfer loop**: up to `max_attempts` streamed GETs, each resuming
//!    with `Range: bytes=<have>-`, separated by doubling backoff sleeps.
//!
//! Bytes land in a staging file next to the destination. The destination is
//! only ever created by renaming the synced staging file, so it is observed
//! either absent or complete.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use std::time::Duration;
//! use asset_fetch::download::{DownloadEngine, HttpClient, RetryPolicy};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = DownloadEngine::new(Arc::new(HttpClient::new()))
//!     .with_policy(RetryPolicy::default().with_backoff_floor(Duration::from_millis(250)));
//! let report = engine
//!     .fetch("https://example.com/job_0.glb", Path::new("downloads/job_0.glb"))
//!     .await?;
//! println!("{} bytes after {} attempts", report.bytes, report.attempts);
//! # Ok(())
//! # }
//! ```

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_RANGE, RETRY_AFTER};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::constants::{ATTEMPT_TIMEOUT, DEFAULT_CHUNK_SIZE, ERROR_BODY_SNIPPET_BYTES, PROBE_TIMEOUT};
use super::error::DownloadError;
use super::plan::{ResumePlan, plan_resume, staging_path_for};
use super::probe::{parse_content_range, probe_total_size};
use super::retry::{Outcome, RetryPolicy, parse_retry_after};
use super::transport::{BodyStream, ByteRange, Transport, TransportError, TransportRequest};

/// Receives progress updates after every durable write to the staging file.
pub trait ProgressSink: Send + Sync {
    /// `received` bytes are staged out of `expected` (if known).
    fn update(&self, received: u64, expected: Option<u64>);
}

/// Timeouts and buffer size used by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    /// Budget for the size probe (HEAD plus ranged GET).
    pub probe_timeout: Duration,
    /// Timeout for each transfer attempt, body included.
    pub attempt_timeout: Duration,
    /// Bytes buffered before each write to the staging file.
    pub chunk_size: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            probe_timeout: PROBE_TIMEOUT,
            attempt_timeout: ATTEMPT_TIMEOUT,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Summary of a successful `fetch` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchReport {
    /// The destination path, now holding the complete artifact.
    pub path: PathBuf,
    /// Size of the file at `path`.
    pub bytes: u64,
    /// Size reported by the server, if it could be learned.
    pub expected_bytes: Option<u64>,
    /// Staged bytes found on disk when the call started.
    pub resumed_from: u64,
    /// Transfer attempts used (0 when the destination was already complete).
    pub attempts: u32,
    /// Backoff delays slept between attempts, in order.
    pub backoff_delays: Vec<Duration>,
    /// The destination was already complete; no network request was made.
    pub already_complete: bool,
}

/// What one transfer attempt concluded.
#[derive(Debug)]
enum AttemptStep {
    /// The staging file holds the whole artifact.
    Complete,
    /// Clean end of stream below the known size; go again right away.
    ShortRead,
    /// Transient failure; back off and go again.
    Retry {
        reason: String,
        retry_after: Option<Duration>,
    },
}

/// Download engine for one-URL-to-one-path transfers.
///
/// The engine holds no per-download state, so one instance can serve many
/// sequential or concurrent `fetch` calls for *different* destinations.
/// Concurrent calls for the same destination must be serialized by the
/// caller, for example with [`DestinationLocks`](super::DestinationLocks).
#[derive(Clone)]
pub struct DownloadEngine {
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
    settings: EngineSettings,
    progress: Option<Arc<dyn ProgressSink>>,
}

impl std::fmt::Debug for DownloadEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadEngine")
            .field("transport", &self.transport)
            .field("policy", &self.policy)
            .field("settings", &self.settings)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl DownloadEngine {
    /// Creates an engine with the default policy and settings.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            policy: RetryPolicy::default(),
            settings: EngineSettings::default(),
            progress: None,
        }
    }

    /// Replaces the retry policy.
    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replaces timeouts and buffer size. A zero chunk size is raised to 1.
    #[must_use]
    pub fn with_settings(mut self, mut settings: EngineSettings) -> Self {
        settings.chunk_size = settings.chunk_size.max(1);
        self.settings = settings;
        self
    }

    /// Installs a progress sink.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Returns the configured retry policy.
    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Returns the configured settings.
    #[must_use]
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Downloads `url` to `destination`, resuming any staged bytes.
    ///
    /// Returns immediately, without network I/O, when `destination` already
    /// holds a non-empty file. On success the staging file has been synced
    /// and renamed to `destination`. On failure the staging file is left in
    /// place so a later call can resume.
    ///
    /// # Errors
    ///
    /// - [`DownloadError::InvalidUrl`] for non-HTTP(S) or malformed URLs.
    /// - [`DownloadError::Precondition`] / [`DownloadError::Io`] for unusable
    ///   local paths.
    /// - [`DownloadError::HttpStatus`] when the content request is answered
    ///   with a fatal status (first occurrence, no retry).
    /// - [`DownloadError::RetriesExhausted`] when the attempt budget runs out.
    #[instrument(skip_all, fields(url = %url, destination = %destination.display()))]
    pub async fn fetch(&self, url: &str, destination: &Path) -> Result<FetchReport, DownloadError> {
        validate_url(url)?;

        let staging = staging_path_for(destination);
        let plan = plan_resume(destination, &staging).await?;
        if let ResumePlan::AlreadyComplete { size } = plan {
            info!(bytes = size, "destination already complete, skipping download");
            return Ok(FetchReport {
                path: destination.to_path_buf(),
                bytes: size,
                expected_bytes: None,
                resumed_from: 0,
                attempts: 0,
                backoff_delays: Vec::new(),
                already_complete: true,
            });
        }

        let resumed_from = plan.offset();
        let expected =
            probe_total_size(self.transport.as_ref(), url, self.settings.probe_timeout).await;
        debug!(resumed_from, ?expected, "starting transfer");

        // Create the staging file up front so it exists for the whole invocation.
        open_staging(&staging, resumed_from).await?;

        let mut have = resumed_from;
        let mut attempts = 0u32;
        let mut backoff = self.policy.backoff();
        let mut backoff_delays = Vec::new();
        let mut last_error: Option<String> = None;

        while attempts < self.policy.max_attempts() {
            attempts += 1;
            debug!(attempt = attempts, offset = have, "starting attempt");

            match self.attempt(url, &staging, &mut have, expected).await? {
                AttemptStep::Complete => {
                    finalize(&staging, destination).await?;
                    info!(bytes = have, attempts, "download complete");
                    return Ok(FetchReport {
                        path: destination.to_path_buf(),
                        bytes: have,
                        expected_bytes: expected,
                        resumed_from,
                        attempts,
                        backoff_delays,
                        already_complete: false,
                    });
                }
                AttemptStep::ShortRead => {
                    debug!(received = have, ?expected, "stream ended early, continuing");
                }
                AttemptStep::Retry {
                    reason,
                    retry_after,
                } => {
                    if attempts < self.policy.max_attempts() {
                        let delay = backoff.next_delay().max(retry_after.unwrap_or_default());
                        warn!(
                            attempt = attempts,
                            max_attempts = self.policy.max_attempts(),
                            received = have,
                            delay_ms = delay.as_millis(),
                            error = %reason,
                            "attempt failed, retrying"
                        );
                        backoff_delays.push(delay);
                        tokio::time::sleep(delay).await;
                    } else {
                        warn!(attempt = attempts, error = %reason, "final attempt failed");
                    }
                    last_error = Some(reason);
                }
            }
        }

        // Last safety net: the final attempt may have written the last byte and
        // still failed (e.g. the connection dropped after the body).
        if let Some(total) = expected
            && have >= total
        {
            finalize(&staging, destination).await?;
            info!(bytes = have, attempts, "download complete after final attempt");
            return Ok(FetchReport {
                path: destination.to_path_buf(),
                bytes: have,
                expected_bytes: expected,
                resumed_from,
                attempts,
                backoff_delays,
                already_complete: false,
            });
        }

        Err(DownloadError::RetriesExhausted {
            url: url.to_string(),
            received: have,
            expected,
            attempts,
            last_error,
        })
    }

    /// Runs one network attempt, advancing `have` as bytes become durable.
    ///
    /// Returns `Err` only for conditions that end the whole invocation.
    async fn attempt(
        &self,
        url: &str,
        staging: &Path,
        have: &mut u64,
        expected: Option<u64>,
    ) -> Result<AttemptStep, DownloadError> {
        let mut request = TransportRequest::transfer(url, self.settings.attempt_timeout);
        if *have > 0 {
            request = request.with_range(ByteRange::From(*have));
        }

        let response = match self.transport.send(request).await {
            Ok(response) => response,
            Err(error) => {
                return Ok(AttemptStep::Retry {
                    reason: error.to_string(),
                    retry_after: None,
                });
            }
        };
        let status = response.status;

        match self.policy.classify(status) {
            Outcome::Proceed => {}
            Outcome::RangeExhausted => {
                drop(response);
                return match expected {
                    Some(total) if *have != total => {
                        warn!(
                            received = *have,
                            expected = total,
                            "416 does not match expected size; restarting from byte 0"
                        );
                        let reason = format!("HTTP 416 at offset {} of {total}", *have);
                        *have = 0;
                        open_staging(staging, 0).await?;
                        Ok(AttemptStep::Retry {
                            reason,
                            retry_after: None,
                        })
                    }
                    None if *have == 0 => Ok(AttemptStep::Retry {
                        reason: "HTTP 416 for a request without a range".to_string(),
                        retry_after: None,
                    }),
                    _ => {
                        debug!(received = *have, "416: nothing left to fetch");
                        Ok(AttemptStep::Complete)
                    }
                };
            }
            Outcome::Transient => {
                let retry_after = response
                    .header_str(&RETRY_AFTER)
                    .and_then(parse_retry_after);
                return Ok(AttemptStep::Retry {
                    reason: format!("HTTP {status}"),
                    retry_after,
                });
            }
            Outcome::Fatal => {
                let body = response.snippet(ERROR_BODY_SNIPPET_BYTES).await;
                return Err(DownloadError::http_status(url, status.as_u16(), body));
            }
        }

        if *have > 0 {
            if status == StatusCode::PARTIAL_CONTENT {
                let start = response
                    .header_str(&CONTENT_RANGE)
                    .and_then(parse_content_range)
                    .map(|range| range.start);
                if let Some(start) = start
                    && start != *have
                {
                    return Ok(AttemptStep::Retry {
                        reason: format!("server resumed at byte {start} instead of {}", *have),
                        retry_after: None,
                    });
                }
            } else {
                warn!(
                    status = status.as_u16(),
                    discarded = *have,
                    "server ignored range request; restarting from byte 0"
                );
                *have = 0;
            }
        }

        let mut file = open_staging(staging, *have).await?;
        let copied = self
            .copy_body(&mut file, response.body, staging, have, expected)
            .await;
        drop(file);

        match copied {
            Ok(()) => match expected {
                Some(total) if *have < total => Ok(AttemptStep::ShortRead),
                _ => Ok(AttemptStep::Complete),
            },
            Err(reason) => Ok(AttemptStep::Retry {
                reason,
                retry_after: None,
            }),
        }
    }

    /// Streams `body` into `file` in `chunk_size` writes.
    ///
    /// Bytes received before a read error are still written, so they count
    /// toward the next attempt's offset. Errors are returned as descriptions:
    /// both read and write failures only end the current attempt.
    async fn copy_body(
        &self,
        file: &mut File,
        mut body: BodyStream,
        staging: &Path,
        have: &mut u64,
        expected: Option<u64>,
    ) -> Result<(), String> {
        let chunk_size = self.settings.chunk_size;
        let mut pending: Vec<u8> = Vec::with_capacity(chunk_size);

        while let Some(next) = body.next().await {
            match next {
                Ok(bytes) => {
                    pending.extend_from_slice(&bytes);
                    if pending.len() >= chunk_size {
                        self.write_chunk(file, &mut pending, staging, have, expected)
                            .await?;
                    }
                }
                Err(error) => {
                    self.write_chunk(file, &mut pending, staging, have, expected)
                        .await?;
                    return Err(read_failure(&error));
                }
            }
        }

        self.write_chunk(file, &mut pending, staging, have, expected)
            .await
    }

    async fn write_chunk(
        &self,
        file: &mut File,
        pending: &mut Vec<u8>,
        staging: &Path,
        have: &mut u64,
        expected: Option<u64>,
    ) -> Result<(), String> {
        if pending.is_empty() {
            return Ok(());
        }
        let written = async {
            file.write_all(pending).await?;
            file.flush().await
        }
        .await;
        if let Err(error) = written {
            return Err(DownloadError::io(staging, error).to_string());
        }
        *have += pending.len() as u64;
        pending.clear();
        if let Some(progress) = &self.progress {
            progress.update(*have, expected);
        }
        Ok(())
    }
}

fn read_failure(error: &TransportError) -> String {
    match error {
        TransportError::Timeout { .. } => format!("{error} (attempt timed out mid-stream)"),
        TransportError::Connection { .. } | TransportError::Body { .. } => error.to_string(),
    }
}

fn validate_url(url: &str) -> Result<(), DownloadError> {
    let parsed = Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        _ => Err(DownloadError::invalid_url(url)),
    }
}

/// Opens (creating if needed) the staging file, drops anything past `offset`
/// and positions the cursor at `offset`.
async fn open_staging(staging: &Path, offset: u64) -> Result<File, DownloadError> {
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(staging)
        .await
        .map_err(|e| DownloadError::io(staging, e))?;
    file.set_len(offset)
        .await
        .map_err(|e| DownloadError::io(staging, e))?;
    file.seek(SeekFrom::Start(offset))
        .await
        .map_err(|e| DownloadError::io(staging, e))?;
    Ok(file)
}

/// Flushes the staging file to durable storage and renames it into place.
async fn finalize(staging: &Path, destination: &Path) -> Result<(), DownloadError> {
    let file = OpenOptions::new()
        .write(true)
        .open(staging)
        .await
        .map_err(|e| DownloadError::io(staging, e))?;
    file.sync_all()
        .await
        .map_err(|e| DownloadError::io(staging, e))?;
    drop(file);
    tokio::fs::rename(staging, destination)
        .await
        .map_err(|e| DownloadError::io(destination, e))?;
    debug!(path = %destination.display(), "staging file published");
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::download::HttpClient;
    use crate::test_support::socket_guard::start_mock_server_or_skip;
    use std::sync::Mutex;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, ResponseTemplate};

    fn fast_engine() -> DownloadEngine {
        DownloadEngine::new(Arc::new(HttpClient::new()))
            .with_policy(RetryPolicy::default().with_backoff_floor(Duration::from_millis(1)))
    }

    #[derive(Default)]
    struct RecordingProgress {
        updates: Mutex<Vec<(u64, Option<u64>)>>,
    }

    impl ProgressSink for RecordingProgress {
        fn update(&self, received: u64, expected: Option<u64>) {
            self.updates.lock().unwrap().push((received, expected));
        }
    }

    #[test]
    fn test_validate_url_accepts_http_and_https() {
        assert!(validate_url("http://example.com/a.glb").is_ok());
        assert!(validate_url("https://example.com/a.glb").is_ok());
    }

    #[test]
    fn test_validate_url_rejects_other_schemes() {
        assert!(matches!(
            validate_url("ftp://example.com/a.glb"),
            Err(DownloadError::InvalidUrl { .. })
        ));
        assert!(matches!(
            validate_url("not a url"),
            Err(DownloadError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn test_settings_zero_chunk_size_raised() {
        let engine = fast_engine().with_settings(EngineSettings {
            chunk_size: 0,
            ..EngineSettings::default()
        });
        assert_eq!(engine.settings().chunk_size, 1);
    }

    #[test]
    fn test_default_settings_match_design_values() {
        let settings = EngineSettings::default();
        assert_eq!(settings.probe_timeout, Duration::from_secs(20));
        assert_eq!(settings.attempt_timeout, Duration::from_secs(900));
        assert_eq!(settings.chunk_size, 4 * 1024 * 1024);
    }

    #[tokio::test]
    async fn test_open_staging_truncates_torn_tail() {
        let dir = TempDir::new().unwrap();
        let staging = dir.path().join("a.glb.part");
        std::fs::write(&staging, b"0123456789").unwrap();

        let mut file = open_staging(&staging, 4).await.unwrap();
        file.write_all(b"XY").await.unwrap();
        file.flush().await.unwrap();
        drop(file);

        assert_eq!(std::fs::read(&staging).unwrap(), b"0123XY");
    }

    #[tokio::test]
    async fn test_finalize_renames_staging() {
        let dir = TempDir::new().unwrap();
        let staging = dir.path().join("a.glb.part");
        let dest = dir.path().join("a.glb");
        std::fs::write(&staging, b"mesh").unwrap();

        finalize(&staging, &dest).await.unwrap();

        assert!(!staging.exists());
        assert_eq!(std::fs::read(&dest).unwrap(), b"mesh");
    }

    #[tokio::test]
    async fn test_fetch_reports_progress_and_publishes() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        let body = vec![42u8; 10_000];
        Mock::given(method("GET"))
            .and(path("/model.glb"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
            .mount(&mock_server)
            .await;

        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("model.glb");
        let progress = Arc::new(RecordingProgress::default());
        let engine = fast_engine()
            .with_settings(EngineSettings {
                chunk_size: 4096,
                ..EngineSettings::default()
            })
            .with_progress(Arc::clone(&progress) as Arc<dyn ProgressSink>);

        let url = format!("{}/model.glb", mock_server.uri());
        let report = engine.fetch(&url, &dest).await.unwrap();

        assert_eq!(report.bytes, 10_000);
        assert_eq!(report.attempts, 1);
        assert!(!report.already_complete);
        assert_eq!(std::fs::read(&dest).unwrap(), body);
        assert!(!staging_path_for(&dest).exists());

        let updates = progress.updates.lock().unwrap();
        assert_eq!(updates.last().map(|u| u.0), Some(10_000));
        assert!(updates.windows(2).all(|w| w[0].0 < w[1].0));
    }

    #[tokio::test]
    async fn test_fetch_invalid_url_touches_nothing() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("model.glb");
        let result = fast_engine().fetch("file:///etc/passwd", &dest).await;
        assert!(matches!(result, Err(DownloadError::InvalidUrl { .. })));
        assert!(!staging_path_for(&dest).exists());
    }
}
