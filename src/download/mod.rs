//! Resumable HTTP download engine.
//!
//! This module fetches one URL into one local file over an unreliable
//! network, resuming from already-staged bytes after interruptions.
//!
//! # Features
//!
//! - Streaming downloads in fixed-size chunks (memory use bounded by chunk size)
//! - Resume across attempts *and* across process runs via `<dest>.part`
//! - Size probing with HEAD, falling back to a one-byte ranged GET
//! - Bounded retries with doubling backoff and `Retry-After` support
//! - Atomic publication: the destination appears only when complete
//! - Pluggable [`Transport`] so tests can script the server side
//!
//! # Example
//!
//! ```no_run
//! use asset_fetch::download::{DownloadEngine, HttpClient};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = DownloadEngine::new(Arc::new(HttpClient::new()));
//! let report = engine
//!     .fetch("https://example.com/model.glb", Path::new("./model.glb"))
//!     .await?;
//! println!("Downloaded: {} ({} bytes)", report.path.display(), report.bytes);
//! # Ok(())
//! # }
//! ```

mod client;
pub mod constants;
mod engine;
mod error;
mod locks;
mod plan;
mod probe;
mod retry;
mod transport;

pub use client::HttpClient;
pub use constants::{DEFAULT_BACKOFF_FLOOR, DEFAULT_CHUNK_SIZE, DEFAULT_MAX_ATTEMPTS};
pub use engine::{DownloadEngine, EngineSettings, FetchReport, ProgressSink};
pub use error::{DownloadError, ErrorCategory};
pub use locks::{DestinationGuard, DestinationLocks};
pub use plan::{ResumePlan, plan_resume, staging_path_for};
pub use probe::{ContentRange, parse_content_length, parse_content_range, probe_total_size};
pub use retry::{Backoff, Outcome, RetryPolicy, parse_retry_after};
pub use transport::{
    BodyStream, BoxError, ByteRange, Transport, TransportError, TransportRequest,
    TransportResponse,
};

// Note: we do NOT define module-local Result aliases.
// Use `Result<T, DownloadError>` explicitly in function signatures.
