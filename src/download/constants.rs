//! Constants for the download module (timeouts, retry budget, buffer sizes).

use std::time::Duration;

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Budget for the size probe, shared by the HEAD and ranged GET requests.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(20);

/// Per-attempt request timeout (15 minutes, large assets on slow links).
pub const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// Default maximum number of transfer attempts per `fetch` call.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 6;

/// First backoff delay; doubles after every failed attempt.
pub const DEFAULT_BACKOFF_FLOOR: Duration = Duration::from_millis(400);

/// Bytes buffered from the network before each staging write (4 MiB).
pub const DEFAULT_CHUNK_SIZE: usize = 4 << 20;

/// Longest body snippet carried by a fatal status error.
pub const ERROR_BODY_SNIPPET_BYTES: usize = 512;

/// Maximum Retry-After header value (1 hour) to prevent excessive delays.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

/// Suffix appended to the destination file name for the staging file.
pub const STAGING_SUFFIX: &str = ".part";
