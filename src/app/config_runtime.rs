//! Merges CLI flags, config file values and engine defaults.

use std::time::Duration;

use asset_fetch::download::constants::{ATTEMPT_TIMEOUT, CONNECT_TIMEOUT_SECS, PROBE_TIMEOUT};
use asset_fetch::{DEFAULT_MAX_ATTEMPTS, EngineSettings, RetryPolicy};
use asset_fetch::download::{DEFAULT_BACKOFF_FLOOR, DEFAULT_CHUNK_SIZE};

use crate::app_config::{FileConfig, VerbositySetting};
use crate::cli::RetryArgs;

/// Picks the tracing level used when `RUST_LOG` is unset.
///
/// Priority: quiet flag > verbose flag > config verbosity > info.
pub(crate) fn resolve_default_log_level(
    quiet: bool,
    verbose: u8,
    configured: Option<VerbositySetting>,
) -> &'static str {
    if quiet {
        return "error";
    }
    match verbose {
        0 => {}
        1 => return "debug",
        _ => return "trace",
    }
    match configured {
        Some(VerbositySetting::Quiet) => "error",
        Some(VerbositySetting::Verbose | VerbositySetting::Debug) => "debug",
        Some(VerbositySetting::Default) | None => "info",
    }
}

/// Builds the retry policy; CLI flags win over config values.
pub(crate) fn resolve_retry_policy(retry: &RetryArgs, file_config: &FileConfig) -> RetryPolicy {
    let max_attempts = retry
        .max_attempts
        .or(file_config.max_attempts)
        .unwrap_or(DEFAULT_MAX_ATTEMPTS);
    let floor = retry
        .backoff_floor_ms
        .or(file_config.backoff_floor_ms)
        .map_or(DEFAULT_BACKOFF_FLOOR, Duration::from_millis);
    let ceiling = file_config.backoff_ceiling_ms.map(Duration::from_millis);
    let retry_server_errors =
        !retry.strict_status && file_config.retry_server_errors.unwrap_or(true);

    RetryPolicy::new(max_attempts, floor, ceiling, retry_server_errors)
}

pub(crate) fn resolve_engine_settings(file_config: &FileConfig) -> EngineSettings {
    let chunk_size = file_config
        .chunk_size_kib
        .and_then(|kib| usize::try_from(kib.saturating_mul(1024)).ok())
        .unwrap_or(DEFAULT_CHUNK_SIZE);
    EngineSettings {
        probe_timeout: file_config
            .probe_timeout_secs
            .map_or(PROBE_TIMEOUT, Duration::from_secs),
        attempt_timeout: file_config
            .attempt_timeout_secs
            .map_or(ATTEMPT_TIMEOUT, Duration::from_secs),
        chunk_size,
    }
}

pub(crate) fn resolve_connect_timeout_secs(file_config: &FileConfig) -> u64 {
    file_config
        .connect_timeout_secs
        .unwrap_or(CONNECT_TIMEOUT_SECS)
}
