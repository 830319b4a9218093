//! Outcome classification and retry policy for transfer attempts.
//!
//! Every response the transfer loop receives is classified once, by
//! [`RetryPolicy::classify`], into a closed [`Outcome`] enumeration. The loop
//! then matches exhaustively on that value, so the retry behaviour is a total
//! function over the enumeration instead of status checks scattered through
//! the loop.
//!
//! # Classification
//!
//! | Status | Default policy | Strict policy |
//! |--------|----------------|---------------|
//! | < 400 | Proceed | Proceed |
//! | 416 | RangeExhausted | RangeExhausted |
//! | 408, 429 | Transient | Fatal |
//! | other 4xx | Fatal | Fatal |
//! | 5xx | Transient | Fatal |
//!
//! Transport-level failures (timeouts, resets, broken bodies) are always
//! transient.
//!
//! # Example
//!
//! ```
//! use asset_fetch::download::{Outcome, RetryPolicy};
//! use reqwest::StatusCode;
//!
//! let policy = RetryPolicy::default();
//! assert_eq!(policy.classify(StatusCode::SERVICE_UNAVAILABLE), Outcome::Transient);
//! assert_eq!(RetryPolicy::strict().classify(StatusCode::SERVICE_UNAVAILABLE), Outcome::Fatal);
//!
//! let mut backoff = policy.backoff();
//! let first = backoff.next_delay();
//! assert_eq!(backoff.next_delay(), first * 2);
//! ```

use std::time::Duration;

use reqwest::StatusCode;
use tracing::{debug, warn};

use super::constants::{DEFAULT_BACKOFF_FLOOR, DEFAULT_MAX_ATTEMPTS, MAX_RETRY_AFTER};

/// What the transfer loop does with a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Stream the body into the staging file.
    Proceed,
    /// HTTP 416: nothing left to fetch from the requested offset.
    RangeExhausted,
    /// Temporary condition; back off and try again.
    Transient,
    /// Permanent condition; abort the whole invocation.
    Fatal,
}

/// Attempt budget, backoff parameters and status classification.
///
/// # Default Values
///
/// - `max_attempts`: 6
/// - `backoff_floor`: 400 ms
/// - `backoff_ceiling`: none (delays double without bound)
/// - `retry_server_errors`: true
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff_floor: Duration,
    backoff_ceiling: Option<Duration>,
    retry_server_errors: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_floor: DEFAULT_BACKOFF_FLOOR,
            backoff_ceiling: None,
            retry_server_errors: true,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with custom settings.
    ///
    /// `max_attempts` is clamped to at least 1 and a ceiling below the floor
    /// is raised to the floor.
    #[must_use]
    pub fn new(
        max_attempts: u32,
        backoff_floor: Duration,
        backoff_ceiling: Option<Duration>,
        retry_server_errors: bool,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_floor,
            backoff_ceiling: backoff_ceiling.map(|ceiling| ceiling.max(backoff_floor)),
            retry_server_errors,
        }
    }

    /// A policy that treats every error status except 416 as fatal.
    #[must_use]
    pub fn strict() -> Self {
        Self {
            retry_server_errors: false,
            ..Self::default()
        }
    }

    /// Returns a copy with a different attempt budget.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Returns a copy with a different backoff floor.
    #[must_use]
    pub fn with_backoff_floor(mut self, floor: Duration) -> Self {
        self.backoff_floor = floor;
        self.backoff_ceiling = self.backoff_ceiling.map(|ceiling| ceiling.max(floor));
        self
    }

    /// Returns the maximum number of attempts configured.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns the first backoff delay.
    #[must_use]
    pub fn backoff_floor(&self) -> Duration {
        self.backoff_floor
    }

    /// Returns the backoff ceiling, if any.
    #[must_use]
    pub fn backoff_ceiling(&self) -> Option<Duration> {
        self.backoff_ceiling
    }

    /// Whether 408, 429 and 5xx are retried.
    #[must_use]
    pub fn retries_server_errors(&self) -> bool {
        self.retry_server_errors
    }

    /// A fresh backoff sequence for one `fetch` call.
    #[must_use]
    pub fn backoff(&self) -> Backoff {
        Backoff {
            next: self.backoff_floor,
            ceiling: self.backoff_ceiling,
        }
    }

    /// Classifies a content response status.
    ///
    /// Explicit match arms are kept per status group for documentation purposes.
    #[allow(clippy::match_same_arms)]
    #[must_use]
    pub fn classify(&self, status: StatusCode) -> Outcome {
        let code = status.as_u16();
        let outcome = match code {
            416 => Outcome::RangeExhausted,
            408 | 429 if self.retry_server_errors => Outcome::Transient,
            500..=599 if self.retry_server_errors => Outcome::Transient,
            code if code >= 400 => Outcome::Fatal,
            _ => Outcome::Proceed,
        };
        debug!(status = code, ?outcome, "classified response");
        outcome
    }
}

/// Doubling delay sequence, starting at the policy floor.
#[derive(Debug, Clone)]
pub struct Backoff {
    next: Duration,
    ceiling: Option<Duration>,
}

impl Backoff {
    /// Returns the current delay and doubles it for the next call.
    pub fn next_delay(&mut self) -> Duration {
        let current = self.next;
        let doubled = current.saturating_mul(2);
        self.next = match self.ceiling {
            Some(ceiling) => doubled.min(ceiling),
            None => doubled,
        };
        current
    }

    /// Returns the delay the next call will produce.
    #[must_use]
    pub fn peek(&self) -> Duration {
        self.next
    }
}

/// Parses a `Retry-After` header value into a delay.
///
/// Supports both formats per RFC 7231:
/// - Integer seconds: `Retry-After: 120`
/// - HTTP-date: `Retry-After: Wed, 21 Oct 2026 07:28:00 GMT`
///
/// Values are capped at one hour. Negative values, dates in the past and
/// unparseable values yield `None`.
#[must_use]
pub fn parse_retry_after(header_value: &str) -> Option<Duration> {
    let header_value = header_value.trim();

    if let Ok(seconds) = header_value.parse::<i64>() {
        let Ok(seconds) = u64::try_from(seconds) else {
            debug!(seconds, "negative Retry-After value, ignoring");
            return None;
        };
        return Some(cap_retry_after(Duration::from_secs(seconds)));
    }

    if let Ok(datetime) = httpdate::parse_http_date(header_value) {
        return datetime
            .duration_since(std::time::SystemTime::now())
            .ok()
            .map(cap_retry_after);
    }

    debug!(value = header_value, "unparseable Retry-After value, ignoring");
    None
}

fn cap_retry_after(delay: Duration) -> Duration {
    if delay > MAX_RETRY_AFTER {
        warn!(
            delay_secs = delay.as_secs(),
            max_secs = MAX_RETRY_AFTER.as_secs(),
            "Retry-After exceeds maximum, capping at 1 hour"
        );
        MAX_RETRY_AFTER
    } else {
        delay
    }
}
