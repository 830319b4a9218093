//! Size probe: learn the expected total length of a remote resource.
//!
//! A HEAD request is tried first. Servers that do not answer HEAD usefully
//! get a one-byte ranged GET instead, whose `Content-Range` carries the total.
//! Nothing here is fatal: every failure degrades to an unknown size.

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE};
use tokio::time::Instant;
use tracing::{debug, info, instrument};

use super::transport::{ByteRange, Transport, TransportRequest};

/// A parsed `Content-Range: bytes <start>-<end>/<total>` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    /// First byte in the response body.
    pub start: u64,
    /// Last byte in the response body (inclusive).
    pub end: u64,
    /// Complete length, `None` when the server sent `*`.
    pub total: Option<u64>,
}

/// Parses a `Content-Length` header value.
#[must_use]
pub fn parse_content_length(value: &str) -> Option<u64> {
    value.trim().parse::<u64>().ok()
}

/// Parses a `Content-Range` header value of the form `bytes <start>-<end>/<total>`.
///
/// Unsatisfied-range forms (`bytes */<total>`) and malformed values yield `None`.
#[must_use]
pub fn parse_content_range(value: &str) -> Option<ContentRange> {
    let rest = value.trim().strip_prefix("bytes")?.trim_start();
    let (span, total) = rest.split_once('/')?;
    let (start, end) = span.trim().split_once('-')?;
    let start = start.trim().parse::<u64>().ok()?;
    let end = end.trim().parse::<u64>().ok()?;
    if end < start {
        return None;
    }
    let total = match total.trim() {
        "*" => None,
        digits => Some(digits.parse::<u64>().ok()?),
    };
    Some(ContentRange { start, end, total })
}

/// Determines the expected total size of `url`, or `None` if it cannot be learned.
///
/// A reported size of zero is treated as unknown.
///
/// Both requests share the `timeout` budget. The ranged response body (at
/// most one byte) is drained before the response is dropped; a server that
/// ignores the range and starts sending the whole resource is hung up on
/// instead of read.
#[instrument(skip_all, fields(url = %url))]
pub async fn probe_total_size(
    transport: &dyn Transport,
    url: &str,
    timeout: Duration,
) -> Option<u64> {
    let deadline = Instant::now() + timeout;

    match transport.send(TransportRequest::head(url, timeout)).await {
        Ok(response) if response.status.is_success() => {
            let length = response
                .header_str(&CONTENT_LENGTH)
                .and_then(parse_content_length)
                .filter(|&length| length > 0);
            response.drain().await;
            if let Some(length) = length {
                debug!(length, "size learned from HEAD");
                return Some(length);
            }
            debug!("HEAD response has no usable Content-Length");
        }
        Ok(response) => {
            debug!(status = response.status.as_u16(), "HEAD not usable for sizing");
        }
        Err(error) => {
            debug!(error = %error, "HEAD probe failed");
        }
    }

    let remaining = deadline.saturating_duration_since(Instant::now());
    if remaining.is_zero() {
        info!("probe budget spent; total size unknown");
        return None;
    }

    let request =
        TransportRequest::get(url, remaining).with_range(ByteRange::Span { start: 0, end: 0 });
    let total = match transport.send(request).await {
        Ok(response) if response.status == StatusCode::PARTIAL_CONTENT => {
            let total = response
                .header_str(&CONTENT_RANGE)
                .and_then(parse_content_range)
                .and_then(|range| range.total)
                .filter(|&total| total > 0);
            response.drain().await;
            total
        }
        Ok(response) => {
            debug!(
                status = response.status.as_u16(),
                "ranged probe not honoured; abandoning body"
            );
            None
        }
        Err(error) => {
            debug!(error = %error, "ranged probe failed");
            None
        }
    };

    match total {
        Some(total) => debug!(total, "size learned from Content-Range"),
        None => info!("server reports no size; completion will be inferred from end of stream"),
    }
    total
}
