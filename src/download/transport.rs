//! The request/response seam between the download engine and the network.
//!
//! The engine never talks to reqwest directly. It builds a [`TransportRequest`],
//! hands it to an injected [`Transport`], and consumes the streamed
//! [`TransportResponse`]. [`HttpClient`](super::HttpClient) is the production
//! implementation; tests substitute scripted transports to inject faults.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use reqwest::header::{HeaderMap, HeaderName};
use reqwest::{Method, StatusCode};
use thiserror::Error;

/// Boxed error used as the source of transport failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Streamed response body.
pub type BodyStream = BoxStream<'static, Result<Bytes, TransportError>>;

/// Failures below the HTTP status level. All of them are transient to the engine.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The request (or the body read) exceeded its timeout.
    #[error("timeout requesting {url}")]
    Timeout {
        /// The requested URL.
        url: String,
    },

    /// The request could not be sent or no response head was received.
    #[error("connection error requesting {url}: {source}")]
    Connection {
        /// The requested URL.
        url: String,
        /// The underlying error.
        #[source]
        source: BoxError,
    },

    /// The response body broke off mid-stream.
    #[error("error reading body of {url}: {source}")]
    Body {
        /// The requested URL.
        url: String,
        /// The underlying error.
        #[source]
        source: BoxError,
    },
}

impl TransportError {
    /// Creates a connection error from any error type.
    pub fn connection(url: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Connection {
            url: url.into(),
            source: source.into(),
        }
    }

    /// Creates a mid-stream body error from any error type.
    pub fn body(url: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Body {
            url: url.into(),
            source: source.into(),
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }
}

/// Byte range requested through the `Range` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteRange {
    /// `bytes=<start>-`, everything from `start` to the end.
    From(u64),
    /// `bytes=<start>-<end>`, inclusive on both ends.
    Span {
        /// First byte.
        start: u64,
        /// Last byte (inclusive).
        end: u64,
    },
}

impl ByteRange {
    /// Formats the range as a `Range` header value.
    #[must_use]
    pub fn header_value(self) -> String {
        match self {
            Self::From(start) => format!("bytes={start}-"),
            Self::Span { start, end } => format!("bytes={start}-{end}"),
        }
    }

    /// First requested byte.
    #[must_use]
    pub fn start(self) -> u64 {
        match self {
            Self::From(start) | Self::Span { start, .. } => start,
        }
    }
}

/// A single request issued by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportRequest {
    /// HTTP method (`HEAD` for the probe, `GET` otherwise).
    pub method: Method,
    /// Target URL.
    pub url: String,
    /// Optional `Range` header.
    pub range: Option<ByteRange>,
    /// Request-scoped timeout covering headers and body.
    pub timeout: Duration,
    /// Ask for a fresh connection (`Connection: close`).
    pub close_connection: bool,
}

impl TransportRequest {
    /// A metadata-only request.
    #[must_use]
    pub fn head(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            method: Method::HEAD,
            url: url.into(),
            range: None,
            timeout,
            close_connection: false,
        }
    }

    /// A plain GET request.
    #[must_use]
    pub fn get(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            range: None,
            timeout,
            close_connection: false,
        }
    }

    /// A GET for one transfer attempt. Some gateways handle reused
    /// keep-alive connections badly mid-transfer, so each attempt closes its own.
    #[must_use]
    pub fn transfer(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            close_connection: true,
            ..Self::get(url, timeout)
        }
    }

    /// Adds a `Range` header.
    #[must_use]
    pub fn with_range(mut self, range: ByteRange) -> Self {
        self.range = Some(range);
        self
    }
}

/// Response head plus streamed body.
pub struct TransportResponse {
    /// HTTP status.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Body stream; dropping it abandons the rest of the body.
    pub body: BodyStream,
}

impl fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

impl TransportResponse {
    /// Builds a response from an in-memory body, split into `chunks`.
    #[must_use]
    pub fn from_chunks(status: StatusCode, headers: HeaderMap, chunks: Vec<Bytes>) -> Self {
        let body = futures_util::stream::iter(chunks.into_iter().map(Ok)).boxed();
        Self {
            status,
            headers,
            body,
        }
    }

    /// Returns a header value if it is present and valid visible ASCII.
    #[must_use]
    pub fn header_str(&self, name: &HeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Reads and discards the rest of the body, returning how many bytes were read.
    ///
    /// Errors end the drain early; the connection is closed when the response drops.
    pub async fn drain(mut self) -> u64 {
        let mut drained = 0u64;
        while let Some(Ok(chunk)) = self.body.next().await {
            drained += chunk.len() as u64;
        }
        drained
    }

    /// Reads at most `limit` bytes of the body as lossy UTF-8.
    pub async fn snippet(mut self, limit: usize) -> String {
        let mut collected = Vec::new();
        while collected.len() < limit {
            match self.body.next().await {
                Some(Ok(chunk)) => {
                    let take = chunk.len().min(limit - collected.len());
                    collected.extend_from_slice(&chunk[..take]);
                }
                _ => break,
            }
        }
        String::from_utf8_lossy(&collected).trim().to_string()
    }
}

/// Sends requests on behalf of the download engine.
///
/// Implementations map HTTP error statuses to ordinary responses; only
/// failures that leave no response to inspect become [`TransportError`].
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Sends one request and returns the response head with a streamed body.
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_range_header_values() {
        assert_eq!(ByteRange::From(4_194_304).header_value(), "bytes=4194304-");
        assert_eq!(
            ByteRange::Span { start: 0, end: 0 }.header_value(),
            "bytes=0-0"
        );
        assert_eq!(ByteRange::Span { start: 7, end: 9 }.start(), 7);
    }

    #[test]
    fn test_transfer_request_closes_connection() {
        let request = TransportRequest::transfer("https://example.com/a.glb", Duration::from_secs(1))
            .with_range(ByteRange::From(10));
        assert_eq!(request.method, Method::GET);
        assert!(request.close_connection);
        assert_eq!(request.range, Some(ByteRange::From(10)));

        let probe = TransportRequest::head("https://example.com/a.glb", Duration::from_secs(1));
        assert_eq!(probe.method, Method::HEAD);
        assert!(!probe.close_connection);
    }

    #[tokio::test]
    async fn test_snippet_truncates_to_limit() {
        let response = TransportResponse::from_chunks(
            StatusCode::FORBIDDEN,
            HeaderMap::new(),
            vec![Bytes::from_static(b"access "), Bytes::from_static(b"denied forever")],
        );
        assert_eq!(response.snippet(13).await, "access denied");
    }

    #[tokio::test]
    async fn test_drain_counts_bytes() {
        let response = TransportResponse::from_chunks(
            StatusCode::PARTIAL_CONTENT,
            HeaderMap::new(),
            vec![Bytes::from_static(b"x")],
        );
        assert_eq!(response.drain().await, 1);
    }

    #[test]
    fn test_transport_error_display_carries_url() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer");
        let error = TransportError::body("https://example.com/a.glb", io);
        let msg = error.to_string();
        assert!(msg.contains("https://example.com/a.glb"), "{msg}");
        assert!(msg.contains("reset by peer"), "{msg}");
    }
}
