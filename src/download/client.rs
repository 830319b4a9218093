//! reqwest-backed [`Transport`] implementation.
//!
//! This module provides the `HttpClient` struct, the production transport used
//! by the download engine. One client is built per engine (or shared between
//! engines) rather than living in a process-wide static.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use reqwest::header::{CONNECTION, RANGE};
use tracing::{debug, instrument};

use super::constants::CONNECT_TIMEOUT_SECS;
use super::transport::{Transport, TransportError, TransportRequest, TransportResponse};
use crate::user_agent;

/// HTTP client for the download engine.
///
/// This client is designed to be created once and reused, taking advantage of
/// connection pooling for the probe requests. Transfer attempts ask for a
/// fresh connection each time.
///
/// Response decompression is disabled: byte offsets used for resuming must
/// refer to the bytes as stored on the server.
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use std::sync::Arc;
/// use asset_fetch::download::{DownloadEngine, HttpClient};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let engine = DownloadEngine::new(Arc::new(HttpClient::new()));
/// let report = engine
///     .fetch("https://example.com/model.glb", Path::new("./downloads/model.glb"))
///     .await?;
/// println!("Downloaded {} bytes", report.bytes);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    /// Creates a new HTTP client with the default connect timeout (30 seconds).
    ///
    /// Request timeouts are not set on the client; every request carries its own.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new() -> Self {
        Self::with_connect_timeout(CONNECT_TIMEOUT_SECS)
    }

    /// Creates a new HTTP client with an explicit connect timeout.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the supplied
    /// timeout configuration.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn with_connect_timeout(connect_timeout_secs: u64) -> Self {
        let client = build_client(connect_timeout_secs)
            .expect("failed to build HTTP client with static configuration");
        Self { client }
    }

    /// Wraps an already configured reqwest client.
    #[must_use]
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    /// Returns a reference to the underlying reqwest client.
    #[must_use]
    pub fn inner(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl Transport for HttpClient {
    #[instrument(level = "debug", skip(self), fields(method = %request.method, url = %request.url))]
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let url = request.url;
        let mut builder = self
            .client
            .request(request.method, &url)
            .timeout(request.timeout);
        if let Some(range) = request.range {
            builder = builder.header(RANGE, range.header_value());
        }
        if request.close_connection {
            builder = builder.header(CONNECTION, "close");
        }

        let response = builder
            .send()
            .await
            .map_err(|e| map_request_error(&url, e))?;

        let status = response.status();
        let headers = response.headers().clone();
        debug!(status = status.as_u16(), "response received");

        let body = response
            .bytes_stream()
            .map(move |chunk| chunk.map_err(|e| map_body_error(&url, e)))
            .boxed();

        Ok(TransportResponse {
            status,
            headers,
            body,
        })
    }
}

fn build_client(connect_timeout_secs: u64) -> Result<Client, reqwest::Error> {
    Client::builder()
        .connect_timeout(Duration::from_secs(connect_timeout_secs))
        .user_agent(user_agent::default_download_user_agent())
        .build()
}

fn map_request_error(url: &str, error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::timeout(url)
    } else {
        TransportError::connection(url, error)
    }
}

fn map_body_error(url: &str, error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::timeout(url)
    } else {
        TransportError::body(url, error)
    }
}
