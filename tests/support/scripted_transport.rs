//! In-process `Transport` that serves one resource and injects scripted faults.
//!
//! Probe requests (HEAD and the one-byte ranged GET) are answered according
//! to a [`ProbeMode`]. Transfer requests (`Connection: close`) consume
//! [`Step`]s in order; once the script runs out, the resource is served
//! honouring the `Range` header.

use std::collections::VecDeque;
use std::io;
use std::sync::Mutex;

use async_trait::async_trait;
use asset_fetch::download::{
    ByteRange, Transport, TransportError, TransportRequest, TransportResponse,
};
use bytes::Bytes;
use futures_util::StreamExt;
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, HeaderMap, HeaderValue, RETRY_AFTER};
use reqwest::{Method, StatusCode};

/// How the size probe is answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeMode {
    /// HEAD returns 200 with `Content-Length`.
    Head,
    /// HEAD returns 405; the ranged GET returns 206 with `Content-Range`.
    RangedGet,
    /// HEAD returns 405; the ranged GET returns 200 without any size header.
    Unknown,
    /// HEAD returns 200 with `Content-Length: 0`; the ranged GET returns 200
    /// without any size header.
    ZeroLength,
}

/// What one transfer request receives.
#[derive(Debug, Clone)]
pub enum Step {
    /// Serve the resource honouring `Range`, breaking off with a connection
    /// reset after `fail_after` body bytes if set.
    Serve { fail_after: Option<usize> },
    /// Serve the resource honouring `Range`, ending the body cleanly after
    /// `len` bytes.
    ShortBody { len: usize },
    /// Serve the whole resource with 200, ignoring any `Range` header.
    ServeIgnoringRange,
    /// Respond with `status` and a short body.
    Status(u16),
    /// Respond with `status` and a `Retry-After` header.
    StatusRetryAfter(u16, &'static str),
    /// Fail before any response head arrives.
    ConnectError,
    /// Respond 206 from `start`, regardless of the requested offset.
    WrongOffset { start: usize },
}

/// A recorded request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recorded {
    pub method: Method,
    pub range: Option<ByteRange>,
    pub close_connection: bool,
}

#[derive(Debug)]
pub struct ScriptedTransport {
    content: Vec<u8>,
    probe: ProbeMode,
    chunk: usize,
    steps: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<Recorded>>,
}

impl ScriptedTransport {
    pub fn new(content: Vec<u8>, probe: ProbeMode) -> Self {
        Self {
            content,
            probe,
            chunk: 64 * 1024,
            steps: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Appends transfer steps.
    pub fn with_steps(self, steps: impl IntoIterator<Item = Step>) -> Self {
        self.steps.lock().unwrap().extend(steps);
        self
    }

    /// Size of the body chunks handed to the engine.
    pub fn with_chunk(mut self, chunk: usize) -> Self {
        self.chunk = chunk.max(1);
        self
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    /// Transfer requests only (probe traffic excluded).
    pub fn transfers(&self) -> Vec<Recorded> {
        self.requests()
            .into_iter()
            .filter(|r| r.close_connection)
            .collect()
    }

    fn len(&self) -> u64 {
        self.content.len() as u64
    }

    fn probe_response(&self, request: &TransportRequest) -> TransportResponse {
        let mut headers = HeaderMap::new();
        if request.method == Method::HEAD {
            let length = match self.probe {
                ProbeMode::Head => Some(self.len()),
                ProbeMode::ZeroLength => Some(0),
                ProbeMode::RangedGet | ProbeMode::Unknown => None,
            };
            if let Some(length) = length {
                headers.insert(CONTENT_LENGTH, HeaderValue::from(length));
                return TransportResponse::from_chunks(StatusCode::OK, headers, Vec::new());
            }
            return TransportResponse::from_chunks(
                StatusCode::METHOD_NOT_ALLOWED,
                headers,
                Vec::new(),
            );
        }
        match self.probe {
            ProbeMode::Unknown | ProbeMode::ZeroLength => {
                self.body_response(StatusCode::OK, headers, 0, None)
            }
            ProbeMode::Head | ProbeMode::RangedGet => {
                let end = request.range.map_or(0, |r| match r {
                    ByteRange::Span { end, .. } => end,
                    ByteRange::From(_) => self.len().saturating_sub(1),
                });
                headers.insert(
                    CONTENT_RANGE,
                    HeaderValue::from_str(&format!("bytes 0-{end}/{}", self.len())).unwrap(),
                );
                let end = usize::try_from(end).unwrap();
                TransportResponse::from_chunks(
                    StatusCode::PARTIAL_CONTENT,
                    headers,
                    vec![Bytes::copy_from_slice(&self.content[..=end.min(self.content.len() - 1)])],
                )
            }
        }
    }

    fn body_response(
        &self,
        status: StatusCode,
        headers: HeaderMap,
        start: usize,
        fail_after: Option<usize>,
    ) -> TransportResponse {
        let slice = &self.content[start.min(self.content.len())..];
        let take = fail_after.map_or(slice.len(), |n| n.min(slice.len()));
        let mut items: Vec<Result<Bytes, TransportError>> = slice[..take]
            .chunks(self.chunk)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        if fail_after.is_some() {
            items.push(Err(TransportError::body(
                "scripted://resource",
                io::Error::from(io::ErrorKind::ConnectionReset),
            )));
        }
        TransportResponse {
            status,
            headers,
            body: futures_util::stream::iter(items).boxed(),
        }
    }

    fn serve(&self, request: &TransportRequest, fail_after: Option<usize>) -> TransportResponse {
        let mut headers = HeaderMap::new();
        match request.range {
            Some(range) => {
                let start = range.start();
                if start >= self.len() {
                    headers.insert(
                        CONTENT_RANGE,
                        HeaderValue::from_str(&format!("bytes */{}", self.len())).unwrap(),
                    );
                    return TransportResponse::from_chunks(
                        StatusCode::RANGE_NOT_SATISFIABLE,
                        headers,
                        Vec::new(),
                    );
                }
                headers.insert(
                    CONTENT_RANGE,
                    HeaderValue::from_str(&format!(
                        "bytes {start}-{}/{}",
                        self.len() - 1,
                        self.len()
                    ))
                    .unwrap(),
                );
                self.body_response(
                    StatusCode::PARTIAL_CONTENT,
                    headers,
                    usize::try_from(start).unwrap(),
                    fail_after,
                )
            }
            None => self.body_response(StatusCode::OK, headers, 0, fail_after),
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        self.requests.lock().unwrap().push(Recorded {
            method: request.method.clone(),
            range: request.range,
            close_connection: request.close_connection,
        });

        if !request.close_connection {
            return Ok(self.probe_response(&request));
        }

        let step = self
            .steps
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Step::Serve { fail_after: None });

        match step {
            Step::Serve { fail_after } => Ok(self.serve(&request, fail_after)),
            Step::ShortBody { len } => {
                let mut response = self.serve(&request, Some(len));
                let chunks: Vec<_> = response.body.collect().await;
                response.body = futures_util::stream::iter(chunks.into_iter().filter(Result::is_ok))
                    .boxed();
                Ok(response)
            }
            Step::ServeIgnoringRange => {
                Ok(self.body_response(StatusCode::OK, HeaderMap::new(), 0, None))
            }
            Step::Status(code) => Ok(TransportResponse::from_chunks(
                StatusCode::from_u16(code).unwrap(),
                HeaderMap::new(),
                vec![Bytes::from(format!("scripted status {code}"))],
            )),
            Step::StatusRetryAfter(code, value) => {
                let mut headers = HeaderMap::new();
                headers.insert(RETRY_AFTER, HeaderValue::from_static(value));
                Ok(TransportResponse::from_chunks(
                    StatusCode::from_u16(code).unwrap(),
                    headers,
                    Vec::new(),
                ))
            }
            Step::ConnectError => Err(TransportError::connection(
                request.url,
                io::Error::from(io::ErrorKind::ConnectionRefused),
            )),
            Step::WrongOffset { start } => {
                let mut headers = HeaderMap::new();
                headers.insert(
                    CONTENT_RANGE,
                    HeaderValue::from_str(&format!(
                        "bytes {start}-{}/{}",
                        self.len() - 1,
                        self.len()
                    ))
                    .unwrap(),
                );
                Ok(self.body_response(StatusCode::PARTIAL_CONTENT, headers, start, None))
            }
        }
    }
}
