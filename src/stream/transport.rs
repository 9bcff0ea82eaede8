//! Streaming HTTP transport
//!
//! A transport opens exactly one request per call and hands back the raw
//! response body as a byte stream. Reading is pull-based through
//! [`ByteReader`], which also owns cancellation: once its [`CancelHandle`]
//! fires, the pending read resolves as [`ReadOutcome::Aborted`] rather than
//! as end-of-stream or an error.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::ServerSettings;

/// Longest error body kept in a [`TransportError::Status`] reason
const MAX_ERROR_BODY: usize = 512;

/// How long a failed request waits for the start of its error body
const ERROR_BODY_WAIT: Duration = Duration::from_millis(500);

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("invalid header {name}: {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("stream error: {0}")]
    Stream(String),
}

/// Response body as an unbounded stream of byte batches
pub type BodyStream = BoxStream<'static, Result<Bytes, TransportError>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
}

/// One streaming request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamRequest {
    pub method: Method,

    /// Absolute URL, or a path starting with `/` resolved against the
    /// configured base URL
    pub url: String,

    /// JSON body sent with `POST`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,

    /// Extra request headers
    #[serde(default)]
    pub headers: Vec<(String, String)>,
}

impl StreamRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            body: None,
            headers: Vec::new(),
        }
    }

    pub fn post(url: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            body: Some(body),
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

impl From<&str> for StreamRequest {
    fn from(url: &str) -> Self {
        Self::get(url)
    }
}

impl From<String> for StreamRequest {
    fn from(url: String) -> Self {
        Self::get(url)
    }
}

/// Opens streaming requests
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open one request. Fails before any body bytes are exposed if the
    /// request cannot be made or the server answers with a non-success
    /// status.
    async fn open(&self, request: &StreamRequest) -> Result<BodyStream, TransportError>;
}

/// Idempotent abort switch for one in-flight transport
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once [`cancel`](Self::cancel) has been called
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }
}

/// Result of a single pull from a [`ByteReader`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    Chunk(Bytes),
    /// The body ended normally
    End,
    /// The read was abandoned because the transport was cancelled
    Aborted,
}

/// Pull-based reader over a response body
pub struct ByteReader {
    body: BodyStream,
    cancel: CancelHandle,
}

impl ByteReader {
    pub fn new(body: BodyStream, cancel: CancelHandle) -> Self {
        Self { body, cancel }
    }

    /// Read the next batch of bytes.
    ///
    /// Cancellation wins over any data that is ready at the same time.
    pub async fn read(&mut self) -> Result<ReadOutcome, TransportError> {
        if self.cancel.is_cancelled() {
            return Ok(ReadOutcome::Aborted);
        }

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Ok(ReadOutcome::Aborted),
            next = self.body.next() => match next {
                Some(Ok(bytes)) => Ok(ReadOutcome::Chunk(bytes)),
                Some(Err(e)) => Err(e),
                None => Ok(ReadOutcome::End),
            },
        }
    }
}

/// reqwest-backed transport
pub struct HttpTransport {
    client: Client,
    base_url: Option<Url>,
    default_headers: Vec<(String, String)>,
}

impl HttpTransport {
    pub fn new(settings: &ServerSettings) -> Result<Self, TransportError> {
        let mut builder = Client::builder();
        if let Some(secs) = settings.connect_timeout_secs {
            builder = builder.connect_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = settings.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder.build()?;

        let base_url = match settings.base_url.as_deref() {
            Some(base) if !base.is_empty() => Some(
                Url::parse(base).map_err(|e| TransportError::InvalidUrl(format!("{}: {}", base, e)))?,
            ),
            _ => None,
        };

        Ok(Self {
            client,
            base_url,
            default_headers: settings
                .headers
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        })
    }

    /// Resolve a request URL, joining paths onto the base URL
    pub fn resolve_url(&self, url: &str) -> Result<Url, TransportError> {
        match Url::parse(url) {
            Ok(url) => Ok(url),
            Err(_) if url.starts_with('/') => match &self.base_url {
                Some(base) => base
                    .join(url)
                    .map_err(|e| TransportError::InvalidUrl(format!("{}: {}", url, e))),
                None => Err(TransportError::InvalidUrl(format!(
                    "{}: relative URL without a configured base_url",
                    url
                ))),
            },
            Err(e) => Err(TransportError::InvalidUrl(format!("{}: {}", url, e))),
        }
    }

    fn build_headers(&self, request: &StreamRequest) -> Result<HeaderMap, TransportError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/x-ndjson"));

        for (name, value) in self.default_headers.iter().chain(request.headers.iter()) {
            let header_name =
                HeaderName::from_bytes(name.as_bytes()).map_err(|e| TransportError::InvalidHeader {
                    name: name.clone(),
                    reason: e.to_string(),
                })?;
            let header_value =
                HeaderValue::from_str(value).map_err(|e| TransportError::InvalidHeader {
                    name: name.clone(),
                    reason: e.to_string(),
                })?;
            headers.insert(header_name, header_value);
        }

        Ok(headers)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn open(&self, request: &StreamRequest) -> Result<BodyStream, TransportError> {
        let url = self.resolve_url(&request.url)?;
        let headers = self.build_headers(request)?;
        debug!("Opening {:?} {}", request.method, url);

        let builder = match request.method {
            Method::Get => self.client.get(url),
            Method::Post => {
                let builder = self.client.post(url);
                match &request.body {
                    Some(body) => builder.json(body),
                    None => builder,
                }
            }
        };

        let response = builder.headers(headers).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = error_body_excerpt(response).await;
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(TransportError::from))
            .boxed())
    }
}

/// First batch of an error response body, capped in size and wait time.
///
/// The response is dropped afterwards, so an error body that never ends
/// cannot hold the request open.
async fn error_body_excerpt(mut response: reqwest::Response) -> String {
    let first = tokio::time::timeout(ERROR_BODY_WAIT, response.chunk()).await;
    let mut body = match first {
        Ok(Ok(Some(bytes))) => {
            let end = bytes.len().min(MAX_ERROR_BODY);
            String::from_utf8_lossy(&bytes[..end]).into_owned()
        }
        Ok(Ok(None)) | Ok(Err(_)) => String::new(),
        Err(_) => {
            debug!("Error body not received within {:?}", ERROR_BODY_WAIT);
            String::new()
        }
    };
    truncate_at_char_boundary(&mut body, MAX_ERROR_BODY);
    body.trim_end().to_string()
}

fn truncate_at_char_boundary(s: &mut String, max_len: usize) {
    if s.len() <= max_len {
        return;
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s.truncate(end);
}
