//! The HTTP transport seam.
//!
//! [`HttpTransport`] performs a single attempt and reports either a response
//! (any status) or a network failure. Retry logic lives above it in
//! [`RetryingHttpClient`](crate::RetryingHttpClient), so tests can swap in a
//! scripted transport.

use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use http::Method;
use std::error::Error as StdError;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;
use vigil_core::{NetworkErrorCode, UpstreamResponse};

/// A boxed future returned by transports.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// An outbound request description.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    method: Method,
    url: String,
    headers: HeaderMap,
    body: Option<Bytes>,
    retry_override: Option<bool>,
}

impl OutboundRequest {
    /// Creates a request with no headers and no body.
    #[must_use]
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: None,
            retry_override: None,
        }
    }

    /// Creates a GET request.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    /// Creates a POST request.
    #[must_use]
    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    /// Sets a header, replacing any previous value.
    #[must_use]
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Sets a raw body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serializes `value` as the JSON body.
    ///
    /// # Errors
    ///
    /// Returns the serialization error.
    pub fn json<T: serde::Serialize + ?Sized>(mut self, value: &T) -> serde_json::Result<Self> {
        self.body = Some(Bytes::from(serde_json::to_vec(value)?));
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(self)
    }

    /// Forces retries on or off for this call, regardless of method.
    #[must_use]
    pub const fn allow_retry(mut self, allow: bool) -> Self {
        self.retry_override = Some(allow);
        self
    }

    /// The method.
    #[must_use]
    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// The target URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The request headers.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Mutable access to the request headers.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// The request body, if any.
    #[must_use]
    pub const fn body_bytes(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// The per-call retry override, if any.
    #[must_use]
    pub const fn retry_override(&self) -> Option<bool> {
        self.retry_override
    }
}

/// A failure below HTTP on a single attempt.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct TransportError {
    /// The mapped network code, if recognized.
    pub code: Option<NetworkErrorCode>,
    /// Description of the failure.
    pub message: String,
}

impl TransportError {
    /// Creates a transport error.
    #[must_use]
    pub fn new(code: Option<NetworkErrorCode>, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Performs single HTTP attempts.
pub trait HttpTransport: Send + Sync + 'static {
    /// Sends `request` once.
    fn send<'a>(
        &'a self,
        request: &'a OutboundRequest,
    ) -> BoxFuture<'a, Result<UpstreamResponse, TransportError>>;
}

/// [`HttpTransport`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Creates a transport with a default `reqwest` client.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialized.
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| TransportError::new(None, e.to_string()))?;
        Ok(Self { client })
    }

    /// Wraps an existing `reqwest` client.
    #[must_use]
    pub const fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl HttpTransport for ReqwestTransport {
    fn send<'a>(
        &'a self,
        request: &'a OutboundRequest,
    ) -> BoxFuture<'a, Result<UpstreamResponse, TransportError>> {
        Box::pin(async move {
            let mut builder = self
                .client
                .request(request.method.clone(), &request.url)
                .headers(request.headers.clone());
            if let Some(body) = &request.body {
                builder = builder.body(body.clone());
            }

            let response = builder.send().await.map_err(|e| map_reqwest_error(&e))?;
            let status = response.status().as_u16();
            let headers = response.headers().clone();
            let body = response.bytes().await.map_err(|e| map_reqwest_error(&e))?;

            Ok(UpstreamResponse {
                status,
                headers,
                body,
            })
        })
    }
}

/// Maps a `reqwest` failure to a transport error with a network code.
///
/// The code comes from the first `std::io::Error` found in the source chain.
/// Timeouts and resolver failures, which reqwest does not surface as a plain
/// I/O error kind, are detected separately.
#[must_use]
pub fn map_reqwest_error(err: &reqwest::Error) -> TransportError {
    let code = if err.is_timeout() {
        Some(NetworkErrorCode::TimedOut)
    } else {
        io_code(err).or_else(|| is_dns_failure(err).then_some(NetworkErrorCode::DnsFailure))
    };

    TransportError::new(code, error_chain(err))
}

fn io_code(err: &reqwest::Error) -> Option<NetworkErrorCode> {
    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            if let Some(code) = NetworkErrorCode::from_io_kind(io.kind()) {
                return Some(code);
            }
        }
        source = cause.source();
    }
    None
}

fn is_dns_failure(err: &reqwest::Error) -> bool {
    err.is_connect() && error_chain(err).to_ascii_lowercase().contains("dns error")
}

fn error_chain(err: &reqwest::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
