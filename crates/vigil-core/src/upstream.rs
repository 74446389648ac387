//! Downstream HTTP failure types.
//!
//! These are produced by the outbound client in `vigil-client` and surfaced to
//! handlers unmodified, so the classifier can report the original signal.

use bytes::Bytes;
use http::HeaderMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Network-level failure codes.
///
/// Serialized with their conventional `E*` names, which is also how they are
/// spelled in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NetworkErrorCode {
    /// Connection aborted.
    #[serde(rename = "ECONNABORTED")]
    ConnectionAborted,
    /// Connection reset by peer.
    #[serde(rename = "ECONNRESET")]
    ConnectionReset,
    /// Connection refused.
    #[serde(rename = "ECONNREFUSED")]
    ConnectionRefused,
    /// DNS lookup failed.
    #[serde(rename = "ENOTFOUND")]
    DnsFailure,
    /// Operation timed out.
    #[serde(rename = "ETIMEDOUT")]
    TimedOut,
    /// Broken pipe.
    #[serde(rename = "EPIPE")]
    BrokenPipe,
    /// Network unreachable.
    #[serde(rename = "ENETUNREACH")]
    NetworkUnreachable,
    /// Host unreachable.
    #[serde(rename = "EHOSTUNREACH")]
    HostUnreachable,
}

impl NetworkErrorCode {
    /// All known codes.
    pub const ALL: [Self; 8] = [
        Self::ConnectionAborted,
        Self::ConnectionReset,
        Self::ConnectionRefused,
        Self::DnsFailure,
        Self::TimedOut,
        Self::BrokenPipe,
        Self::NetworkUnreachable,
        Self::HostUnreachable,
    ];

    /// Returns the conventional `E*` name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ConnectionAborted => "ECONNABORTED",
            Self::ConnectionReset => "ECONNRESET",
            Self::ConnectionRefused => "ECONNREFUSED",
            Self::DnsFailure => "ENOTFOUND",
            Self::TimedOut => "ETIMEDOUT",
            Self::BrokenPipe => "EPIPE",
            Self::NetworkUnreachable => "ENETUNREACH",
            Self::HostUnreachable => "EHOSTUNREACH",
        }
    }

    /// Maps an I/O error kind to a network code.
    #[must_use]
    pub fn from_io_kind(kind: std::io::ErrorKind) -> Option<Self> {
        use std::io::ErrorKind;

        match kind {
            ErrorKind::ConnectionAborted => Some(Self::ConnectionAborted),
            ErrorKind::ConnectionReset => Some(Self::ConnectionReset),
            ErrorKind::ConnectionRefused => Some(Self::ConnectionRefused),
            ErrorKind::TimedOut => Some(Self::TimedOut),
            ErrorKind::BrokenPipe => Some(Self::BrokenPipe),
            _ => None,
        }
    }
}

impl fmt::Display for NetworkErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown network code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown network error code: {0}")]
pub struct UnknownNetworkCode(pub String);

impl FromStr for NetworkErrorCode {
    type Err = UnknownNetworkCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|code| code.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownNetworkCode(s.to_string()))
    }
}

/// A response received from a downstream service.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: HeaderMap,
    /// Raw response body.
    pub body: Bytes,
}

impl UpstreamResponse {
    /// Creates a response with empty headers.
    #[must_use]
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// Returns `true` for 2xx and 3xx statuses.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 400
    }

    /// Parses the body as JSON.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.body)
    }

    /// Returns a status code embedded in a JSON body as `code` or `error.code`.
    ///
    /// Only values in the HTTP status range (100..=599) are returned.
    #[must_use]
    pub fn embedded_code(&self) -> Option<u16> {
        let value: serde_json::Value = serde_json::from_slice(&self.body).ok()?;
        let code = value
            .get("code")
            .or_else(|| value.get("error").and_then(|e| e.get("code")))?;

        let code = match code {
            serde_json::Value::Number(n) => n.as_u64()?,
            serde_json::Value::String(s) => s.parse().ok()?,
            _ => return None,
        };

        u16::try_from(code)
            .ok()
            .filter(|code| (100..=599).contains(code))
    }
}

/// What went wrong on the last attempt of an outbound call.
#[derive(Debug, Clone, Error)]
pub enum UpstreamCause {
    /// The downstream service answered with a non-success status.
    #[error("responded with status {}", .0.status)]
    Status(UpstreamResponse),

    /// The call failed below HTTP.
    #[error("network error{}: {message}", .code.map(|c| format!(" {c}")).unwrap_or_default())]
    Network {
        /// The mapped network code, if recognized.
        code: Option<NetworkErrorCode>,
        /// Transport error description (never shown to clients).
        message: String,
    },
}

/// A failed outbound call, after retries were exhausted or refused.
#[derive(Debug, Clone, Error)]
#[error("{method} {url} failed after {attempts} attempt(s): {cause}")]
pub struct UpstreamError {
    /// HTTP method of the call.
    pub method: String,
    /// Target URL of the call.
    pub url: String,
    /// Number of attempts made.
    pub attempts: u32,
    /// The last observed failure.
    #[source]
    pub cause: UpstreamCause,
}

impl UpstreamError {
    /// Returns the last observed response status, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        self.response().map(|r| r.status)
    }

    /// Returns the last observed response, if any.
    #[must_use]
    pub fn response(&self) -> Option<&UpstreamResponse> {
        match &self.cause {
            UpstreamCause::Status(response) => Some(response),
            UpstreamCause::Network { .. } => None,
        }
    }

    /// Returns the network code, if the call failed below HTTP.
    #[must_use]
    pub fn network_code(&self) -> Option<NetworkErrorCode> {
        match &self.cause {
            UpstreamCause::Network { code, .. } => *code,
            UpstreamCause::Status(_) => None,
        }
    }
}
