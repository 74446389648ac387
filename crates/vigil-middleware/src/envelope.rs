//! The external error contract.
//!
//! Every failed request is answered with exactly one [`ErrorEnvelope`]:
//!
//! ```json
//! {
//!   "error": {
//!     "code": 404,
//!     "traceid": "7f1c...",
//!     "context": "cats/find_one",
//!     "message": ["Not Found"],
//!     "timestamp": "2024-03-01 12:00:00",
//!     "path": "/cats/7"
//!   }
//! }
//! ```

use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::header::{HeaderValue, CONTENT_TYPE, RETRY_AFTER};
use http::StatusCode;
use http_body_util::Full;
use serde::{Deserialize, Serialize};
use vigil_core::{RequestContext, TRACE_ID_HEADER};

use crate::classify::Classification;
use crate::types::Response;

/// UTC timestamp format of the envelope.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Error body returned to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// HTTP status.
    pub code: u16,
    /// Trace ID of the request.
    pub traceid: String,
    /// Logical location of the failure (`component/operation`).
    pub context: Option<String>,
    /// Client-facing messages; never empty.
    pub message: Vec<String>,
    /// UTC time of formatting.
    pub timestamp: String,
    /// Original request path.
    pub path: String,
    #[serde(skip)]
    retry_after_seconds: Option<u64>,
}

#[derive(Serialize, Deserialize)]
struct Body<T> {
    error: T,
}

impl ErrorEnvelope {
    /// Builds the envelope for a classified failure, stamped now.
    #[must_use]
    pub fn format(ctx: &RequestContext, classification: &Classification) -> Self {
        Self::format_at(ctx, classification, Utc::now())
    }

    /// Builds the envelope stamped at `now`.
    #[must_use]
    pub fn format_at(
        ctx: &RequestContext,
        classification: &Classification,
        now: DateTime<Utc>,
    ) -> Self {
        let context = classification
            .context
            .clone()
            .or_else(|| ctx.route().map(vigil_core::RouteConfig::logical_identity));

        Self {
            code: classification.status,
            traceid: ctx.trace_id().to_string(),
            context,
            message: classification.messages.clone(),
            timestamp: now.format(TIMESTAMP_FORMAT).to_string(),
            path: ctx.path().to_string(),
            retry_after_seconds: classification.retry_after_seconds,
        }
    }

    /// Serializes the `{"error": {...}}` body.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({ "error": self })
    }

    /// Parses an envelope out of a response body.
    ///
    /// # Errors
    ///
    /// Returns the JSON error if `body` is not an error envelope.
    pub fn from_body(body: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice::<Body<Self>>(body).map(|body| body.error)
    }

    /// Renders the envelope into an HTTP response.
    ///
    /// The response carries `content-type: application/json`, the `traceid`
    /// header and, for rate-limited failures with a known delay, `retry-after`.
    #[must_use]
    pub fn into_response(self) -> Response {
        let body = serde_json::to_vec(&Body { error: &self }).unwrap_or_else(|e| {
            tracing::error!(
                traceid = %self.traceid,
                code = self.code,
                error = %e,
                "error envelope failed to serialize; sending the bare code"
            );
            bare_body(self.code)
        });
        let mut response = http::Response::new(Full::new(Bytes::from(body)));
        *response.status_mut() =
            StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let headers = response.headers_mut();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Ok(value) = HeaderValue::from_str(&self.traceid) {
            headers.insert(TRACE_ID_HEADER.clone(), value);
        }
        if let Some(seconds) = self.retry_after_seconds {
            headers.insert(RETRY_AFTER, HeaderValue::from(seconds));
        }

        response
    }
}

/// `{"error":{"code":N}}`, built without a serializer.
fn bare_body(code: u16) -> Vec<u8> {
    format!(r#"{{"error":{{"code":{code}}}}}"#).into_bytes()
}
