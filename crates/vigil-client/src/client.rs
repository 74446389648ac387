//! The retrying HTTP client.
//!
//! Every call made through [`RetryingHttpClient::request`] gets its own child
//! span under the caller's span. Attempts and scheduled retries are logged as
//! span events:
//!
//! | Event | Attributes |
//! |-------|------------|
//! | `http.attempt` | `attempt`, `outcome` (status code or network code) |
//! | `http.retry` | `attempt`, `delay_ms` |
//!
//! When the call fails for good, the last observed failure is returned
//! unmodified inside an [`UpstreamError`].

use crate::error::{ClientError, ClientResult};
use crate::policy::RetryPolicy;
use crate::transport::{HttpTransport, OutboundRequest, ReqwestTransport, TransportError};
use std::sync::Arc;
use std::time::Duration;
use vigil_core::{
    AttributeValue, NetworkErrorCode, SpanHandle, SpanStatus, UpstreamCause, UpstreamError,
    UpstreamResponse,
};

/// Outbound HTTP client with bounded, jittered retries.
///
/// Cheap to clone; clones share the transport and the policy.
#[derive(Clone)]
pub struct RetryingHttpClient {
    transport: Arc<dyn HttpTransport>,
    policy: Arc<RetryPolicy>,
}

impl std::fmt::Debug for RetryingHttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryingHttpClient")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl RetryingHttpClient {
    /// Creates a client over `transport`.
    pub fn new(transport: impl HttpTransport, policy: RetryPolicy) -> Self {
        Self {
            transport: Arc::new(transport),
            policy: Arc::new(policy),
        }
    }

    /// Creates a client backed by `reqwest`.
    ///
    /// # Errors
    ///
    /// Returns an error if the `reqwest` client cannot be built.
    pub fn with_reqwest(policy: RetryPolicy) -> Result<Self, TransportError> {
        Ok(Self::new(ReqwestTransport::new()?, policy))
    }

    /// The retry policy.
    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Performs `request` under a new child span of `span`.
    ///
    /// Returns the first response with a 2xx or 3xx status.
    ///
    /// # Errors
    ///
    /// - `ClientError::Trace` if `span` is already finished; nothing is sent.
    /// - `ClientError::Upstream` with the last failure once retries are
    ///   exhausted or the failure is not retryable.
    pub async fn request(
        &self,
        span: &SpanHandle,
        request: OutboundRequest,
    ) -> ClientResult<UpstreamResponse> {
        let call = span.start_child(format!("HTTP {}", request.method()))?;
        call.add_attribute("http.method", request.method().as_str());
        call.add_attribute("http.url", request.url());

        let result = self.execute(&call, &request).await;
        match &result {
            Ok(response) => {
                call.add_attribute("http.status_code", response.status);
                call.set_status(SpanStatus::Ok);
            }
            Err(err) => {
                if let Some(status) = err.status() {
                    call.add_attribute("http.status_code", status);
                }
                call.set_status(SpanStatus::error(err.cause.to_string()));
            }
        }
        call.finish();

        result.map_err(ClientError::from)
    }

    async fn execute(
        &self,
        call: &SpanHandle,
        request: &OutboundRequest,
    ) -> Result<UpstreamResponse, UpstreamError> {
        let retry_allowed = request
            .retry_override()
            .unwrap_or_else(|| self.policy.is_idempotent(request.method()));
        let max_attempts = self.policy.max_attempts();

        let mut attempt = 0;
        loop {
            attempt += 1;

            let cause = match self.attempt(request).await {
                Ok(response) if response.is_success() => {
                    log_attempt(call, attempt, response.status.to_string());
                    call.add_attribute("http.attempts", attempt);
                    return Ok(response);
                }
                Ok(response) => {
                    log_attempt(call, attempt, response.status.to_string());
                    UpstreamCause::Status(response)
                }
                Err(err) => {
                    let outcome = err
                        .code
                        .map_or_else(|| "network_error".to_string(), |c| c.as_str().to_string());
                    log_attempt(call, attempt, outcome);
                    UpstreamCause::Network {
                        code: err.code,
                        message: err.message,
                    }
                }
            };

            let retryable = match &cause {
                UpstreamCause::Status(response) => self.policy.is_retryable_status(response.status),
                UpstreamCause::Network { code, .. } => self.policy.is_retryable_code(*code),
            };

            if !retry_allowed || !retryable || attempt >= max_attempts {
                call.add_attribute("http.attempts", attempt);
                tracing::debug!(
                    traceid = %call.trace_id(),
                    http.method = %request.method(),
                    http.url = %request.url(),
                    attempts = attempt,
                    "outbound call failed"
                );
                return Err(UpstreamError {
                    method: request.method().to_string(),
                    url: request.url().to_string(),
                    attempts: attempt,
                    cause,
                });
            }

            let delay = self.policy.backoff(attempt);
            call.log_event(
                "http.retry",
                [
                    ("attempt", AttributeValue::from(attempt)),
                    ("delay_ms", AttributeValue::from(millis(delay))),
                ],
            );
            tracing::debug!(
                traceid = %call.trace_id(),
                http.url = %request.url(),
                attempt,
                delay_ms = millis(delay),
                "retrying outbound call"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn attempt(&self, request: &OutboundRequest) -> Result<UpstreamResponse, TransportError> {
        match self.policy.attempt_timeout() {
            Some(limit) => tokio::time::timeout(limit, self.transport.send(request))
                .await
                .unwrap_or_else(|_| {
                    Err(TransportError::new(
                        Some(NetworkErrorCode::TimedOut),
                        format!("attempt timed out after {}ms", millis(limit)),
                    ))
                }),
            None => self.transport.send(request).await,
        }
    }
}

fn log_attempt(call: &SpanHandle, attempt: u32, outcome: String) {
    call.log_event(
        "http.attempt",
        [
            ("attempt", AttributeValue::from(attempt)),
            ("outcome", AttributeValue::from(outcome)),
        ],
    );
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
