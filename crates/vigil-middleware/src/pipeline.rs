//! The request pipeline.
//!
//! [`RequestPipeline::handle`] drives one request through a fixed sequence of
//! states:
//!
//! ```text
//! Received → Traced → Executing → {Completed | TimedOut | Failed}
//!          → Classified → Responded → SpanClosed
//! ```
//!
//! `Classified` is skipped only for `Completed`. `SpanClosed` is reached on
//! every path: handler success, handler error, deadline expiry, handler panic,
//! and cancellation of the pipeline future itself. The last step runs from a
//! drop guard, which is also the single place a metric sample is recorded.

use futures_util::FutureExt;
use http::header::AUTHORIZATION;
use http::HeaderValue;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Instrument;
use vigil_core::{PipelineError, RequestContext, RouteConfig, SpanStatus, TRACE_ID_HEADER};
use vigil_telemetry::{MetricSample, MetricsRecorder};

use crate::classify::classify;
use crate::deadline::DeadlineGuard;
use crate::envelope::ErrorEnvelope;
use crate::types::{HandlerResult, Request, Response};

/// Status recorded when the caller goes away before a response exists.
pub const CLIENT_CLOSED_REQUEST: u16 = 499;

/// Lifecycle states of one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineState {
    /// The request arrived.
    Received,
    /// The trace context and root span exist.
    Traced,
    /// The handler is running under its deadline.
    Executing,
    /// The handler produced a response.
    Completed,
    /// The deadline fired first.
    TimedOut,
    /// The handler returned an error or panicked.
    Failed,
    /// The failure has a status, kind and messages.
    Classified,
    /// The final status is known.
    Responded,
    /// Metrics are recorded and the root span is finished.
    SpanClosed,
}

impl PipelineState {
    /// Returns the upper-case name of the state.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "RECEIVED",
            Self::Traced => "TRACED",
            Self::Executing => "EXECUTING",
            Self::Completed => "COMPLETED",
            Self::TimedOut => "TIMED_OUT",
            Self::Failed => "FAILED",
            Self::Classified => "CLASSIFIED",
            Self::Responded => "RESPONDED",
            Self::SpanClosed => "SPAN_CLOSED",
        }
    }

    /// Returns `true` for [`PipelineState::SpanClosed`].
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::SpanClosed)
    }

    /// Returns `true` if the pipeline may move from `self` to `next`.
    #[must_use]
    pub const fn can_advance_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Received, Self::Traced)
                | (Self::Traced, Self::Executing)
                | (
                    Self::Executing,
                    Self::Completed | Self::TimedOut | Self::Failed
                )
                | (Self::TimedOut | Self::Failed, Self::Classified)
                | (Self::Completed | Self::Classified, Self::Responded)
                | (_, Self::SpanClosed)
        ) && !self.is_terminal()
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runs handlers with tracing, deadlines, error classification and metrics.
///
/// One pipeline serves every route; per-route behaviour comes from the
/// [`RouteConfig`] passed to [`handle`](Self::handle).
///
/// # Example
///
/// ```ignore
/// let pipeline = RequestPipeline::builder(metrics)
///     .default_timeout(Some(Duration::from_secs(30)))
///     .build();
///
/// let route = RouteConfig::new("GET", "/cats/:id", "cats", "find_one");
/// let response = pipeline
///     .handle(&route, request, |ctx, req| async move { find_cat(ctx, req).await })
///     .await;
/// ```
#[derive(Debug, Clone)]
pub struct RequestPipeline {
    metrics: Arc<MetricsRecorder>,
    deadline: DeadlineGuard,
}

/// Builder for [`RequestPipeline`].
#[derive(Debug)]
pub struct RequestPipelineBuilder {
    metrics: Arc<MetricsRecorder>,
    default_timeout: Option<Duration>,
}

impl RequestPipelineBuilder {
    /// Sets the deadline for routes without their own maximum duration.
    ///
    /// `None` falls back to one minute.
    #[must_use]
    pub fn default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Builds the pipeline.
    #[must_use]
    pub fn build(self) -> RequestPipeline {
        RequestPipeline {
            metrics: self.metrics,
            deadline: DeadlineGuard::new(self.default_timeout),
        }
    }
}

impl RequestPipeline {
    /// Creates a builder recording into `metrics`.
    #[must_use]
    pub fn builder(metrics: Arc<MetricsRecorder>) -> RequestPipelineBuilder {
        RequestPipelineBuilder {
            metrics,
            default_timeout: None,
        }
    }

    /// The deadline guard applied to handlers.
    #[must_use]
    pub const fn deadline(&self) -> &DeadlineGuard {
        &self.deadline
    }

    /// The recorder samples go to.
    #[must_use]
    pub fn metrics(&self) -> &Arc<MetricsRecorder> {
        &self.metrics
    }

    /// Processes one request.
    ///
    /// The handler receives the request's [`RequestContext`] and the request
    /// itself. Whatever happens, the returned response carries the `traceid`
    /// header, and failures are rendered as an [`ErrorEnvelope`].
    pub async fn handle<H, Fut>(&self, route: &RouteConfig, request: Request, handler: H) -> Response
    where
        H: FnOnce(RequestContext, Request) -> Fut,
        Fut: Future<Output = HandlerResult>,
    {
        let inbound = request
            .headers()
            .get(&TRACE_ID_HEADER)
            .and_then(|value| match value.to_str() {
                Ok(traceid) => Some(traceid),
                Err(_) => {
                    tracing::debug!(
                        inbound = ?value,
                        "inbound traceid is not visible ASCII; generating a new one"
                    );
                    None
                }
            });
        let limit = self.deadline.effective_timeout(route.max_duration());

        let mut ctx = RequestContext::begin(inbound)
            .with_method(request.method().as_str())
            .with_path(request.uri().path())
            .with_route(route.clone());
        match Instant::now().checked_add(limit) {
            Some(deadline) => ctx = ctx.with_deadline(deadline),
            None => tracing::debug!(
                http.route = %route.template(),
                "route deadline is past the clock range; leaving it unset"
            ),
        }
        if let Some(authorization) = request.headers().get(AUTHORIZATION) {
            ctx = ctx.with_authorization(authorization.clone());
        }

        let span = tracing::info_span!(
            "request",
            traceid = %ctx.trace_id(),
            http.method = %ctx.method(),
            http.route = %route.template(),
        );

        self.run(ctx, route, request, handler).instrument(span).await
    }

    async fn run<H, Fut>(
        &self,
        ctx: RequestContext,
        route: &RouteConfig,
        request: Request,
        handler: H,
    ) -> Response
    where
        H: FnOnce(RequestContext, Request) -> Fut,
        Fut: Future<Output = HandlerResult>,
    {
        let mut finalizer = Finalizer::new(ctx.clone(), Arc::clone(&self.metrics));
        finalizer.advance(PipelineState::Traced);

        let handler_ctx = ctx.clone();
        let invocation = AssertUnwindSafe(async move { handler(handler_ctx, request).await });

        finalizer.advance(PipelineState::Executing);
        let outcome = self
            .deadline
            .run(&ctx, route.max_duration(), invocation.catch_unwind())
            .await;

        let result = match outcome {
            Ok(Ok(Ok(response))) => Ok(response),
            Ok(Ok(Err(err))) => Err((PipelineState::Failed, err)),
            Ok(Err(panic)) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(traceid = %ctx.trace_id(), panic = %message, "Handler panicked");
                Err((PipelineState::Failed, PipelineError::internal(message)))
            }
            Err(timeout) => Err((PipelineState::TimedOut, PipelineError::from(timeout))),
        };

        let mut response = match result {
            Ok(response) => {
                finalizer.advance(PipelineState::Completed);
                response
            }
            Err((state, err)) => {
                finalizer.advance(state);
                let classification = classify(&err);
                finalizer.advance(PipelineState::Classified);

                vigil_telemetry::log_request_error!(
                    ctx.trace_id(),
                    classification.kind,
                    classification.status,
                    err
                );
                let root = ctx.root_span();
                root.add_attribute("error.kind", classification.kind.as_str());
                root.set_status(SpanStatus::error(classification.kind.as_str()));

                ErrorEnvelope::format(&ctx, &classification).into_response()
            }
        };

        if let Ok(value) = HeaderValue::from_str(ctx.trace_id().as_str()) {
            response.headers_mut().insert(TRACE_ID_HEADER.clone(), value);
        }

        finalizer.respond(response.status().as_u16());
        response
    }
}

/// Finalizes a request exactly once, when dropped.
struct Finalizer {
    ctx: RequestContext,
    metrics: Arc<MetricsRecorder>,
    state: PipelineState,
    status: Option<u16>,
}

impl Finalizer {
    fn new(ctx: RequestContext, metrics: Arc<MetricsRecorder>) -> Self {
        Self {
            ctx,
            metrics,
            state: PipelineState::Received,
            status: None,
        }
    }

    fn advance(&mut self, next: PipelineState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "invalid pipeline transition {} -> {next}",
            self.state
        );
        tracing::trace!(from = %self.state, to = %next, "pipeline state");
        self.state = next;
    }

    fn respond(&mut self, status: u16) {
        self.status = Some(status);
        self.advance(PipelineState::Responded);
    }
}

impl Drop for Finalizer {
    fn drop(&mut self) {
        let status = self.status.unwrap_or_else(|| {
            tracing::warn!(
                traceid = %self.ctx.trace_id(),
                state = %self.state,
                "Request cancelled before a response was produced"
            );
            CLIENT_CLOSED_REQUEST
        });

        let route = self
            .ctx
            .route()
            .map_or_else(|| self.ctx.path().to_string(), |r| r.template().to_string());
        let duration = self.ctx.elapsed();
        self.metrics.record(&MetricSample::new(
            self.ctx.method(),
            route.as_str(),
            status,
            duration,
        ));

        let root = self.ctx.root_span();
        root.add_attribute("http.status_code", status);
        if self.status.is_none() {
            root.set_status(SpanStatus::error("cancelled"));
        } else if !root.snapshot().status.is_error() {
            root.set_status(SpanStatus::Ok);
        }
        root.finish();
        self.state = PipelineState::SpanClosed;

        vigil_telemetry::log_request_complete!(
            self.ctx.trace_id(),
            self.ctx.method(),
            route,
            status,
            duration.as_millis() as u64
        );
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_names() {
        assert_eq!(PipelineState::TimedOut.to_string(), "TIMED_OUT");
        assert_eq!(PipelineState::SpanClosed.as_str(), "SPAN_CLOSED");
        assert!(PipelineState::SpanClosed.is_terminal());
        assert!(!PipelineState::Responded.is_terminal());
    }

    #[test]
    fn test_transitions() {
        use PipelineState::{
            Classified, Completed, Executing, Failed, Received, Responded, SpanClosed, TimedOut,
            Traced,
        };

        assert!(Received.can_advance_to(Traced));
        assert!(Executing.can_advance_to(TimedOut));
        assert!(Completed.can_advance_to(Responded));
        assert!(Failed.can_advance_to(Classified));

        // Only successful handlers skip classification.
        assert!(!Failed.can_advance_to(Responded));
        assert!(!Completed.can_advance_to(Classified));

        // Cancellation may close the span from anywhere but the end.
        assert!(Executing.can_advance_to(SpanClosed));
        assert!(!SpanClosed.can_advance_to(SpanClosed));
    }

    #[test]
    fn test_panic_message() {
        let panic: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(panic.as_ref()), "boom");

        let panic: Box<dyn Any + Send> = Box::new(String::from("kaboom"));
        assert_eq!(panic_message(panic.as_ref()), "kaboom");

        let panic: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(panic.as_ref()), "handler panicked");
    }
}
