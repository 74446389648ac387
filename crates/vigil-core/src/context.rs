//! Request context types.
//!
//! The [`RequestContext`] carries all per-request state through the pipeline
//! and into handlers. It is created once at ingress by [`RequestContext::begin`]
//! and passed explicitly; nothing here is ever stored in a shared map.

use crate::identity::UserIdentity;
use crate::route::RouteConfig;
use crate::span::{Span, SpanHandle, TraceError};
use http::{HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Name given to the root span of every request.
pub const ROOT_SPAN_NAME: &str = "request";

/// Header carrying the trace id, inbound, outbound and on every response.
pub static TRACE_ID_HEADER: HeaderName = HeaderName::from_static("traceid");

/// The trace identifier of one request.
///
/// Either propagated verbatim from the inbound `traceid` header or a freshly
/// generated UUID v4.
///
/// # Example
///
/// ```
/// use vigil_core::TraceId;
///
/// let id = TraceId::from_inbound(Some("abc-123"));
/// assert_eq!(id.as_str(), "abc-123");
///
/// let fresh = TraceId::from_inbound(None);
/// assert_eq!(fresh.as_str().len(), 36);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TraceId(String);

impl TraceId {
    /// Generates a new random (UUID v4) trace ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Reuses an inbound trace ID, or generates one if it is absent or empty.
    #[must_use]
    pub fn from_inbound(inbound: Option<&str>) -> Self {
        match inbound {
            Some(value) if !value.is_empty() => Self(value.to_string()),
            _ => Self::generate(),
        }
    }

    /// Returns the trace ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TraceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-request context that flows through the pipeline.
///
/// `RequestContext` carries:
/// - The trace ID, stable for the request's lifetime
/// - The root span of the request's span tree
/// - The deadline, once the pipeline has computed it
/// - The caller identity, if one was resolved
/// - The inbound `authorization` header, passed through to outbound calls
///
/// Cloning a context yields another handle onto the same request: the clone
/// shares the span tree, so it can be moved into fan-out futures.
///
/// # Example
///
/// ```
/// use vigil_core::RequestContext;
///
/// let ctx = RequestContext::begin(Some("trace-1"));
/// let child = ctx.start_child_span(ctx.root_span(), "db.query").unwrap();
/// child.finish();
/// assert_eq!(ctx.spans().len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct RequestContext {
    trace_id: TraceId,
    root: SpanHandle,
    deadline: Option<Instant>,
    started_at: Instant,
    identity: Option<UserIdentity>,
    authorization: Option<HeaderValue>,
    method: String,
    path: String,
    route: Option<RouteConfig>,
}

impl RequestContext {
    /// Begins a request, reusing `inbound` as the trace ID when present.
    #[must_use]
    pub fn begin(inbound: Option<&str>) -> Self {
        let trace_id = TraceId::from_inbound(inbound);
        let root = SpanHandle::new_root(trace_id.clone(), ROOT_SPAN_NAME);

        Self {
            trace_id,
            root,
            deadline: None,
            started_at: Instant::now(),
            identity: None,
            authorization: None,
            method: String::new(),
            path: String::new(),
            route: None,
        }
    }

    /// Sets the request method and records it on the root span.
    #[must_use]
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self.root.add_attribute("http.method", self.method.clone());
        self
    }

    /// Sets the original request path and records it on the root span.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self.root.add_attribute("http.target", self.path.clone());
        self
    }

    /// Associates the route this request was dispatched to.
    ///
    /// The root span is renamed to `"<METHOD> <template>"`.
    #[must_use]
    pub fn with_route(mut self, route: RouteConfig) -> Self {
        self.root
            .set_name(format!("{} {}", route.method(), route.template()));
        self.root.add_attribute("http.route", route.template());
        self.route = Some(route);
        self
    }

    /// Sets the caller identity.
    #[must_use]
    pub fn with_identity(mut self, identity: UserIdentity) -> Self {
        self.root.add_attribute("enduser.id", identity.log_id());
        self.identity = Some(identity);
        self
    }

    /// Sets the inbound `authorization` header value.
    #[must_use]
    pub fn with_authorization(mut self, authorization: HeaderValue) -> Self {
        self.authorization = Some(authorization);
        self
    }

    /// Sets the absolute deadline.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Returns the trace ID.
    #[must_use]
    pub fn trace_id(&self) -> &TraceId {
        &self.trace_id
    }

    /// Returns the root span of this request.
    #[must_use]
    pub fn root_span(&self) -> &SpanHandle {
        &self.root
    }

    /// Starts a child span of `parent`.
    ///
    /// # Errors
    ///
    /// Returns [`TraceError::ForeignSpan`] if `parent` belongs to another
    /// request, or [`TraceError::ParentFinished`] if it is already finished.
    pub fn start_child_span(
        &self,
        parent: &SpanHandle,
        name: impl Into<String>,
    ) -> Result<SpanHandle, TraceError> {
        if !parent.same_trace(&self.root) {
            return Err(TraceError::ForeignSpan {
                span_id: parent.id().clone(),
                trace_id: self.trace_id.clone(),
            });
        }
        parent.start_child(name)
    }

    /// Returns snapshots of every span of this request, in creation order.
    #[must_use]
    pub fn spans(&self) -> Vec<Span> {
        self.root.tree_snapshot()
    }

    /// Returns the caller identity, if one was resolved.
    #[must_use]
    pub fn identity(&self) -> Option<&UserIdentity> {
        self.identity.as_ref()
    }

    /// Returns the inbound `authorization` header value.
    #[must_use]
    pub fn authorization(&self) -> Option<&HeaderValue> {
        self.authorization.as_ref()
    }

    /// Returns the request method.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Returns the original request path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the route this request was dispatched to.
    #[must_use]
    pub fn route(&self) -> Option<&RouteConfig> {
        self.route.as_ref()
    }

    /// Returns the absolute deadline, if set.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns the time left until the deadline.
    ///
    /// `None` when no deadline is set; zero once it has passed.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Returns the time elapsed since the request began.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Returns `true` once the root span is finished.
    ///
    /// A closed request's span tree is sealed; late work is discarded.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.root.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_trace_id_reused_verbatim() {
        let ctx = RequestContext::begin(Some("my-Trace_ID.42"));
        assert_eq!(ctx.trace_id().as_str(), "my-Trace_ID.42");
        assert_eq!(ctx.root_span().snapshot().trace_id.as_str(), "my-Trace_ID.42");
    }

    #[test]
    fn test_generated_trace_id_is_uuid_v4() {
        let ctx = RequestContext::begin(None);
        let uuid = Uuid::parse_str(ctx.trace_id().as_str()).unwrap();
        assert_eq!(uuid.get_version_num(), 4);
    }

    #[test]
    fn test_empty_inbound_counts_as_absent() {
        let ctx = RequestContext::begin(Some(""));
        assert!(Uuid::parse_str(ctx.trace_id().as_str()).is_ok());
    }

    #[test]
    fn test_requests_are_isolated() {
        let a = RequestContext::begin(None);
        let b = RequestContext::begin(None);
        assert_ne!(a.trace_id(), b.trace_id());

        a.start_child_span(a.root_span(), "only-in-a").unwrap();
        assert_eq!(a.spans().len(), 2);
        assert_eq!(b.spans().len(), 1);
    }

    #[test]
    fn test_foreign_parent_rejected() {
        let a = RequestContext::begin(None);
        let b = RequestContext::begin(None);

        let err = a.start_child_span(b.root_span(), "cross").unwrap_err();
        assert!(matches!(err, TraceError::ForeignSpan { .. }));
    }

    #[test]
    fn test_clone_shares_span_tree() {
        let ctx = RequestContext::begin(None);
        let clone = ctx.clone();
        clone
            .start_child_span(clone.root_span(), "from-clone")
            .unwrap();
        assert_eq!(ctx.spans().len(), 2);
    }

    #[test]
    fn test_route_renames_root_span() {
        let route = RouteConfig::new("GET", "/cats/:id", "cats", "find_one");
        let ctx = RequestContext::begin(None)
            .with_method("GET")
            .with_path("/cats/7")
            .with_route(route);

        let root = ctx.root_span().snapshot();
        assert_eq!(root.name, "GET /cats/:id");
        assert_eq!(ctx.path(), "/cats/7");
        assert_eq!(ctx.route().map(RouteConfig::template), Some("/cats/:id"));
    }

    #[test]
    fn test_remaining_saturates() {
        let ctx = RequestContext::begin(None).with_deadline(Instant::now());
        std::thread::sleep(Duration::from_millis(2));
        assert_eq!(ctx.remaining(), Some(Duration::ZERO));
        assert!(RequestContext::begin(None).remaining().is_none());
    }

    #[test]
    fn test_is_closed_after_root_finish() {
        let ctx = RequestContext::begin(None);
        assert!(!ctx.is_closed());
        ctx.root_span().finish();
        assert!(ctx.is_closed());
    }
}
