//! Trace-propagating outbound calls.
//!
//! Handlers never build outbound requests against the bare client. They ask
//! their [`RequestContext`] for a [`TracedClient`], which injects the request's
//! `traceid` and passes the inbound `authorization` header through unmodified:
//!
//! ```rust,ignore
//! use vigil_client::{OutboundClientExt, OutboundRequest};
//!
//! let owner = ctx
//!     .outbound_client(&client)
//!     .send(OutboundRequest::get("http://owners.internal/owners/7"))
//!     .await?;
//! ```

use crate::client::RetryingHttpClient;
use crate::error::{ClientError, ClientResult};
use crate::transport::OutboundRequest;
use http::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use vigil_core::{
    RequestContext, SpanHandle, TraceError, TraceId, UpstreamResponse, TRACE_ID_HEADER,
};

/// Headers copied from the inbound request onto every outbound call.
#[derive(Debug, Clone)]
pub struct PropagatedHeaders {
    trace_id: TraceId,
    authorization: Option<HeaderValue>,
}

impl PropagatedHeaders {
    /// Captures the propagated headers of `ctx`.
    #[must_use]
    pub fn from_context(ctx: &RequestContext) -> Self {
        Self {
            trace_id: ctx.trace_id().clone(),
            authorization: ctx.authorization().cloned(),
        }
    }

    /// The propagated trace id.
    #[must_use]
    pub const fn trace_id(&self) -> &TraceId {
        &self.trace_id
    }

    /// Writes the headers into `headers`, replacing existing values.
    pub fn add_to_headers(&self, headers: &mut HeaderMap) {
        match HeaderValue::from_str(self.trace_id.as_str()) {
            Ok(value) => {
                headers.insert(TRACE_ID_HEADER.clone(), value);
            }
            Err(_) => {
                tracing::warn!(traceid = %self.trace_id, "trace id is not a valid header value");
            }
        }

        if let Some(authorization) = &self.authorization {
            headers.insert(AUTHORIZATION, authorization.clone());
        }
    }
}

/// An outbound client bound to one request.
#[derive(Debug, Clone)]
pub struct TracedClient {
    client: RetryingHttpClient,
    headers: PropagatedHeaders,
    root: SpanHandle,
    parent: SpanHandle,
}

impl TracedClient {
    /// Binds `client` to `ctx`; calls become children of the root span.
    #[must_use]
    pub fn new(client: RetryingHttpClient, ctx: &RequestContext) -> Self {
        Self {
            client,
            headers: PropagatedHeaders::from_context(ctx),
            root: ctx.root_span().clone(),
            parent: ctx.root_span().clone(),
        }
    }

    /// Makes subsequent calls children of `span` instead of the root span.
    ///
    /// # Errors
    ///
    /// Returns [`TraceError::ForeignSpan`] when `span` belongs to another
    /// request's tree.
    pub fn under(mut self, span: SpanHandle) -> ClientResult<Self> {
        if !span.same_trace(&self.root) {
            return Err(ClientError::Trace(TraceError::ForeignSpan {
                span_id: span.id().clone(),
                trace_id: self.headers.trace_id().clone(),
            }));
        }
        self.parent = span;
        Ok(self)
    }

    /// The propagated headers.
    #[must_use]
    pub const fn propagated(&self) -> &PropagatedHeaders {
        &self.headers
    }

    /// Sends `request` with the propagated headers through the retrying
    /// client.
    ///
    /// # Errors
    ///
    /// See [`RetryingHttpClient::request`].
    pub async fn send(&self, mut request: OutboundRequest) -> ClientResult<UpstreamResponse> {
        self.headers.add_to_headers(request.headers_mut());
        self.client.request(&self.parent, request).await
    }

    /// Sends a GET request.
    ///
    /// # Errors
    ///
    /// See [`RetryingHttpClient::request`].
    pub async fn get(&self, url: impl Into<String>) -> ClientResult<UpstreamResponse> {
        self.send(OutboundRequest::get(url)).await
    }
}

/// Creates outbound clients from a request context.
pub trait OutboundClientExt {
    /// Returns a client that propagates this request's trace and
    /// authorization headers.
    fn outbound_client(&self, client: &RetryingHttpClient) -> TracedClient;
}

impl OutboundClientExt for RequestContext {
    fn outbound_client(&self, client: &RetryingHttpClient) -> TracedClient {
        TracedClient::new(client.clone(), self)
    }
}
