//! # Vigil Core
//!
//! Core types shared by every stage of the Vigil request pipeline.
//!
//! This crate provides the foundational, request-scoped types:
//!
//! - [`RequestContext`] - Per-request context carrying the trace id, deadline, identity and span tree
//! - [`TraceId`] - The request's trace identifier (propagated or UUID v4)
//! - [`SpanHandle`] / [`Span`] - Handles into, and snapshots of, the request's span tree
//! - [`PipelineError`] - Closed set of failure variants constructed at the raise site
//! - [`UpstreamError`] - Downstream HTTP failures surfaced by the outbound client
//! - [`RouteConfig`] - Per-route metadata supplied at registration time
//! - [`Schema`] - Request body validation producing field-level violations
//!
//! Nothing in this crate holds global state. Every value here lives for exactly
//! one request and is passed explicitly.

#![doc(html_root_url = "https://docs.rs/vigil-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod context;
mod error;
mod identity;
mod route;
pub mod span;
mod upstream;
pub mod validation;

pub use context::{RequestContext, TraceId, ROOT_SPAN_NAME, TRACE_ID_HEADER};
pub use error::{ErrorKind, PipelineError, PipelineResult, TimeoutError};
pub use identity::UserIdentity;
pub use route::RouteConfig;
pub use span::{AttributeValue, Span, SpanEvent, SpanHandle, SpanId, SpanStatus, TraceError};
pub use upstream::{
    NetworkErrorCode, UnknownNetworkCode, UpstreamCause, UpstreamError, UpstreamResponse,
};
pub use validation::{FieldViolation, PathSegment, Schema};
