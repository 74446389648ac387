//! Outbound HTTP for Vigil handlers.
//!
//! - [`RetryingHttpClient`] retries failed calls according to a
//!   [`RetryPolicy`] and records every attempt on a child span.
//! - [`HttpTransport`] is the single-attempt seam; [`ReqwestTransport`] is
//!   the production implementation.
//! - [`OutboundClientExt`] turns a [`RequestContext`](vigil_core::RequestContext)
//!   into a [`TracedClient`] that propagates `traceid` and `authorization`.

pub mod client;
pub mod error;
pub mod policy;
pub mod traced;
pub mod transport;

pub use client::RetryingHttpClient;
pub use error::{ClientError, ClientResult};
pub use policy::{RetryPolicy, DEFAULT_RETRYABLE_STATUSES};
pub use traced::{OutboundClientExt, PropagatedHeaders, TracedClient};
pub use transport::{
    map_reqwest_error, BoxFuture, HttpTransport, OutboundRequest, ReqwestTransport,
    TransportError,
};
pub use vigil_core::{NetworkErrorCode, UpstreamCause, UpstreamError, UpstreamResponse};
