//! # Vigil
//!
//! **Request observability and resilience pipeline**
//!
//! Vigil wraps every route handler with:
//!
//! - **Tracing**: a per-request span tree keyed by the `traceid` header
//! - **Deadlines**: per-route maximum durations with a one-minute fallback
//! - **Resilient outbound calls**: retries with exponential backoff, recorded
//!   on the request's span tree, propagating `traceid` and `authorization`
//! - **One error contract**: every failure classified into a stable
//!   `{"error": {...}}` envelope that never leaks internals
//! - **Metrics**: exactly one Prometheus sample per request
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use vigil::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConfigLoader::new()
//!         .with_optional_file("vigil.toml")?
//!         .with_env_prefix("VIGIL")
//!         .load()?;
//!     let vigil = Vigil::init(&config)?;
//!
//!     let route = RouteConfig::new("GET", "/cats/:id/owner", "cats", "owner");
//!     let response = vigil
//!         .pipeline()
//!         .handle(&route, request, |ctx, _req| async move {
//!             let owner = ctx
//!                 .outbound_client(vigil.client())
//!                 .get("http://owners.internal/owners/7")
//!                 .await?;
//!             Ok(Response::json(StatusCode::OK, &owner.json()?))
//!         })
//!         .await;
//!     Ok(())
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/vigil/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod runtime;

pub use runtime::{Vigil, VigilError};

pub use vigil_client as client;
pub use vigil_config as config;
pub use vigil_core as core;
pub use vigil_middleware as middleware;
pub use vigil_telemetry as telemetry;

pub use vigil_config::VigilConfig;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust,ignore
/// use vigil::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{Vigil, VigilError};

    pub use vigil_core::{
        ErrorKind, FieldViolation, PathSegment, PipelineError, PipelineResult, RequestContext,
        RouteConfig, Schema, SpanHandle, SpanStatus, TraceId,
    };

    pub use vigil_middleware::{
        ErrorEnvelope, HandlerResult, Request, RequestPipeline, Response, ResponseExt,
    };

    pub use vigil_client::{
        ClientError, OutboundClientExt, OutboundRequest, RetryPolicy, RetryingHttpClient,
        UpstreamError, UpstreamResponse,
    };

    pub use vigil_config::{ConfigLoader, VigilConfig};
}
