//! # Vigil Middleware
//!
//! The request pipeline every route runs through.
//!
//! ```text
//! Request → begin trace → deadline ⟶ handler
//!                                      ↓
//! Response ← envelope ← classify ← {ok | error | timeout | panic}
//!              └──────── metrics + root span close (exactly once) ────────┘
//! ```
//!
//! | Module       | Purpose                                              |
//! |--------------|------------------------------------------------------|
//! | [`deadline`] | Race handlers against the per-route deadline         |
//! | [`classify`] | Map any [`PipelineError`](vigil_core::PipelineError) to status, kind and messages |
//! | [`envelope`] | Render the `{"error": {...}}` contract               |
//! | [`pipeline`] | Drive one request and finalize it on every path      |
//!
//! ## Example
//!
//! ```
//! use vigil_middleware::classify;
//! use vigil_core::{FieldViolation, PathSegment, PipelineError};
//!
//! let err = PipelineError::validation(vec![FieldViolation::new(
//!     vec![PathSegment::key("age")],
//!     "Required",
//! )]);
//! let classification = classify(&err);
//! assert_eq!(classification.status, 400);
//! assert_eq!(classification.messages, vec!["age: required".to_string()]);
//! ```

#![doc(html_root_url = "https://docs.rs/vigil-middleware/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod classify;
pub mod deadline;
pub mod envelope;
pub mod pipeline;
pub mod types;

pub use classify::{classify, Classification, INTERNAL_MESSAGE};
pub use deadline::{DeadlineGuard, FALLBACK_TIMEOUT};
pub use envelope::{ErrorEnvelope, TIMESTAMP_FORMAT};
pub use pipeline::{PipelineState, RequestPipeline, RequestPipelineBuilder, CLIENT_CLOSED_REQUEST};
pub use types::{HandlerResult, Request, Response, ResponseExt};
