//! Error types for Vigil.
//!
//! This module provides [`PipelineError`], the error type handlers return to
//! the pipeline. It is a closed set of tagged variants: everything the
//! classifier needs (status, kind, context, parameters) is fixed when the error
//! is constructed at the raise site, and no later layer patches it.
//!
//! Opaque faults enter through `From<anyhow::Error>` and always classify as
//! [`ErrorKind::Internal`], so their text never reaches a client.

use crate::span::TraceError;
use crate::upstream::UpstreamError;
use crate::validation::FieldViolation;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Result type alias using [`PipelineError`].
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Error taxonomy.
///
/// Kinds describe the nature of a failure independently of the exact status
/// code that ends up on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Request body or parameters failed validation.
    InputValidation,
    /// Missing or invalid credentials.
    Unauthenticated,
    /// Authenticated but not permitted.
    Unauthorized,
    /// Resource not found.
    NotFound,
    /// The request exceeded its deadline.
    Timeout,
    /// Conflict with current resource state.
    Conflict,
    /// Semantically invalid request.
    UnprocessableEntity,
    /// Rate limit exceeded.
    RateLimited,
    /// A downstream call failed.
    UpstreamFailure,
    /// Anything else.
    Internal,
}

impl ErrorKind {
    /// Returns the default HTTP status for this kind.
    ///
    /// [`ErrorKind::UpstreamFailure`] has no fixed status: it is derived from
    /// the downstream response.
    #[must_use]
    pub const fn default_status(&self) -> Option<u16> {
        match self {
            Self::InputValidation => Some(400),
            Self::Unauthenticated => Some(401),
            Self::Unauthorized => Some(403),
            Self::NotFound => Some(404),
            Self::Timeout => Some(408),
            Self::Conflict => Some(409),
            Self::UnprocessableEntity => Some(422),
            Self::RateLimited => Some(429),
            Self::UpstreamFailure => None,
            Self::Internal => Some(500),
        }
    }

    /// Returns the kind conventionally associated with a status code.
    #[must_use]
    pub const fn from_status(status: u16) -> Self {
        match status {
            400 => Self::InputValidation,
            401 => Self::Unauthenticated,
            403 => Self::Unauthorized,
            404 => Self::NotFound,
            408 => Self::Timeout,
            409 => Self::Conflict,
            422 => Self::UnprocessableEntity,
            429 => Self::RateLimited,
            _ => Self::Internal,
        }
    }

    /// Returns the `snake_case` name of this kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InputValidation => "input_validation",
            Self::Unauthenticated => "unauthenticated",
            Self::Unauthorized => "unauthorized",
            Self::NotFound => "not_found",
            Self::Timeout => "timeout",
            Self::Conflict => "conflict",
            Self::UnprocessableEntity => "unprocessable_entity",
            Self::RateLimited => "rate_limited",
            Self::UpstreamFailure => "upstream_failure",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A handler exceeded its deadline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("route {route} exceeded its {}ms deadline", .limit.as_millis())]
pub struct TimeoutError {
    /// The effective timeout that fired.
    pub limit: Duration,
    /// Identity of the route that timed out.
    pub route: String,
}

impl TimeoutError {
    /// Creates a timeout error.
    #[must_use]
    pub fn new(limit: Duration, route: impl Into<String>) -> Self {
        Self {
            limit,
            route: route.into(),
        }
    }

    /// Returns the limit in whole milliseconds.
    #[must_use]
    pub fn limit_ms(&self) -> u128 {
        self.limit.as_millis()
    }
}

/// Errors returned by request handlers.
///
/// # Example
///
/// ```
/// use vigil_core::{ErrorKind, PipelineError};
///
/// fn find_cat(id: u64) -> Result<(), PipelineError> {
///     Err(PipelineError::not_found(format!("cat {id}")).with_context("cats/find_one"))
/// }
///
/// let err = find_cat(7).unwrap_err();
/// assert_eq!(err.kind(), ErrorKind::NotFound);
/// assert_eq!(err.context(), Some("cats/find_one"));
/// ```
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Input validation failed.
    #[error("validation failed with {} violation(s)", .violations.len())]
    Validation {
        /// Every violated field, in schema order.
        violations: Vec<FieldViolation>,
    },

    /// Credentials missing or invalid.
    #[error("unauthenticated: {message}")]
    Unauthenticated {
        /// Internal description.
        message: String,
    },

    /// Caller is not permitted.
    #[error("unauthorized: {message}")]
    Unauthorized {
        /// Internal description.
        message: String,
    },

    /// Resource not found.
    #[error("not found: {message}")]
    NotFound {
        /// Internal description.
        message: String,
    },

    /// Conflict with current state.
    #[error("conflict: {message}")]
    Conflict {
        /// Internal description.
        message: String,
    },

    /// Semantically invalid request.
    #[error("unprocessable entity: {message}")]
    UnprocessableEntity {
        /// Internal description.
        message: String,
    },

    /// Rate limit exceeded.
    #[error("rate limited")]
    RateLimited {
        /// Seconds until the caller may retry.
        retry_after_seconds: Option<u64>,
    },

    /// An explicit status chosen by the handler.
    #[error("status {status}{}", .message.as_deref().map(|m| format!(": {m}")).unwrap_or_default())]
    Status {
        /// HTTP status to respond with.
        status: u16,
        /// Client-facing message, used only when the status has no standard message.
        message: Option<String>,
    },

    /// The deadline fired.
    #[error(transparent)]
    Timeout(#[from] TimeoutError),

    /// A downstream call failed.
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    /// Any other fault.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),

    /// An error annotated with an envelope context.
    #[error("{context}: {source}")]
    WithContext {
        /// Context reported in the envelope.
        context: String,
        /// The wrapped error.
        #[source]
        source: Box<PipelineError>,
    },
}

impl PipelineError {
    /// Creates a validation error.
    #[must_use]
    pub fn validation(violations: Vec<FieldViolation>) -> Self {
        Self::Validation { violations }
    }

    /// Creates an unauthenticated error.
    #[must_use]
    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::Unauthenticated {
            message: message.into(),
        }
    }

    /// Creates an unauthorized error.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Creates a conflict error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Creates an unprocessable-entity error.
    #[must_use]
    pub fn unprocessable(message: impl Into<String>) -> Self {
        Self::UnprocessableEntity {
            message: message.into(),
        }
    }

    /// Creates a rate-limited error.
    #[must_use]
    pub const fn rate_limited(retry_after_seconds: Option<u64>) -> Self {
        Self::RateLimited {
            retry_after_seconds,
        }
    }

    /// Creates an error with an explicit status.
    #[must_use]
    pub const fn with_status(status: u16) -> Self {
        Self::Status {
            status,
            message: None,
        }
    }

    /// Creates an error with an explicit status and client-facing message.
    #[must_use]
    pub fn with_status_message(status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: Some(message.into()),
        }
    }

    /// Creates an internal error from a message.
    #[must_use]
    pub fn internal(message: impl fmt::Display + fmt::Debug + Send + Sync + 'static) -> Self {
        Self::Internal(anyhow::Error::msg(message))
    }

    /// Attaches an envelope context.
    ///
    /// The outermost context wins.
    #[must_use]
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Returns the outermost attached context.
    #[must_use]
    pub fn context(&self) -> Option<&str> {
        match self {
            Self::WithContext { context, .. } => Some(context),
            _ => None,
        }
    }

    /// Returns the error beneath any context wrappers.
    #[must_use]
    pub fn root(&self) -> &Self {
        let mut current = self;
        while let Self::WithContext { source, .. } = current {
            current = source;
        }
        current
    }

    /// Returns the status fixed by the variant itself, if any.
    ///
    /// Upstream and internal errors have none; their status is resolved by the
    /// classifier.
    #[must_use]
    pub fn explicit_status(&self) -> Option<u16> {
        match self.root() {
            Self::Status { status, .. } => Some(*status),
            Self::Upstream(_) | Self::Internal(_) => None,
            other => other.kind().default_status(),
        }
    }

    /// Returns the taxonomy kind.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self.root() {
            Self::Validation { .. } => ErrorKind::InputValidation,
            Self::Unauthenticated { .. } => ErrorKind::Unauthenticated,
            Self::Unauthorized { .. } => ErrorKind::Unauthorized,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::UnprocessableEntity { .. } => ErrorKind::UnprocessableEntity,
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::Status { status, .. } => ErrorKind::from_status(*status),
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Upstream(_) => ErrorKind::UpstreamFailure,
            Self::Internal(_) | Self::WithContext { .. } => ErrorKind::Internal,
        }
    }

    /// Returns the client-facing message supplied at the raise site, if any.
    #[must_use]
    pub fn supplied_message(&self) -> Option<&str> {
        match self.root() {
            Self::Status { message, .. } => message.as_deref(),
            _ => None,
        }
    }
}

impl From<TraceError> for PipelineError {
    fn from(err: TraceError) -> Self {
        Self::Internal(anyhow::Error::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::{UpstreamCause, UpstreamResponse};
    use crate::validation::PathSegment;

    #[test]
    fn test_kind_default_status() {
        assert_eq!(ErrorKind::InputValidation.default_status(), Some(400));
        assert_eq!(ErrorKind::Timeout.default_status(), Some(408));
        assert_eq!(ErrorKind::UpstreamFailure.default_status(), None);
        assert_eq!(ErrorKind::Internal.default_status(), Some(500));
    }

    #[test]
    fn test_kind_from_status() {
        assert_eq!(ErrorKind::from_status(422), ErrorKind::UnprocessableEntity);
        assert_eq!(ErrorKind::from_status(503), ErrorKind::Internal);
    }

    #[test]
    fn test_explicit_status_by_variant() {
        let violation = FieldViolation::new(vec![PathSegment::key("age")], "Required");
        assert_eq!(PipelineError::validation(vec![violation]).explicit_status(), Some(400));
        assert_eq!(PipelineError::unauthorized("no").explicit_status(), Some(403));
        assert_eq!(PipelineError::with_status(418).explicit_status(), Some(418));
        assert_eq!(PipelineError::internal("boom").explicit_status(), None);
    }

    #[test]
    fn test_upstream_has_no_explicit_status() {
        let err = PipelineError::from(UpstreamError {
            method: "GET".into(),
            url: "http://svc".into(),
            attempts: 1,
            cause: UpstreamCause::Status(UpstreamResponse::new(502, "")),
        });
        assert_eq!(err.kind(), ErrorKind::UpstreamFailure);
        assert_eq!(err.explicit_status(), None);
    }

    #[test]
    fn test_context_wraps_without_changing_kind() {
        let err = PipelineError::conflict("duplicate")
            .with_context("inner")
            .with_context("cats/create");
        assert_eq!(err.context(), Some("cats/create"));
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(err.explicit_status(), Some(409));
        assert!(matches!(err.root(), PipelineError::Conflict { .. }));
    }

    #[test]
    fn test_anyhow_becomes_internal() {
        fn fails() -> PipelineResult<()> {
            Err(anyhow::anyhow!("db password is hunter2"))?;
            Ok(())
        }
        let err = fails().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(err.supplied_message().is_none());
    }

    #[test]
    fn test_timeout_display() {
        let err = TimeoutError::new(Duration::from_secs(5), "GET /slow");
        assert_eq!(err.limit_ms(), 5000);
        assert_eq!(err.to_string(), "route GET /slow exceeded its 5000ms deadline");
    }
}
