//! Client error types.

use thiserror::Error;
use vigil_core::{PipelineError, TraceError, UpstreamError};

/// Errors returned by outbound calls.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The downstream call failed; retries were exhausted or refused.
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    /// The call could not be attached to the request's span tree, usually
    /// because the request was already finalized.
    #[error("outbound call rejected: {0}")]
    Trace(#[from] TraceError),
}

impl ClientError {
    /// Returns the upstream failure, if this is one.
    #[must_use]
    pub const fn as_upstream(&self) -> Option<&UpstreamError> {
        match self {
            Self::Upstream(err) => Some(err),
            Self::Trace(_) => None,
        }
    }
}

impl From<ClientError> for PipelineError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Upstream(err) => Self::Upstream(err),
            ClientError::Trace(err) => err.into(),
        }
    }
}

/// Result type for outbound calls.
pub type ClientResult<T> = Result<T, ClientError>;
