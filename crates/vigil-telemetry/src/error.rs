//! Telemetry errors.

use thiserror::Error;

/// Why logging or metrics could not be brought up.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// A global subscriber is already set, or the subscriber failed to build.
    #[error("logging subscriber: {0}")]
    Logging(String),

    /// The level or `RUST_LOG` directives do not parse.
    #[error("invalid log filter `{directives}`: {reason}")]
    InvalidFilter {
        /// The rejected directives.
        directives: String,
        /// Parser message.
        reason: String,
    },

    /// The Prometheus recorder could not be built or installed.
    #[error("metrics recorder: {0}")]
    Metrics(String),

    /// The scrape listener address does not parse.
    #[error("invalid metrics listen address `{addr}`: {reason}")]
    ListenAddress {
        /// The rejected address.
        addr: String,
        /// Parser message.
        reason: String,
    },
}
