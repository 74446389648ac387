//! Typed configuration for Vigil.
//!
//! Values come from a preset, then a TOML or JSON document, then
//! `PREFIX__SECTION__KEY` environment variables. Unknown keys are errors,
//! and [`ConfigLoader::load`] validates the result.
//!
//! [`VigilConfig`] holds three sections:
//!
//! - [`PipelineSection`] - request deadlines
//! - [`RetrySection`] - outbound retry policy
//! - [`TelemetrySection`] - metrics and logging
//!
//! Each section converts into the runtime type its crate consumes
//! ([`RetrySection::retry_policy`], [`TelemetrySection::telemetry_config`],
//! [`PipelineSection::default_timeout`]).
//!
//! # Example
//!
//! ```no_run
//! use vigil_config::ConfigLoader;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigLoader::new()
//!     .with_dotenv()?
//!     .with_optional_file("vigil.toml")?
//!     .with_env_prefix("VIGIL")
//!     .load()?;
//!
//! let policy = config.retry.retry_policy()?;
//! let telemetry = config.telemetry.telemetry_config();
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration File Format
//!
//! ```toml
//! [pipeline]
//! default_timeout_ms = 30000
//!
//! [retry]
//! max_attempts = 3
//! base_backoff_ms = 100
//! jitter_ms = 100
//! attempt_timeout_ms = 10000
//! retryable_statuses = [408, 429]
//! retry_server_errors = true
//! retryable_network_codes = ["ECONNRESET", "ECONNREFUSED", "ETIMEDOUT"]
//! idempotent_methods = ["GET", "HEAD", "OPTIONS", "PUT", "DELETE"]
//!
//! [telemetry]
//! service_name = "cats-api"
//! environment = "production"
//!
//! [telemetry.metrics]
//! enabled = true
//! listen_addr = "0.0.0.0:9090"
//!
//! [telemetry.logging]
//! level = "info"
//! format = "json"
//! ```
//!
//! # Environment Variable Overrides
//!
//! Values can be overridden with `PREFIX__SECTION__KEY` variables:
//!
//! - `VIGIL__PIPELINE__DEFAULT_TIMEOUT_MS=5000`
//! - `VIGIL__RETRY__RETRYABLE_STATUSES=429,503`
//! - `VIGIL__TELEMETRY__METRICS__ENABLED=false`

#![warn(missing_docs)]

mod config;
mod error;
mod loader;
mod schema;

pub use config::VigilConfig;
pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;
pub use schema::*;
