//! Main configuration types.
//!
//! This module provides the top-level [`VigilConfig`] struct.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

use crate::error::{ConfigError, ConfigResult};
use crate::schema::{LogFormat, PipelineSection, RetrySection, TelemetrySection};

/// Complete Vigil configuration.
///
/// Use [`ConfigLoader`](crate::ConfigLoader) to load it from files and
/// environment variables.
///
/// # Example
///
/// ```
/// use vigil_config::VigilConfig;
///
/// let config = VigilConfig::default();
/// assert_eq!(config.retry.max_attempts, 3);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct VigilConfig {
    /// Request pipeline configuration.
    #[serde(default)]
    pub pipeline: PipelineSection,

    /// Outbound retry configuration.
    #[serde(default)]
    pub retry: RetrySection,

    /// Telemetry configuration (metrics, logging).
    #[serde(default)]
    pub telemetry: TelemetrySection,
}

impl VigilConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for the first invalid field.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.pipeline.default_timeout_ms == Some(0) {
            return Err(ConfigError::invalid_value(
                "pipeline.default_timeout_ms",
                "must be greater than 0",
            ));
        }

        if self.pipeline.fallback_timeout_ms == 0 {
            return Err(ConfigError::invalid_value(
                "pipeline.fallback_timeout_ms",
                "must be greater than 0",
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(ConfigError::invalid_value(
                "retry.max_attempts",
                "must be at least 1",
            ));
        }

        // Strictly increasing backoff needs a non-zero base.
        if self.retry.base_backoff_ms == 0 {
            return Err(ConfigError::invalid_value(
                "retry.base_backoff_ms",
                "must be greater than 0",
            ));
        }

        if self.retry.attempt_timeout_ms == Some(0) {
            return Err(ConfigError::invalid_value(
                "retry.attempt_timeout_ms",
                "must be greater than 0",
            ));
        }

        if let Some(status) = self
            .retry
            .retryable_statuses
            .iter()
            .find(|status| !(100..=599).contains(*status))
        {
            return Err(ConfigError::invalid_value(
                "retry.retryable_statuses",
                format!("{status} is not an HTTP status"),
            ));
        }

        self.retry.retry_policy()?;

        let metrics = &self.telemetry.metrics;
        if metrics.enabled {
            if let Some(addr) = &metrics.listen_addr {
                if addr.parse::<SocketAddr>().is_err() {
                    return Err(ConfigError::invalid_value(
                        "telemetry.metrics.listen_addr",
                        format!("invalid socket address: {addr}"),
                    ));
                }
            }

            if metrics.duration_buckets_ms.is_empty() {
                return Err(ConfigError::invalid_value(
                    "telemetry.metrics.duration_buckets_ms",
                    "must not be empty",
                ));
            }
        }

        Ok(())
    }

    /// Create a development configuration preset.
    ///
    /// Pretty, debug-level logs and a single outbound attempt, so failures
    /// surface immediately.
    #[must_use]
    pub fn development() -> Self {
        let mut config = Self::default();
        config.telemetry.environment = "development".to_string();
        config.telemetry.logging.level = "debug".to_string();
        config.telemetry.logging.format = LogFormat::Pretty;
        config.telemetry.logging.file_line_info = true;
        config.retry.max_attempts = 1;
        config
    }

    /// Create a production configuration preset.
    ///
    /// JSON logs at info level and a scrape listener on `0.0.0.0:9090`.
    #[must_use]
    pub fn production() -> Self {
        let mut config = Self::default();
        config.telemetry.environment = "production".to_string();
        config.telemetry.logging.level = "info".to_string();
        config.telemetry.logging.format = LogFormat::Json;
        config.telemetry.metrics.listen_addr = Some("0.0.0.0:9090".to_string());
        config
    }
}
