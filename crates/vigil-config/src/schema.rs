//! Configuration schema types.
//!
//! This module defines the structure of all configuration sections. Every
//! section rejects unknown fields and fills missing ones with defaults.

use crate::error::{ConfigError, ConfigResult};
use http::Method;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use vigil_client::{RetryPolicy, DEFAULT_RETRYABLE_STATUSES};
use vigil_core::NetworkErrorCode;
use vigil_telemetry::{LogConfig, MetricsConfig, TelemetryConfig};

/// Timeout used when neither the route nor the configuration sets one.
pub const FALLBACK_TIMEOUT_MS: u64 = 60_000;

/// Request pipeline section.
///
/// # Example
///
/// ```
/// use vigil_config::PipelineSection;
/// use std::time::Duration;
///
/// let section = PipelineSection { default_timeout_ms: Some(5_000), ..Default::default() };
/// assert_eq!(section.default_timeout(), Duration::from_secs(5));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PipelineSection {
    /// Deadline for routes without their own maximum duration, in
    /// milliseconds.
    #[serde(default)]
    pub default_timeout_ms: Option<u64>,

    /// Deadline used when `default_timeout_ms` is unset, in milliseconds.
    #[serde(default = "default_fallback_timeout")]
    pub fallback_timeout_ms: u64,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            default_timeout_ms: None,
            fallback_timeout_ms: default_fallback_timeout(),
        }
    }
}

impl PipelineSection {
    /// The deadline applied to routes without an override.
    #[must_use]
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms.unwrap_or(self.fallback_timeout_ms))
    }
}

fn default_fallback_timeout() -> u64 {
    FALLBACK_TIMEOUT_MS
}

/// Outbound retry section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RetrySection {
    /// Maximum attempts per call, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff before the first retry, in milliseconds.
    #[serde(default = "default_base_backoff")]
    pub base_backoff_ms: u64,

    /// Upper bound of the random jitter added to each backoff, in
    /// milliseconds. Clamped to `base_backoff_ms`.
    #[serde(default = "default_jitter")]
    pub jitter_ms: u64,

    /// Timeout of a single attempt, in milliseconds.
    #[serde(default = "default_attempt_timeout")]
    pub attempt_timeout_ms: Option<u64>,

    /// Statuses retried individually.
    #[serde(default = "default_retryable_statuses")]
    pub retryable_statuses: Vec<u16>,

    /// Whether every 5xx status is retried.
    #[serde(default = "default_true")]
    pub retry_server_errors: bool,

    /// Network failures that are retried.
    #[serde(default = "default_network_codes")]
    pub retryable_network_codes: Vec<NetworkErrorCode>,

    /// Methods retried without a per-call override.
    #[serde(default = "default_idempotent_methods")]
    pub idempotent_methods: Vec<String>,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_backoff_ms: default_base_backoff(),
            jitter_ms: default_jitter(),
            attempt_timeout_ms: default_attempt_timeout(),
            retryable_statuses: default_retryable_statuses(),
            retry_server_errors: true,
            retryable_network_codes: default_network_codes(),
            idempotent_methods: default_idempotent_methods(),
        }
    }
}

impl RetrySection {
    /// Builds the runtime retry policy.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if a method name is invalid.
    pub fn retry_policy(&self) -> ConfigResult<RetryPolicy> {
        let methods = self
            .idempotent_methods
            .iter()
            .map(|name| {
                Method::from_bytes(name.to_ascii_uppercase().as_bytes()).map_err(|_| {
                    ConfigError::invalid_value(
                        "retry.idempotent_methods",
                        format!("invalid HTTP method: {name}"),
                    )
                })
            })
            .collect::<ConfigResult<Vec<_>>>()?;

        Ok(RetryPolicy::new()
            .with_max_attempts(self.max_attempts)
            .with_base_backoff(Duration::from_millis(self.base_backoff_ms))
            .with_jitter(Duration::from_millis(self.jitter_ms))
            .with_attempt_timeout(self.attempt_timeout_ms.map(Duration::from_millis))
            .with_retryable_statuses(self.retryable_statuses.iter().copied())
            .with_server_errors(self.retry_server_errors)
            .with_retryable_codes(self.retryable_network_codes.iter().copied())
            .with_idempotent_methods(methods))
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_backoff() -> u64 {
    100
}

fn default_jitter() -> u64 {
    100
}

#[allow(clippy::unnecessary_wraps)]
fn default_attempt_timeout() -> Option<u64> {
    Some(10_000)
}

fn default_retryable_statuses() -> Vec<u16> {
    DEFAULT_RETRYABLE_STATUSES.to_vec()
}

fn default_network_codes() -> Vec<NetworkErrorCode> {
    NetworkErrorCode::ALL.to_vec()
}

fn default_idempotent_methods() -> Vec<String> {
    ["GET", "HEAD", "OPTIONS", "PUT", "DELETE", "TRACE"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Log format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON formatted logs (production).
    #[default]
    Json,
    /// Human-readable pretty format (development).
    Pretty,
}

/// Metrics section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct MetricsSection {
    /// Enable request metrics.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Prometheus scrape listener address. Unset means metrics are only
    /// rendered on demand.
    #[serde(default)]
    pub listen_addr: Option<String>,

    /// Histogram buckets for request duration, in milliseconds.
    #[serde(default = "default_duration_buckets")]
    pub duration_buckets_ms: Vec<f64>,
}

impl Default for MetricsSection {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_addr: None,
            duration_buckets_ms: default_duration_buckets(),
        }
    }
}

fn default_duration_buckets() -> Vec<f64> {
    MetricsConfig::default().duration_buckets_ms
}

/// Logging section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingSection {
    /// Enable logging.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Log level or filter directive (e.g. `info,vigil=debug`).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format.
    #[serde(default)]
    pub format: LogFormat,

    /// Log span open/close events.
    #[serde(default)]
    pub span_events: bool,

    /// Include source file and line in logs.
    #[serde(default)]
    pub file_line_info: bool,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            enabled: true,
            level: default_log_level(),
            format: LogFormat::default(),
            span_events: false,
            file_line_info: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Telemetry section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TelemetrySection {
    /// Service name, added to logs and metrics.
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Deployment environment.
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsSection,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingSection,
}

impl Default for TelemetrySection {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            environment: default_environment(),
            metrics: MetricsSection::default(),
            logging: LoggingSection::default(),
        }
    }
}

impl TelemetrySection {
    /// Builds the runtime telemetry configuration.
    #[must_use]
    pub fn telemetry_config(&self) -> TelemetryConfig {
        let format = match self.logging.format {
            LogFormat::Json => vigil_telemetry::LogFormat::Json,
            LogFormat::Pretty => vigil_telemetry::LogFormat::Pretty,
        };
        let logging = LogConfig {
            enabled: self.logging.enabled,
            level: self.logging.level.clone(),
            format,
            span_events: self.logging.span_events,
            file_line_info: self.logging.file_line_info,
            ..LogConfig::default()
        };

        TelemetryConfig::new(&self.service_name, &self.environment)
            .with_metrics(self.metrics_config())
            .with_logging(logging)
    }

    /// Builds the runtime metrics configuration.
    #[must_use]
    pub fn metrics_config(&self) -> MetricsConfig {
        MetricsConfig {
            enabled: self.metrics.enabled,
            listen_addr: self.metrics.listen_addr.clone(),
            service_name: self.service_name.clone(),
            duration_buckets_ms: self.metrics.duration_buckets_ms.clone(),
        }
    }
}

fn default_service_name() -> String {
    "vigil-service".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_default_timeout() {
        assert_eq!(
            PipelineSection::default().default_timeout(),
            Duration::from_secs(60)
        );

        let section = PipelineSection {
            default_timeout_ms: Some(2_500),
            ..PipelineSection::default()
        };
        assert_eq!(section.default_timeout(), Duration::from_millis(2_500));
    }

    #[test]
    fn test_retry_section_deserialize_partial() {
        let section: RetrySection = toml::from_str("max_attempts = 5").unwrap();
        assert_eq!(section.max_attempts, 5);
        assert_eq!(section.retryable_statuses, vec![408, 429]);
        assert_eq!(section.retryable_network_codes.len(), NetworkErrorCode::ALL.len());
    }

    #[test]
    fn test_retry_section_network_codes_by_name() {
        let section: RetrySection =
            toml::from_str(r#"retryable_network_codes = ["ECONNRESET", "ETIMEDOUT"]"#).unwrap();
        assert_eq!(
            section.retryable_network_codes,
            vec![NetworkErrorCode::ConnectionReset, NetworkErrorCode::TimedOut]
        );
    }

    #[test]
    fn test_retry_section_rejects_unknown_field() {
        let result: Result<RetrySection, _> = toml::from_str("max_retries = 5");
        assert!(result.is_err());
    }

    #[test]
    fn test_retry_policy_conversion() {
        let section = RetrySection {
            max_attempts: 4,
            base_backoff_ms: 50,
            jitter_ms: 500,
            idempotent_methods: vec!["get".to_string()],
            ..RetrySection::default()
        };
        let policy = section.retry_policy().unwrap();

        assert_eq!(policy.max_attempts(), 4);
        assert_eq!(policy.base_backoff(), Duration::from_millis(50));
        assert_eq!(policy.jitter(), Duration::from_millis(50));
        assert!(policy.is_idempotent(&Method::GET));
        assert!(!policy.is_idempotent(&Method::PUT));
    }

    #[test]
    fn test_retry_policy_invalid_method() {
        let section = RetrySection {
            idempotent_methods: vec!["GE T".to_string()],
            ..RetrySection::default()
        };
        assert!(matches!(
            section.retry_policy(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_log_format_deserialize() {
        let section: LoggingSection = toml::from_str(r#"format = "pretty""#).unwrap();
        assert_eq!(section.format, LogFormat::Pretty);
    }

    #[test]
    fn test_telemetry_conversion() {
        let section = TelemetrySection {
            service_name: "cats-api".to_string(),
            logging: LoggingSection {
                format: LogFormat::Pretty,
                level: "debug".to_string(),
                ..LoggingSection::default()
            },
            ..TelemetrySection::default()
        };
        let config = section.telemetry_config();

        assert_eq!(config.service_name, "cats-api");
        assert_eq!(config.metrics.service_name, "cats-api");
        assert_eq!(config.logging.format, vigil_telemetry::LogFormat::Pretty);
        assert_eq!(config.logging.service_name, "cats-api");
        assert_eq!(config.logging.level, "debug");
    }
}
