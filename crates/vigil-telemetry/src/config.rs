//! Telemetry configuration.

use crate::logging::LogConfig;
use crate::metrics::MetricsConfig;

/// Logging and metrics settings for one service.
///
/// The service name is stamped into both sections, so the `service` metric
/// label and the `service.name` log field always agree.
///
/// ```
/// use vigil_telemetry::{LogConfig, MetricsConfig, TelemetryConfig};
///
/// let config = TelemetryConfig::new("cats-api", "staging")
///     .with_logging(LogConfig::development())
///     .with_metrics(MetricsConfig::default());
/// assert_eq!(config.logging.service_name, "cats-api");
/// assert_eq!(config.metrics.service_name, "cats-api");
/// ```
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name.
    pub service_name: String,
    /// Deployment environment, logged once at startup.
    pub environment: String,
    /// Request metrics.
    pub metrics: MetricsConfig,
    /// Subscriber setup.
    pub logging: LogConfig,
}

impl TelemetryConfig {
    /// Default sections for `service_name` in `environment`.
    #[must_use]
    pub fn new(service_name: impl Into<String>, environment: impl Into<String>) -> Self {
        let service_name = service_name.into();
        Self {
            metrics: MetricsConfig {
                service_name: service_name.clone(),
                ..MetricsConfig::default()
            },
            logging: LogConfig {
                service_name: service_name.clone(),
                ..LogConfig::default()
            },
            service_name,
            environment: environment.into(),
        }
    }

    /// Replaces the metrics section, keeping this service's name.
    #[must_use]
    pub fn with_metrics(mut self, metrics: MetricsConfig) -> Self {
        self.metrics = MetricsConfig {
            service_name: self.service_name.clone(),
            ..metrics
        };
        self
    }

    /// Replaces the logging section, keeping this service's name.
    #[must_use]
    pub fn with_logging(mut self, logging: LogConfig) -> Self {
        self.logging = LogConfig {
            service_name: self.service_name.clone(),
            ..logging
        };
        self
    }

    /// Pretty debug logs.
    #[must_use]
    pub fn development() -> Self {
        Self::default().with_logging(LogConfig::development())
    }

    /// JSON info logs.
    #[must_use]
    pub fn production() -> Self {
        Self::new("vigil-service", "production").with_logging(LogConfig::production())
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self::new("vigil-service", "development")
    }
}
