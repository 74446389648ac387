//! Logging and metrics for Vigil.
//!
//! This crate provides the two process-wide observability sinks the pipeline
//! writes to:
//!
//! - **Metrics**: Prometheus-format request metrics via the `metrics` crate
//! - **Logging**: Structured JSON (or pretty) logs via `tracing-subscriber`
//!
//! Both are safe for concurrent writers. Everything request-scoped (trace ids,
//! span trees) lives in `vigil-core` and is passed explicitly.
//!
//! # Example
//!
//! ```rust,ignore
//! use vigil_telemetry::{init_telemetry, MetricsConfig, TelemetryConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = TelemetryConfig::new("cats-api", "production").with_metrics(MetricsConfig {
//!         listen_addr: Some("0.0.0.0:9090".to_string()),
//!         ..MetricsConfig::default()
//!     });
//!
//!     let guard = init_telemetry(config).expect("Failed to init telemetry");
//!     let recorder = guard.metrics().expect("metrics enabled");
//!     // hand `recorder` to the pipeline...
//! }
//! ```
//!
//! # Metrics Endpoint
//!
//! ```text
//! # TYPE http_server_requests_count counter
//! http_server_requests_count{http_method="GET",http_route="/cats/:id",http_status_code="200",http_status_class="2xx"} 1234
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;

use std::sync::Arc;

pub use config::TelemetryConfig;
pub use error::TelemetryError;
pub use logging::{init_logging, LogConfig, LogFormat};
pub use metrics::{MetricSample, MetricsConfig, MetricsRecorder};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Handle to the telemetry initialized by [`init_telemetry`].
///
/// Keep it alive for the lifetime of the application.
#[derive(Debug)]
pub struct TelemetryGuard {
    metrics: Option<Arc<MetricsRecorder>>,
}

impl TelemetryGuard {
    /// Returns the process-wide metrics recorder, if metrics are enabled.
    #[must_use]
    pub fn metrics(&self) -> Option<Arc<MetricsRecorder>> {
        self.metrics.clone()
    }
}

/// Initializes logging, then installs the global metrics recorder.
///
/// # Errors
///
/// Returns `TelemetryError` if any subsystem fails to initialize.
pub fn init_telemetry(config: TelemetryConfig) -> TelemetryResult<TelemetryGuard> {
    init_logging(&config.logging)?;

    let metrics = if config.metrics.enabled {
        Some(Arc::new(MetricsRecorder::install(&config.metrics)?))
    } else {
        None
    };

    tracing::info!(
        service.name = %config.service_name,
        environment = %config.environment,
        metrics = metrics.is_some(),
        "telemetry initialized"
    );

    Ok(TelemetryGuard { metrics })
}
