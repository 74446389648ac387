//! Prometheus request metrics.
//!
//! # Standard Metrics
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `http_server_requests_count` | Counter | `http.method`, `http.route`, `http.status_code`, `http.status_class` |
//! | `http_server_requests_duration` | Histogram (ms) | same |
//!
//! The Prometheus exporter sanitizes label names, so they are scraped as
//! `http_method`, `http_route`, and so on.
//!
//! # Example
//!
//! ```
//! use vigil_telemetry::metrics::{MetricSample, MetricsConfig, MetricsRecorder};
//! use std::time::Duration;
//!
//! let recorder = MetricsRecorder::new(&MetricsConfig::default()).unwrap();
//! recorder.record(&MetricSample::new("GET", "/cats/:id", 200, Duration::from_millis(12)));
//!
//! assert!(recorder.render().contains("http_server_requests_count"));
//! ```

use crate::error::TelemetryError;
use crate::TelemetryResult;
use metrics::{counter, describe_counter, describe_histogram, histogram, Label, Unit};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle, PrometheusRecorder};
use std::net::SocketAddr;
use std::time::Duration;

/// Request counter name.
pub const REQUESTS_COUNT: &str = "http_server_requests_count";

/// Request duration histogram name.
pub const REQUESTS_DURATION: &str = "http_server_requests_duration";

/// Metrics configuration.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Whether metrics are enabled.
    pub enabled: bool,

    /// Address of the scrape listener (e.g., "0.0.0.0:9090").
    ///
    /// Only used by [`MetricsRecorder::install`]. `None` disables the listener;
    /// metrics are then rendered on demand.
    pub listen_addr: Option<String>,

    /// Service name, added as a `service` label when non-empty.
    pub service_name: String,

    /// Histogram buckets for request duration, in milliseconds.
    pub duration_buckets_ms: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_addr: None,
            service_name: String::new(),
            duration_buckets_ms: vec![
                5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1_000.0, 2_500.0, 5_000.0, 10_000.0,
                30_000.0, 60_000.0,
            ],
        }
    }
}

/// One completed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricSample {
    /// HTTP method.
    pub method: String,
    /// Route template (never the raw URL).
    pub route: String,
    /// Final response status.
    pub status: u16,
    /// Total request duration.
    pub duration: Duration,
}

impl MetricSample {
    /// Creates a sample.
    #[must_use]
    pub fn new(
        method: impl Into<String>,
        route: impl Into<String>,
        status: u16,
        duration: Duration,
    ) -> Self {
        Self {
            method: method.into(),
            route: route.into(),
            status,
            duration,
        }
    }

    /// Returns the status class (`2xx`, `4xx`, ...).
    #[must_use]
    pub fn status_class(&self) -> String {
        format!("{}xx", self.status / 100)
    }
}

enum Backend {
    /// Owned recorder; samples are routed to it explicitly.
    Local(PrometheusRecorder),
    /// The process-wide recorder installed through the `metrics` facade.
    Global,
}

/// Records request samples into Prometheus aggregators.
///
/// The aggregators are the only state shared between requests; they accept
/// concurrent writers.
pub struct MetricsRecorder {
    backend: Backend,
    handle: PrometheusHandle,
}

impl std::fmt::Debug for MetricsRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRecorder")
            .field("global", &matches!(self.backend, Backend::Global))
            .finish_non_exhaustive()
    }
}

impl MetricsRecorder {
    /// Creates a recorder that owns its aggregators.
    ///
    /// Nothing is installed globally, so several recorders can coexist (one
    /// per test, for example).
    ///
    /// # Errors
    ///
    /// Returns `TelemetryError::Metrics` if the buckets are invalid.
    pub fn new(config: &MetricsConfig) -> TelemetryResult<Self> {
        let recorder = builder(config)?.build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, register_metric_descriptions);

        Ok(Self {
            backend: Backend::Local(recorder),
            handle,
        })
    }

    /// Creates a recorder and installs it as the process-wide recorder.
    ///
    /// When `listen_addr` is set, a scrape listener is spawned on the current
    /// tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid, no runtime is available
    /// for the listener, or a global recorder is already installed.
    pub fn install(config: &MetricsConfig) -> TelemetryResult<Self> {
        let mut builder = builder(config)?;

        let handle = if let Some(addr) = &config.listen_addr {
            let addr: SocketAddr = addr
                .parse()
                .map_err(|e: std::net::AddrParseError| TelemetryError::ListenAddress {
                    addr: addr.clone(),
                    reason: e.to_string(),
                })?;
            let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
                TelemetryError::Metrics(format!("scrape listener needs a tokio runtime: {e}"))
            })?;

            builder = builder.with_http_listener(addr);
            let (recorder, exporter) = {
                let _entered = runtime.enter();
                builder
                    .build()
                    .map_err(|e| TelemetryError::Metrics(e.to_string()))?
            };
            let handle = recorder.handle();
            metrics::set_global_recorder(recorder)
                .map_err(|e| TelemetryError::Metrics(e.to_string()))?;
            runtime.spawn(async move {
                if let Err(e) = exporter.await {
                    tracing::error!(error = ?e, "metrics scrape listener stopped");
                }
            });
            tracing::info!(%addr, "metrics scrape listener started");
            handle
        } else {
            builder
                .install_recorder()
                .map_err(|e| TelemetryError::Metrics(e.to_string()))?
        };

        register_metric_descriptions();

        Ok(Self {
            backend: Backend::Global,
            handle,
        })
    }

    /// Records one request sample.
    pub fn record(&self, sample: &MetricSample) {
        match &self.backend {
            Backend::Local(recorder) => {
                metrics::with_local_recorder(recorder, || emit(sample));
            }
            Backend::Global => emit(sample),
        }
    }

    /// Renders all metrics in Prometheus text format.
    #[must_use]
    pub fn render(&self) -> String {
        self.handle.render()
    }

    /// Returns the Prometheus handle.
    #[must_use]
    pub fn handle(&self) -> &PrometheusHandle {
        &self.handle
    }
}

fn builder(config: &MetricsConfig) -> TelemetryResult<PrometheusBuilder> {
    let mut builder = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(REQUESTS_DURATION.to_string()),
            &config.duration_buckets_ms,
        )
        .map_err(|e| TelemetryError::Metrics(e.to_string()))?;

    if !config.service_name.is_empty() {
        builder = builder.add_global_label("service", config.service_name.clone());
    }

    Ok(builder)
}

fn register_metric_descriptions() {
    describe_counter!(REQUESTS_COUNT, "Total number of HTTP requests processed");
    describe_histogram!(
        REQUESTS_DURATION,
        Unit::Milliseconds,
        "HTTP request duration in milliseconds"
    );
}

fn emit(sample: &MetricSample) {
    let labels = vec![
        Label::new("http.method", sample.method.clone()),
        Label::new("http.route", sample.route.clone()),
        Label::new("http.status_code", sample.status.to_string()),
        Label::new("http.status_class", sample.status_class()),
    ];

    counter!(REQUESTS_COUNT, labels.clone()).increment(1);
    histogram!(REQUESTS_DURATION, labels).record(sample.duration.as_secs_f64() * 1_000.0);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line_for<'a>(rendered: &'a str, metric: &str, route: &str, status: u16) -> Option<&'a str> {
        rendered.lines().find(|line| {
            line.starts_with(&format!("{metric}{{"))
                && line.contains(&format!("http_route=\"{route}\""))
                && line.contains(&format!("http_status_code=\"{status}\""))
        })
    }

    #[test]
    fn test_status_class() {
        assert_eq!(MetricSample::new("GET", "/", 204, Duration::ZERO).status_class(), "2xx");
        assert_eq!(MetricSample::new("GET", "/", 499, Duration::ZERO).status_class(), "4xx");
        assert_eq!(MetricSample::new("GET", "/", 503, Duration::ZERO).status_class(), "5xx");
    }

    #[test]
    fn test_counter_uses_route_template_and_sanitized_labels() {
        let recorder = MetricsRecorder::new(&MetricsConfig::default()).unwrap();
        recorder.record(&MetricSample::new("GET", "/cats/:id", 200, Duration::from_millis(3)));
        recorder.record(&MetricSample::new("GET", "/cats/:id", 200, Duration::from_millis(4)));
        recorder.record(&MetricSample::new("GET", "/cats/:id", 404, Duration::from_millis(1)));

        let rendered = recorder.render();
        let ok = line_for(&rendered, REQUESTS_COUNT, "/cats/:id", 200).unwrap();
        assert!(ok.contains("http_method=\"GET\""));
        assert!(ok.contains("http_status_class=\"2xx\""));
        assert!(ok.ends_with(" 2"));

        let missing = line_for(&rendered, REQUESTS_COUNT, "/cats/:id", 404).unwrap();
        assert!(missing.ends_with(" 1"));
    }

    #[test]
    fn test_duration_is_histogram() {
        let recorder = MetricsRecorder::new(&MetricsConfig::default()).unwrap();
        recorder.record(&MetricSample::new("POST", "/cats", 201, Duration::from_millis(30)));

        let rendered = recorder.render();
        assert!(rendered.contains("http_server_requests_duration_bucket"));
        let count = line_for(&rendered, "http_server_requests_duration_count", "/cats", 201).unwrap();
        assert!(count.ends_with(" 1"));
    }

    #[test]
    fn test_local_recorders_are_isolated() {
        let a = MetricsRecorder::new(&MetricsConfig::default()).unwrap();
        let b = MetricsRecorder::new(&MetricsConfig::default()).unwrap();
        a.record(&MetricSample::new("GET", "/only-a", 200, Duration::ZERO));

        assert!(a.render().contains("/only-a"));
        assert!(!b.render().contains("/only-a"));
    }

    #[test]
    fn test_service_label() {
        let config = MetricsConfig {
            service_name: "cats-api".to_string(),
            ..MetricsConfig::default()
        };
        let recorder = MetricsRecorder::new(&config).unwrap();
        recorder.record(&MetricSample::new("GET", "/", 200, Duration::ZERO));
        assert!(recorder.render().contains("service=\"cats-api\""));
    }

    #[test]
    fn test_empty_buckets_rejected() {
        let config = MetricsConfig {
            duration_buckets_ms: Vec::new(),
            ..MetricsConfig::default()
        };
        assert!(matches!(
            MetricsRecorder::new(&config),
            Err(TelemetryError::Metrics(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_recording() {
        let recorder = std::sync::Arc::new(MetricsRecorder::new(&MetricsConfig::default()).unwrap());
        let mut tasks = Vec::new();
        for _ in 0..50 {
            let recorder = recorder.clone();
            tasks.push(tokio::spawn(async move {
                recorder.record(&MetricSample::new("GET", "/busy", 200, Duration::from_millis(1)));
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let rendered = recorder.render();
        assert!(line_for(&rendered, REQUESTS_COUNT, "/busy", 200).unwrap().ends_with(" 50"));
    }
}
