//! Structured logging.
//!
//! The pipeline runs each request inside a `request` span that carries its
//! `traceid`. In JSON mode the span list is written with every event, so all
//! lines of one request can be joined on that field.
//!
//! ```rust,ignore
//! use vigil_telemetry::logging::{init_logging, LogConfig};
//!
//! init_logging(&LogConfig::production())?;
//! tracing::info!(traceid = "3f1c…", http.route = "/cats/:id", "owner lookup");
//! ```

use crate::error::TelemetryError;
use crate::TelemetryResult;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// How log lines are rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// Multi-line human-readable output.
    Pretty,
}

/// Logging setup for one process.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// When false, [`init_logging`] installs nothing.
    pub enabled: bool,
    /// Level or filter directives, overridden by `RUST_LOG`.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
    /// Emit an event when a `tracing` span opens and closes.
    pub span_events: bool,
    /// Include source file and line.
    pub file_line_info: bool,
    /// Written as `service.name` on the startup line.
    pub service_name: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
            format: LogFormat::Json,
            span_events: false,
            file_line_info: false,
            service_name: "vigil-service".to_string(),
        }
    }
}

impl LogConfig {
    /// Pretty output at debug level with span events and source locations.
    #[must_use]
    pub fn development() -> Self {
        Self {
            level: "debug".to_string(),
            format: LogFormat::Pretty,
            span_events: true,
            file_line_info: true,
            ..Self::default()
        }
    }

    /// JSON output at info level.
    #[must_use]
    pub fn production() -> Self {
        Self::default()
    }

    fn span_events(&self) -> FmtSpan {
        if self.span_events {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        }
    }
}

/// Installs the process-wide subscriber.
///
/// A non-empty `RUST_LOG` wins over `config.level`.
///
/// # Errors
///
/// Returns [`TelemetryError::InvalidFilter`] for unparsable directives and
/// [`TelemetryError::Logging`] if a global subscriber is already set.
pub fn init_logging(config: &LogConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let directives = std::env::var(EnvFilter::DEFAULT_ENV)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| config.level.clone());
    let filter = create_env_filter(&directives)?;

    let base = tracing_subscriber::fmt::layer()
        .with_span_events(config.span_events())
        .with_file(config.file_line_info)
        .with_line_number(config.file_line_info);
    let layer: Box<dyn Layer<Registry> + Send + Sync> = match config.format {
        LogFormat::Json => base
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .boxed(),
        LogFormat::Pretty => base.pretty().boxed(),
    };

    tracing_subscriber::registry()
        .with(layer.with_filter(filter))
        .try_init()
        .map_err(|e| TelemetryError::Logging(e.to_string()))?;

    tracing::debug!(
        service.name = %config.service_name,
        filter = %directives,
        "logging initialized"
    );
    Ok(())
}

/// Parses a level or directive list such as `info,vigil_client=debug`.
///
/// # Errors
///
/// Returns [`TelemetryError::InvalidFilter`] when the directives do not parse.
pub fn create_env_filter(directives: &str) -> TelemetryResult<EnvFilter> {
    EnvFilter::try_new(directives).map_err(|e| TelemetryError::InvalidFilter {
        directives: directives.to_string(),
        reason: e.to_string(),
    })
}

/// Field names shared by the pipeline's log lines.
pub mod fields {
    /// Same name as the propagated header.
    pub const TRACE_ID: &str = "traceid";
    /// Pipeline span id.
    pub const SPAN_ID: &str = "span_id";
    /// Request method.
    pub const HTTP_METHOD: &str = "http.method";
    /// Route template, never the concrete path.
    pub const HTTP_ROUTE: &str = "http.route";
    /// Final response status.
    pub const HTTP_STATUS: &str = "http.status_code";
    /// Wall time in milliseconds.
    pub const DURATION_MS: &str = "duration_ms";
    /// Classified error kind.
    pub const ERROR_KIND: &str = "error.kind";
    /// Configured service name.
    pub const SERVICE_NAME: &str = "service.name";
}

/// Logs the single completion line of a request.
#[macro_export]
macro_rules! log_request_complete {
    ($traceid:expr, $method:expr, $route:expr, $status:expr, $duration_ms:expr) => {
        tracing::info!(
            traceid = %$traceid,
            http.method = %$method,
            http.route = %$route,
            http.status_code = $status,
            duration_ms = $duration_ms,
            "request completed"
        );
    };
}

/// Logs a classified failure with its full cause chain.
///
/// Only this line sees the cause; the client gets the envelope.
#[macro_export]
macro_rules! log_request_error {
    ($traceid:expr, $kind:expr, $status:expr, $error:expr) => {
        tracing::warn!(
            traceid = %$traceid,
            error.kind = %$kind,
            http.status_code = $status,
            error = %$error,
            "request failed"
        );
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        let dev = LogConfig::development();
        assert_eq!(dev.format, LogFormat::Pretty);
        assert_eq!(dev.level, "debug");
        assert_eq!(dev.span_events(), FmtSpan::NEW | FmtSpan::CLOSE);

        let prod = LogConfig::production();
        assert_eq!(prod.format, LogFormat::Json);
        assert_eq!(prod.level, "info");
        assert_eq!(prod.span_events(), FmtSpan::NONE);
    }

    #[test]
    fn test_filter_directives() {
        assert!(create_env_filter("info,vigil_client=debug").is_ok());

        let err = create_env_filter("vigil=notalevel").unwrap_err();
        assert!(matches!(
            err,
            TelemetryError::InvalidFilter { ref directives, .. } if directives == "vigil=notalevel"
        ));
    }

    #[test]
    fn test_disabled_is_noop() {
        let config = LogConfig {
            enabled: false,
            level: "not a filter ===".to_string(),
            ..LogConfig::default()
        };
        assert!(init_logging(&config).is_ok());
    }
}
