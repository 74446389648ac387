//! Assembling the pipeline from configuration.

use std::sync::Arc;
use thiserror::Error;
use vigil_client::{RetryingHttpClient, TransportError};
use vigil_config::{ConfigError, VigilConfig};
use vigil_middleware::RequestPipeline;
use vigil_telemetry::{init_telemetry, MetricsRecorder, TelemetryError, TelemetryGuard};

/// Errors raised while starting Vigil.
#[derive(Debug, Error)]
pub enum VigilError {
    /// The configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Logging or metrics failed to initialize.
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),

    /// The outbound HTTP client could not be built.
    #[error("failed to build outbound client: {0}")]
    Transport(#[from] TransportError),
}

/// Everything a service needs: the request pipeline and the outbound client.
///
/// # Example
///
/// ```
/// use vigil::{Vigil, VigilConfig};
///
/// let vigil = Vigil::local(&VigilConfig::default()).unwrap();
/// assert_eq!(vigil.client().policy().max_attempts(), 3);
/// ```
#[derive(Debug)]
pub struct Vigil {
    pipeline: RequestPipeline,
    client: RetryingHttpClient,
    telemetry: Option<TelemetryGuard>,
}

impl Vigil {
    /// Initializes process-wide logging and metrics, then builds the
    /// pipeline.
    ///
    /// Call once per process; the global logger and recorder cannot be
    /// installed twice.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or telemetry fails to
    /// initialize.
    pub fn init(config: &VigilConfig) -> Result<Self, VigilError> {
        config.validate()?;
        let guard = init_telemetry(config.telemetry.telemetry_config())?;

        let metrics = match guard.metrics() {
            Some(metrics) => metrics,
            None => Arc::new(MetricsRecorder::new(&config.telemetry.metrics_config())?),
        };

        let mut vigil = Self::assemble(config, metrics)?;
        vigil.telemetry = Some(guard);
        Ok(vigil)
    }

    /// Builds the pipeline without touching process-wide state.
    ///
    /// Metrics go to a recorder owned by this instance; logging is left to
    /// the caller.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn local(config: &VigilConfig) -> Result<Self, VigilError> {
        config.validate()?;
        let metrics = Arc::new(MetricsRecorder::new(&config.telemetry.metrics_config())?);
        Self::assemble(config, metrics)
    }

    fn assemble(config: &VigilConfig, metrics: Arc<MetricsRecorder>) -> Result<Self, VigilError> {
        let pipeline = RequestPipeline::builder(metrics)
            .default_timeout(Some(config.pipeline.default_timeout()))
            .build();
        let client = RetryingHttpClient::with_reqwest(config.retry.retry_policy()?)?;

        tracing::debug!(
            default_timeout_ms = config.pipeline.default_timeout().as_millis() as u64,
            max_attempts = config.retry.max_attempts,
            "vigil pipeline assembled"
        );

        Ok(Self {
            pipeline,
            client,
            telemetry: None,
        })
    }

    /// The request pipeline.
    #[must_use]
    pub const fn pipeline(&self) -> &RequestPipeline {
        &self.pipeline
    }

    /// The retrying outbound client; bind it to a request with
    /// [`OutboundClientExt::outbound_client`](vigil_client::OutboundClientExt::outbound_client).
    #[must_use]
    pub const fn client(&self) -> &RetryingHttpClient {
        &self.client
    }

    /// The telemetry guard, when initialized through [`Vigil::init`].
    #[must_use]
    pub const fn telemetry(&self) -> Option<&TelemetryGuard> {
        self.telemetry.as_ref()
    }
}
