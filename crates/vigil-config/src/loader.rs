//! Layered loading: preset, then one file or string, then environment.

use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use vigil_core::NetworkErrorCode;

use crate::error::{ConfigError, ConfigResult};
use crate::schema::LogFormat;
use crate::VigilConfig;

/// Source formats understood by the loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Toml,
    Json,
}

impl Format {
    fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_name)
    }

    fn parse(self, content: &str) -> ConfigResult<VigilConfig> {
        Ok(match self {
            Self::Toml => toml::from_str(content)?,
            Self::Json => serde_json::from_str(content)?,
        })
    }
}

/// Builds a [`VigilConfig`] from layers.
///
/// A file or string replaces the current layer wholesale (missing keys take
/// their defaults). Environment overrides named `PREFIX__SECTION__KEY` are
/// applied last, then the result is validated.
///
/// ```no_run
/// use vigil_config::ConfigLoader;
///
/// # fn main() -> Result<(), vigil_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_optional_file("/etc/cats-api/vigil.toml")?
///     .with_env_prefix("VIGIL")
///     .load()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct ConfigLoader {
    config: VigilConfig,
    env_prefix: Option<String>,
}

impl ConfigLoader {
    /// Starts from [`VigilConfig::default`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from [`VigilConfig::development`].
    ///
    /// ```
    /// use vigil_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new().with_development().load().unwrap();
    /// assert!(config.telemetry.logging.file_line_info);
    /// ```
    #[must_use]
    pub fn with_development(self) -> Self {
        self.with_preset(VigilConfig::development())
    }

    /// Starts from [`VigilConfig::production`].
    #[must_use]
    pub fn with_production(self) -> Self {
        self.with_preset(VigilConfig::production())
    }

    fn with_preset(mut self, config: VigilConfig) -> Self {
        self.config = config;
        self
    }

    /// Reads `path`, choosing TOML or JSON by extension.
    ///
    /// # Errors
    ///
    /// Fails when the file is missing or unreadable, has another extension,
    /// does not parse, or names a key outside the schema.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ConfigError::missing_file(path));
        }
        let format = Format::from_path(path)
            .ok_or_else(|| ConfigError::unsupported_format(path.display().to_string()))?;

        let content = fs::read_to_string(path).map_err(|e| ConfigError::read(path, e))?;
        self.config = format.parse(&content)?;
        Ok(self)
    }

    /// Like [`with_file`](Self::with_file), but a missing file leaves the
    /// current layer in place.
    ///
    /// # Errors
    ///
    /// Fails when the file exists and cannot be loaded.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> ConfigResult<Self> {
        if path.as_ref().is_file() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Parses `content` as `format` (`toml` or `json`).
    ///
    /// ```
    /// use vigil_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_string("[pipeline]\ndefault_timeout_ms = 2500", "toml")
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    /// assert_eq!(config.pipeline.default_timeout_ms, Some(2_500));
    /// ```
    ///
    /// # Errors
    ///
    /// Fails on an unknown format or content that does not parse.
    pub fn with_string(mut self, content: &str, format: &str) -> ConfigResult<Self> {
        let format = Format::from_name(format).ok_or_else(|| ConfigError::unsupported_format(format))?;
        self.config = format.parse(content)?;
        Ok(self)
    }

    /// Enables overrides such as `VIGIL__RETRY__MAX_ATTEMPTS=5`.
    ///
    /// Lists are comma separated; `none` or an empty value clears an
    /// optional setting.
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_ascii_uppercase());
        self
    }

    /// Exports variables from the nearest `.env`, if there is one.
    ///
    /// # Errors
    ///
    /// Fails when a `.env` exists and does not parse.
    pub fn with_dotenv(self) -> ConfigResult<Self> {
        match dotenvy::dotenv() {
            Err(e) if !e.not_found() => Err(e.into()),
            _ => Ok(self),
        }
    }

    /// Exports variables from `path`.
    ///
    /// # Errors
    ///
    /// Fails when the file is missing or does not parse.
    pub fn with_dotenv_file<P: AsRef<Path>>(self, path: P) -> ConfigResult<Self> {
        dotenvy::from_path(path)?;
        Ok(self)
    }

    /// Applies environment overrides and validates.
    ///
    /// # Errors
    ///
    /// Fails on an unparsable override or an invalid final value.
    pub fn load(mut self) -> ConfigResult<VigilConfig> {
        if let Some(prefix) = self.env_prefix.take() {
            self.apply_env_overrides(&prefix, env::vars())?;
        }
        self.config.validate()?;
        Ok(self.config)
    }

    /// Returns the current layer as is, skipping overrides and validation.
    #[must_use]
    pub fn load_unvalidated(self) -> VigilConfig {
        self.config
    }

    fn apply_env_overrides(
        &mut self,
        prefix: &str,
        vars: impl IntoIterator<Item = (String, String)>,
    ) -> ConfigResult<()> {
        for (var, value) in vars {
            let Some(path) = var
                .strip_prefix(prefix)
                .and_then(|rest| rest.strip_prefix("__"))
            else {
                continue;
            };
            let segments: Vec<&str> = path.split("__").collect();
            self.apply_override(&var, &segments, &value)?;
        }
        Ok(())
    }

    fn apply_override(&mut self, var: &str, segments: &[&str], value: &str) -> ConfigResult<()> {
        let config = &mut self.config;
        match segments {
            ["PIPELINE", "DEFAULT_TIMEOUT_MS"] => {
                config.pipeline.default_timeout_ms = optional_millis(var, value)?;
            }
            ["PIPELINE", "FALLBACK_TIMEOUT_MS"] => {
                config.pipeline.fallback_timeout_ms = number(var, value)?;
            }

            ["RETRY", "MAX_ATTEMPTS"] => config.retry.max_attempts = number(var, value)?,
            ["RETRY", "BASE_BACKOFF_MS"] => config.retry.base_backoff_ms = number(var, value)?,
            ["RETRY", "JITTER_MS"] => config.retry.jitter_ms = number(var, value)?,
            ["RETRY", "ATTEMPT_TIMEOUT_MS"] => {
                config.retry.attempt_timeout_ms = optional_millis(var, value)?;
            }
            ["RETRY", "RETRYABLE_STATUSES"] => {
                config.retry.retryable_statuses = list(var, value, number)?;
            }
            ["RETRY", "RETRY_SERVER_ERRORS"] => {
                config.retry.retry_server_errors = flag(var, value)?;
            }
            ["RETRY", "RETRYABLE_NETWORK_CODES"] => {
                config.retry.retryable_network_codes = list(var, value, |var, code| {
                    NetworkErrorCode::from_str(code)
                        .map_err(|e| ConfigError::env_override(var, e.to_string()))
                })?;
            }
            ["RETRY", "IDEMPOTENT_METHODS"] => {
                config.retry.idempotent_methods = items(value).map(str::to_ascii_uppercase).collect();
            }

            ["TELEMETRY", "SERVICE_NAME"] => config.telemetry.service_name = value.to_string(),
            ["TELEMETRY", "ENVIRONMENT"] => config.telemetry.environment = value.to_string(),
            ["TELEMETRY", "METRICS", "ENABLED"] => {
                config.telemetry.metrics.enabled = flag(var, value)?;
            }
            ["TELEMETRY", "METRICS", "LISTEN_ADDR"] => {
                config.telemetry.metrics.listen_addr =
                    Some(value.trim()).filter(|addr| !addr.is_empty()).map(String::from);
            }
            ["TELEMETRY", "METRICS", "DURATION_BUCKETS_MS"] => {
                config.telemetry.metrics.duration_buckets_ms = list(var, value, number)?;
            }
            ["TELEMETRY", "LOGGING", "ENABLED"] => {
                config.telemetry.logging.enabled = flag(var, value)?;
            }
            ["TELEMETRY", "LOGGING", "LEVEL"] => config.telemetry.logging.level = value.to_string(),
            ["TELEMETRY", "LOGGING", "FORMAT"] => {
                config.telemetry.logging.format = if value.eq_ignore_ascii_case("json") {
                    LogFormat::Json
                } else if value.eq_ignore_ascii_case("pretty") {
                    LogFormat::Pretty
                } else {
                    return Err(ConfigError::env_override(var, "expected json or pretty"));
                };
            }
            ["TELEMETRY", "LOGGING", "SPAN_EVENTS"] => {
                config.telemetry.logging.span_events = flag(var, value)?;
            }
            ["TELEMETRY", "LOGGING", "FILE_LINE_INFO"] => {
                config.telemetry.logging.file_line_info = flag(var, value)?;
            }

            _ => tracing::debug!(var, "ignoring unrecognized configuration override"),
        }
        Ok(())
    }
}

fn flag(var: &str, value: &str) -> ConfigResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::env_override(var, "expected a boolean")),
    }
}

fn number<T: FromStr>(var: &str, value: &str) -> ConfigResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::env_override(var, format!("`{value}` is not a number")))
}

fn optional_millis(var: &str, value: &str) -> ConfigResult<Option<u64>> {
    let value = value.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    number(var, value).map(Some)
}

fn items(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|item| !item.is_empty())
}

fn list<T>(
    var: &str,
    value: &str,
    parse: impl Fn(&str, &str) -> ConfigResult<T>,
) -> ConfigResult<Vec<T>> {
    items(value).map(|item| parse(var, item)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn overridden(pairs: &[(&str, &str)]) -> ConfigResult<VigilConfig> {
        let mut loader = ConfigLoader::new();
        let vars = pairs
            .iter()
            .map(|(var, value)| ((*var).to_string(), (*value).to_string()));
        loader.apply_env_overrides("VIGIL", vars)?;
        Ok(loader.load_unvalidated())
    }

    fn toml_file(body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_presets() {
        assert_eq!(ConfigLoader::new().load().unwrap(), VigilConfig::default());

        let dev = ConfigLoader::new().with_development().load().unwrap();
        assert_eq!(dev.telemetry.logging.format, LogFormat::Pretty);

        let prod = ConfigLoader::new().with_production().load().unwrap();
        assert_eq!(prod.telemetry.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_json_string_keeps_other_defaults() {
        let config = ConfigLoader::new()
            .with_string(r#"{"pipeline": {"default_timeout_ms": 5000}}"#, "JSON")
            .unwrap()
            .load()
            .unwrap();

        assert_eq!(config.pipeline.default_timeout_ms, Some(5_000));
        assert_eq!(config.retry, VigilConfig::default().retry);
    }

    #[test]
    fn test_unknown_format() {
        let err = ConfigLoader::new().with_string("", "yaml").unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedFormat { ref format } if format == "yaml"));

        let file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        let err = ConfigLoader::new().with_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedFormat { .. }));
    }

    #[test]
    fn test_toml_file() {
        let file = toml_file(
            r#"
            [retry]
            max_attempts = 4
            retryable_statuses = [429, 503]

            [telemetry]
            service_name = "cats-api"

            [telemetry.metrics]
            listen_addr = "127.0.0.1:9100"
            "#,
        );

        let config = ConfigLoader::new().with_file(file.path()).unwrap().load().unwrap();
        assert_eq!(config.retry.max_attempts, 4);
        assert_eq!(config.retry.retryable_statuses, vec![429, 503]);
        assert_eq!(config.telemetry.service_name, "cats-api");
        assert_eq!(
            config.telemetry.metrics.listen_addr.as_deref(),
            Some("127.0.0.1:9100")
        );
    }

    #[test]
    fn test_misspelled_key_rejected() {
        let file = toml_file("[retry]\nmax_retries = 4\n");
        let err = ConfigLoader::new().with_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
    }

    #[test]
    fn test_missing_files() {
        let err = ConfigLoader::new().with_file("/nonexistent/vigil.toml").unwrap_err();
        assert!(matches!(err, ConfigError::MissingFile { .. }));

        let config = ConfigLoader::new()
            .with_production()
            .with_optional_file("/nonexistent/vigil.toml")
            .unwrap()
            .load()
            .unwrap();
        assert_eq!(config, VigilConfig::production());
    }

    #[test]
    fn test_load_validates() {
        let err = ConfigLoader::new()
            .with_string("[retry]\nmax_attempts = 0", "toml")
            .unwrap()
            .load()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "retry.max_attempts"));
    }

    #[test]
    fn test_env_overrides() {
        let config = overridden(&[
            ("VIGIL__PIPELINE__DEFAULT_TIMEOUT_MS", "5000"),
            ("VIGIL__RETRY__MAX_ATTEMPTS", " 5 "),
            ("VIGIL__RETRY__RETRYABLE_STATUSES", "429, 502,503"),
            ("VIGIL__RETRY__RETRYABLE_NETWORK_CODES", "econnreset,ETIMEDOUT"),
            ("VIGIL__RETRY__IDEMPOTENT_METHODS", "get, head"),
            ("VIGIL__TELEMETRY__LOGGING__FORMAT", "Pretty"),
            ("VIGIL__TELEMETRY__METRICS__ENABLED", "off"),
            ("OTHER__RETRY__MAX_ATTEMPTS", "not-a-number"),
            ("VIGILANT", "ignored"),
        ])
        .unwrap();

        assert_eq!(config.pipeline.default_timeout_ms, Some(5_000));
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.retryable_statuses, vec![429, 502, 503]);
        assert_eq!(
            config.retry.retryable_network_codes,
            vec![NetworkErrorCode::ConnectionReset, NetworkErrorCode::TimedOut]
        );
        assert_eq!(config.retry.idempotent_methods, vec!["GET", "HEAD"]);
        assert_eq!(config.telemetry.logging.format, LogFormat::Pretty);
        assert!(!config.telemetry.metrics.enabled);
    }

    #[test]
    fn test_env_clears_optional_values() {
        let config = overridden(&[
            ("VIGIL__RETRY__ATTEMPT_TIMEOUT_MS", "none"),
            ("VIGIL__TELEMETRY__METRICS__LISTEN_ADDR", ""),
        ])
        .unwrap();
        assert!(config.retry.attempt_timeout_ms.is_none());
        assert!(config.telemetry.metrics.listen_addr.is_none());
    }

    #[test]
    fn test_env_rejects_bad_values() {
        let err = overridden(&[("VIGIL__RETRY__MAX_ATTEMPTS", "three")]).unwrap_err();
        assert!(matches!(err, ConfigError::EnvOverride { ref var, .. } if var == "VIGIL__RETRY__MAX_ATTEMPTS"));

        let err = overridden(&[("VIGIL__RETRY__RETRYABLE_NETWORK_CODES", "EWHAT")]).unwrap_err();
        assert!(err.to_string().contains("EWHAT"));

        let err = overridden(&[("VIGIL__TELEMETRY__LOGGING__SPAN_EVENTS", "maybe")]).unwrap_err();
        assert!(err.to_string().contains("boolean"));
    }

    #[test]
    fn test_env_unknown_key_ignored() {
        let config = overridden(&[("VIGIL__SERVER__HTTP_ADDR", "0.0.0.0:1")]).unwrap();
        assert_eq!(config, VigilConfig::default());
    }

    #[test]
    fn test_flag_spellings() {
        for on in ["1", "true", "TRUE", "yes", "on"] {
            assert!(flag("V", on).unwrap(), "{on}");
        }
        for off in ["0", "false", "No", "off"] {
            assert!(!flag("V", off).unwrap(), "{off}");
        }
        assert!(flag("V", "").is_err());
    }

    #[test]
    fn test_dotenv_file_feeds_overrides() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "VIGIL_DOTENV_TEST__RETRY__JITTER_MS=7").unwrap();

        let config = ConfigLoader::new()
            .with_dotenv_file(file.path())
            .unwrap()
            .with_env_prefix("vigil_dotenv_test")
            .load()
            .unwrap();
        assert_eq!(config.retry.jitter_ms, 7);
    }
}
