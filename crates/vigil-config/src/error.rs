//! Configuration errors.

use std::path::PathBuf;
use thiserror::Error;

/// Why a configuration could not be loaded.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The named file does not exist.
    #[error("no configuration at {}", .path.display())]
    MissingFile {
        /// Path that was looked up.
        path: PathBuf,
    },

    /// The file exists but could not be read.
    #[error("cannot read {}", .path.display())]
    Read {
        /// Path of the unreadable file.
        path: PathBuf,
        /// I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// Only TOML and JSON are understood.
    #[error("unsupported configuration format `{format}` (expected toml or json)")]
    UnsupportedFormat {
        /// The rejected format or file name.
        format: String,
    },

    /// Malformed TOML, or a TOML key outside the schema.
    #[error("invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),

    /// Malformed JSON, or a JSON key outside the schema.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A `.env` file could not be parsed.
    #[error(".env: {0}")]
    Dotenv(#[from] dotenvy::Error),

    /// A loaded value breaks a pipeline invariant.
    #[error("`{field}` {reason}")]
    InvalidValue {
        /// Dotted path of the field (`retry.max_attempts`).
        field: String,
        /// What is wrong with it.
        reason: String,
    },

    /// An environment override could not be applied.
    #[error("environment override {var}: {reason}")]
    EnvOverride {
        /// The variable name.
        var: String,
        /// What is wrong with it.
        reason: String,
    },
}

impl ConfigError {
    pub(crate) fn missing_file(path: impl Into<PathBuf>) -> Self {
        Self::MissingFile { path: path.into() }
    }

    pub(crate) fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Read {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn unsupported_format(format: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            format: format.into(),
        }
    }

    /// Creates an [`ConfigError::InvalidValue`].
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn env_override(var: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::EnvOverride {
            var: var.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
