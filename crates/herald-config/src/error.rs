//! Configuration error types.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Why a Herald configuration could not be loaded or was rejected.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// `with_file` was given a path that does not exist.
    #[error("config file {} does not exist", path.display())]
    Missing {
        /// The requested path.
        path: PathBuf,
    },

    /// The file exists but could not be read.
    #[error("cannot read config file {}", path.display())]
    Unreadable {
        /// The requested path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Malformed TOML, or a TOML key outside the schema.
    #[error("invalid TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    /// Malformed JSON, or a JSON key outside the schema.
    #[error("invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),

    /// The extension or format name is neither `toml` nor `json`.
    #[error("unsupported config format '{0}', expected toml or json")]
    UnsupportedFormat(String),

    /// A `.env` file exists but is malformed.
    #[error("cannot load .env file: {0}")]
    Dotenv(#[from] dotenvy::Error),

    /// An override variable such as `HERALD__QUEUE__RETRY_LIMIT` has a value
    /// of the wrong shape.
    #[error("environment override {var}: {reason}")]
    Env {
        /// The full variable name.
        var: String,
        /// What was expected.
        reason: String,
    },

    /// A loaded value is out of range, e.g. a zero batch size.
    #[error("invalid value for {field}: {reason}")]
    InvalidValue {
        /// Dotted field path, e.g. `queue.stream_batch_size`.
        field: String,
        /// What the field requires.
        reason: String,
    },
}

impl ConfigError {
    pub(crate) fn missing(path: impl Into<PathBuf>) -> Self {
        Self::Missing { path: path.into() }
    }

    pub(crate) fn unreadable(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Unreadable {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn env(var: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Env {
            var: var.into(),
            reason: reason.into(),
        }
    }

    /// An out-of-range value for `field`.
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// The dotted field path, for `InvalidValue` errors.
    #[must_use]
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::InvalidValue { field, .. } => Some(field),
            _ => None,
        }
    }
}
