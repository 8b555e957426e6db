//! Configuration loader with layered approach.
//!
//! This module provides the [`ConfigLoader`] for loading configuration from
//! multiple sources: defaults, files, `.env` and environment variables.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use herald_middleware::LogMode;

use crate::{ConfigError, HeraldConfig, LogFormat};

/// Configuration loader with layered approach.
///
/// Later layers override earlier ones:
/// 1. Default values or a preset
/// 2. Configuration file (TOML or JSON)
/// 3. `.env` file, folded into the process environment
/// 4. Environment variables `PREFIX__SECTION__KEY`
///
/// # Example
///
/// ```no_run
/// use herald_config::ConfigLoader;
///
/// # fn main() -> Result<(), herald_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_defaults()
///     .with_optional_file("herald.toml")?
///     .with_dotenv()?
///     .with_env_prefix("HERALD")
///     .load()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ConfigLoader {
    config: HeraldConfig,
    env_prefix: Option<String>,
    file_loaded: bool,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a new configuration loader.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: HeraldConfig::default(),
            env_prefix: None,
            file_loaded: false,
        }
    }

    /// Start with default configuration values.
    #[must_use]
    pub fn with_defaults(mut self) -> Self {
        self.config = HeraldConfig::default();
        self
    }

    /// Start from the development preset.
    #[must_use]
    pub fn with_development(mut self) -> Self {
        self.config = HeraldConfig::development();
        self
    }

    /// Start from the production preset.
    #[must_use]
    pub fn with_production(mut self) -> Self {
        self.config = HeraldConfig::production();
        self
    }

    /// Load configuration from a file. The format follows the extension.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file doesn't exist, cannot be read,
    /// is neither TOML nor JSON, or contains unknown fields.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::missing(path));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::unreadable(path, e))?;

        let file_config = Self::parse_file(&content, path)?;
        self.merge_config(file_config);
        self.file_loaded = true;

        Ok(self)
    }

    /// Load configuration from a file if it exists.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file exists but cannot be loaded.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Load configuration from a string in the given format ("toml" or "json").
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if parsing fails.
    ///
    /// # Example
    ///
    /// ```
    /// use herald_config::ConfigLoader;
    ///
    /// let toml = r#"
    ///     [queue]
    ///     group_name = "svcA"
    ///     machine_name = "worker-1"
    ///     prefix = "evt"
    /// "#;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_string(toml, "toml")
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(config.queue.prefix.as_deref(), Some("evt"));
    /// ```
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        let file_config = match format.to_lowercase().as_str() {
            "toml" => toml::from_str(content)?,
            "json" => serde_json::from_str(content)?,
            other => return Err(ConfigError::UnsupportedFormat(other.to_string())),
        };

        self.merge_config(file_config);
        Ok(self)
    }

    /// Set environment variable prefix for overrides.
    ///
    /// With prefix "HERALD":
    /// - `HERALD__QUEUE__STREAM_BATCH_SIZE=100`
    /// - `HERALD__PIPELINES__LOG_MODE=request`
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Load a `.env` file into the process environment, if one exists.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a `.env` file exists but is malformed.
    pub fn with_dotenv(self) -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(_) => Ok(self),
            Err(e) if e.not_found() => Ok(self),
            Err(e) => Err(ConfigError::Dotenv(e)),
        }
    }

    /// Whether a configuration file was loaded.
    #[must_use]
    pub fn file_loaded(&self) -> bool {
        self.file_loaded
    }

    /// Apply environment overrides and validate.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if an environment variable cannot be parsed
    /// or validation fails.
    pub fn load(mut self) -> Result<HeraldConfig, ConfigError> {
        if let Some(prefix) = self.env_prefix.take() {
            self.apply_env_overrides(&prefix)?;
        }

        self.config.validate()?;

        Ok(self.config)
    }

    /// Finalize without environment overrides or validation.
    #[must_use]
    pub fn load_unvalidated(self) -> HeraldConfig {
        self.config
    }

    fn parse_file(content: &str, path: &Path) -> Result<HeraldConfig, ConfigError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);

        match extension.as_deref() {
            Some("toml") => Ok(toml::from_str(content)?),
            Some("json") => Ok(serde_json::from_str(content)?),
            _ => Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        }
    }

    // Full replace; sections missing from the file fall back to serde defaults.
    fn merge_config(&mut self, file_config: HeraldConfig) {
        self.config = file_config;
    }

    fn apply_env_overrides(&mut self, prefix: &str) -> Result<(), ConfigError> {
        let env_vars: HashMap<String, String> = env::vars()
            .filter(|(k, _)| k.starts_with(prefix))
            .collect();

        for (key, value) in env_vars {
            self.apply_env_var(&key, &value, prefix)?;
        }

        Ok(())
    }

    fn apply_env_var(&mut self, key: &str, value: &str, prefix: &str) -> Result<(), ConfigError> {
        let key_without_prefix = key
            .strip_prefix(prefix)
            .and_then(|k| k.strip_prefix("__"))
            .ok_or_else(|| ConfigError::env(key, "invalid key format"))?;

        let parts: Vec<&str> = key_without_prefix.split("__").collect();
        let queue = &mut self.config.queue;

        match parts.as_slice() {
            // Queue section
            ["QUEUE", "GROUP_NAME"] => queue.group_name = value.to_string(),
            ["QUEUE", "MACHINE_NAME"] => queue.machine_name = value.to_string(),
            ["QUEUE", "PREFIX"] => {
                queue.prefix = (!value.trim().is_empty()).then(|| value.to_string());
            }
            ["QUEUE", "COMMUNICATION_CHANNEL"] => queue.communication_channel = value.to_string(),
            ["QUEUE", "SLOW_COMMAND_MS"] => queue.slow_command_ms = parse_number(key, value)?,
            ["QUEUE", "STREAM_IDLE_MS"] => queue.stream_idle_ms = parse_number(key, value)?,
            ["QUEUE", "STREAM_BATCH_SIZE"] => queue.stream_batch_size = parse_number(key, value)?,
            ["QUEUE", "STREAM_MAX_SIZE"] => {
                queue.stream_max_size = if value.trim().is_empty() {
                    None
                } else {
                    Some(parse_number(key, value)?)
                };
            }
            ["QUEUE", "WORKER_TASK_LIMIT"] => queue.worker_task_limit = parse_number(key, value)?,
            ["QUEUE", "RETRY_LIMIT"] => queue.retry_limit = parse_number(key, value)?,
            ["QUEUE", "HEALTH_CHECK_INTERVAL_MS"] => {
                queue.health_check_interval_ms = parse_number(key, value)?;
            }
            ["QUEUE", "GROUP_NEWEST_ID"] => queue.group_newest_id = parse_flag(key, value)?,
            ["QUEUE", "CONSUMER_NEWEST_ID"] => queue.consumer_newest_id = parse_flag(key, value)?,

            // Logging section
            ["LOGGING", "ENABLED"] => self.config.logging.enabled = parse_flag(key, value)?,
            ["LOGGING", "LEVEL"] => self.config.logging.level = value.to_string(),
            ["LOGGING", "FORMAT"] => {
                self.config.logging.format = match value.to_lowercase().as_str() {
                    "json" => LogFormat::Json,
                    "pretty" => LogFormat::Pretty,
                    _ => {
                        return Err(ConfigError::env(
                            key,
                            "expected 'json' or 'pretty'",
                        ))
                    }
                };
            }
            ["LOGGING", "ANSI_ENABLED"] => {
                self.config.logging.ansi_enabled = parse_flag(key, value)?;
            }
            ["LOGGING", "INCLUDE_LOCATION"] => {
                self.config.logging.include_location = parse_flag(key, value)?;
            }

            // Pipelines section
            ["PIPELINES", "LOG_MODE"] => {
                self.config.pipelines.log_mode = LogMode::from_str(value)
                    .map_err(|reason| ConfigError::env(key, reason))?;
            }
            ["PIPELINES", "SLOW_COMMAND_MS"] => {
                self.config.pipelines.slow_command_ms = parse_number(key, value)?;
            }
            ["PIPELINES", "VALIDATION"] => {
                self.config.pipelines.validation = parse_flag(key, value)?;
            }

            // Unknown keys are ignored so unrelated HERALD_* variables don't fail startup
            _ => {}
        }

        Ok(())
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::env(key, "expected integer"))
}

fn parse_flag(key: &str, value: &str) -> Result<bool, ConfigError> {
    parse_bool(value).ok_or_else(|| ConfigError::env(key, "expected boolean"))
}

/// Parse a boolean from a string.
fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
