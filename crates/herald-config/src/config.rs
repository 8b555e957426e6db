//! Main configuration types.
//!
//! This module provides the top-level [`HeraldConfig`] struct and its builder.

use herald_queue::QueueConfig;
use serde::{Deserialize, Serialize};

use crate::{ConfigError, LogFormat, LoggingConfig, PipelinesConfig};

/// Complete Herald configuration.
///
/// Use [`ConfigLoader`](crate::ConfigLoader) to load configuration from files
/// and environment variables.
///
/// # Example
///
/// ```
/// use herald_config::HeraldConfig;
///
/// let config = HeraldConfig::default();
/// assert_eq!(config.queue.stream_batch_size, 50);
/// assert_eq!(config.logging.level, "info");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct HeraldConfig {
    /// Queuing client and runner options.
    #[serde(default)]
    pub queue: QueueConfig,

    /// Logging output.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Built-in pipeline stages.
    #[serde(default)]
    pub pipelines: PipelinesConfig,
}

impl HeraldConfig {
    /// Create a new configuration builder.
    ///
    /// # Example
    ///
    /// ```
    /// use herald_config::HeraldConfig;
    /// use herald_queue::QueueConfig;
    ///
    /// let config = HeraldConfig::builder()
    ///     .queue(QueueConfig {
    ///         group_name: "billing".to_string(),
    ///         ..Default::default()
    ///     })
    ///     .build();
    ///
    /// assert_eq!(config.queue.group_name, "billing");
    /// ```
    #[must_use]
    pub fn builder() -> HeraldConfigBuilder {
        HeraldConfigBuilder::new()
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let queue = &self.queue;

        if queue.group_name.trim().is_empty() {
            return Err(ConfigError::invalid_value("queue.group_name", "must not be empty"));
        }
        if queue.machine_name.trim().is_empty() {
            return Err(ConfigError::invalid_value("queue.machine_name", "must not be empty"));
        }
        if queue.communication_channel.trim().is_empty() {
            return Err(ConfigError::invalid_value(
                "queue.communication_channel",
                "must not be empty",
            ));
        }
        if queue.stream_batch_size == 0 {
            return Err(ConfigError::invalid_value(
                "queue.stream_batch_size",
                "must be greater than zero",
            ));
        }
        if queue.worker_task_limit == 0 {
            return Err(ConfigError::invalid_value(
                "queue.worker_task_limit",
                "must be greater than zero",
            ));
        }
        if queue.stream_idle_ms == 0 {
            return Err(ConfigError::invalid_value(
                "queue.stream_idle_ms",
                "must be greater than zero",
            ));
        }
        if queue.health_check_interval_ms == 0 {
            return Err(ConfigError::invalid_value(
                "queue.health_check_interval_ms",
                "must be greater than zero",
            ));
        }
        if queue.stream_max_size == Some(0) {
            return Err(ConfigError::invalid_value(
                "queue.stream_max_size",
                "must be greater than zero when set",
            ));
        }

        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::invalid_value("logging.level", "must not be empty"));
        }

        Ok(())
    }

    /// Development preset: pretty logs, debug level, short idle time.
    ///
    /// # Example
    ///
    /// ```
    /// use herald_config::{HeraldConfig, LogFormat};
    ///
    /// let config = HeraldConfig::development();
    /// assert_eq!(config.logging.format, LogFormat::Pretty);
    /// assert_eq!(config.logging.level, "debug");
    /// ```
    #[must_use]
    pub fn development() -> Self {
        Self {
            queue: QueueConfig {
                stream_idle_ms: 2000,
                health_check_interval_ms: 10_000,
                ..QueueConfig::default()
            },
            logging: LoggingConfig {
                enabled: true,
                level: "debug".to_string(),
                format: LogFormat::Pretty,
                ansi_enabled: true,
                include_location: true,
            },
            pipelines: PipelinesConfig {
                slow_command_ms: 500,
                ..PipelinesConfig::default()
            },
        }
    }

    /// Production preset: JSON logs, bounded streams, more headroom per key.
    ///
    /// # Example
    ///
    /// ```
    /// use herald_config::{HeraldConfig, LogFormat};
    ///
    /// let config = HeraldConfig::production();
    /// assert_eq!(config.logging.format, LogFormat::Json);
    /// assert!(config.queue.stream_max_size.is_some());
    /// ```
    #[must_use]
    pub fn production() -> Self {
        Self {
            queue: QueueConfig {
                stream_max_size: Some(100_000),
                worker_task_limit: 10,
                retry_limit: 5,
                ..QueueConfig::default()
            },
            logging: LoggingConfig {
                enabled: true,
                level: "info".to_string(),
                format: LogFormat::Json,
                ansi_enabled: false,
                include_location: false,
            },
            pipelines: PipelinesConfig::default(),
        }
    }
}

/// Builder for [`HeraldConfig`].
#[derive(Debug, Default)]
pub struct HeraldConfigBuilder {
    config: HeraldConfig,
}

impl HeraldConfigBuilder {
    /// Create a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the queue section.
    #[must_use]
    pub fn queue(mut self, queue: QueueConfig) -> Self {
        self.config.queue = queue;
        self
    }

    /// Set the logging section.
    #[must_use]
    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.config.logging = logging;
        self
    }

    /// Set the pipelines section.
    #[must_use]
    pub fn pipelines(mut self, pipelines: PipelinesConfig) -> Self {
        self.config.pipelines = pipelines;
        self
    }

    /// Build the configuration without validation.
    #[must_use]
    pub fn build(self) -> HeraldConfig {
        self.config
    }

    /// Build and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if validation fails.
    pub fn build_validated(self) -> Result<HeraldConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_middleware::LogMode;

    fn named() -> HeraldConfig {
        HeraldConfig::builder()
            .queue(QueueConfig {
                group_name: "svcA".to_string(),
                machine_name: "host-1".to_string(),
                ..QueueConfig::default()
            })
            .build()
    }

    #[test]
    fn test_default_config() {
        let config = HeraldConfig::default();
        assert_eq!(config.queue.communication_channel, "notification");
        assert_eq!(config.pipelines.log_mode, LogMode::Both);
        assert!(config.logging.enabled);
    }

    #[test]
    fn test_builder_all_sections() {
        let config = HeraldConfig::builder()
            .logging(LoggingConfig {
                level: "warn".to_string(),
                ..LoggingConfig::default()
            })
            .pipelines(PipelinesConfig {
                log_mode: LogMode::None,
                ..PipelinesConfig::default()
            })
            .build();

        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.pipelines.log_mode, LogMode::None);
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(named().validate().is_ok());
    }

    #[test]
    fn test_validate_zero_batch_size() {
        let mut config = named();
        config.queue.stream_batch_size = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("queue.stream_batch_size"));
    }

    #[test]
    fn test_validate_zero_worker_limit() {
        let mut config = named();
        config.queue.worker_task_limit = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field, .. }) if field == "queue.worker_task_limit"
        ));
    }

    #[test]
    fn test_validate_zero_idle_and_interval() {
        let mut config = named();
        config.queue.stream_idle_ms = 0;
        assert!(config.validate().is_err());

        let mut config = named();
        config.queue.health_check_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_empty_names() {
        let mut config = named();
        config.queue.group_name = "  ".to_string();
        assert!(config.validate().is_err());

        let mut config = named();
        config.queue.machine_name = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_presets_are_valid() {
        assert!(HeraldConfig::development().validate().is_ok());
        assert!(HeraldConfig::production().validate().is_ok());
    }

    #[test]
    fn test_build_validated_failure() {
        let result = HeraldConfig::builder()
            .queue(QueueConfig {
                stream_max_size: Some(0),
                ..QueueConfig::default()
            })
            .build_validated();
        assert!(result.is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = named();
        let text = toml::to_string(&config).unwrap();
        let parsed: HeraldConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result: Result<HeraldConfig, _> = toml::from_str("[server]\nport = 1\n");
        assert!(result.is_err());
    }
}
