//! Configuration schema types.
//!
//! The `[queue]` section is [`QueueConfig`](herald_queue::QueueConfig),
//! owned by the queue crate; this module defines the remaining sections.

use herald_middleware::LogMode;
use serde::{Deserialize, Serialize};

/// Log format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON formatted logs (production).
    #[default]
    Json,
    /// Human-readable pretty format (development).
    Pretty,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Enable logging.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Log level or filter directive (e.g. "info", "herald_tasks=debug").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format.
    #[serde(default)]
    pub format: LogFormat,

    /// Include ANSI color codes in output.
    #[serde(default)]
    pub ansi_enabled: bool,

    /// Include source file and line in logs.
    #[serde(default)]
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: default_log_level(),
            format: LogFormat::default(),
            ansi_enabled: false,
            include_location: false,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Built-in pipeline configuration.
///
/// # Example
///
/// ```
/// use herald_config::PipelinesConfig;
/// use herald_middleware::LogMode;
///
/// let config: PipelinesConfig = toml::from_str(r#"log_mode = "request""#).unwrap();
/// assert_eq!(config.log_mode, LogMode::Request);
/// assert_eq!(config.slow_command_ms, 2000);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PipelinesConfig {
    /// What the logging pipeline records.
    #[serde(default)]
    pub log_mode: LogMode,

    /// Dispatches slower than this are logged, in milliseconds.
    #[serde(default = "default_slow_command_ms")]
    pub slow_command_ms: u64,

    /// Run registered validators before request handlers.
    #[serde(default = "default_true")]
    pub validation: bool,
}

impl Default for PipelinesConfig {
    fn default() -> Self {
        Self {
            log_mode: LogMode::default(),
            slow_command_ms: default_slow_command_ms(),
            validation: true,
        }
    }
}

impl PipelinesConfig {
    /// Slow dispatch threshold.
    #[must_use]
    pub const fn slow_command(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.slow_command_ms)
    }
}

fn default_slow_command_ms() -> u64 {
    2000
}
