//! Subscriber setup and standard log fields.

use crate::error::TelemetryError;
use crate::TelemetryResult;
use tracing_subscriber::fmt::{self, format::FmtSpan};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// How the process-wide `tracing` subscriber is set up.
///
/// `level` accepts any `EnvFilter` directive, so per-crate levels such as
/// `info,herald_tasks=debug` work as well as a bare level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// When false, [`init_logging`] installs nothing.
    pub enabled: bool,
    /// Filter directive.
    pub level: String,
    /// One JSON object per event instead of the multi-line pretty format.
    pub json_format: bool,
    /// Emit an event when a span opens and closes (e.g. `process_entry`).
    pub span_events: bool,
    /// Source file and line on every event.
    pub file_line_info: bool,
    /// Runtime thread id on every event.
    pub thread_ids: bool,
    /// Module path of the emitting code.
    pub include_target: bool,
    /// Logged once at startup; Herald uses the consumer group name.
    pub service_name: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
            json_format: true,
            span_events: false,
            file_line_info: false,
            thread_ids: false,
            include_target: true,
            service_name: "herald".to_string(),
        }
    }
}

impl LogConfig {
    /// Pretty, debug-level output with span events and source locations.
    #[must_use]
    pub fn development() -> Self {
        Self {
            level: "debug".to_string(),
            json_format: false,
            span_events: true,
            file_line_info: true,
            ..Self::default()
        }
    }

    /// JSON at `info`, tagged with thread ids since runner loops share a
    /// multi-threaded runtime.
    #[must_use]
    pub fn production() -> Self {
        Self {
            thread_ids: true,
            ..Self::default()
        }
    }

    /// Replaces the service name.
    #[must_use]
    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = name.into();
        self
    }

    fn span_events(&self) -> FmtSpan {
        if self.span_events {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        }
    }
}

/// Installs the global subscriber. A no-op when `config.enabled` is false.
///
/// # Errors
///
/// `TelemetryError::InvalidConfig` for a bad directive or a blank service
/// name; `TelemetryError::LoggingInit` when a subscriber is already set.
pub fn init_logging(config: &LogConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }
    if config.service_name.trim().is_empty() {
        return Err(TelemetryError::InvalidConfig(
            "service name must not be empty".to_string(),
        ));
    }

    let filter = create_env_filter(&config.level)?;
    let layer = if config.json_format {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_events(config.span_events())
            .with_file(config.file_line_info)
            .with_line_number(config.file_line_info)
            .with_thread_ids(config.thread_ids)
            .with_target(config.include_target)
            .boxed()
    } else {
        fmt::layer()
            .pretty()
            .with_span_events(config.span_events())
            .with_file(config.file_line_info)
            .with_line_number(config.file_line_info)
            .with_thread_ids(config.thread_ids)
            .with_target(config.include_target)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(layer.with_filter(filter))
        .try_init()
        .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;

    tracing::info!(
        service.name = %config.service_name,
        json = config.json_format,
        "herald logging ready"
    );
    Ok(())
}

/// Creates an env filter from a directive string.
///
/// # Errors
///
/// Returns `TelemetryError::InvalidConfig` if the directive doesn't parse.
pub fn create_env_filter(filter: &str) -> TelemetryResult<EnvFilter> {
    EnvFilter::try_new(filter)
        .map_err(|e| TelemetryError::InvalidConfig(format!("invalid log filter '{filter}': {e}")))
}

/// Field names shared by every Herald log event, so that log queries can
/// join the queuing client, the runners and the pipelines on one key.
pub mod fields {
    /// Normalized stream key.
    pub const STREAM_KEY: &str = "stream_key";
    /// Entry id within a stream.
    pub const STREAM_ID: &str = "stream_id";
    /// Consumer group.
    pub const GROUP_NAME: &str = "group_name";
    /// The consumer name inside a group.
    pub const MACHINE_NAME: &str = "machine_name";
    /// Request id forwarded with the envelope.
    pub const REQUEST_ID: &str = "request_id";
    /// Type identity of the request being handled.
    pub const SERVICE_TYPE: &str = "service_type";
    /// Elapsed milliseconds.
    pub const DURATION_MS: &str = "duration_ms";
    /// Error text.
    pub const ERROR: &str = "error";
    /// Service name on the startup event.
    pub const SERVICE_NAME: &str = "service.name";
}
