//! Structured logging for Herald services.
//!
//! Herald components log through `tracing` macros. This crate installs the
//! subscriber: an `EnvFilter` plus JSON (production) or pretty (development)
//! formatting, and names the fields the runners attach to their events.
//!
//! # Example
//!
//! ```rust,ignore
//! use herald_telemetry::{init_logging, LogConfig};
//!
//! init_logging(&LogConfig::production().with_service_name("billing"))?;
//!
//! tracing::info!(stream_key = "evt:billing:charge", "Consumer started");
//! ```

pub mod error;
pub mod logging;

pub use error::TelemetryError;
pub use logging::{create_env_filter, fields, init_logging, LogConfig};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
