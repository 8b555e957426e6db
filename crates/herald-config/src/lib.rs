//! Typed configuration for Herald.
//!
//! - TOML and JSON configuration files
//! - `.env` files and environment variable overrides
//! - Strict validation (fails on unknown fields)
//! - Layered configuration (defaults → file → `.env` → env)
//!
//! # Example
//!
//! ```no_run
//! use herald_config::ConfigLoader;
//!
//! # fn main() -> Result<(), herald_config::ConfigError> {
//! let config = ConfigLoader::new()
//!     .with_defaults()
//!     .with_optional_file("herald.toml")?
//!     .with_dotenv()?
//!     .with_env_prefix("HERALD")
//!     .load()?;
//!
//! println!("consuming as {}/{}", config.queue.group_name, config.queue.machine_name);
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration File Format
//!
//! ```toml
//! [queue]
//! group_name = "billing"
//! machine_name = "worker-1"
//! prefix = "evt"
//! communication_channel = "notification"
//! stream_batch_size = 50
//! stream_idle_ms = 5000
//! worker_task_limit = 5
//! retry_limit = 3
//!
//! [logging]
//! level = "info"
//! format = "json"
//!
//! [pipelines]
//! log_mode = "both"
//! slow_command_ms = 2000
//! ```
//!
//! # Environment Variables
//!
//! With prefix `HERALD`, keys map as `HERALD__SECTION__KEY`:
//!
//! - `HERALD__QUEUE__STREAM_BATCH_SIZE=100`
//! - `HERALD__QUEUE__PREFIX=evt`
//! - `HERALD__LOGGING__LEVEL=debug`
//! - `HERALD__PIPELINES__LOG_MODE=request`

mod config;
mod error;
mod loader;
mod schema;

pub use config::{HeraldConfig, HeraldConfigBuilder};
pub use error::ConfigError;
pub use herald_queue::QueueConfig;
pub use loader::ConfigLoader;
pub use schema::{LogFormat, LoggingConfig, PipelinesConfig};
