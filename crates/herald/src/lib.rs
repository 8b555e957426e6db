//! # Herald
//!
//! **Request/response mediator with in-process pipelines and stream-based
//! distribution.**
//!
//! - **Local dispatch** – `send` runs a request through an ordered pipeline
//!   chain around its registered handler
//! - **Distributed dispatch** – `publish` appends the request to a broker
//!   stream; a consumer in another process handles it and replies to the
//!   origin group's reply stream
//! - **At-least-once** – unacknowledged entries are reclaimed after an idle
//!   timeout and processed again
//! - **Backpressure** – a per-stream bound on concurrent drain loops
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use herald::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConfigLoader::new()
//!         .with_optional_file("herald.toml")?
//!         .with_dotenv()?
//!         .with_env_prefix("HERALD")
//!         .load()?;
//!     herald::init_logging(&config)?;
//!
//!     let mediator = Mediator::builder()
//!         .config(config)
//!         .broker(MemoryBroker::shared())
//!         .handler::<Ping, _>(PingHandler)
//!         .build()?;
//!
//!     let shutdown = CancellationToken::new();
//!     let worker = mediator.worker().expect("broker configured").start(shutdown.clone());
//!
//!     mediator.dispatcher().publish(&Ping::default(), true).await?;
//!
//!     shutdown.cancel();
//!     worker.await??;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! send ──► Global[..] ──► Scoped[..] ──► Handler
//!
//! publish ──► stream "prefix:type" ──► notify ──► reader ──► Dispatcher
//!                                                  │
//!      reply stream "prefix:group:type" ◄── ack ◄──┘
//! ```

#![doc(html_root_url = "https://docs.rs/herald/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod dispatcher;
mod mediator;
mod registry;

pub use dispatcher::Dispatcher;
pub use mediator::{ConsumerWorker, Mediator, MediatorBuilder};
pub use registry::Registry;

// Re-export member crates
pub use herald_config as config;
pub use herald_core as core;
pub use herald_middleware as middleware;
pub use herald_queue as queue;
pub use herald_tasks as tasks;
pub use herald_telemetry as telemetry;

use herald_config::{HeraldConfig, LogFormat};
use herald_telemetry::{LogConfig, TelemetryResult};

/// Telemetry settings derived from a loaded configuration. The consumer
/// group name becomes the service name.
#[must_use]
pub fn log_config(config: &HeraldConfig) -> LogConfig {
    let logging = &config.logging;
    LogConfig {
        enabled: logging.enabled,
        level: logging.level.clone(),
        json_format: logging.format == LogFormat::Json,
        file_line_info: logging.include_location,
        ..LogConfig::default()
    }
    .with_service_name(config.queue.group_name.clone())
}

/// Installs the global `tracing` subscriber described by `config`.
///
/// # Errors
///
/// Fails on an invalid level directive or when a subscriber is already set.
pub fn init_logging(config: &HeraldConfig) -> TelemetryResult<()> {
    herald_telemetry::init_logging(&log_config(config))
}

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust,ignore
/// use herald::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{ConsumerWorker, Dispatcher, Mediator, MediatorBuilder};

    pub use herald_core::di::{Container, HandlerProvider};
    pub use herald_core::{
        handler_fn, response_handler_fn, HandlerKind, HeraldError, HeraldResult, Lifetime,
        Request, RequestContext, RequestHandler, RequestId, ResponseHandler, ServiceMap,
    };

    pub use herald_middleware::stages::{LogMode, Validator};
    pub use herald_middleware::{
        BoxFuture, Next, Outcome, Pipeline, PipelineContext, RequestPipeline, TypedNext,
    };

    pub use herald_config::{ConfigLoader, HeraldConfig};
    pub use herald_queue::{Broker, MemoryBroker, QueueConfig, SharedBroker, StreamId};
    pub use herald_tasks::{RunnerStats, WorkerError};

    pub use tokio_util::sync::CancellationToken;
}
