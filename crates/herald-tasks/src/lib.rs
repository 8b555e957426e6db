//! # Herald Tasks
//!
//! Consumer runners for the Herald mediator.
//!
//! The runner set consumes the streams of every locally registered handler:
//!
//! 1. **Read loop** ([`ConsumerReader`]): drains a stream when its
//!    notification arrives, bounded per key by a [`KeyCountLocker`]
//! 2. **Pending sweeper** ([`PendingSweeper`]): reclaims entries left idle by
//!    other consumers and evicts consumers that stopped reading
//! 3. **Health checker** ([`HealthChecker`]): pings the broker
//!
//! A [`Supervisor`] runs the three under one cancellation scope and
//! restarts them on failure.
//!
//! ```rust,no_run
//! use herald_queue::{MemoryBroker, QueueConfig, Queuing};
//! use herald_tasks::{LocalDispatch, Supervisor};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example(dispatch: Arc<dyn LocalDispatch>) {
//! let queuing = Arc::new(Queuing::new(MemoryBroker::shared(), QueueConfig::default()));
//! let supervisor = Supervisor::new(queuing, dispatch, Vec::new());
//!
//! let shutdown = CancellationToken::new();
//! supervisor.run(&shutdown).await.unwrap();
//! # }
//! ```

#![doc(html_root_url = "https://docs.rs/herald-tasks/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod dispatch;
mod error;
mod health;
mod locker;
mod processor;
mod reader;
mod stats;
mod supervisor;
mod sweeper;

pub use dispatch::{EncodedOutput, LocalDispatch};
pub use error::{WorkerError, WorkerResult};
pub use health::HealthChecker;
pub use locker::{KeyCountLocker, KeyPermit};
pub use processor::{EntryOutcome, EntryProcessor};
pub use reader::ConsumerReader;
pub use stats::RunnerStats;
pub use supervisor::Supervisor;
pub use sweeper::PendingSweeper;
