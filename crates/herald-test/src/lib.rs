//! # Herald Test
//!
//! Test utilities for the Herald mediator.
//!
//! - [`CountingBroker`] wraps any [`Broker`](herald_queue::Broker), counts
//!   calls per [`BrokerOp`], and can fail the next calls of an operation
//!
//! Backpressure and supervisor tests assert on broker round-trips rather
//! than on timing:
//!
//! ```
//! use herald_queue::{Broker, BrokerError, MemoryBroker};
//! use herald_test::{BrokerOp, CountingBroker};
//!
//! # tokio_test::block_on(async {
//! let broker = CountingBroker::new(MemoryBroker::new());
//! broker.fail_next(BrokerOp::Ping, 1, BrokerError::Unavailable("down".into()));
//!
//! assert!(broker.ping().await.is_err());
//! assert!(broker.ping().await.is_ok());
//! assert_eq!(broker.calls(BrokerOp::Ping), 2);
//! # });
//! ```

#![doc(html_root_url = "https://docs.rs/herald-test/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod broker;

pub use broker::{BrokerOp, CountingBroker};
