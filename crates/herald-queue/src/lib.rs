//! # Herald Queue
//!
//! Stream-based queuing protocol for the Herald mediator.
//!
//! Requests published for remote handling are appended to a per-type
//! stream and announced on a shared pub/sub channel. Consumers read them in
//! batches through a consumer group, publish a reply to the origin group's
//! reply stream, and acknowledge the entry.
//!
//! - [`stream_key`] - Deterministic stream key scheme
//! - [`Message`] - Wire envelope for requests and replies
//! - [`Broker`] - Abstract stream broker
//! - [`MemoryBroker`] - In-process broker
//! - [`Queuing`] - Registration, publish and notifications
//! - [`QueueConfig`] - Queuing options

#![doc(html_root_url = "https://docs.rs/herald-queue/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod broker;
mod client;
mod envelope;
mod error;
mod key;
mod memory;
mod options;
mod stream;

pub use broker::{Broker, SharedBroker, Subscription};
pub use client::Queuing;
pub use envelope::Message;
pub use error::{BrokerError, BrokerResult};
pub use key::{normalize_segment, stream_key, StreamKey};
pub use memory::MemoryBroker;
pub use options::QueueConfig;
pub use stream::{
    ConsumerInfo, GroupInfo, GroupStart, IdBound, PendingEntry, StreamEntry, StreamId,
    StreamRecord, FIELD_DATA, FIELD_KEY, FIELD_TIMESTAMP,
};
