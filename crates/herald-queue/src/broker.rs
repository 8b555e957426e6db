//! The broker abstraction.
//!
//! [`Broker`] models the minimum set of append-only stream primitives the
//! queuing protocol needs: appends, consumer-group reads, acknowledgement,
//! pending-list inspection, claim, group and consumer management, and a
//! pub/sub channel for wake-up notifications. The trait is object safe so a
//! single `Arc<dyn Broker>` can be shared by the client and every runner.

use crate::error::BrokerResult;
use crate::stream::{ConsumerInfo, GroupInfo, GroupStart, IdBound, PendingEntry, StreamEntry, StreamId};
use bytes::Bytes;
use futures_util::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Receiving half of a pub/sub subscription.
pub type Subscription = mpsc::UnboundedReceiver<String>;

/// Shared broker handle.
pub type SharedBroker = Arc<dyn Broker>;

/// Stream broker with consumer-group semantics.
pub trait Broker: Send + Sync + 'static {
    /// Returns `true` if the stream exists.
    fn exists<'a>(&'a self, key: &'a str) -> BoxFuture<'a, BrokerResult<bool>>;

    /// Creates a consumer group.
    ///
    /// Fails with `GroupExists` if the group is already present, and with
    /// `NoSuchKey` if the stream is missing and `make_stream` is false.
    fn create_group<'a>(
        &'a self,
        key: &'a str,
        group: &'a str,
        start: GroupStart,
        make_stream: bool,
    ) -> BoxFuture<'a, BrokerResult<()>>;

    /// Lists the consumer groups of a stream.
    fn list_groups<'a>(&'a self, key: &'a str) -> BoxFuture<'a, BrokerResult<Vec<GroupInfo>>>;

    /// Lists the consumers of a group.
    fn list_consumers<'a>(
        &'a self,
        key: &'a str,
        group: &'a str,
    ) -> BoxFuture<'a, BrokerResult<Vec<ConsumerInfo>>>;

    /// Adds a consumer to a group. Returns `false` if it already existed.
    fn create_consumer<'a>(
        &'a self,
        key: &'a str,
        group: &'a str,
        consumer: &'a str,
    ) -> BoxFuture<'a, BrokerResult<bool>>;

    /// Appends an entry, trimming the stream to `max_len` entries if set.
    fn append<'a>(
        &'a self,
        key: &'a str,
        fields: Vec<(String, Bytes)>,
        max_len: Option<usize>,
    ) -> BoxFuture<'a, BrokerResult<StreamId>>;

    /// Reads up to `count` entries never delivered to the group (`>`),
    /// adding them to the consumer's pending list.
    fn read_group<'a>(
        &'a self,
        key: &'a str,
        group: &'a str,
        consumer: &'a str,
        count: usize,
    ) -> BoxFuture<'a, BrokerResult<Vec<StreamEntry>>>;

    /// Acknowledges entries. Returns how many were pending.
    fn ack<'a>(
        &'a self,
        key: &'a str,
        group: &'a str,
        ids: &'a [StreamId],
    ) -> BoxFuture<'a, BrokerResult<usize>>;

    /// Returns up to `count` pending entries with ids in `[start, end]`.
    fn pending<'a>(
        &'a self,
        key: &'a str,
        group: &'a str,
        start: IdBound,
        end: IdBound,
        count: usize,
    ) -> BoxFuture<'a, BrokerResult<Vec<PendingEntry>>>;

    /// Transfers ownership of pending entries idle for at least `min_idle`
    /// to `consumer`, returning the claimed entries.
    fn claim<'a>(
        &'a self,
        key: &'a str,
        group: &'a str,
        consumer: &'a str,
        min_idle: Duration,
        ids: &'a [StreamId],
    ) -> BoxFuture<'a, BrokerResult<Vec<StreamEntry>>>;

    /// Removes a consumer. Returns the number of entries it had pending.
    fn delete_consumer<'a>(
        &'a self,
        key: &'a str,
        group: &'a str,
        consumer: &'a str,
    ) -> BoxFuture<'a, BrokerResult<usize>>;

    /// Publishes a message on a channel. Returns the number of receivers.
    fn publish<'a>(&'a self, channel: &'a str, message: &'a str) -> BoxFuture<'a, BrokerResult<usize>>;

    /// Subscribes to a channel.
    fn subscribe<'a>(&'a self, channel: &'a str) -> BoxFuture<'a, BrokerResult<Subscription>>;

    /// Round-trips to the broker.
    fn ping(&self) -> BoxFuture<'_, BrokerResult<Duration>>;
}
