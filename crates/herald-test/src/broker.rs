//! A broker wrapper that counts calls and injects failures.

use bytes::Bytes;
use futures_util::future::BoxFuture;
use herald_queue::{
    Broker, BrokerError, BrokerResult, ConsumerInfo, GroupInfo, GroupStart, IdBound, PendingEntry,
    StreamEntry, StreamId, Subscription,
};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::time::Duration;

/// Broker operations, as counted by [`CountingBroker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum BrokerOp {
    Exists,
    CreateGroup,
    ListGroups,
    ListConsumers,
    CreateConsumer,
    Append,
    ReadGroup,
    Ack,
    Pending,
    Claim,
    DeleteConsumer,
    Publish,
    Subscribe,
    Ping,
}

/// Wraps a broker, records how often each operation is called, and fails
/// scripted calls.
///
/// Failed calls are counted but never reach the wrapped broker.
pub struct CountingBroker<B> {
    inner: B,
    calls: Mutex<HashMap<BrokerOp, usize>>,
    failures: Mutex<HashMap<BrokerOp, VecDeque<BrokerError>>>,
}

impl<B: Broker> CountingBroker<B> {
    /// Wraps `inner`.
    pub fn new(inner: B) -> Self {
        Self {
            inner,
            calls: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// The wrapped broker.
    pub fn inner(&self) -> &B {
        &self.inner
    }

    /// Number of calls made to `op`, failed ones included.
    pub fn calls(&self, op: BrokerOp) -> usize {
        self.calls.lock().get(&op).copied().unwrap_or(0)
    }

    /// Resets every counter. Scripted failures are kept.
    pub fn reset(&self) {
        self.calls.lock().clear();
    }

    /// Fails the next `times` calls to `op` with `error`.
    pub fn fail_next(&self, op: BrokerOp, times: usize, error: BrokerError) {
        self.failures
            .lock()
            .entry(op)
            .or_default()
            .extend(std::iter::repeat(error).take(times));
    }

    fn call<'a, T: Send + 'a>(
        &'a self,
        op: BrokerOp,
        forward: impl FnOnce() -> BoxFuture<'a, BrokerResult<T>>,
    ) -> BoxFuture<'a, BrokerResult<T>> {
        *self.calls.lock().entry(op).or_insert(0) += 1;
        let scripted = self.failures.lock().get_mut(&op).and_then(VecDeque::pop_front);
        match scripted {
            Some(err) => Box::pin(async move { Err(err) }),
            None => forward(),
        }
    }
}

impl<B> fmt::Debug for CountingBroker<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CountingBroker")
            .field("calls", &*self.calls.lock())
            .finish_non_exhaustive()
    }
}

impl<B: Broker> Broker for CountingBroker<B> {
    fn exists<'a>(&'a self, key: &'a str) -> BoxFuture<'a, BrokerResult<bool>> {
        self.call(BrokerOp::Exists, || self.inner.exists(key))
    }

    fn create_group<'a>(
        &'a self,
        key: &'a str,
        group: &'a str,
        start: GroupStart,
        make_stream: bool,
    ) -> BoxFuture<'a, BrokerResult<()>> {
        self.call(BrokerOp::CreateGroup, || self.inner.create_group(key, group, start, make_stream))
    }

    fn list_groups<'a>(&'a self, key: &'a str) -> BoxFuture<'a, BrokerResult<Vec<GroupInfo>>> {
        self.call(BrokerOp::ListGroups, || self.inner.list_groups(key))
    }

    fn list_consumers<'a>(
        &'a self,
        key: &'a str,
        group: &'a str,
    ) -> BoxFuture<'a, BrokerResult<Vec<ConsumerInfo>>> {
        self.call(BrokerOp::ListConsumers, || self.inner.list_consumers(key, group))
    }

    fn create_consumer<'a>(
        &'a self,
        key: &'a str,
        group: &'a str,
        consumer: &'a str,
    ) -> BoxFuture<'a, BrokerResult<bool>> {
        self.call(BrokerOp::CreateConsumer, || self.inner.create_consumer(key, group, consumer))
    }

    fn append<'a>(
        &'a self,
        key: &'a str,
        fields: Vec<(String, Bytes)>,
        max_len: Option<usize>,
    ) -> BoxFuture<'a, BrokerResult<StreamId>> {
        self.call(BrokerOp::Append, || self.inner.append(key, fields, max_len))
    }

    fn read_group<'a>(
        &'a self,
        key: &'a str,
        group: &'a str,
        consumer: &'a str,
        count: usize,
    ) -> BoxFuture<'a, BrokerResult<Vec<StreamEntry>>> {
        self.call(BrokerOp::ReadGroup, || self.inner.read_group(key, group, consumer, count))
    }

    fn ack<'a>(
        &'a self,
        key: &'a str,
        group: &'a str,
        ids: &'a [StreamId],
    ) -> BoxFuture<'a, BrokerResult<usize>> {
        self.call(BrokerOp::Ack, || self.inner.ack(key, group, ids))
    }

    fn pending<'a>(
        &'a self,
        key: &'a str,
        group: &'a str,
        start: IdBound,
        end: IdBound,
        count: usize,
    ) -> BoxFuture<'a, BrokerResult<Vec<PendingEntry>>> {
        self.call(BrokerOp::Pending, || self.inner.pending(key, group, start, end, count))
    }

    fn claim<'a>(
        &'a self,
        key: &'a str,
        group: &'a str,
        consumer: &'a str,
        min_idle: Duration,
        ids: &'a [StreamId],
    ) -> BoxFuture<'a, BrokerResult<Vec<StreamEntry>>> {
        self.call(BrokerOp::Claim, || self.inner.claim(key, group, consumer, min_idle, ids))
    }

    fn delete_consumer<'a>(
        &'a self,
        key: &'a str,
        group: &'a str,
        consumer: &'a str,
    ) -> BoxFuture<'a, BrokerResult<usize>> {
        self.call(BrokerOp::DeleteConsumer, || self.inner.delete_consumer(key, group, consumer))
    }

    fn publish<'a>(&'a self, channel: &'a str, message: &'a str) -> BoxFuture<'a, BrokerResult<usize>> {
        self.call(BrokerOp::Publish, || self.inner.publish(channel, message))
    }

    fn subscribe<'a>(&'a self, channel: &'a str) -> BoxFuture<'a, BrokerResult<Subscription>> {
        self.call(BrokerOp::Subscribe, || self.inner.subscribe(channel))
    }

    fn ping(&self) -> BoxFuture<'_, BrokerResult<Duration>> {
        self.call(BrokerOp::Ping, || self.inner.ping())
    }
}
