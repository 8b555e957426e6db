//! In-process broker.
//!
//! [`MemoryBroker`] keeps streams, consumer groups and pending-entry lists
//! in memory with the same semantics the queuing protocol relies on from a
//! Redis-compatible server. Idle times are measured with tokio's clock, so
//! tests can drive reclamation with `tokio::time::pause`/`advance`.

use crate::broker::{Broker, Subscription};
use crate::error::{BrokerError, BrokerResult};
use crate::stream::{
    ConsumerInfo, GroupInfo, GroupStart, IdBound, PendingEntry, StreamEntry, StreamId,
};
use bytes::Bytes;
use futures_util::future::BoxFuture;
use parking_lot::{Mutex, MutexGuard};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tokio::time::Instant;

type Fields = Vec<(String, Bytes)>;

#[derive(Debug, Default)]
struct State {
    streams: HashMap<String, StreamState>,
    channels: HashMap<String, Vec<mpsc::UnboundedSender<String>>>,
}

#[derive(Debug, Default)]
struct StreamState {
    entries: BTreeMap<StreamId, Fields>,
    last_id: StreamId,
    groups: BTreeMap<String, GroupState>,
}

#[derive(Debug)]
struct GroupState {
    last_delivered: StreamId,
    pending: BTreeMap<StreamId, PendingState>,
    consumers: BTreeMap<String, Instant>,
}

#[derive(Debug)]
struct PendingState {
    consumer: String,
    delivered_at: Instant,
    delivery_count: u64,
}

impl StreamState {
    fn group_mut(&mut self, key: &str, group: &str) -> BrokerResult<&mut GroupState> {
        self.groups.get_mut(group).ok_or_else(|| BrokerError::NoSuchGroup {
            key: key.to_string(),
            group: group.to_string(),
        })
    }

    fn entry(&self, id: StreamId) -> Option<StreamEntry> {
        self.entries.get(&id).map(|fields| StreamEntry {
            id,
            fields: fields.clone(),
        })
    }
}

impl GroupState {
    fn touch(&mut self, consumer: &str, now: Instant) {
        self.consumers.insert(consumer.to_string(), now);
    }
}

impl State {
    fn stream(&self, key: &str) -> BrokerResult<&StreamState> {
        self.streams
            .get(key)
            .ok_or_else(|| BrokerError::NoSuchKey(key.to_string()))
    }

    fn stream_mut(&mut self, key: &str) -> BrokerResult<&mut StreamState> {
        self.streams
            .get_mut(key)
            .ok_or_else(|| BrokerError::NoSuchKey(key.to_string()))
    }
}

/// In-memory [`Broker`] implementation.
///
/// # Example
///
/// ```
/// use herald_queue::{Broker, GroupStart, MemoryBroker, StreamRecord};
/// use bytes::Bytes;
///
/// # tokio_test::block_on(async {
/// let broker = MemoryBroker::new();
/// broker.create_group("evt:ping", "svca", GroupStart::Beginning, true).await.unwrap();
/// broker
///     .append("evt:ping", StreamRecord::fields("evt:ping", 0, Bytes::from_static(b"{}")), None)
///     .await
///     .unwrap();
///
/// let entries = broker.read_group("evt:ping", "svca", "host-1", 10).await.unwrap();
/// assert_eq!(entries.len(), 1);
/// # });
/// ```
#[derive(Debug, Default)]
pub struct MemoryBroker {
    state: Mutex<State>,
    offline: AtomicBool,
}

impl MemoryBroker {
    /// Creates an empty broker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty broker behind an `Arc`.
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Simulates losing (or regaining) the connection. While offline every
    /// operation fails with [`BrokerError::Unavailable`].
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Returns every entry of a stream in id order.
    pub fn range(&self, key: &str) -> Vec<StreamEntry> {
        let state = self.state.lock();
        state
            .streams
            .get(key)
            .map(|stream| {
                stream
                    .entries
                    .iter()
                    .map(|(id, fields)| StreamEntry {
                        id: *id,
                        fields: fields.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Returns the number of entries in a stream.
    pub fn len(&self, key: &str) -> usize {
        self.state
            .lock()
            .streams
            .get(key)
            .map_or(0, |stream| stream.entries.len())
    }

    fn lock(&self) -> BrokerResult<MutexGuard<'_, State>> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(BrokerError::Unavailable("memory broker is offline".to_string()));
        }
        Ok(self.state.lock())
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_millis() as u64)
}

impl Broker for MemoryBroker {
    fn exists<'a>(&'a self, key: &'a str) -> BoxFuture<'a, BrokerResult<bool>> {
        Box::pin(async move { Ok(self.lock()?.streams.contains_key(key)) })
    }

    fn create_group<'a>(
        &'a self,
        key: &'a str,
        group: &'a str,
        start: GroupStart,
        make_stream: bool,
    ) -> BoxFuture<'a, BrokerResult<()>> {
        Box::pin(async move {
            let mut state = self.lock()?;
            if !state.streams.contains_key(key) {
                if !make_stream {
                    return Err(BrokerError::NoSuchKey(key.to_string()));
                }
                state.streams.insert(key.to_string(), StreamState::default());
            }
            let stream = state.stream_mut(key)?;
            if stream.groups.contains_key(group) {
                return Err(BrokerError::GroupExists {
                    key: key.to_string(),
                    group: group.to_string(),
                });
            }
            let last_delivered = match start {
                GroupStart::Newest => stream.last_id,
                GroupStart::Beginning => StreamId::ZERO,
            };
            stream.groups.insert(
                group.to_string(),
                GroupState {
                    last_delivered,
                    pending: BTreeMap::new(),
                    consumers: BTreeMap::new(),
                },
            );
            Ok(())
        })
    }

    fn list_groups<'a>(&'a self, key: &'a str) -> BoxFuture<'a, BrokerResult<Vec<GroupInfo>>> {
        Box::pin(async move {
            let state = self.lock()?;
            let stream = state.stream(key)?;
            Ok(stream
                .groups
                .iter()
                .map(|(name, group)| GroupInfo {
                    name: name.clone(),
                    consumers: group.consumers.len(),
                    pending: group.pending.len(),
                    last_delivered_id: group.last_delivered,
                })
                .collect())
        })
    }

    fn list_consumers<'a>(
        &'a self,
        key: &'a str,
        group: &'a str,
    ) -> BoxFuture<'a, BrokerResult<Vec<ConsumerInfo>>> {
        Box::pin(async move {
            let mut state = self.lock()?;
            let group = state.stream_mut(key)?.group_mut(key, group)?;
            let now = Instant::now();
            Ok(group
                .consumers
                .iter()
                .map(|(name, seen_at)| ConsumerInfo {
                    name: name.clone(),
                    pending: group
                        .pending
                        .values()
                        .filter(|pending| &pending.consumer == name)
                        .count(),
                    idle: now.saturating_duration_since(*seen_at),
                })
                .collect())
        })
    }

    fn create_consumer<'a>(
        &'a self,
        key: &'a str,
        group: &'a str,
        consumer: &'a str,
    ) -> BoxFuture<'a, BrokerResult<bool>> {
        Box::pin(async move {
            let mut state = self.lock()?;
            let group = state.stream_mut(key)?.group_mut(key, group)?;
            if group.consumers.contains_key(consumer) {
                return Ok(false);
            }
            group.touch(consumer, Instant::now());
            Ok(true)
        })
    }

    fn append<'a>(
        &'a self,
        key: &'a str,
        fields: Vec<(String, Bytes)>,
        max_len: Option<usize>,
    ) -> BoxFuture<'a, BrokerResult<StreamId>> {
        Box::pin(async move {
            let mut state = self.lock()?;
            let stream = state.streams.entry(key.to_string()).or_default();
            let id = stream.last_id.next_after(now_millis());
            stream.last_id = id;
            stream.entries.insert(id, fields);
            if let Some(max_len) = max_len {
                while stream.entries.len() > max_len {
                    stream.entries.pop_first();
                }
            }
            Ok(id)
        })
    }

    fn read_group<'a>(
        &'a self,
        key: &'a str,
        group: &'a str,
        consumer: &'a str,
        count: usize,
    ) -> BoxFuture<'a, BrokerResult<Vec<StreamEntry>>> {
        Box::pin(async move {
            let mut state = self.lock()?;
            let stream = state.stream_mut(key)?;
            let now = Instant::now();
            let start = stream.group_mut(key, group)?.last_delivered;
            let batch: Vec<StreamEntry> = stream
                .entries
                .range((std::ops::Bound::Excluded(start), std::ops::Bound::Unbounded))
                .take(count)
                .map(|(id, fields)| StreamEntry {
                    id: *id,
                    fields: fields.clone(),
                })
                .collect();

            let group = stream.group_mut(key, group)?;
            group.touch(consumer, now);
            for entry in &batch {
                group.last_delivered = entry.id;
                group.pending.insert(
                    entry.id,
                    PendingState {
                        consumer: consumer.to_string(),
                        delivered_at: now,
                        delivery_count: 1,
                    },
                );
            }
            Ok(batch)
        })
    }

    fn ack<'a>(
        &'a self,
        key: &'a str,
        group: &'a str,
        ids: &'a [StreamId],
    ) -> BoxFuture<'a, BrokerResult<usize>> {
        Box::pin(async move {
            let mut state = self.lock()?;
            let group = state.stream_mut(key)?.group_mut(key, group)?;
            Ok(ids
                .iter()
                .filter(|id| group.pending.remove(*id).is_some())
                .count())
        })
    }

    fn pending<'a>(
        &'a self,
        key: &'a str,
        group: &'a str,
        start: IdBound,
        end: IdBound,
        count: usize,
    ) -> BoxFuture<'a, BrokerResult<Vec<PendingEntry>>> {
        Box::pin(async move {
            let mut state = self.lock()?;
            let group = state.stream_mut(key)?.group_mut(key, group)?;
            let now = Instant::now();
            Ok(group
                .pending
                .iter()
                .filter(|(id, _)| start.admits_from(**id) && end.admits_to(**id))
                .take(count)
                .map(|(id, pending)| PendingEntry {
                    id: *id,
                    consumer: pending.consumer.clone(),
                    idle: now.saturating_duration_since(pending.delivered_at),
                    delivery_count: pending.delivery_count,
                })
                .collect())
        })
    }

    fn claim<'a>(
        &'a self,
        key: &'a str,
        group: &'a str,
        consumer: &'a str,
        min_idle: Duration,
        ids: &'a [StreamId],
    ) -> BoxFuture<'a, BrokerResult<Vec<StreamEntry>>> {
        Box::pin(async move {
            let mut state = self.lock()?;
            let stream = state.stream_mut(key)?;
            let now = Instant::now();
            let live: Vec<Option<StreamEntry>> = ids.iter().map(|id| stream.entry(*id)).collect();

            let group = stream.group_mut(key, group)?;
            group.touch(consumer, now);
            let mut claimed = Vec::new();
            for (id, entry) in ids.iter().zip(live) {
                let Some(pending) = group.pending.get_mut(id) else {
                    continue;
                };
                if now.saturating_duration_since(pending.delivered_at) < min_idle {
                    continue;
                }
                match entry {
                    Some(entry) => {
                        pending.consumer = consumer.to_string();
                        pending.delivered_at = now;
                        pending.delivery_count += 1;
                        claimed.push(entry);
                    }
                    // trimmed away while pending
                    None => {
                        group.pending.remove(id);
                    }
                }
            }
            Ok(claimed)
        })
    }

    fn delete_consumer<'a>(
        &'a self,
        key: &'a str,
        group: &'a str,
        consumer: &'a str,
    ) -> BoxFuture<'a, BrokerResult<usize>> {
        Box::pin(async move {
            let mut state = self.lock()?;
            let group = state.stream_mut(key)?.group_mut(key, group)?;
            if group.consumers.remove(consumer).is_none() {
                return Ok(0);
            }
            let before = group.pending.len();
            group.pending.retain(|_, pending| pending.consumer != consumer);
            Ok(before - group.pending.len())
        })
    }

    fn publish<'a>(&'a self, channel: &'a str, message: &'a str) -> BoxFuture<'a, BrokerResult<usize>> {
        Box::pin(async move {
            let mut state = self.lock()?;
            let Some(senders) = state.channels.get_mut(channel) else {
                return Ok(0);
            };
            senders.retain(|sender| sender.send(message.to_string()).is_ok());
            Ok(senders.len())
        })
    }

    fn subscribe<'a>(&'a self, channel: &'a str) -> BoxFuture<'a, BrokerResult<Subscription>> {
        Box::pin(async move {
            let (tx, rx) = mpsc::unbounded_channel();
            self.lock()?
                .channels
                .entry(channel.to_string())
                .or_default()
                .push(tx);
            Ok(rx)
        })
    }

    fn ping(&self) -> BoxFuture<'_, BrokerResult<Duration>> {
        Box::pin(async move {
            let started = Instant::now();
            drop(self.lock()?);
            Ok(started.elapsed())
        })
    }
}
