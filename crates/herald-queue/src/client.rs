//! The queuing client: registration, publish and notifications.

use crate::broker::SharedBroker;
use crate::envelope::Message;
use crate::error::BrokerError;
use crate::key::{stream_key, StreamKey};
use crate::options::QueueConfig;
use crate::stream::{GroupStart, StreamId, StreamRecord};
use herald_core::{HandlerKind, HeraldResult, Request, RequestContext, ServiceMap};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Client for the stream-based queuing protocol.
///
/// One client is shared by the dispatcher (publishing) and the consumer
/// runners (registration and notifications). It holds at most one active
/// notification subscription; subscribing again replaces it.
pub struct Queuing {
    broker: SharedBroker,
    config: Arc<QueueConfig>,
    subscription: Mutex<Option<JoinHandle<()>>>,
}

impl Queuing {
    /// Creates a client over a broker.
    pub fn new(broker: SharedBroker, config: QueueConfig) -> Self {
        Self::with_shared_config(broker, Arc::new(config))
    }

    /// Creates a client sharing an existing configuration.
    pub fn with_shared_config(broker: SharedBroker, config: Arc<QueueConfig>) -> Self {
        Self {
            broker,
            config,
            subscription: Mutex::new(None),
        }
    }

    /// The underlying broker.
    pub fn broker(&self) -> &SharedBroker {
        &self.broker
    }

    /// The queuing options.
    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Stream carrying fresh requests of a type.
    pub fn request_key(&self, identity: &str) -> StreamKey {
        stream_key(self.config.prefix(), None, identity)
    }

    /// Stream carrying replies of a type for a group.
    pub fn reply_key(&self, group_name: &str, identity: &str) -> StreamKey {
        stream_key(self.config.prefix(), Some(group_name), identity)
    }

    /// The notification channel.
    pub fn channel(&self) -> StreamKey {
        stream_key(self.config.prefix(), None, &self.config.communication_channel)
    }

    /// The stream this process consumes for a registered handler.
    pub fn stream_key_for(&self, map: &ServiceMap) -> StreamKey {
        match map.kind() {
            HandlerKind::Request => self.request_key(map.request_type()),
            HandlerKind::Response => self.reply_key(&self.config.group_name, map.request_type()),
        }
    }

    /// Ensures the stream, group and consumer exist for every handler.
    ///
    /// Safe to call repeatedly and concurrently; a group created by another
    /// caller in the meantime is not an error.
    pub async fn register_consumer(&self, maps: &[ServiceMap]) -> HeraldResult<BTreeSet<StreamKey>> {
        let keys: BTreeSet<StreamKey> = maps.iter().map(|map| self.stream_key_for(map)).collect();
        let group = self.config.group_name.as_str();
        let consumer = self.config.machine_name.as_str();
        let start = if self.config.group_newest_id || self.config.consumer_newest_id {
            GroupStart::Newest
        } else {
            GroupStart::Beginning
        };

        for key in &keys {
            let key_str = key.as_str();
            let has_group = self
                .timed("exists", key_str, self.broker.exists(key_str))
                .await?
                && self
                    .timed("list_groups", key_str, self.broker.list_groups(key_str))
                    .await?
                    .iter()
                    .any(|info| info.name == group);

            if !has_group {
                match self
                    .timed("create_group", key_str, self.broker.create_group(key_str, group, start, true))
                    .await
                {
                    Ok(()) => {
                        tracing::debug!(stream_key = %key, group_name = group, "consumer group created");
                    }
                    Err(BrokerError::GroupExists { .. }) => {}
                    Err(err) => return Err(err.into()),
                }
            }

            let has_consumer = self
                .timed("list_consumers", key_str, self.broker.list_consumers(key_str, group))
                .await?
                .iter()
                .any(|info| info.name == consumer);
            if !has_consumer {
                self.timed(
                    "create_consumer",
                    key_str,
                    self.broker.create_consumer(key_str, group, consumer),
                )
                .await?;
            }
        }

        tracing::info!(
            group_name = group,
            machine_name = consumer,
            streams = keys.len(),
            "consumer registered"
        );
        Ok(keys)
    }

    /// Appends an envelope to a stream and notifies listeners.
    pub async fn publish(&self, key: &StreamKey, message: &Message) -> HeraldResult<StreamId> {
        let data = message.encode()?;
        let timestamp = chrono::Utc::now().timestamp_millis();
        let fields = StreamRecord::fields(key.as_str(), timestamp, data);

        let id = self
            .timed(
                "append",
                key.as_str(),
                self.broker.append(key.as_str(), fields, self.config.stream_max_size),
            )
            .await?;

        let channel = self.channel();
        self.timed(
            "publish",
            key.as_str(),
            self.broker.publish(channel.as_str(), key.as_str()),
        )
        .await?;

        tracing::debug!(stream_key = %key, stream_id = %id, service_type = %message.service_type, "message published");
        Ok(id)
    }

    /// Publishes a fresh request to its type's stream.
    pub async fn publish_request<R: Request>(
        &self,
        request: &R,
        respond: bool,
        ctx: &RequestContext,
    ) -> HeraldResult<StreamId> {
        let message = Message::request(
            request,
            respond,
            ctx,
            &self.config.group_name,
            &self.config.machine_name,
        )?;
        self.publish(&self.request_key(R::type_identity()), &message).await
    }

    /// Subscribes to the notification channel, forwarding notifications for
    /// `keys` to `on_notify`. Replaces any previous subscription.
    pub async fn subscribe_notifications<F>(&self, keys: BTreeSet<StreamKey>, on_notify: F) -> HeraldResult<()>
    where
        F: Fn(StreamKey) + Send + Sync + 'static,
    {
        self.unsubscribe();

        let channel = self.channel();
        let mut notifications = self
            .timed("subscribe", channel.as_str(), self.broker.subscribe(channel.as_str()))
            .await?;

        let handle = tokio::spawn(async move {
            while let Some(payload) = notifications.recv().await {
                let key = StreamKey::from_normalized(payload);
                if keys.contains(&key) {
                    on_notify(key);
                }
            }
        });

        if let Some(previous) = self.subscription.lock().replace(handle) {
            previous.abort();
        }
        tracing::debug!(channel = %channel, "subscribed to notifications");
        Ok(())
    }

    /// Drops the notification subscription, if any.
    pub fn unsubscribe(&self) {
        if let Some(handle) = self.subscription.lock().take() {
            handle.abort();
        }
    }

    async fn timed<T>(&self, command: &'static str, key: &str, fut: impl Future<Output = T>) -> T {
        let started = Instant::now();
        let result = fut.await;
        let elapsed = started.elapsed();
        if elapsed > self.config.slow_command() {
            tracing::warn!(
                command,
                stream_key = key,
                duration_ms = elapsed.as_millis() as u64,
                "slow broker command"
            );
        }
        result
    }
}

impl Drop for Queuing {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Queuing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queuing")
            .field("group_name", &self.config.group_name)
            .field("machine_name", &self.config.machine_name)
            .field("subscribed", &self.subscription.lock().is_some())
            .finish_non_exhaustive()
    }
}
