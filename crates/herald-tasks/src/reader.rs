//! The primary read loop.

use crate::error::{WorkerError, WorkerResult};
use crate::locker::KeyCountLocker;
use crate::processor::EntryProcessor;
use herald_queue::StreamKey;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Drains streams when their notification arrives.
///
/// Each notification starts a drain loop for its key unless the key is
/// already at the worker task limit, in which case the notification is
/// dropped: the running loop reads until the stream is empty anyway.
///
/// Drain loops are tracked, and [`run`](Self::run) only returns once every
/// loop it started has finished its current entry.
#[derive(Debug)]
pub struct ConsumerReader {
    processor: Arc<EntryProcessor>,
    locker: KeyCountLocker,
    drains: TaskTracker,
}

impl ConsumerReader {
    /// Creates a reader.
    pub fn new(processor: Arc<EntryProcessor>, locker: KeyCountLocker) -> Self {
        Self {
            processor,
            locker,
            drains: TaskTracker::new(),
        }
    }

    /// Number of drain loops still running.
    pub fn active_drains(&self) -> usize {
        self.drains.len()
    }

    /// The per-key drain counter.
    pub fn locker(&self) -> &KeyCountLocker {
        &self.locker
    }

    /// Subscribes to notifications for `keys` and drains on demand until
    /// cancelled or a drain loop fails.
    ///
    /// Every key is drained once on start so entries published while no
    /// consumer was listening are picked up. On exit the remaining drain
    /// loops are cancelled and awaited.
    pub async fn run(self: &Arc<Self>, keys: Arc<BTreeSet<StreamKey>>, cancel: &CancellationToken) -> WorkerResult<()> {
        let queuing = self.processor.queuing();
        let (failures_tx, mut failures_rx) = mpsc::unbounded_channel();
        let scope = cancel.child_token();
        self.drains.reopen();

        let reader = Arc::clone(self);
        let notify_scope = scope.clone();
        let failures = failures_tx.clone();
        queuing
            .subscribe_notifications((*keys).clone(), move |key| {
                reader.notify(key, &notify_scope, &failures);
            })
            .await?;

        for key in keys.iter() {
            self.notify(key.clone(), &scope, &failures_tx);
        }

        let result = tokio::select! {
            () = cancel.cancelled() => Ok(()),
            Some(err) = failures_rx.recv() => Err(err),
        };

        scope.cancel();
        queuing.unsubscribe();
        self.drains.close();
        self.drains.wait().await;
        tracing::debug!("drain loops stopped");
        result
    }

    /// Starts a drain loop for `key` if a permit is available.
    ///
    /// Returns `false` when the notification was dropped. Drain failures
    /// are sent to `failures`.
    pub fn notify(
        self: &Arc<Self>,
        key: StreamKey,
        cancel: &CancellationToken,
        failures: &mpsc::UnboundedSender<WorkerError>,
    ) -> bool {
        if cancel.is_cancelled() {
            return false;
        }
        let Some(permit) = self.locker.try_acquire(&key) else {
            tracing::warn!(stream_key = %key, limit = self.locker.limit(), "worker task limit exceeded");
            self.processor.stats().record_dropped_notification();
            return false;
        };

        let reader = Arc::clone(self);
        let cancel = cancel.clone();
        let failures = failures.clone();
        self.drains.spawn(async move {
            let _permit = permit;
            if let Err(err) = reader.drain(&key, &cancel).await {
                tracing::error!(stream_key = %key, error = %err, "stream drain failed");
                let _ = failures.send(err);
            }
        });
        true
    }

    /// Reads and processes batches from `key` until the stream has no new
    /// entries for this group. Returns the number of entries processed.
    pub async fn drain(&self, key: &StreamKey, cancel: &CancellationToken) -> WorkerResult<usize> {
        let queuing = self.processor.queuing();
        let config = queuing.config();
        let mut processed = 0;

        while !cancel.is_cancelled() {
            let entries = tokio::select! {
                () = cancel.cancelled() => break,
                entries = queuing.broker().read_group(
                    key.as_str(),
                    &config.group_name,
                    &config.machine_name,
                    config.stream_batch_size,
                ) => entries?,
            };
            if entries.is_empty() {
                break;
            }
            tracing::debug!(stream_key = %key, count = entries.len(), "read batch");

            for entry in &entries {
                // unprocessed entries stay pending for the sweeper
                if cancel.is_cancelled() {
                    break;
                }
                self.processor.process(key, entry, cancel).await?;
                processed += 1;
            }
        }
        Ok(processed)
    }
}
