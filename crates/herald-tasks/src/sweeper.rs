//! Reclamation of idle pending entries.

use crate::error::WorkerResult;
use crate::processor::EntryProcessor;
use futures_util::future::try_join_all;
use herald_queue::{IdBound, StreamId, StreamKey};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Claims entries left pending by slow or dead consumers and processes
/// them, then evicts consumers idle beyond the stream idle time that no
/// longer own pending entries.
#[derive(Debug)]
pub struct PendingSweeper {
    processor: Arc<EntryProcessor>,
    sweeping: AtomicBool,
}

struct SweepGuard<'a>(&'a AtomicBool);

impl<'a> SweepGuard<'a> {
    fn try_new(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for SweepGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl PendingSweeper {
    /// Creates a sweeper.
    pub fn new(processor: Arc<EntryProcessor>) -> Self {
        Self {
            processor,
            sweeping: AtomicBool::new(false),
        }
    }

    /// Returns `true` while a sweep is in progress.
    pub fn is_sweeping(&self) -> bool {
        self.sweeping.load(Ordering::Acquire)
    }

    /// Sweeps `keys` every `stream_idle_ms` until cancelled.
    pub async fn run(&self, keys: &BTreeSet<StreamKey>, cancel: &CancellationToken) -> WorkerResult<()> {
        let period = self.processor.queuing().config().stream_idle();
        loop {
            tokio::select! {
                () = cancel.cancelled() => return Ok(()),
                () = tokio::time::sleep(period) => {}
            }
            self.sweep(keys, cancel).await?;
        }
    }

    /// Runs one sweep over `keys`, returning the number of entries
    /// reclaimed. Does nothing if another sweep is running.
    pub async fn sweep(&self, keys: &BTreeSet<StreamKey>, cancel: &CancellationToken) -> WorkerResult<usize> {
        let Some(_guard) = SweepGuard::try_new(&self.sweeping) else {
            tracing::debug!("pending sweep already running");
            return Ok(0);
        };
        let claimed = try_join_all(keys.iter().map(|key| self.sweep_key(key, cancel))).await?;
        Ok(claimed.into_iter().sum())
    }

    async fn sweep_key(&self, key: &StreamKey, cancel: &CancellationToken) -> WorkerResult<usize> {
        let queuing = self.processor.queuing();
        let config = queuing.config();
        let broker = queuing.broker();
        let idle = config.stream_idle();
        let mut cursor = IdBound::Min;
        let mut reclaimed = 0;

        while !cancel.is_cancelled() {
            let page = broker
                .pending(
                    key.as_str(),
                    &config.group_name,
                    cursor,
                    IdBound::Max,
                    config.stream_batch_size,
                )
                .await?;
            let Some(last) = page.last() else {
                break;
            };
            cursor = IdBound::Exclusive(last.id);

            let ids: Vec<StreamId> = page
                .iter()
                .filter(|pending| pending.idle > idle)
                .map(|pending| pending.id)
                .collect();
            if ids.is_empty() {
                break;
            }

            let entries = broker
                .claim(key.as_str(), &config.group_name, &config.machine_name, idle, &ids)
                .await?;
            if entries.is_empty() {
                continue;
            }
            self.processor.stats().record_claimed(entries.len());
            tracing::info!(stream_key = %key, count = entries.len(), "reclaimed idle entries");

            for entry in &entries {
                if cancel.is_cancelled() {
                    break;
                }
                self.processor.process(key, entry, cancel).await?;
                reclaimed += 1;
            }
        }

        self.evict_idle_consumers(key).await?;
        Ok(reclaimed)
    }

    async fn evict_idle_consumers(&self, key: &StreamKey) -> WorkerResult<()> {
        let queuing = self.processor.queuing();
        let config = queuing.config();
        let broker = queuing.broker();
        let idle = config.stream_idle();

        let consumers = broker.list_consumers(key.as_str(), &config.group_name).await?;
        for consumer in consumers
            .iter()
            .filter(|consumer| consumer.name != config.machine_name && consumer.idle > idle)
        {
            // deleting drops its pending entries; wait until they are reclaimed
            if consumer.pending > 0 {
                tracing::debug!(
                    stream_key = %key,
                    consumer = %consumer.name,
                    pending = consumer.pending,
                    "idle consumer still owns pending entries"
                );
                continue;
            }
            let dropped = broker
                .delete_consumer(key.as_str(), &config.group_name, &consumer.name)
                .await?;
            self.processor.stats().record_evicted_consumer();
            tracing::info!(
                stream_key = %key,
                consumer = %consumer.name,
                pending = dropped,
                "evicted idle consumer"
            );
        }
        Ok(())
    }
}
