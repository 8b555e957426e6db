//! Runner statistics.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared by the read loop and the pending sweeper.
#[derive(Debug, Default)]
pub struct RunnerStats {
    /// Entries fed through the dispatcher.
    pub processed: AtomicU64,
    /// Entries whose decoding or handler failed.
    pub failed: AtomicU64,
    /// Replies published.
    pub replied: AtomicU64,
    /// Entries acknowledged.
    pub acked: AtomicU64,
    /// Entries reclaimed from idle consumers.
    pub claimed: AtomicU64,
    /// Notifications dropped at the worker task limit.
    pub dropped_notifications: AtomicU64,
    /// Idle consumers removed from their group.
    pub evicted_consumers: AtomicU64,
}

impl RunnerStats {
    /// Create new empty stats.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a dispatched entry.
    pub fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed entry.
    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a published reply.
    pub fn record_replied(&self) {
        self.replied.fetch_add(1, Ordering::Relaxed);
    }

    /// Record acknowledged entries.
    pub fn record_acked(&self, count: usize) {
        self.acked.fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Record reclaimed entries.
    pub fn record_claimed(&self, count: usize) {
        self.claimed.fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Record a dropped notification.
    pub fn record_dropped_notification(&self) {
        self.dropped_notifications.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an evicted consumer.
    pub fn record_evicted_consumer(&self) {
        self.evicted_consumers.fetch_add(1, Ordering::Relaxed);
    }

    /// Get processed count.
    pub fn total_processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Get failed count.
    pub fn total_failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Get replied count.
    pub fn total_replied(&self) -> u64 {
        self.replied.load(Ordering::Relaxed)
    }

    /// Get acked count.
    pub fn total_acked(&self) -> u64 {
        self.acked.load(Ordering::Relaxed)
    }

    /// Get claimed count.
    pub fn total_claimed(&self) -> u64 {
        self.claimed.load(Ordering::Relaxed)
    }

    /// Get dropped notification count.
    pub fn total_dropped_notifications(&self) -> u64 {
        self.dropped_notifications.load(Ordering::Relaxed)
    }

    /// Get evicted consumer count.
    pub fn total_evicted_consumers(&self) -> u64 {
        self.evicted_consumers.load(Ordering::Relaxed)
    }

    /// Get success rate (0.0 to 1.0).
    pub fn success_rate(&self) -> f64 {
        let processed = self.total_processed();
        if processed == 0 {
            1.0
        } else {
            processed.saturating_sub(self.total_failed()) as f64 / processed as f64
        }
    }
}
