//! Per-key concurrency limiting.

use dashmap::DashMap;
use herald_queue::StreamKey;
use std::sync::Arc;

/// Counts active drain loops per stream key.
///
/// A permit is handed out while the count for its key is below the limit
/// and returned when the [`KeyPermit`] is dropped, on every exit path.
///
/// # Example
///
/// ```rust
/// use herald_queue::StreamKey;
/// use herald_tasks::KeyCountLocker;
///
/// let locker = KeyCountLocker::new(1);
/// let key = StreamKey::from_normalized("evt:ping");
///
/// let permit = locker.try_acquire(&key).unwrap();
/// assert!(locker.try_acquire(&key).is_none());
///
/// drop(permit);
/// assert_eq!(locker.count(&key), 0);
/// assert!(locker.try_acquire(&key).is_some());
/// ```
#[derive(Debug, Clone)]
pub struct KeyCountLocker {
    counts: Arc<DashMap<StreamKey, usize>>,
    limit: usize,
}

impl KeyCountLocker {
    /// Creates a locker allowing `limit` permits per key.
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            counts: Arc::new(DashMap::new()),
            limit: limit.max(1),
        }
    }

    /// The per-key limit.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Acquires a permit for `key` unless it is at the limit.
    #[must_use]
    pub fn try_acquire(&self, key: &StreamKey) -> Option<KeyPermit> {
        let mut count = self.counts.entry(key.clone()).or_insert(0);
        if *count >= self.limit {
            return None;
        }
        *count += 1;
        Some(KeyPermit {
            counts: Arc::clone(&self.counts),
            key: key.clone(),
        })
    }

    /// Number of permits currently held for `key`.
    pub fn count(&self, key: &StreamKey) -> usize {
        self.counts.get(key).map_or(0, |count| *count)
    }
}

/// A held slot for one drain loop on a key.
#[derive(Debug)]
pub struct KeyPermit {
    counts: Arc<DashMap<StreamKey, usize>>,
    key: StreamKey,
}

impl KeyPermit {
    /// The key this permit was acquired for.
    pub fn key(&self) -> &StreamKey {
        &self.key
    }
}

impl Drop for KeyPermit {
    fn drop(&mut self) {
        if let Some(mut count) = self.counts.get_mut(&self.key) {
            *count = count.saturating_sub(1);
        }
        self.counts.remove_if(&self.key, |_, count| *count == 0);
    }
}
