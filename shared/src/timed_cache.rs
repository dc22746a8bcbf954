// Passive keyed cache with lazily checked freshness. Nothing expires in the
// background: entries only age relative to the `now_ms` a reader passes in, and
// stale entries stay readable until they are overwritten, pruned or evicted.
// Capacity is bounded by moka's size-based eviction.
use moka::sync::Cache;
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the unix epoch, or 0 if the clock is before it.
pub fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[derive(Clone, Debug, PartialEq)]
pub struct CacheEntry<V> {
    pub value: V,
    pub stored_at_ms: u64,
}

impl<V> CacheEntry<V> {
    pub fn is_fresh(&self, ttl_ms: u64, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.stored_at_ms) < ttl_ms
    }
}

pub struct TimedCache<V> {
    cache: Cache<String, CacheEntry<V>>,
}

impl<V: Clone + Send + Sync + 'static> TimedCache<V> {
    pub fn new(max_entries: usize) -> Self {
        // No time_to_live: expired values must stay readable as a fallback
        let cache = Cache::builder()
            .max_capacity(max_entries.max(1) as u64)
            .build();

        TimedCache { cache }
    }

    /// Returns the value for `key` only if it was stored less than `ttl_ms` before `now_ms`.
    pub fn get_fresh(&self, key: &str, ttl_ms: u64, now_ms: u64) -> Option<V> {
        self.cache
            .get(key)
            .filter(|entry| entry.is_fresh(ttl_ms, now_ms))
            .map(|entry| entry.value)
    }

    /// Returns the value for `key` regardless of its age.
    pub fn get_any(&self, key: &str) -> Option<V> {
        self.cache.get(key).map(|entry| entry.value)
    }

    /// Overwrites the entry for `key`, recording `stored_at_ms` as its age origin.
    pub fn insert(&self, key: &str, value: V, stored_at_ms: u64) {
        self.cache.insert(
            key.to_string(),
            CacheEntry {
                value,
                stored_at_ms,
            },
        );
    }

    /// Drops every entry that is no longer fresh. Returns how many were removed.
    pub fn prune_expired(&self, ttl_ms: u64, now_ms: u64) -> usize {
        let stale: Vec<_> = self
            .cache
            .iter()
            .filter(|(_, entry)| !entry.is_fresh(ttl_ms, now_ms))
            .map(|(key, _)| key)
            .collect();

        for key in &stale {
            self.cache.invalidate(key.as_str());
        }
        stale.len()
    }

    /// Snapshot of every entry, fresh or not.
    pub fn entries(&self) -> Vec<(String, CacheEntry<V>)> {
        self.cache
            .iter()
            .map(|(key, entry)| (key.as_ref().clone(), entry))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.cache.run_pending_tasks();
        self.cache.entry_count() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
