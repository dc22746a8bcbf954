// Credentials last fetched for each subject. Freshness is only a hint: a stale
// entry is still handed out when the backend cannot be reached.
use super::Credentials;
use crate::metrics_defs::{CREDENTIALS_CACHE_HIT, CREDENTIALS_CACHE_MISS, CREDENTIALS_CACHE_SIZE};
use shared::{counter, gauge};
use shared::timed_cache::TimedCache;

pub struct CredentialCache {
    entries: TimedCache<Credentials>,
}

impl CredentialCache {
    pub fn new(max_entries: usize) -> Self {
        CredentialCache {
            entries: TimedCache::new(max_entries),
        }
    }

    /// Returns the subject's credentials if they were fetched less than `ttl_ms` ago.
    pub fn get(&self, subject_id: &str, ttl_ms: u64, now_ms: u64) -> Option<Credentials> {
        let hit = self.entries.get_fresh(subject_id, ttl_ms, now_ms);
        let metric_def = if hit.is_some() {
            CREDENTIALS_CACHE_HIT
        } else {
            CREDENTIALS_CACHE_MISS
        };
        counter!(metric_def).increment(1);
        hit
    }

    /// Returns the subject's credentials however old they are.
    pub fn get_stale(&self, subject_id: &str) -> Option<Credentials> {
        self.entries.get_any(subject_id)
    }

    pub fn put(&self, subject_id: &str, credentials: Credentials, now_ms: u64) {
        self.entries.insert(subject_id, credentials, now_ms);
        gauge!(CREDENTIALS_CACHE_SIZE).set(self.entries.len() as f64);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
