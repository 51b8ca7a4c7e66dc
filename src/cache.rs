//! Time-bounded key/value cache
//!
//! Entries expire `ttl` after insertion. Expired entries are never returned
//! and are purged by a background sweeper task so that caches keyed by
//! short-lived PIDs do not grow without bound.
//!
//! The sweeper holds a tokio timer; call [`TtlCache::close`] on shutdown to
//! release it (dropping the cache does the same).

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tracing::debug;

/// Upper bound for the interval between two sweeps.
const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Longer TTLs are clamped so expiry instants stay representable.
const MAX_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

type Entries<K, V> = Arc<Mutex<HashMap<K, Entry<V>>>>;

/// A concurrency-safe cache whose entries expire after a fixed duration.
pub struct TtlCache<K, V> {
    name: &'static str,
    ttl: Duration,
    entries: Entries<K, V>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Send + 'static,
    V: Clone + Send + 'static,
{
    /// Create a cache and start its sweeper.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(name: &'static str, ttl: Duration) -> Self {
        let ttl = ttl.min(MAX_TTL);
        let entries: Entries<K, V> = Arc::new(Mutex::new(HashMap::new()));
        let interval = ttl.min(MAX_SWEEP_INTERVAL).max(Duration::from_millis(10));

        let sweep_entries = Arc::clone(&entries);
        let sweeper = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let now = Instant::now();
                let mut map = lock(&sweep_entries);
                let before = map.len();
                map.retain(|_, entry| entry.expires_at > now);
                let purged = before - map.len();
                if purged > 0 {
                    debug!(cache = name, purged, "Purged expired cache entries");
                }
            }
        });

        Self {
            name,
            ttl,
            entries,
            sweeper: Mutex::new(Some(sweeper)),
        }
    }

    /// Expiry applied to new entries.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Look up a live entry.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut map = lock(&self.entries);
        match map.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            Some(_) => {
                map.remove(key);
                None
            }
            None => None,
        }
    }

    /// Insert or replace an entry, restarting its expiry.
    pub fn insert(&self, key: K, value: V) {
        let entry = Entry {
            value,
            expires_at: Instant::now() + self.ttl,
        };
        lock(&self.entries).insert(key, entry);
    }

    /// Remove an entry, returning its value if it was still live.
    pub fn remove(&self, key: &K) -> Option<V> {
        lock(&self.entries)
            .remove(key)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.value)
    }

    /// Number of stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop the sweeper and drop all entries. Safe to call repeatedly.
    pub fn close(&self) {
        let handle = self
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
            debug!(cache = self.name, "Stopped cache sweeper");
        }
        lock(&self.entries).clear();
    }

    /// Whether the sweeper is still running.
    pub fn is_closed(&self) -> bool {
        self.sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

impl<K, V> Drop for TtlCache<K, V> {
    fn drop(&mut self) {
        if let Some(handle) = self
            .sweeper
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}

fn lock<K, V>(entries: &Entries<K, V>) -> MutexGuard<'_, HashMap<K, Entry<V>>> {
    entries.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_and_get() {
        let cache: TtlCache<u32, String> = TtlCache::new("test", Duration::from_secs(60));
        cache.insert(1, "abc".to_string());

        assert_eq!(cache.get(&1).as_deref(), Some("abc"));
        assert_eq!(cache.get(&2), None);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_entries_expire() {
        let cache: TtlCache<String, String> = TtlCache::new("test", Duration::from_millis(30));
        cache.insert("0".to_string(), "read".to_string());

        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(cache.get(&"0".to_string()), None);
    }

    #[tokio::test]
    async fn test_sweeper_purges_expired_entries() {
        let cache: TtlCache<u32, u32> = TtlCache::new("test", Duration::from_millis(20));
        for pid in 0..10 {
            cache.insert(pid, pid);
        }

        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_huge_ttl_is_clamped() {
        let cache: TtlCache<u32, u32> = TtlCache::new("test", Duration::from_secs(u64::MAX));
        assert_eq!(cache.ttl(), MAX_TTL);

        cache.insert(1, 1);
        assert_eq!(cache.get(&1), Some(1));
    }

    #[tokio::test]
    async fn test_remove() {
        let cache: TtlCache<u32, u32> = TtlCache::new("test", Duration::from_secs(60));
        cache.insert(7, 42);

        assert_eq!(cache.remove(&7), Some(42));
        assert_eq!(cache.remove(&7), None);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let cache: TtlCache<u32, u32> = TtlCache::new("test", Duration::from_secs(60));
        cache.insert(1, 1);

        cache.close();
        cache.close();

        assert!(cache.is_closed());
        assert!(cache.is_empty());
    }
}
