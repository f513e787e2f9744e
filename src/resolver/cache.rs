// In-memory URL cache with TTL and optional capacity
//
// Expired entries are dropped lazily on lookup or insertion. When the
// capacity is reached the oldest inserted entry is evicted (FIFO, not LRU).

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Monotonic wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    start: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(PoisonError::into_inner);
        *offset += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.start + *self.offset.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    order: VecDeque<String>,
}

impl CacheInner {
    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.order.retain(|k| k != key);
        Some(entry)
    }

    fn purge_expired(&mut self, now: Instant) {
        let entries = &mut self.entries;
        self.order.retain(|key| match entries.get(key) {
            Some(entry) if entry.expires_at > now => true,
            _ => {
                entries.remove(key);
                false
            }
        });
    }
}

/// Cache statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub size: usize,
    pub capacity: Option<usize>,
}

/// Thread-safe TTL cache keyed by input URL
pub struct UrlCache {
    ttl: Duration,
    capacity: Option<usize>,
    clock: Arc<dyn Clock>,
    inner: Mutex<CacheInner>,
}

impl UrlCache {
    /// `ttl` of zero disables caching; `capacity` of `None` means unbounded
    pub fn new(ttl: Duration, capacity: Option<usize>) -> Self {
        Self::with_clock(ttl, capacity, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, capacity: Option<usize>, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            capacity: capacity.filter(|c| *c > 0),
            clock,
            inner: Mutex::new(CacheInner::default()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.ttl.is_zero()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cached value for `key` unless it has expired
    pub fn get(&self, key: &str) -> Option<String> {
        if !self.is_enabled() {
            return None;
        }
        let now = self.clock.now();
        let mut inner = self.lock();
        match inner.entries.get(key) {
            Some(entry) if entry.expires_at > now => Some(entry.value.clone()),
            Some(_) => {
                inner.remove(key);
                None
            }
            None => None,
        }
    }

    /// Store `value` for `key`, replacing any earlier entry
    pub fn insert(&self, key: impl Into<String>, value: impl Into<String>) {
        if !self.is_enabled() {
            return;
        }
        let key = key.into();
        let now = self.clock.now();
        let mut inner = self.lock();

        inner.purge_expired(now);
        inner.remove(&key);

        if let Some(capacity) = self.capacity {
            while inner.entries.len() >= capacity {
                match inner.order.pop_front() {
                    Some(oldest) => {
                        inner.entries.remove(&oldest);
                        tracing::debug!(key = %oldest, "Evicted oldest cache entry");
                    }
                    None => break,
                }
            }
        }

        inner.entries.insert(
            key.clone(),
            CacheEntry {
                value: value.into(),
                expires_at: now + self.ttl,
            },
        );
        inner.order.push_back(key);
    }

    pub fn remove(&self, key: &str) -> Option<String> {
        self.lock().remove(key).map(|entry| entry.value)
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.order.clear();
    }

    /// Number of stored entries, including ones not yet purged
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.len(),
            capacity: self.capacity,
        }
    }
}

impl std::fmt::Debug for UrlCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlCache")
            .field("ttl", &self.ttl)
            .field("capacity", &self.capacity)
            .field("size", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(ttl_secs: u64, capacity: Option<usize>) -> (UrlCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let cache = UrlCache::with_clock(Duration::from_secs(ttl_secs), capacity, clock.clone());
        (cache, clock)
    }

    #[test]
    fn test_hit_within_ttl() {
        let (cache, clock) = cache(600, None);
        cache.insert("https://vm.tiktok.com/a", "https://cdn/a.mp4");
        clock.advance(Duration::from_secs(599));
        assert_eq!(cache.get("https://vm.tiktok.com/a").as_deref(), Some("https://cdn/a.mp4"));
    }

    #[test]
    fn test_expired_entry_is_absent_and_evicted() {
        let (cache, clock) = cache(600, None);
        cache.insert("k", "v");
        clock.advance(Duration::from_secs(600));
        assert_eq!(cache.get("k"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_zero_ttl_disables_cache() {
        let (cache, _) = cache(0, None);
        assert!(!cache.is_enabled());
        cache.insert("k", "v");
        assert_eq!(cache.get("k"), None);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_capacity_evicts_oldest_inserted() {
        let (cache, _) = cache(600, Some(2));
        cache.insert("a", "1");
        cache.insert("b", "2");
        // Reading does not refresh position
        assert!(cache.get("a").is_some());
        cache.insert("c", "3");

        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b").as_deref(), Some("2"));
        assert_eq!(cache.get("c").as_deref(), Some("3"));
        assert_eq!(
            cache.stats(),
            CacheStats {
                size: 2,
                capacity: Some(2)
            }
        );
    }

    #[test]
    fn test_insert_purges_expired_before_evicting() {
        let (cache, clock) = cache(10, Some(2));
        cache.insert("old", "1");
        clock.advance(Duration::from_secs(5));
        cache.insert("fresh", "2");
        clock.advance(Duration::from_secs(6));
        cache.insert("new", "3");

        // "old" expired and was purged, so "fresh" survives
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("fresh").as_deref(), Some("2"));
        assert_eq!(cache.get("new").as_deref(), Some("3"));
    }

    #[test]
    fn test_reinsert_replaces_value_and_expiry() {
        let (cache, clock) = cache(10, None);
        cache.insert("k", "v1");
        clock.advance(Duration::from_secs(8));
        cache.insert("k", "v2");
        clock.advance(Duration::from_secs(8));
        assert_eq!(cache.get("k").as_deref(), Some("v2"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_zero_capacity_means_unbounded() {
        let (cache, _) = cache(10, Some(0));
        for i in 0..100 {
            cache.insert(format!("k{i}"), "v");
        }
        assert_eq!(cache.len(), 100);
        assert_eq!(cache.stats().capacity, None);
    }

    #[test]
    fn test_remove_and_clear() {
        let (cache, _) = cache(10, None);
        cache.insert("a", "1");
        cache.insert("b", "2");
        assert_eq!(cache.remove("a").as_deref(), Some("1"));
        assert_eq!(cache.remove("a"), None);
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_concurrent_access() {
        let cache = Arc::new(UrlCache::new(Duration::from_secs(60), Some(32)));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        let key = format!("{t}-{i}");
                        cache.insert(key.clone(), "v");
                        let _ = cache.get(&key);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(cache.len() <= 32);
    }
}
