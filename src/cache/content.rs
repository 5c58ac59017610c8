//! Generic TTL + capacity-bounded content cache.

use super::key::{CacheKey, Fingerprint};
use crate::Result;
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Label used in log lines and stats (e.g. "parse_tree").
    pub name: String,
    pub default_ttl: Duration,
    pub capacity: usize,
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            name: "content".to_string(),
            default_ttl: Duration::from_secs(3600),
            capacity: 1000,
            enabled: true,
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub size: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub invalidations: u64,
    pub inserts: u64,
    pub hit_rate: f64,
}

struct AtomicStats {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
    invalidations: AtomicU64,
    inserts: AtomicU64,
}

impl AtomicStats {
    fn new() -> Self {
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
            inserts: AtomicU64::new(0),
        }
    }
}

/// Why a present entry was not served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaleReason {
    Expired,
    FingerprintMismatch,
}

/// Outcome of a lookup. `Stale` is reported separately for observability but
/// callers should treat it exactly like `Miss`.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<V> {
    Hit(V),
    Miss,
    Stale(StaleReason),
}

impl<V> Lookup<V> {
    pub fn is_hit(&self) -> bool {
        matches!(self, Lookup::Hit(_))
    }
    pub fn into_option(self) -> Option<V> {
        match self {
            Lookup::Hit(v) => Some(v),
            Lookup::Miss | Lookup::Stale(_) => None,
        }
    }
}

/// Bookkeeping for one entry, as seen from outside the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    pub fingerprint: Fingerprint,
    pub created_at: Instant,
    pub last_accessed_at: Instant,
    pub access_count: u64,
    pub expires_at: Instant,
}

struct CacheEntry<V> {
    value: V,
    fingerprint: Fingerprint,
    created_at: Instant,
    last_accessed_at: Instant,
    access_count: u64,
    ttl: Duration,
}

impl<V> CacheEntry<V> {
    fn new(value: V, fingerprint: Fingerprint, ttl: Duration, now: Instant) -> Self {
        Self {
            value,
            fingerprint,
            created_at: now,
            last_accessed_at: now,
            access_count: 0,
            ttl,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) >= self.ttl
    }

    fn check(&self, fingerprint: &Fingerprint, now: Instant) -> Option<StaleReason> {
        if self.is_expired(now) {
            Some(StaleReason::Expired)
        } else if self.fingerprint != *fingerprint {
            Some(StaleReason::FingerprintMismatch)
        } else {
            None
        }
    }

    fn info(&self) -> EntryInfo {
        EntryInfo {
            fingerprint: self.fingerprint.clone(),
            created_at: self.created_at,
            last_accessed_at: self.last_accessed_at,
            access_count: self.access_count,
            expires_at: self.created_at + self.ttl,
        }
    }
}

/// Thread-safe cache keyed by (logical id, fingerprint).
///
/// One entry is kept per logical id. A lookup is served only when the stored
/// fingerprint equals the caller's current one and the TTL has not elapsed;
/// both checks happen under the same lock as the lookup. Eviction is pure
/// LRU: reads and writes both refresh recency, and hit/miss counters never
/// influence which entry goes.
///
/// Values are cloned out on a hit; wrap large payloads in `Arc`.
pub struct ContentCache<V> {
    config: CacheConfig,
    entries: Mutex<LruCache<String, CacheEntry<V>>>,
    stats: AtomicStats,
}

impl<V: Clone> ContentCache<V> {
    /// A capacity of 0 is raised to 1; `config()` and `stats()` report the
    /// bound actually in force.
    pub fn new(mut config: CacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.capacity).unwrap_or(NonZeroUsize::MIN);
        config.capacity = capacity.get();
        Self {
            config,
            entries: Mutex::new(LruCache::new(capacity)),
            stats: AtomicStats::new(),
        }
    }

    /// Cache with the default TTL and the given capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::new(CacheConfig::default().with_capacity(capacity))
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<String, CacheEntry<V>>> {
        // Every critical section leaves the map consistent, so a poisoned
        // lock still guards valid data.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the value if present, unexpired, and stored under `fingerprint`.
    pub fn get(&self, logical_id: &str, fingerprint: &Fingerprint) -> Option<V> {
        self.lookup(logical_id, fingerprint).into_option()
    }

    pub fn get_key(&self, key: &CacheKey) -> Option<V> {
        self.get(&key.logical_id, &key.fingerprint)
    }

    /// Like [`get`](Self::get) but distinguishes stale entries from absent ones.
    /// Stale entries are removed.
    pub fn lookup(&self, logical_id: &str, fingerprint: &Fingerprint) -> Lookup<V> {
        if !self.config.enabled {
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
            return Lookup::Miss;
        }
        let now = Instant::now();
        let mut entries = self.lock();

        let verdict = entries.peek(logical_id).map(|e| e.check(fingerprint, now));
        match verdict {
            None => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                Lookup::Miss
            }
            Some(Some(reason)) => {
                entries.pop(logical_id);
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                if reason == StaleReason::Expired {
                    self.stats.expirations.fetch_add(1, Ordering::Relaxed);
                }
                debug!(cache = %self.config.name, id = logical_id, ?reason, "stale entry dropped");
                Lookup::Stale(reason)
            }
            Some(None) => match entries.get_mut(logical_id) {
                Some(entry) => {
                    entry.last_accessed_at = now;
                    entry.access_count += 1;
                    self.stats.hits.fetch_add(1, Ordering::Relaxed);
                    Lookup::Hit(entry.value.clone())
                }
                None => {
                    self.stats.misses.fetch_add(1, Ordering::Relaxed);
                    Lookup::Miss
                }
            },
        }
    }

    /// Insert with the configured default TTL.
    pub fn put(&self, logical_id: impl Into<String>, fingerprint: Fingerprint, value: V) {
        self.put_with_ttl(logical_id, fingerprint, value, self.config.default_ttl);
    }

    pub fn put_key(&self, key: &CacheKey, value: V) {
        self.put(key.logical_id.clone(), key.fingerprint.clone(), value);
    }

    /// Insert or overwrite the entry for `logical_id`, whatever its previous
    /// fingerprint. At capacity the least recently used entry is evicted first.
    pub fn put_with_ttl(
        &self,
        logical_id: impl Into<String>,
        fingerprint: Fingerprint,
        value: V,
        ttl: Duration,
    ) {
        if !self.config.enabled {
            return;
        }
        let logical_id = logical_id.into();
        let entry = CacheEntry::new(value, fingerprint, ttl, Instant::now());
        let mut entries = self.lock();

        if !entries.contains(&logical_id) && entries.len() >= entries.cap().get() {
            if let Some((evicted, _)) = entries.pop_lru() {
                self.stats.evictions.fetch_add(1, Ordering::Relaxed);
                debug!(cache = %self.config.name, id = %evicted, "evicted least recently used entry");
            }
        }
        entries.put(logical_id, entry);
        self.stats.inserts.fetch_add(1, Ordering::Relaxed);
    }

    /// Return the cached value or compute, store and return a fresh one.
    pub fn get_or_insert_with<F>(&self, key: &CacheKey, compute: F) -> V
    where
        F: FnOnce() -> V,
    {
        if let Some(v) = self.get_key(key) {
            return v;
        }
        let value = compute();
        self.put_key(key, value.clone());
        value
    }

    /// Fallible variant of [`get_or_insert_with`](Self::get_or_insert_with).
    /// Errors are returned and nothing is cached.
    pub fn try_get_or_insert_with<F>(&self, key: &CacheKey, compute: F) -> Result<V>
    where
        F: FnOnce() -> Result<V>,
    {
        if let Some(v) = self.get_key(key) {
            return Ok(v);
        }
        let value = compute()?;
        self.put_key(key, value.clone());
        Ok(value)
    }

    /// Remove the entry for `logical_id` regardless of its fingerprint.
    pub fn invalidate(&self, logical_id: &str) -> bool {
        let removed = self.lock().pop(logical_id).is_some();
        if removed {
            self.stats.invalidations.fetch_add(1, Ordering::Relaxed);
            debug!(cache = %self.config.name, id = logical_id, "invalidated");
        }
        removed
    }

    /// Remove every TTL-expired entry; returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.lock();
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, e)| e.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();
        for id in &expired {
            entries.pop(id);
        }
        drop(entries);

        let removed = expired.len();
        if removed > 0 {
            self.stats
                .expirations
                .fetch_add(removed as u64, Ordering::Relaxed);
            debug!(cache = %self.config.name, removed, "sweep removed expired entries");
        }
        removed
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a fresh entry exists for the key. Does not touch recency or counters.
    pub fn contains(&self, logical_id: &str, fingerprint: &Fingerprint) -> bool {
        let now = Instant::now();
        self.lock()
            .peek(logical_id)
            .map(|e| e.check(fingerprint, now).is_none())
            .unwrap_or(false)
    }

    /// Entry bookkeeping without touching recency or counters.
    pub fn entry_info(&self, logical_id: &str) -> Option<EntryInfo> {
        self.lock().peek(logical_id).map(CacheEntry::info)
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.stats.hits.load(Ordering::Relaxed);
        let misses = self.stats.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            size: self.len(),
            capacity: self.config.capacity,
            hits,
            misses,
            evictions: self.stats.evictions.load(Ordering::Relaxed),
            expirations: self.stats.expirations.load(Ordering::Relaxed),
            invalidations: self.stats.invalidations.load(Ordering::Relaxed),
            inserts: self.stats.inserts.load(Ordering::Relaxed),
            hit_rate: if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn fp(s: &str) -> Fingerprint {
        Fingerprint::of(s)
    }

    #[test]
    fn test_put_then_get_within_ttl() {
        let cache = ContentCache::with_capacity(4);
        cache.put("a", fp("1"), 10);
        assert_eq!(cache.get("a", &fp("1")), Some(10));
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.size, 1);
    }

    #[test]
    fn test_fingerprint_mismatch_is_stale_and_removed() {
        let cache = ContentCache::with_capacity(4);
        cache.put("a", fp("old"), "tree");
        assert_eq!(
            cache.lookup("a", &fp("new")),
            Lookup::Stale(StaleReason::FingerprintMismatch)
        );
        assert!(cache.is_empty());
        assert_eq!(cache.get("a", &fp("old")), None);
    }

    #[test]
    fn test_expired_entry_not_returned_without_sweep() {
        let cache = ContentCache::with_capacity(4);
        cache.put_with_ttl("a", fp("1"), 1, Duration::from_millis(20));
        thread::sleep(Duration::from_millis(40));
        assert_eq!(cache.lookup("a", &fp("1")), Lookup::Stale(StaleReason::Expired));
        assert_eq!(cache.stats().expirations, 1);
    }

    #[test]
    fn test_capacity_two_promoted_entry_survives() {
        let cache = ContentCache::with_capacity(2);
        cache.put("A", fp("a"), 'a');
        cache.put("B", fp("b"), 'b');
        assert_eq!(cache.get("A", &fp("a")), Some('a'));
        cache.put("C", fp("c"), 'c');

        assert!(cache.contains("A", &fp("a")));
        assert!(!cache.contains("B", &fp("b")));
        assert!(cache.contains("C", &fp("c")));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_zero_capacity_reports_effective_bound() {
        let cache: ContentCache<u32> = ContentCache::with_capacity(0);
        assert_eq!(cache.config().capacity, 1);
        assert_eq!(cache.stats().capacity, 1);

        cache.put("a", fp("1"), 1);
        assert_eq!(cache.get("a", &fp("1")), Some(1));
        cache.put("b", fp("1"), 2);
        assert_eq!(cache.get("a", &fp("1")), None);
        assert_eq!(cache.get("b", &fp("1")), Some(2));
        assert_eq!(cache.stats().size, 1);
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_overwrite_same_id_does_not_evict() {
        let cache = ContentCache::with_capacity(2);
        cache.put("A", fp("a1"), 1);
        cache.put("B", fp("b"), 2);
        cache.put("A", fp("a2"), 3);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.stats().evictions, 0);
        assert_eq!(cache.get("A", &fp("a2")), Some(3));
        assert_eq!(cache.get("A", &fp("a1")), None);
    }

    #[test]
    fn test_overwrite_equivalent_to_invalidate_then_insert() {
        let overwritten = ContentCache::with_capacity(4);
        overwritten.put("f", fp("v1"), "one");
        overwritten.put("f", fp("v2"), "two");

        let reinserted = ContentCache::with_capacity(4);
        reinserted.put("f", fp("v1"), "one");
        reinserted.invalidate("f");
        reinserted.put("f", fp("v2"), "two");

        for cache in [&overwritten, &reinserted] {
            assert_eq!(cache.len(), 1);
            assert_eq!(cache.get("f", &fp("v2")), Some("two"));
        }
    }

    #[test]
    fn test_hit_updates_access_bookkeeping() {
        let cache = ContentCache::with_capacity(2);
        cache.put("a", fp("1"), ());
        let before = cache.entry_info("a").unwrap();
        assert_eq!(before.access_count, 0);
        thread::sleep(Duration::from_millis(5));
        cache.get("a", &fp("1"));
        cache.get("a", &fp("1"));
        let after = cache.entry_info("a").unwrap();
        assert_eq!(after.access_count, 2);
        assert!(after.last_accessed_at > before.last_accessed_at);
        assert_eq!(after.created_at, before.created_at);
    }

    #[test]
    fn test_sweep_counts_removed() {
        let cache = ContentCache::with_capacity(8);
        cache.put_with_ttl("short-1", fp("x"), 1, Duration::from_millis(10));
        cache.put_with_ttl("short-2", fp("x"), 2, Duration::from_millis(10));
        cache.put_with_ttl("long", fp("x"), 3, Duration::from_secs(60));
        thread::sleep(Duration::from_millis(30));
        assert_eq!(cache.sweep(), 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.sweep(), 0);
    }

    #[test]
    fn test_disabled_cache_never_stores() {
        let cache = ContentCache::new(CacheConfig::new().with_enabled(false));
        cache.put("a", fp("1"), 1);
        assert!(cache.is_empty());
        assert_eq!(cache.get("a", &fp("1")), None);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_get_or_insert_with_computes_once() {
        let cache = ContentCache::with_capacity(4);
        let key = CacheKey::for_content("sig", "fn f()");
        let mut calls = 0;
        let v1 = cache.get_or_insert_with(&key, || {
            calls += 1;
            "f()".to_string()
        });
        let v2 = cache.get_or_insert_with(&key, || {
            calls += 1;
            "other".to_string()
        });
        assert_eq!(v1, v2);
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_try_get_or_insert_with_does_not_cache_errors() {
        let cache: ContentCache<u32> = ContentCache::with_capacity(4);
        let key = CacheKey::for_content("smells", "body");
        let res = cache.try_get_or_insert_with(&key, || Err(crate::Error::store("boom")));
        assert!(res.is_err());
        assert!(cache.is_empty());
        assert_eq!(cache.try_get_or_insert_with(&key, || Ok(7)).unwrap(), 7);
    }

    #[test]
    fn test_hit_rate() {
        let cache = ContentCache::with_capacity(4);
        cache.put("a", fp("1"), 1);
        cache.get("a", &fp("1"));
        cache.get("b", &fp("1"));
        cache.get("a", &fp("1"));
        cache.get("c", &fp("1"));
        assert!((cache.stats().hit_rate - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_concurrent_writers_leave_consistent_entry() {
        use std::sync::Arc;
        let cache = Arc::new(ContentCache::with_capacity(16));
        let handles: Vec<_> = (0..8u32)
            .map(|i| {
                let c = Arc::clone(&cache);
                thread::spawn(move || {
                    for _ in 0..100 {
                        c.put("shared", Fingerprint::of(i.to_le_bytes()), i);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let info = cache.entry_info("shared").unwrap();
        let winner = (0..8u32)
            .find(|i| Fingerprint::of(i.to_le_bytes()) == info.fingerprint)
            .unwrap();
        assert_eq!(cache.get("shared", &info.fingerprint), Some(winner));
    }
}
