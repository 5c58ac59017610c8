//! Behavioral laws of the content cache: LRU survival, TTL, fingerprints.

use analysis_cache::cache::{
    spawn_sweeper, CacheConfig, CacheKey, CacheKind, CacheRegistry, ContentCache, Fingerprint,
    Lookup, StaleReason,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

fn fp(s: &str) -> Fingerprint {
    Fingerprint::of(s.as_bytes())
}

#[test]
fn test_capacity_two_promotion_scenario() {
    let cache: ContentCache<&str> = ContentCache::with_capacity(2);
    cache.put("A", fp("a"), "alpha");
    cache.put("B", fp("b"), "beta");
    assert_eq!(cache.get("A", &fp("a")), Some("alpha"));
    cache.put("C", fp("c"), "gamma");

    assert_eq!(cache.get("B", &fp("b")), None);
    assert_eq!(cache.get("A", &fp("a")), Some("alpha"));
    assert_eq!(cache.get("C", &fp("c")), Some("gamma"));
    assert_eq!(cache.stats().evictions, 1);
}

#[test]
fn test_survivors_are_most_recently_accessed() {
    let capacity = 5;
    let cache: ContentCache<usize> = ContentCache::with_capacity(capacity);
    for i in 0..20 {
        cache.put(format!("k{}", i), fp("v"), i);
        // Touch an old key now and then so recency differs from insertion order.
        if i % 4 == 3 {
            let _ = cache.get("k0", &fp("v"));
        }
    }
    assert_eq!(cache.len(), capacity);
    // k0 was touched at i=19 (after k19's insert) and stays; k16..k19 fill the rest.
    for id in ["k0", "k16", "k17", "k18", "k19"] {
        assert!(cache.contains(id, &fp("v")), "{} should survive", id);
    }
    assert!(!cache.contains("k15", &fp("v")));
}

#[test]
fn test_fingerprint_change_behaves_like_invalidate_then_insert() {
    let overwritten: ContentCache<&str> = ContentCache::with_capacity(4);
    overwritten.put("src/lib.rs", fp("v1"), "old");
    overwritten.put("src/lib.rs", fp("v2"), "new");

    let replaced: ContentCache<&str> = ContentCache::with_capacity(4);
    replaced.put("src/lib.rs", fp("v1"), "old");
    replaced.invalidate("src/lib.rs");
    replaced.put("src/lib.rs", fp("v2"), "new");

    for cache in [&overwritten, &replaced] {
        assert_eq!(cache.get("src/lib.rs", &fp("v1")), None);
        assert_eq!(cache.len(), 0);
    }
    overwritten.put("src/lib.rs", fp("v2"), "new");
    replaced.put("src/lib.rs", fp("v2"), "new");
    assert_eq!(
        overwritten.get("src/lib.rs", &fp("v2")),
        replaced.get("src/lib.rs", &fp("v2"))
    );
}

#[test]
fn test_mismatched_fingerprint_is_stale_not_error() {
    let cache: ContentCache<u32> = ContentCache::with_capacity(4);
    let key = CacheKey::for_content("src/parse.rs", "fn parse() {}");
    cache.put_key(&key, 7);

    let edited = CacheKey::for_content("src/parse.rs", "fn parse() { todo() }");
    assert_eq!(
        cache.lookup(&edited.logical_id, &edited.fingerprint),
        Lookup::Stale(StaleReason::FingerprintMismatch)
    );
    assert!(matches!(cache.lookup(&key.logical_id, &key.fingerprint), Lookup::Miss));
}

#[test]
fn test_entry_expires_without_sweep() {
    let cache: ContentCache<u32> = ContentCache::new(CacheConfig::new().with_capacity(4));
    cache.put_with_ttl("short", fp("x"), 1, Duration::from_millis(30));
    cache.put_with_ttl("long", fp("x"), 2, Duration::from_secs(60));
    assert_eq!(cache.get("short", &fp("x")), Some(1));

    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(cache.get("short", &fp("x")), None);
    assert_eq!(cache.get("long", &fp("x")), Some(2));
    assert_eq!(cache.stats().expirations, 1);
}

#[tokio::test]
async fn test_background_sweeper_reclaims_expired_entries() {
    let cache: Arc<ContentCache<u32>> = Arc::new(ContentCache::new(
        CacheConfig::new().with_ttl(Duration::from_millis(20)),
    ));
    for i in 0..10 {
        cache.put(format!("f{}", i), fp("x"), i);
    }
    let sweeper = spawn_sweeper(&cache, Duration::from_millis(10));
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert_eq!(cache.len(), 0);
    sweeper.stop().await;
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Smell {
    name: String,
    line: u32,
}

#[test]
fn test_registry_keeps_kinds_isolated() {
    let registry = CacheRegistry::new(CacheConfig::new().with_capacity(16));
    let key = CacheKey::symbol("src/db.rs", "open", "fn open() {}");
    let smells = vec![Smell {
        name: "long parameter list".into(),
        line: 12,
    }];
    registry.put(CacheKind::Smells, &key, &smells).unwrap();

    assert_eq!(registry.get::<Vec<Smell>>(CacheKind::Smells, &key), Some(smells));
    assert_eq!(registry.get::<Vec<Smell>>(CacheKind::Patterns, &key), None);
    assert_eq!(registry.stats()[&CacheKind::Smells].size, 1);
}

#[test]
fn test_concurrent_writers_leave_one_consistent_value() {
    let cache: Arc<ContentCache<(u32, u32)>> = Arc::new(ContentCache::with_capacity(8));
    let handles: Vec<_> = (0..8u32)
        .map(|t| {
            let cache = Arc::clone(&cache);
            std::thread::spawn(move || {
                for _ in 0..200 {
                    cache.put("shared", fp("x"), (t, t * 10));
                    if let Some((a, b)) = cache.get("shared", &fp("x")) {
                        assert_eq!(b, a * 10);
                    }
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    let (a, b) = cache.get("shared", &fp("x")).unwrap();
    assert_eq!(b, a * 10);
    assert_eq!(cache.len(), 1);
}
