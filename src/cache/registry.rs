//! One cache per analysis payload kind, constructed from configuration.

use super::content::{CacheConfig, CacheStats, ContentCache};
use super::key::CacheKey;
use crate::Result;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Payload families cached for the analyzers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheKind {
    ParseTree,
    Patterns,
    Smells,
    Signatures,
}

impl CacheKind {
    pub const ALL: [CacheKind; 4] = [
        CacheKind::ParseTree,
        CacheKind::Patterns,
        CacheKind::Smells,
        CacheKind::Signatures,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            CacheKind::ParseTree => "parse_tree",
            CacheKind::Patterns => "patterns",
            CacheKind::Smells => "smells",
            CacheKind::Signatures => "signatures",
        }
    }
}

impl fmt::Display for CacheKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub type JsonCache = ContentCache<Arc<serde_json::Value>>;

/// Explicitly constructed set of caches, passed by reference to collaborators.
///
/// Payloads are stored as JSON so any analyzer type that round-trips through
/// serde can be cached without the registry knowing its shape.
pub struct CacheRegistry {
    caches: HashMap<CacheKind, Arc<JsonCache>>,
    decode_errors: AtomicU64,
}

impl CacheRegistry {
    /// Every kind shares `base`, renamed per kind.
    pub fn new(base: CacheConfig) -> Self {
        Self::with_overrides(base, &HashMap::new())
    }

    /// Kinds listed in `overrides` use their own config; the rest use `base`.
    pub fn with_overrides(base: CacheConfig, overrides: &HashMap<CacheKind, CacheConfig>) -> Self {
        let caches = CacheKind::ALL
            .iter()
            .map(|kind| {
                let config = overrides
                    .get(kind)
                    .cloned()
                    .unwrap_or_else(|| base.clone())
                    .with_name(kind.name());
                (*kind, Arc::new(ContentCache::new(config)))
            })
            .collect();
        Self {
            caches,
            decode_errors: AtomicU64::new(0),
        }
    }

    pub fn cache(&self, kind: CacheKind) -> &Arc<JsonCache> {
        // Every kind is populated at construction.
        &self.caches[&kind]
    }

    pub fn get<T: DeserializeOwned>(&self, kind: CacheKind, key: &CacheKey) -> Option<T> {
        let cache = self.cache(kind);
        let value = cache.get_key(key)?;
        match T::deserialize(value.as_ref()) {
            Ok(v) => Some(v),
            Err(e) => {
                self.decode_errors.fetch_add(1, Ordering::Relaxed);
                warn!(kind = %kind, id = %key.logical_id, error = %e, "cached payload did not decode; dropping");
                cache.invalidate(&key.logical_id);
                None
            }
        }
    }

    pub fn put<T: Serialize>(&self, kind: CacheKind, key: &CacheKey, value: &T) -> Result<()> {
        let json = serde_json::to_value(value)?;
        self.cache(kind).put_key(key, Arc::new(json));
        Ok(())
    }

    pub fn invalidate(&self, kind: CacheKind, logical_id: &str) -> bool {
        self.cache(kind).invalidate(logical_id)
    }

    /// Drop `logical_id` from every kind, e.g. when a file changed on disk.
    pub fn invalidate_everywhere(&self, logical_id: &str) -> usize {
        CacheKind::ALL
            .iter()
            .filter(|kind| self.invalidate(**kind, logical_id))
            .count()
    }

    pub fn sweep_all(&self) -> usize {
        self.caches.values().map(|c| c.sweep()).sum()
    }

    pub fn stats(&self) -> HashMap<CacheKind, CacheStats> {
        self.caches.iter().map(|(k, c)| (*k, c.stats())).collect()
    }

    pub fn decode_errors(&self) -> u64 {
        self.decode_errors.load(Ordering::Relaxed)
    }
}

impl Default for CacheRegistry {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}
