//! Configuration surface: YAML file, environment overrides, validation.
//!
//! ```yaml
//! cache:
//!   ttl_secs: 3600
//!   capacity: 1000
//! caches:
//!   parse_tree:
//!     capacity: 200
//! pool:
//!   pool_size: 4
//!   acquire_timeout_ms: 5000
//! batch:
//!   max_workers: 8
//!   deadline_ms: 30000
//! retrieval:
//!   result_ttl_secs: 300
//!   default_limit: 20
//! ```

use crate::batch::BatchExecutorConfig;
use crate::cache::{CacheConfig, CacheKind, CacheRegistry};
use crate::pool::PoolConfig;
use crate::retrieval::RetrievalConfig;
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

pub const ENV_TTL_SECS: &str = "ANALYSIS_CACHE_TTL_SECS";
pub const ENV_CAPACITY: &str = "ANALYSIS_CACHE_CAPACITY";
pub const ENV_POOL_SIZE: &str = "ANALYSIS_CACHE_POOL_SIZE";
pub const ENV_ACQUIRE_TIMEOUT_MS: &str = "ANALYSIS_CACHE_ACQUIRE_TIMEOUT_MS";
pub const ENV_MAX_WORKERS: &str = "ANALYSIS_CACHE_MAX_WORKERS";
pub const ENV_BATCH_DEADLINE_MS: &str = "ANALYSIS_CACHE_BATCH_DEADLINE_MS";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub ttl_secs: u64,
    pub capacity: usize,
    pub enabled: bool,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_secs: 3600,
            capacity: 1000,
            enabled: true,
        }
    }
}

impl CacheSettings {
    pub fn with_ttl_secs(mut self, secs: u64) -> Self {
        self.ttl_secs = secs;
        self
    }
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }
    pub fn to_cache_config(&self, name: &str) -> CacheConfig {
        CacheConfig::new()
            .with_name(name)
            .with_ttl(Duration::from_secs(self.ttl_secs))
            .with_capacity(self.capacity)
            .with_enabled(self.enabled)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSettings {
    pub pool_size: usize,
    pub acquire_timeout_ms: u64,
    pub test_on_checkout: bool,
    pub eager: bool,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            pool_size: 4,
            acquire_timeout_ms: 5000,
            test_on_checkout: false,
            eager: false,
        }
    }
}

impl PoolSettings {
    pub fn with_pool_size(mut self, n: usize) -> Self {
        self.pool_size = n;
        self
    }
    pub fn with_acquire_timeout_ms(mut self, ms: u64) -> Self {
        self.acquire_timeout_ms = ms;
        self
    }
    pub fn to_pool_config(&self) -> PoolConfig {
        PoolConfig::new()
            .with_pool_size(self.pool_size)
            .with_acquire_timeout(Duration::from_millis(self.acquire_timeout_ms))
            .with_test_on_checkout(self.test_on_checkout)
            .with_eager(self.eager)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchSettings {
    pub max_workers: usize,
    pub deadline_ms: Option<u64>,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            max_workers: 4,
            deadline_ms: None,
        }
    }
}

impl BatchSettings {
    pub fn with_max_workers(mut self, n: usize) -> Self {
        self.max_workers = n;
        self
    }
    pub fn with_deadline_ms(mut self, ms: u64) -> Self {
        self.deadline_ms = Some(ms);
        self
    }
    pub fn to_executor_config(&self) -> BatchExecutorConfig {
        let config = BatchExecutorConfig::new().with_max_workers(self.max_workers);
        match self.deadline_ms {
            Some(ms) => config.with_deadline(Duration::from_millis(ms)),
            None => config,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub result_ttl_secs: u64,
    pub default_limit: usize,
    pub default_min_confidence: f64,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            result_ttl_secs: 300,
            default_limit: 20,
            default_min_confidence: 0.0,
        }
    }
}

impl RetrievalSettings {
    pub fn to_retrieval_config(&self) -> RetrievalConfig {
        RetrievalConfig::new()
            .with_result_ttl(Duration::from_secs(self.result_ttl_secs))
            .with_default_limit(self.default_limit)
            .with_default_min_confidence(self.default_min_confidence)
    }
}

/// All tunables of the core. Missing sections and fields take defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Defaults for every cache.
    pub cache: CacheSettings,
    /// Per-kind replacements for `cache`.
    pub caches: HashMap<CacheKind, CacheSettings>,
    pub pool: PoolSettings,
    pub batch: BatchSettings,
    pub retrieval: RetrievalSettings,
}

impl CoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        debug!(path = %path.as_ref().display(), "loading core configuration");
        Self::from_yaml_str(&text)
    }

    /// Defaults overlaid with `ANALYSIS_CACHE_*` variables.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Overlay `ANALYSIS_CACHE_*` variables; unparsable values are ignored.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|name| std::env::var(name).ok());
    }

    /// [`apply_env`](Self::apply_env) with a custom variable lookup.
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parsed<T: std::str::FromStr>(lookup: &dyn Fn(&str) -> Option<String>, name: &str) -> Option<T> {
            lookup(name).and_then(|s| s.trim().parse::<T>().ok())
        }
        let lookup: &dyn Fn(&str) -> Option<String> = &lookup;

        if let Some(secs) = parsed::<u64>(lookup, ENV_TTL_SECS) {
            self.cache.ttl_secs = secs;
        }
        if let Some(capacity) = parsed::<usize>(lookup, ENV_CAPACITY) {
            self.cache.capacity = capacity;
        }
        if let Some(n) = parsed::<usize>(lookup, ENV_POOL_SIZE) {
            self.pool.pool_size = n;
        }
        if let Some(ms) = parsed::<u64>(lookup, ENV_ACQUIRE_TIMEOUT_MS) {
            self.pool.acquire_timeout_ms = ms;
        }
        if let Some(n) = parsed::<usize>(lookup, ENV_MAX_WORKERS) {
            self.batch.max_workers = n;
        }
        if let Some(ms) = parsed::<u64>(lookup, ENV_BATCH_DEADLINE_MS) {
            self.batch.deadline_ms = Some(ms).filter(|ms| *ms > 0);
        }
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |field: String, msg: &str| {
            Err(Error::configuration_with_context(
                msg,
                ErrorContext::new()
                    .with_field_path(field)
                    .with_source("core_config"),
            ))
        };

        let mut caches: Vec<(String, &CacheSettings)> = vec![("cache".to_string(), &self.cache)];
        caches.extend(self.caches.iter().map(|(k, v)| (format!("caches.{}", k), v)));
        for (path, c) in caches {
            if c.capacity == 0 {
                return invalid(format!("{}.capacity", path), "capacity must be at least 1");
            }
            if c.ttl_secs == 0 {
                return invalid(format!("{}.ttl_secs", path), "ttl must be positive");
            }
        }
        if self.pool.pool_size == 0 {
            return invalid("pool.pool_size".into(), "pool_size must be at least 1");
        }
        if self.pool.acquire_timeout_ms == 0 {
            return invalid("pool.acquire_timeout_ms".into(), "acquire timeout must be positive");
        }
        if self.batch.max_workers == 0 {
            return invalid("batch.max_workers".into(), "max_workers must be at least 1");
        }
        if self.retrieval.result_ttl_secs == 0 {
            return invalid("retrieval.result_ttl_secs".into(), "result ttl must be positive");
        }
        if self.retrieval.default_limit == 0 {
            return invalid("retrieval.default_limit".into(), "default_limit must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.retrieval.default_min_confidence) {
            return invalid(
                "retrieval.default_min_confidence".into(),
                "default_min_confidence must be within [0, 1]",
            );
        }
        Ok(())
    }

    pub fn cache_config(&self, kind: CacheKind) -> CacheConfig {
        self.caches
            .get(&kind)
            .unwrap_or(&self.cache)
            .to_cache_config(kind.name())
    }

    /// One cache per kind, honoring per-kind overrides.
    pub fn build_registry(&self) -> CacheRegistry {
        let overrides: HashMap<CacheKind, CacheConfig> = self
            .caches
            .keys()
            .map(|kind| (*kind, self.cache_config(*kind)))
            .collect();
        CacheRegistry::with_overrides(self.cache.to_cache_config("content"), &overrides)
    }

    pub fn pool_config(&self) -> PoolConfig {
        self.pool.to_pool_config()
    }

    pub fn batch_config(&self) -> BatchExecutorConfig {
        self.batch.to_executor_config()
    }

    pub fn retrieval_config(&self) -> RetrievalConfig {
        self.retrieval.to_retrieval_config()
    }

    /// Result cache for the retrieval coordinator.
    pub fn retrieval_cache_config(&self) -> CacheConfig {
        self.cache
            .to_cache_config("retrieval")
            .with_ttl(Duration::from_secs(self.retrieval.result_ttl_secs))
    }
}
