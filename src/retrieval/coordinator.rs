//! Cache-first retrieval over a pooled backing store.

use super::fallback::FallbackChain;
use super::request::{Record, RetrievalFailure, RetrievalRequest, RetrievalResult};
use super::source::RecordSource;
use crate::batch::{BatchExecutor, BatchExecutorConfig};
use crate::cache::{spawn_sweeper, CacheConfig, CacheKey, CacheStats, ContentCache, Lookup, SweeperHandle};
use crate::config::CoreConfig;
use crate::pool::{ConnectionManager, PoolStats, ResourcePool};
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    /// Lifetime of a stored result in the result cache.
    pub result_ttl: Duration,
    pub default_limit: usize,
    pub default_min_confidence: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            result_ttl: Duration::from_secs(300),
            default_limit: 20,
            default_min_confidence: 0.0,
        }
    }
}

impl RetrievalConfig {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_result_ttl(mut self, ttl: Duration) -> Self {
        self.result_ttl = ttl;
        self
    }
    pub fn with_default_limit(mut self, limit: usize) -> Self {
        self.default_limit = limit;
        self
    }
    pub fn with_default_min_confidence(mut self, min: f64) -> Self {
        self.default_min_confidence = min;
        self
    }
}

type ResultCache = ContentCache<Arc<Vec<Record>>>;

struct Inner<M: ConnectionManager, S> {
    pool: ResourcePool<M>,
    source: Arc<S>,
    cache: Arc<ResultCache>,
    executor: BatchExecutor,
    config: RetrievalConfig,
}

/// Entry point for analyzers and orchestration code.
///
/// Every retrieval checks the result cache first and only takes a pooled
/// handle on a miss. Per-request failures come back as error results; only
/// pool exhaustion or a closed pool is returned as `Err` from [`retrieve`],
/// so callers can push back upstream.
///
/// Cloning is cheap and shares the pool, cache and source.
///
/// [`retrieve`]: RetrievalCoordinator::retrieve
pub struct RetrievalCoordinator<M: ConnectionManager, S> {
    inner: Arc<Inner<M, S>>,
}

impl<M: ConnectionManager, S> Clone for RetrievalCoordinator<M, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M, S> RetrievalCoordinator<M, S>
where
    M: ConnectionManager,
    S: RecordSource<M::Connection>,
{
    pub fn new(pool: ResourcePool<M>, source: S) -> Self {
        Self::builder(pool, source).build()
    }

    pub fn builder(pool: ResourcePool<M>, source: S) -> RetrievalCoordinatorBuilder<M, S> {
        RetrievalCoordinatorBuilder {
            pool,
            source,
            cache: None,
            batch: BatchExecutorConfig::default(),
            config: RetrievalConfig::default(),
        }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.inner.config
    }

    pub fn pool(&self) -> &ResourcePool<M> {
        &self.inner.pool
    }

    pub fn cache(&self) -> &Arc<ContentCache<Arc<Vec<Record>>>> {
        &self.inner.cache
    }

    fn prepare(&self, request: RetrievalRequest) -> RetrievalRequest {
        request.resolved(
            self.inner.config.default_limit,
            self.inner.config.default_min_confidence,
        )
    }

    /// Serve `request` from the cache, or from the store on a miss.
    pub async fn retrieve(&self, request: RetrievalRequest) -> Result<RetrievalResult> {
        let started = Instant::now();
        let request = self.prepare(request);
        if let Err(e) = request.validate() {
            debug!(domain = %request.domain, error = %e, "rejected retrieval request");
            return Ok(RetrievalResult::failed(
                request.domain,
                RetrievalFailure::from_error(&e),
                started.elapsed(),
            ));
        }

        let key = request.cache_key();
        let inner = &self.inner;
        match inner.cache.lookup(&key.logical_id, &key.fingerprint) {
            Lookup::Hit(records) => {
                debug!(domain = %request.domain, key = %key, "retrieval cache hit");
                return Ok(RetrievalResult::hit(
                    request.domain,
                    records.as_ref().clone(),
                    started.elapsed(),
                ));
            }
            Lookup::Stale(reason) => {
                debug!(domain = %request.domain, key = %key, ?reason, "retrieval cache stale")
            }
            Lookup::Miss => debug!(domain = %request.domain, key = %key, "retrieval cache miss"),
        }

        let source = Arc::clone(&inner.source);
        let query = request.clone();
        let fetched = inner
            .pool
            .execute(move |conn| source.fetch(conn, &query))
            .await;

        match fetched {
            Ok(records) => {
                let records = Arc::new(records);
                inner.cache.put_with_ttl(
                    key.logical_id,
                    key.fingerprint,
                    Arc::clone(&records),
                    inner.config.result_ttl,
                );
                Ok(RetrievalResult::stored(
                    request.domain,
                    Arc::try_unwrap(records).unwrap_or_else(|shared| shared.as_ref().clone()),
                    started.elapsed(),
                ))
            }
            Err(e) if e.is_capacity() => {
                warn!(domain = %request.domain, error = %e, "retrieval could not get a store handle");
                Err(e)
            }
            Err(e) => {
                warn!(domain = %request.domain, error = %e, "retrieval failed");
                Ok(RetrievalResult::failed(
                    request.domain,
                    RetrievalFailure::from_error(&e),
                    started.elapsed(),
                ))
            }
        }
    }

    /// Like [`retrieve`](Self::retrieve) but never fails: capacity errors
    /// become retryable error results.
    async fn retrieve_settled(&self, request: RetrievalRequest) -> RetrievalResult {
        let started = Instant::now();
        let domain = request.domain.clone();
        match self.retrieve(request).await {
            Ok(result) => result,
            Err(e) => RetrievalResult::failed(domain, RetrievalFailure::from_error(&e), started.elapsed()),
        }
    }

    /// Run `requests` concurrently; `result[i]` always answers `requests[i]`.
    pub async fn retrieve_batch(&self, requests: Vec<RetrievalRequest>) -> Vec<RetrievalResult> {
        let domains: Vec<String> = requests.iter().map(|r| r.domain.clone()).collect();
        let this = self.clone();
        let outcome = self
            .inner
            .executor
            .run(requests, move |request| {
                let this = this.clone();
                async move { Ok(this.retrieve_settled(request).await) }
            })
            .await;

        outcome
            .into_results()
            .into_iter()
            .zip(domains)
            .map(|(slot, domain)| match slot {
                Ok(result) => result,
                Err(e) => RetrievalResult::failed(
                    domain,
                    RetrievalFailure {
                        code: e.code,
                        message: e.message,
                    },
                    Duration::ZERO,
                ),
            })
            .collect()
    }

    /// The same query against each domain, concurrently. Every requested
    /// domain gets an entry; duplicates are queried once.
    pub async fn retrieve_multi_domain<I, D>(
        &self,
        template: &RetrievalRequest,
        domains: I,
    ) -> HashMap<String, RetrievalResult>
    where
        I: IntoIterator<Item = D>,
        D: Into<String>,
    {
        let mut unique: Vec<String> = Vec::new();
        for d in domains {
            let d = d.into();
            if !unique.contains(&d) {
                unique.push(d);
            }
        }
        let requests = unique.iter().map(|d| template.for_domain(d.clone())).collect();
        let results = self.retrieve_batch(requests).await;
        let failed = results.iter().filter(|r| r.is_error()).count();
        if failed > 0 {
            debug!(domains = unique.len(), failed, "multi-domain retrieval partially failed");
        }
        unique.into_iter().zip(results).collect()
    }

    /// `primary` first; `fallback` only if primary produced no records.
    /// The two never run concurrently.
    pub async fn retrieve_with_fallback(
        &self,
        primary: RetrievalRequest,
        fallback: RetrievalRequest,
    ) -> Result<RetrievalResult> {
        self.retrieve_with_fallback_chain(FallbackChain::new(primary).then(fallback))
            .await
    }

    /// Try each request in order until one yields records.
    ///
    /// If none do, the last attempt's result is returned. Capacity errors stop
    /// the chain immediately.
    pub async fn retrieve_with_fallback_chain(
        &self,
        chain: FallbackChain,
    ) -> Result<RetrievalResult> {
        let started = Instant::now();
        let mut last: Option<RetrievalResult> = None;
        for (attempt, request) in chain.into_iter().enumerate() {
            let mut result = self.retrieve(request).await?;
            result.fallback_used = attempt > 0;
            if !result.is_empty() {
                if attempt > 0 {
                    debug!(attempt, domain = %result.domain, "fallback produced records");
                }
                result.elapsed = started.elapsed();
                return Ok(result);
            }
            last = Some(result);
        }
        let mut result = last.ok_or_else(|| {
            Error::validation_with_context(
                "fallback chain is empty",
                crate::ErrorContext::new().with_source("retrieval_coordinator"),
            )
        })?;
        result.elapsed = started.elapsed();
        Ok(result)
    }

    /// Analyzer entry point: return the cached value for `key`, or run
    /// `compute` on a pooled handle, cache its output and return it.
    ///
    /// `compute` never runs on a hit. Its errors are returned and nothing is
    /// cached.
    pub async fn compute_cached<V, F>(
        &self,
        cache: &ContentCache<V>,
        key: &CacheKey,
        compute: F,
    ) -> Result<V>
    where
        V: Clone + Send + 'static,
        F: FnOnce(&mut M::Connection) -> Result<V> + Send + 'static,
    {
        if let Some(v) = cache.get_key(key) {
            return Ok(v);
        }
        let value = self.inner.pool.execute(compute).await?;
        cache.put_key(key, value.clone());
        Ok(value)
    }

    /// Drop the cached result for `request`, if any.
    pub fn invalidate(&self, request: &RetrievalRequest) -> bool {
        let key = self.prepare(request.clone()).cache_key();
        self.inner.cache.invalidate(&key.logical_id)
    }

    /// Periodically drop expired results.
    pub fn spawn_sweeper(&self, interval: Duration) -> SweeperHandle {
        spawn_sweeper(&self.inner.cache, interval)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.inner.cache.stats()
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.inner.pool.stats()
    }
}

pub struct RetrievalCoordinatorBuilder<M: ConnectionManager, S> {
    pool: ResourcePool<M>,
    source: S,
    cache: Option<Arc<ResultCache>>,
    batch: BatchExecutorConfig,
    config: RetrievalConfig,
}

impl<M, S> RetrievalCoordinatorBuilder<M, S>
where
    M: ConnectionManager,
    S: RecordSource<M::Connection>,
{
    /// Result cache built from `config`. Defaults to a cache named "retrieval".
    pub fn with_cache_config(mut self, config: CacheConfig) -> Self {
        self.cache = Some(Arc::new(ContentCache::new(config)));
        self
    }

    /// Share an existing result cache.
    pub fn with_cache(mut self, cache: Arc<ContentCache<Arc<Vec<Record>>>>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_batch_config(mut self, config: BatchExecutorConfig) -> Self {
        self.batch = config;
        self
    }

    pub fn with_config(mut self, config: RetrievalConfig) -> Self {
        self.config = config;
        self
    }

    /// Result cache, batch limits and request defaults from one loaded config.
    pub fn with_core_config(self, config: &CoreConfig) -> Self {
        self.with_cache_config(config.retrieval_cache_config())
            .with_batch_config(config.batch_config())
            .with_config(config.retrieval_config())
    }

    pub fn build(self) -> RetrievalCoordinator<M, S> {
        let cache = self.cache.unwrap_or_else(|| {
            Arc::new(ContentCache::new(
                CacheConfig::default()
                    .with_name("retrieval")
                    .with_ttl(self.config.result_ttl),
            ))
        });
        RetrievalCoordinator {
            inner: Arc::new(Inner {
                pool: self.pool,
                source: Arc::new(self.source),
                cache,
                executor: BatchExecutor::with_config(self.batch),
                config: self.config,
            }),
        }
    }
}
