//! Fixed-size pool of backing-store handles.

use super::manager::ConnectionManager;
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub pool_size: usize,
    pub acquire_timeout: Duration,
    /// Probe idle handles with [`ConnectionManager::is_valid`] before handing them out.
    pub test_on_checkout: bool,
    /// Open every handle at construction instead of on first demand.
    pub eager: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            pool_size: 4,
            acquire_timeout: Duration::from_secs(5),
            test_on_checkout: false,
            eager: false,
        }
    }
}

impl PoolConfig {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_pool_size(mut self, n: usize) -> Self {
        self.pool_size = n;
        self
    }
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }
    pub fn with_test_on_checkout(mut self, enabled: bool) -> Self {
        self.test_on_checkout = enabled;
        self
    }
    pub fn with_eager(mut self, eager: bool) -> Self {
        self.eager = eager;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    pub pool_size: usize,
    pub in_use: usize,
    pub idle: usize,
    /// Handles currently open, idle or checked out. Never exceeds `pool_size`.
    pub live: usize,
    pub total_acquisitions: u64,
    pub total_releases: u64,
    pub created_connections: u64,
    pub discarded_connections: u64,
    pub timeouts: u64,
}

/// Bookkeeping for one live handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub id: u64,
    pub created_at: Instant,
    pub total_acquisitions: u64,
}

struct PoolConnection<C> {
    raw: C,
    info: ConnectionInfo,
}

struct Counters {
    in_use: AtomicUsize,
    live: AtomicUsize,
    acquisitions: AtomicU64,
    releases: AtomicU64,
    created: AtomicU64,
    discarded: AtomicU64,
    timeouts: AtomicU64,
}

struct PoolInner<M: ConnectionManager> {
    manager: M,
    config: PoolConfig,
    permits: Arc<Semaphore>,
    idle: Mutex<Vec<PoolConnection<M::Connection>>>,
    closed: AtomicBool,
    next_id: AtomicU64,
    counters: Counters,
}

impl<M: ConnectionManager> PoolInner<M> {
    fn idle(&self) -> MutexGuard<'_, Vec<PoolConnection<M::Connection>>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn open(&self) -> Result<PoolConnection<M::Connection>> {
        let raw = self.manager.connect()?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.counters.created.fetch_add(1, Ordering::Relaxed);
        self.counters.live.fetch_add(1, Ordering::Relaxed);
        debug!(conn_id = id, "opened pooled connection");
        Ok(PoolConnection {
            raw,
            info: ConnectionInfo {
                id,
                created_at: Instant::now(),
                total_acquisitions: 0,
            },
        })
    }

    /// Caller holds a permit, so at most `pool_size` handles are ever live.
    fn checkout(&self) -> Result<PoolConnection<M::Connection>> {
        loop {
            let candidate = self.idle().pop();
            let mut conn = match candidate {
                Some(conn) => conn,
                None => self.open()?,
            };
            if self.config.test_on_checkout && conn.info.total_acquisitions > 0 {
                if let Err(e) = self.manager.is_valid(&mut conn.raw) {
                    warn!(conn_id = conn.info.id, error = %e, "idle connection failed validation; replacing");
                    self.discard(conn);
                    continue;
                }
            }
            conn.info.total_acquisitions += 1;
            return Ok(conn);
        }
    }

    fn discard(&self, conn: PoolConnection<M::Connection>) {
        self.counters.live.fetch_sub(1, Ordering::Relaxed);
        self.counters.discarded.fetch_add(1, Ordering::Relaxed);
        drop(conn);
    }

    /// Put back a handle that was checked out but never handed to a caller.
    fn restore(&self, conn: PoolConnection<M::Connection>) {
        let mut idle = self.idle();
        if self.closed.load(Ordering::Acquire) {
            drop(idle);
            self.discard(conn);
        } else {
            idle.push(conn);
        }
    }

    fn release(&self, conn: Option<PoolConnection<M::Connection>>, broken: bool) {
        self.counters.in_use.fetch_sub(1, Ordering::Relaxed);
        self.counters.releases.fetch_add(1, Ordering::Relaxed);

        let Some(mut conn) = conn else {
            self.counters.live.fetch_sub(1, Ordering::Relaxed);
            self.counters.discarded.fetch_add(1, Ordering::Relaxed);
            return;
        };
        if broken || self.manager.has_broken(&mut conn.raw) {
            warn!(conn_id = conn.info.id, "discarding broken connection");
            self.discard(conn);
            return;
        }
        self.restore(conn);
    }
}

/// Bounded pool of reusable handles.
///
/// Checkout is gated by a semaphore with `pool_size` permits, so waiting for a
/// free handle is a timed wait rather than a polling loop, and the number of
/// live handles never exceeds `pool_size`. Cloning shares the same pool.
pub struct ResourcePool<M: ConnectionManager> {
    inner: Arc<PoolInner<M>>,
}

impl<M: ConnectionManager> Clone for ResourcePool<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M: ConnectionManager> ResourcePool<M> {
    pub fn new(manager: M, config: PoolConfig) -> Result<Self> {
        if config.pool_size == 0 {
            return Err(Error::configuration_with_context(
                "pool_size must be at least 1",
                ErrorContext::new()
                    .with_field_path("pool.pool_size")
                    .with_source("resource_pool"),
            ));
        }
        let inner = Arc::new(PoolInner {
            permits: Arc::new(Semaphore::new(config.pool_size)),
            idle: Mutex::new(Vec::with_capacity(config.pool_size)),
            closed: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
            counters: Counters {
                in_use: AtomicUsize::new(0),
                live: AtomicUsize::new(0),
                acquisitions: AtomicU64::new(0),
                releases: AtomicU64::new(0),
                created: AtomicU64::new(0),
                discarded: AtomicU64::new(0),
                timeouts: AtomicU64::new(0),
            },
            manager,
            config,
        });

        if inner.config.eager {
            for _ in 0..inner.config.pool_size {
                let conn = inner.open()?;
                inner.idle().push(conn);
            }
        }
        info!(
            pool_size = inner.config.pool_size,
            eager = inner.config.eager,
            "resource pool created"
        );
        Ok(Self { inner })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    pub fn manager(&self) -> &M {
        &self.inner.manager
    }

    /// Acquire with the configured timeout.
    pub async fn acquire(&self) -> Result<PooledConnection<M>> {
        self.acquire_timeout(self.inner.config.acquire_timeout).await
    }

    /// Wait up to `timeout` for a free handle; `Error::PoolExhausted` afterwards.
    pub async fn acquire_timeout(&self, timeout: Duration) -> Result<PooledConnection<M>> {
        if self.is_closed() {
            return Err(Error::PoolClosed);
        }
        let started = Instant::now();
        let permit =
            match tokio::time::timeout(timeout, Arc::clone(&self.inner.permits).acquire_owned())
                .await
            {
                Ok(Ok(permit)) => permit,
                Ok(Err(_)) => return Err(Error::PoolClosed),
                Err(_) => {
                    self.inner.counters.timeouts.fetch_add(1, Ordering::Relaxed);
                    let waited = started.elapsed();
                    debug!(?waited, pool_size = self.inner.config.pool_size, "acquire timed out");
                    return Err(Error::PoolExhausted {
                        pool_size: self.inner.config.pool_size,
                        waited,
                    });
                }
            };
        self.checkout(permit).await
    }

    /// Acquire only if a handle slot is free right now; never waits on other
    /// callers. Opening a new handle still happens off the async runtime.
    pub async fn try_acquire(&self) -> Result<PooledConnection<M>> {
        match Arc::clone(&self.inner.permits).try_acquire_owned() {
            Ok(permit) => self.checkout(permit).await,
            Err(TryAcquireError::Closed) => Err(Error::PoolClosed),
            Err(TryAcquireError::NoPermits) => Err(Error::PoolExhausted {
                pool_size: self.inner.config.pool_size,
                waited: Duration::ZERO,
            }),
        }
    }

    /// Connecting and validation may block, so both run on the blocking pool.
    /// An idle handle that needs no validation is taken inline.
    async fn checkout(&self, permit: OwnedSemaphorePermit) -> Result<PooledConnection<M>> {
        let ready = if self.inner.config.test_on_checkout {
            None
        } else {
            self.inner.idle().pop().map(|mut conn| {
                conn.info.total_acquisitions += 1;
                conn
            })
        };
        let conn = match ready {
            Some(conn) => conn,
            None => {
                let inner = Arc::clone(&self.inner);
                // On error the permit drops here and the slot is free again.
                let mut reserved = tokio::task::spawn_blocking(move || {
                    let conn = inner.checkout()?;
                    Ok::<_, Error>(Reserved {
                        pool: inner,
                        conn: Some(conn),
                    })
                })
                .await
                .map_err(|e| Error::TaskFailed {
                    message: format!("pool checkout task failed: {}", e),
                })??;
                match reserved.conn.take() {
                    Some(conn) => conn,
                    None => unreachable!("reserved handle is only taken once"),
                }
            }
        };
        self.inner.counters.in_use.fetch_add(1, Ordering::Relaxed);
        self.inner
            .counters
            .acquisitions
            .fetch_add(1, Ordering::Relaxed);
        Ok(PooledConnection {
            conn: Some(conn),
            broken: false,
            pool: Arc::clone(&self.inner),
            _permit: permit,
        })
    }

    /// Acquire, run `f` on the blocking thread pool, release.
    ///
    /// The handle is released on every path. A `Error::Store` result or a
    /// panic inside `f` discards the handle instead of returning it.
    pub async fn execute<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut M::Connection) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let conn = self.acquire().await?;
        conn.run_blocking(f).await
    }

    /// Stop handing out handles and tear down idle ones. Checked-out handles
    /// are torn down when released.
    pub fn close(&self) {
        let drained = {
            let mut idle = self.inner.idle();
            if self.inner.closed.swap(true, Ordering::AcqRel) {
                return;
            }
            std::mem::take(&mut *idle)
        };
        self.inner.permits.close();
        let count = drained.len();
        for conn in drained {
            self.inner.discard(conn);
        }
        info!(closed_idle = count, "resource pool closed");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> PoolStats {
        let c = &self.inner.counters;
        PoolStats {
            pool_size: self.inner.config.pool_size,
            in_use: c.in_use.load(Ordering::Relaxed),
            idle: self.inner.idle().len(),
            live: c.live.load(Ordering::Relaxed),
            total_acquisitions: c.acquisitions.load(Ordering::Relaxed),
            total_releases: c.releases.load(Ordering::Relaxed),
            created_connections: c.created.load(Ordering::Relaxed),
            discarded_connections: c.discarded.load(Ordering::Relaxed),
            timeouts: c.timeouts.load(Ordering::Relaxed),
        }
    }
}

/// Handle opened or validated on the blocking pool. If the acquiring future
/// is dropped before it resumes, the handle goes back to the free list.
struct Reserved<M: ConnectionManager> {
    pool: Arc<PoolInner<M>>,
    conn: Option<PoolConnection<M::Connection>>,
}

impl<M: ConnectionManager> Drop for Reserved<M> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.restore(conn);
        }
    }
}

/// Exclusive checkout of one handle. Dropping it releases the handle.
pub struct PooledConnection<M: ConnectionManager> {
    conn: Option<PoolConnection<M::Connection>>,
    broken: bool,
    pool: Arc<PoolInner<M>>,
    // Declared last: the handle is back on the free list before the permit frees.
    _permit: OwnedSemaphorePermit,
}

impl<M: ConnectionManager> PooledConnection<M> {
    pub fn id(&self) -> u64 {
        self.info().id
    }

    pub fn info(&self) -> ConnectionInfo {
        match &self.conn {
            Some(c) => c.info,
            None => unreachable!("connection is only taken on drop"),
        }
    }

    /// Discard this handle on release instead of reusing it.
    pub fn mark_broken(&mut self) {
        self.broken = true;
    }

    /// Return the handle to the pool now.
    pub fn release(self) {
        drop(self);
    }

    /// Run `f` against this handle on the blocking thread pool, then release.
    pub async fn run_blocking<F, R>(mut self, f: F) -> Result<R>
    where
        F: FnOnce(&mut M::Connection) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        tokio::task::spawn_blocking(move || {
            let out = f(self.deref_mut());
            if let Err(e @ Error::Store { .. }) = &out {
                warn!(conn_id = self.id(), error = %e, "store error; connection will be replaced");
                self.broken = true;
            }
            out
        })
        .await
        .map_err(|e| Error::TaskFailed {
            message: format!("pooled query task failed: {}", e),
        })?
    }
}

impl<M: ConnectionManager> std::fmt::Debug for PooledConnection<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("info", &self.conn.as_ref().map(|c| c.info))
            .field("broken", &self.broken)
            .finish()
    }
}

impl<M: ConnectionManager> Deref for PooledConnection<M> {
    type Target = M::Connection;

    fn deref(&self) -> &Self::Target {
        match &self.conn {
            Some(c) => &c.raw,
            None => unreachable!("connection is only taken on drop"),
        }
    }
}

impl<M: ConnectionManager> DerefMut for PooledConnection<M> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match &mut self.conn {
            Some(c) => &mut c.raw,
            None => unreachable!("connection is only taken on drop"),
        }
    }
}

impl<M: ConnectionManager> Drop for PooledConnection<M> {
    fn drop(&mut self) {
        let broken = self.broken || std::thread::panicking();
        self.pool.release(self.conn.take(), broken);
    }
}
