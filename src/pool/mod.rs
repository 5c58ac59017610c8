//! # Resource Pool Module
//!
//! A fixed-size pool of handles to the embedded backing store.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`ResourcePool`] | Bounded pool with timed acquisition and self-healing release |
//! | [`PooledConnection`] | RAII checkout; dropping it releases the handle |
//! | [`ConnectionManager`] | Opens and health-checks handles for one store type |
//! | [`SqliteManager`] | `rusqlite` manager for files and shared in-memory databases |
//! | [`PoolConfig`] / [`PoolStats`] | Sizing, timeouts and counters |
//!
//! ## Guarantees
//!
//! - No handle is ever checked out to two callers at once.
//! - At most `pool_size` handles are live; extra demand waits, then fails
//!   with [`crate::Error::PoolExhausted`] after the acquire timeout.
//! - Release happens on every exit path, including panics inside
//!   [`ResourcePool::execute`]. Handles that failed a query are discarded and
//!   replaced lazily.
//!
//! ## Example
//!
//! ```rust,no_run
//! use analysis_cache::pool::{PoolConfig, ResourcePool, SqliteManager};
//! use std::time::Duration;
//!
//! # async fn run() -> analysis_cache::Result<()> {
//! let pool = ResourcePool::new(
//!     SqliteManager::file("analysis.db"),
//!     PoolConfig::new()
//!         .with_pool_size(4)
//!         .with_acquire_timeout(Duration::from_millis(250)),
//! )?;
//!
//! let count: i64 = pool
//!     .execute(|conn| Ok(conn.query_row("SELECT 1", [], |r| r.get(0))?))
//!     .await?;
//! assert_eq!(count, 1);
//! # Ok(())
//! # }
//! ```

mod manager;
mod resource;
mod sqlite;

pub use manager::{ConnectionManager, SqliteManager};
pub use resource::{ConnectionInfo, PoolConfig, PoolStats, PooledConnection, ResourcePool};
pub use sqlite::{Row, SqlitePool};
