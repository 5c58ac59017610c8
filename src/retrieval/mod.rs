//! # Retrieval Module
//!
//! Cache-first reads from the backing store, one request at a time or fanned
//! out across many requests and domains.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`RetrievalCoordinator`] | Cache lookup, pooled store query, cache fill |
//! | [`RetrievalRequest`] | Query, domain, confidence floor, limit, optional fingerprint |
//! | [`RetrievalResult`] | Records tagged with their [`ResultSource`] |
//! | [`RecordSource`] | The store query run on a pooled handle |
//! | [`SqliteRecordSource`] | `records` table in SQLite |
//! | [`FallbackChain`] | Requests tried in order until one yields records |
//!
//! Results are tagged data: callers branch on [`ResultSource::Cache`],
//! [`ResultSource::Store`] or [`ResultSource::Error`] instead of catching
//! failures. Batch and multi-domain calls always return one result per
//! request.
//!
//! ## Example
//!
//! ```rust,no_run
//! use analysis_cache::pool::{PoolConfig, ResourcePool, SqliteManager};
//! use analysis_cache::retrieval::{
//!     RetrievalCoordinator, RetrievalRequest, ResultSource, SqliteRecordSource, RECORDS_SCHEMA,
//! };
//!
//! # async fn run() -> analysis_cache::Result<()> {
//! let pool = ResourcePool::new(
//!     SqliteManager::file("analysis.db").with_init_sql(RECORDS_SCHEMA),
//!     PoolConfig::new().with_pool_size(4),
//! )?;
//! let coordinator = RetrievalCoordinator::new(pool, SqliteRecordSource::new());
//!
//! let first = coordinator
//!     .retrieve(RetrievalRequest::new("smells", "long method"))
//!     .await?;
//! assert_eq!(first.source, ResultSource::Store);
//!
//! let again = coordinator
//!     .retrieve(RetrievalRequest::new("smells", "long method"))
//!     .await?;
//! assert_eq!(again.source, ResultSource::Cache);
//! # Ok(())
//! # }
//! ```

mod coordinator;
mod fallback;
mod request;
mod source;

pub use coordinator::{RetrievalConfig, RetrievalCoordinator, RetrievalCoordinatorBuilder};
pub use fallback::FallbackChain;
pub use request::{Record, ResultSource, RetrievalFailure, RetrievalRequest, RetrievalResult};
pub use source::{RecordSource, SqliteRecordSource, RECORDS_SCHEMA};
