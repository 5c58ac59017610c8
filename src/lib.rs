//! # analysis-cache
//!
//! Caching, resource pooling and batched retrieval for code-analysis
//! pipelines.
//!
//! ## Overview
//!
//! Analyzers produce expensive derived data (parse trees, detected patterns,
//! code smells, signatures) keyed by a logical id such as a file path and a
//! fingerprint of the content it was derived from. This crate keeps that data
//! in bounded TTL + LRU caches, hands out exclusive handles to a fixed-size
//! pool of backing-store connections, and fans retrieval work out across a
//! capped number of workers.
//!
//! A retrieval flows as:
//!
//! ```text
//! retrieve(request) -> cache lookup -> (miss) pool acquire -> store query
//!                   -> cache fill -> handle release -> tagged result
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use analysis_cache::cache::{CacheKey, ContentCache};
//!
//! let cache: ContentCache<String> = ContentCache::with_capacity(128);
//! let key = CacheKey::for_content("src/main.rs", "fn main() {}");
//!
//! let summary = cache.get_or_insert_with(&key, || "1 function".to_string());
//! assert_eq!(cache.get_key(&key), Some(summary));
//!
//! // Same path, edited content: the old entry no longer matches.
//! let edited = CacheKey::for_content("src/main.rs", "fn main() { run() }");
//! assert_eq!(cache.get_key(&edited), None);
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`cache`] | Generic TTL + LRU content cache, fingerprints, per-kind registry |
//! | [`pool`] | Bounded pool of backing-store handles with timed acquisition |
//! | [`retrieval`] | Cache-first coordinator, batch and multi-domain retrieval |
//! | [`batch`] | Bounded-parallel executor with deadlines and summaries |
//! | [`config`] | YAML and environment configuration |
//! | [`telemetry`] | `tracing` subscriber setup |
//! | [`error`] / [`error_code`] | Error type and stable error codes |

pub mod batch;
pub mod cache;
pub mod config;
pub mod error_code;
pub mod pool;
pub mod retrieval;
pub mod telemetry;

// Re-export main types for convenience
pub use batch::{BatchExecutor, BatchSummary};
pub use cache::{CacheKey, ContentCache, Fingerprint};
pub use config::CoreConfig;
pub use error_code::ErrorCode;
pub use pool::{ResourcePool, SqliteManager};
pub use retrieval::{RetrievalCoordinator, RetrievalRequest, RetrievalResult, ResultSource};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};
