//! # Content-Addressed Caching Module
//!
//! One generic cache implementation used for every analysis payload: parsed
//! trees, detected patterns, code smells and function signatures.
//!
//! ## Overview
//!
//! Entries are keyed by a caller-assigned logical id (a file path, or
//! `path::symbol`) together with a [`Fingerprint`] of the content the value was
//! computed from. A lookup under a different fingerprint is a miss, so callers
//! invalidate simply by fingerprinting the current content.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`ContentCache`] | TTL + capacity-bounded LRU cache over an opaque value type |
//! | [`CacheConfig`] | Default TTL, capacity and enable switch |
//! | [`CacheKey`] / [`Fingerprint`] | Composite key and content digest |
//! | [`Fingerprinter`] | Pluggable digest function (SHA-256 by default) |
//! | [`CacheRegistry`] | One JSON-payload cache per [`CacheKind`] |
//! | [`spawn_sweeper`] | Periodic TTL sweep on the tokio runtime |
//!
//! ## Example
//!
//! ```rust
//! use analysis_cache::cache::{CacheConfig, ContentCache, Fingerprint};
//! use std::time::Duration;
//!
//! let cache = ContentCache::new(
//!     CacheConfig::new()
//!         .with_capacity(2)
//!         .with_ttl(Duration::from_secs(60)),
//! );
//!
//! let source = "fn main() {}";
//! cache.put("src/main.rs", Fingerprint::of(source), vec!["main".to_string()]);
//! assert!(cache.get("src/main.rs", &Fingerprint::of(source)).is_some());
//!
//! // Edited content no longer matches.
//! assert!(cache.get("src/main.rs", &Fingerprint::of("fn main() { run() }")).is_none());
//! ```

mod content;
mod key;
mod registry;
mod sweeper;

pub use content::{CacheConfig, CacheStats, ContentCache, EntryInfo, Lookup, StaleReason};
pub use key::{CacheKey, Fingerprint, Fingerprinter, Sha256Fingerprinter};
pub use registry::{CacheKind, CacheRegistry, JsonCache};
pub use sweeper::{spawn_sweeper, SweeperHandle};
