//! # Batch Execution Module
//!
//! Fan a list of independent units of work out across a bounded number of
//! concurrent workers and collect one outcome per input, in input order.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`BatchExecutor`] | Runs a closure over items with a worker cap and optional deadline |
//! | [`BatchExecutorConfig`] | `max_workers` and overall `deadline` |
//! | [`BatchResult`] | Per-item `Result`s plus wall-clock time |
//! | [`BatchError`] | Failure of one item: message, index, code, retryability |
//! | [`BatchSummary`] | Totals and the list of failures |
//!
//! One failing item never aborts the batch; a panicking item becomes a
//! [`crate::error_code::ErrorCode::TaskFailed`] failure for that index only.
//!
//! ## Example
//!
//! ```rust
//! use analysis_cache::batch::{BatchExecutor, BatchExecutorConfig};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let executor = BatchExecutor::with_config(BatchExecutorConfig::new().with_max_workers(2));
//! let result = executor
//!     .run(vec!["a.rs", "b.rs", "c.rs"], |path| async move { Ok(path.len()) })
//!     .await;
//!
//! let summary = result.summarize();
//! assert_eq!(summary.total, 3);
//! assert_eq!(summary.succeeded, 3);
//! # }
//! ```

mod executor;

pub use executor::{BatchError, BatchExecutor, BatchExecutorConfig, BatchResult, BatchSummary};
