//! Bounded-parallel batch executor.

use crate::error_code::ErrorCode;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Per-item results in input order.
#[derive(Debug)]
pub struct BatchResult<R> {
    pub items: Vec<std::result::Result<R, BatchError>>,
    pub execution_time: Duration,
}

impl<R> BatchResult<R> {
    pub fn total(&self) -> usize {
        self.items.len()
    }
    pub fn all_succeeded(&self) -> bool {
        self.items.iter().all(|r| r.is_ok())
    }
    pub fn success_count(&self) -> usize {
        self.items.iter().filter(|r| r.is_ok()).count()
    }
    pub fn failure_count(&self) -> usize {
        self.items.iter().filter(|r| r.is_err()).count()
    }
    pub fn success_rate(&self) -> f64 {
        if self.items.is_empty() {
            0.0
        } else {
            self.success_count() as f64 / self.items.len() as f64
        }
    }
    /// Successful values with their input index.
    pub fn successes(&self) -> impl Iterator<Item = (usize, &R)> {
        self.items
            .iter()
            .enumerate()
            .filter_map(|(i, r)| r.as_ref().ok().map(|v| (i, v)))
    }
    pub fn failures(&self) -> impl Iterator<Item = &BatchError> {
        self.items.iter().filter_map(|r| r.as_ref().err())
    }
    pub fn into_results(self) -> Vec<std::result::Result<R, BatchError>> {
        self.items
    }
    pub fn summarize(&self) -> BatchSummary {
        BatchExecutor::summarize(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchError {
    pub message: String,
    pub index: usize,
    pub code: ErrorCode,
    pub retryable: bool,
}

impl BatchError {
    pub fn new(msg: impl Into<String>, idx: usize) -> Self {
        Self {
            message: msg.into(),
            index: idx,
            code: ErrorCode::Unknown,
            retryable: false,
        }
    }
    pub fn from_error(err: &Error, idx: usize) -> Self {
        Self {
            message: err.to_string(),
            index: idx,
            code: err.code(),
            retryable: err.is_retryable(),
        }
    }
}

impl std::fmt::Display for BatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Batch error at {} [{}]: {}", self.index, self.code, self.message)
    }
}

impl std::error::Error for BatchError {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub errors: Vec<BatchError>,
}

#[derive(Debug, Clone)]
pub struct BatchExecutorConfig {
    /// Hard cap on concurrent invocations.
    pub max_workers: usize,
    /// Overall budget; items not yet dispatched when it passes fail with
    /// `DeadlineExceeded`. In-flight items always finish.
    pub deadline: Option<Duration>,
}

impl Default for BatchExecutorConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            deadline: None,
        }
    }
}

impl BatchExecutorConfig {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_max_workers(mut self, n: usize) -> Self {
        self.max_workers = n.max(1);
        self
    }
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct BatchExecutor {
    config: BatchExecutorConfig,
}

impl BatchExecutor {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_config(config: BatchExecutorConfig) -> Self {
        Self { config }
    }
    pub fn config(&self) -> &BatchExecutorConfig {
        &self.config
    }

    /// Run `f` over `items` with the configured worker cap.
    pub async fn run<T, R, F, Fut>(&self, items: Vec<T>, f: F) -> BatchResult<R>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
    {
        self.run_with_workers(items, self.config.max_workers, f).await
    }

    /// Run `f` over `items` with at most `max_workers` invocations in flight.
    ///
    /// Each item is a separate tokio task gated by a semaphore permit taken
    /// before the task is spawned, so the cap holds no matter how large the
    /// batch is. Failures and panics are captured per item.
    pub async fn run_with_workers<T, R, F, Fut>(
        &self,
        items: Vec<T>,
        max_workers: usize,
        f: F,
    ) -> BatchResult<R>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
    {
        let start = Instant::now();
        let total = items.len();
        let max_workers = max_workers.max(1);
        let deadline = self
            .config
            .deadline
            .map(|d| tokio::time::Instant::from_std(start + d));
        let permits = Arc::new(Semaphore::new(max_workers));
        let f = Arc::new(f);

        let mut slots: Vec<Option<std::result::Result<R, BatchError>>> =
            (0..total).map(|_| None).collect();
        let mut handles = Vec::with_capacity(total);

        for (idx, item) in items.into_iter().enumerate() {
            let acquire = Arc::clone(&permits).acquire_owned();
            let permit = match deadline {
                Some(at) => {
                    let acquired = if tokio::time::Instant::now() >= at {
                        None
                    } else {
                        tokio::time::timeout_at(at, acquire).await.ok()
                    };
                    match acquired {
                        Some(p) => p,
                        None => {
                            slots[idx] =
                                Some(Err(BatchError::from_error(&Error::DeadlineExceeded, idx)));
                            continue;
                        }
                    }
                }
                None => acquire.await,
            };
            let Ok(permit) = permit else {
                slots[idx] = Some(Err(BatchError::new("worker pool closed", idx)));
                continue;
            };
            let f = Arc::clone(&f);
            handles.push((
                idx,
                tokio::spawn(async move {
                    let out = f(item).await;
                    drop(permit);
                    out
                }),
            ));
        }

        for (idx, handle) in handles {
            slots[idx] = Some(match handle.await {
                Ok(Ok(v)) => Ok(v),
                Ok(Err(e)) => Err(BatchError::from_error(&e, idx)),
                Err(join) => {
                    warn!(index = idx, error = %join, "batch item task failed");
                    Err(BatchError::from_error(
                        &Error::TaskFailed {
                            message: join.to_string(),
                        },
                        idx,
                    ))
                }
            });
        }

        let items: Vec<_> = slots
            .into_iter()
            .enumerate()
            .map(|(i, s)| s.unwrap_or_else(|| Err(BatchError::new("batch result missing", i))))
            .collect();
        let result = BatchResult {
            items,
            execution_time: start.elapsed(),
        };
        debug!(
            total,
            succeeded = result.success_count(),
            failed = result.failure_count(),
            max_workers,
            elapsed = ?result.execution_time,
            "batch finished"
        );
        result
    }

    pub fn summarize<R>(result: &BatchResult<R>) -> BatchSummary {
        let errors: Vec<BatchError> = result.failures().cloned().collect();
        BatchSummary {
            total: result.total(),
            succeeded: result.total() - errors.len(),
            failed: errors.len(),
            errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_config_builder() {
        let config = BatchExecutorConfig::new()
            .with_max_workers(0)
            .with_deadline(Duration::from_secs(1));
        assert_eq!(config.max_workers, 1);
        assert_eq!(config.deadline, Some(Duration::from_secs(1)));
    }

    #[tokio::test]
    async fn test_results_keep_input_order() {
        let executor = BatchExecutor::new();
        let result = executor
            .run_with_workers(vec![30u64, 5, 20, 1], 4, |ms| async move {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok(ms * 2)
            })
            .await;
        let values: Vec<u64> = result.items.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(values, vec![60, 10, 40, 2]);
    }

    #[tokio::test]
    async fn test_partial_failure_is_captured_per_item() {
        let executor = BatchExecutor::new();
        let result = executor
            .run(vec![0, 1, 2, 3, 4], |i| async move {
                if i == 3 {
                    Err(Error::store("row decode failed"))
                } else {
                    Ok(i)
                }
            })
            .await;
        assert_eq!(result.total(), 5);
        assert_eq!(result.success_count(), 4);
        let summary = result.summarize();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.errors[0].index, 3);
        assert_eq!(summary.errors[0].code, ErrorCode::BackingStore);
        assert!(result.items[3].is_err());
        assert_eq!(result.successes().map(|(i, _)| i).collect::<Vec<_>>(), vec![0, 1, 2, 4]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_worker_cap_is_never_exceeded() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let executor = BatchExecutor::new();
        let (r, p) = (Arc::clone(&running), Arc::clone(&peak));
        let result = executor
            .run_with_workers((0..40).collect::<Vec<_>>(), 3, move |_| {
                let (running, peak) = (Arc::clone(&r), Arc::clone(&p));
                async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(2)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .await;
        assert!(result.all_succeeded());
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert!(peak.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn test_panicking_item_becomes_failure() {
        let executor = BatchExecutor::new();
        let result = executor
            .run(vec![1, 2, 3], |i| async move {
                if i == 2 {
                    panic!("analyzer bug");
                }
                Ok(i)
            })
            .await;
        assert_eq!(result.success_count(), 2);
        let err = result.items[1].as_ref().unwrap_err();
        assert_eq!(err.code, ErrorCode::TaskFailed);
    }

    #[tokio::test]
    async fn test_deadline_stops_dispatch_but_finishes_in_flight() {
        let executor = BatchExecutor::with_config(
            BatchExecutorConfig::new()
                .with_max_workers(1)
                .with_deadline(Duration::from_millis(50)),
        );
        let result = executor
            .run(vec![0, 1, 2, 3], |i| async move {
                tokio::time::sleep(Duration::from_millis(80)).await;
                Ok(i)
            })
            .await;
        // Item 0 dispatched at once and allowed to finish; the rest never start.
        assert_eq!(result.items[0].as_ref().ok(), Some(&0));
        for r in &result.items[1..] {
            let err = r.as_ref().unwrap_err();
            assert_eq!(err.code, ErrorCode::DeadlineExceeded);
            assert!(err.retryable);
        }
    }

    #[test]
    fn test_batch_error_retryability_follows_cause() {
        assert!(!BatchError::new("worker pool closed", 0).retryable);
        let capacity = BatchError::from_error(
            &Error::PoolExhausted {
                pool_size: 1,
                waited: Duration::ZERO,
            },
            4,
        );
        assert!(capacity.retryable);
        assert_eq!(capacity.code, ErrorCode::PoolExhausted);
        assert!(!BatchError::from_error(&Error::store("corrupt page"), 5).retryable);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let result = BatchExecutor::new()
            .run(Vec::<u8>::new(), |i| async move { Ok(i) })
            .await;
        assert_eq!(result.total(), 0);
        assert_eq!(result.success_rate(), 0.0);
        assert_eq!(result.summarize(), BatchSummary::default());
    }
}
