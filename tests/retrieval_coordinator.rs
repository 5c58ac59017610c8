//! Coordinator behavior end to end against an on-disk SQLite store.

use analysis_cache::batch::BatchExecutorConfig;
use analysis_cache::pool::{PoolConfig, ResourcePool, SqliteManager};
use analysis_cache::retrieval::{
    FallbackChain, Record, RecordSource, ResultSource, RetrievalCoordinator, RetrievalRequest,
    SqliteRecordSource, RECORDS_SCHEMA,
};
use analysis_cache::{CoreConfig, Error, ErrorCode, Result};
use rusqlite::Connection;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Delegates to the SQLite source but fails every query against `broken`
/// domains, and logs the domains it was asked for.
#[derive(Clone)]
struct FlakySource {
    broken: Vec<&'static str>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl FlakySource {
    fn new(broken: &[&'static str]) -> Self {
        Self {
            broken: broken.to_vec(),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl RecordSource<Connection> for FlakySource {
    fn fetch(&self, conn: &mut Connection, request: &RetrievalRequest) -> Result<Vec<Record>> {
        self.calls.lock().unwrap().push(request.domain.clone());
        if self.broken.contains(&request.domain.as_str()) {
            return Err(Error::store(format!("domain {} is unreadable", request.domain)));
        }
        SqliteRecordSource.fetch(conn, request)
    }
}

async fn store(dir: &TempDir, pool_size: usize) -> ResourcePool<SqliteManager> {
    let pool = ResourcePool::new(
        SqliteManager::file(dir.path().join("records.db")).with_init_sql(RECORDS_SCHEMA),
        PoolConfig::new()
            .with_pool_size(pool_size)
            .with_acquire_timeout(Duration::from_millis(100)),
    )
    .unwrap();
    pool.execute(|conn| {
        let mut records = Vec::new();
        for domain in ["x", "y", "z", "global"] {
            for i in 0..3 {
                records.push(
                    Record::new(
                        format!("{}-{}", domain, i),
                        domain,
                        format!("src/{}/mod{}.rs", domain, i),
                        format!("unused import in {} module {}", domain, i),
                    )
                    .with_confidence(0.5 + i as f64 / 10.0),
                );
            }
        }
        SqliteRecordSource::insert_records(conn, &records)
    })
    .await
    .unwrap();
    pool
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_batch_keeps_order_and_isolates_failure() {
    let dir = tempfile::tempdir().unwrap();
    let source = FlakySource::new(&["broken"]);
    let coordinator = RetrievalCoordinator::builder(store(&dir, 2).await, source)
        .with_batch_config(BatchExecutorConfig::new().with_max_workers(3))
        .build();

    let requests = vec![
        RetrievalRequest::new("x", "unused"),
        RetrievalRequest::new("y", "unused"),
        RetrievalRequest::new("z", "unused").with_limit(1),
        RetrievalRequest::new("broken", "unused"),
        RetrievalRequest::new("global", "module 2"),
    ];
    let results = coordinator.retrieve_batch(requests).await;

    assert_eq!(results.len(), 5);
    let domains: Vec<_> = results.iter().map(|r| r.domain.as_str()).collect();
    assert_eq!(domains, vec!["x", "y", "z", "broken", "global"]);
    for (i, result) in results.iter().enumerate() {
        if i == 3 {
            assert_eq!(result.source, ResultSource::Error);
            assert_eq!(result.error.as_ref().unwrap().code, ErrorCode::BackingStore);
            assert!(result.records.is_empty());
        } else {
            assert_eq!(result.source, ResultSource::Store, "slot {}", i);
            assert!(result.error.is_none());
            assert!(!result.records.is_empty());
        }
    }
    assert_eq!(results[0].len(), 3);
    assert_eq!(results[2].len(), 1);
    assert_eq!(results[2].records[0].id, "z-2");
    assert_eq!(results[4].records[0].id, "global-2");
}

#[tokio::test]
async fn test_multi_domain_reports_every_domain() {
    let dir = tempfile::tempdir().unwrap();
    let coordinator = RetrievalCoordinator::new(store(&dir, 2).await, FlakySource::new(&["y"]));

    let results = coordinator
        .retrieve_multi_domain(&RetrievalRequest::new("ignored", "unused"), ["x", "y", "z"])
        .await;

    assert_eq!(results.len(), 3);
    assert_eq!(results["x"].len(), 3);
    assert_eq!(results["z"].len(), 3);
    assert!(results["x"].records.iter().all(|r| r.domain == "x"));
    let y = &results["y"];
    assert!(y.is_error());
    assert!(y.records.is_empty());
    assert!(y.error.as_ref().unwrap().message.contains("unreadable"));
}

#[tokio::test]
async fn test_fallback_runs_only_when_primary_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let source = FlakySource::new(&[]);
    let coordinator = RetrievalCoordinator::new(store(&dir, 1).await, source.clone());

    let hit = coordinator
        .retrieve_with_fallback(
            RetrievalRequest::new("x", "unused"),
            RetrievalRequest::new("global", "unused"),
        )
        .await
        .unwrap();
    assert!(!hit.fallback_used);
    assert_eq!(hit.domain, "x");
    assert_eq!(source.calls(), vec!["x"]);

    let fell_back = coordinator
        .retrieve_with_fallback(
            RetrievalRequest::new("local", "unused"),
            RetrievalRequest::new("global", "unused"),
        )
        .await
        .unwrap();
    assert!(fell_back.fallback_used);
    assert_eq!(fell_back.domain, "global");
    assert_eq!(fell_back.len(), 3);
    assert_eq!(source.calls(), vec!["x", "local", "global"]);
}

#[tokio::test]
async fn test_fallback_chain_returns_last_empty_result() {
    let dir = tempfile::tempdir().unwrap();
    let coordinator =
        RetrievalCoordinator::new(store(&dir, 1).await, SqliteRecordSource::new());

    let chain = FallbackChain::new(RetrievalRequest::new("x", "no such text"))
        .across_domains(["y", "z"]);
    let result = coordinator.retrieve_with_fallback_chain(chain).await.unwrap();
    assert!(result.is_empty());
    assert!(result.fallback_used);
    assert_eq!(result.domain, "z");
}

#[tokio::test]
async fn test_exhaustion_surfaces_from_retrieve_but_not_batch() {
    let dir = tempfile::tempdir().unwrap();
    let coordinator =
        RetrievalCoordinator::new(store(&dir, 1).await, SqliteRecordSource::new());

    let held = coordinator.pool().acquire().await.unwrap();
    let err = coordinator
        .retrieve(RetrievalRequest::new("x", "unused"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::PoolExhausted { .. }));

    let results = coordinator
        .retrieve_batch(vec![
            RetrievalRequest::new("x", "unused"),
            RetrievalRequest::new("y", "unused"),
        ])
        .await;
    assert_eq!(results.len(), 2);
    for result in &results {
        let failure = result.error.as_ref().unwrap();
        assert_eq!(failure.code, ErrorCode::PoolExhausted);
        assert!(failure.is_retryable());
    }
    drop(held);

    let ok = coordinator
        .retrieve(RetrievalRequest::new("x", "unused"))
        .await
        .unwrap();
    assert_eq!(ok.source, ResultSource::Store);
}

#[tokio::test]
async fn test_cached_result_expires_after_result_ttl() {
    let dir = tempfile::tempdir().unwrap();
    let coordinator = RetrievalCoordinator::builder(store(&dir, 1).await, SqliteRecordSource::new())
        .with_config(
            analysis_cache::retrieval::RetrievalConfig::new()
                .with_result_ttl(Duration::from_millis(40)),
        )
        .build();
    let request = RetrievalRequest::new("z", "unused");

    assert_eq!(coordinator.retrieve(request.clone()).await.unwrap().source, ResultSource::Store);
    assert_eq!(coordinator.retrieve(request.clone()).await.unwrap().source, ResultSource::Cache);
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(coordinator.retrieve(request).await.unwrap().source, ResultSource::Store);
    assert_eq!(coordinator.cache_stats().expirations, 1);
}

#[tokio::test]
async fn test_coordinator_from_loaded_config() {
    let dir = tempfile::tempdir().unwrap();
    let config = CoreConfig::from_yaml_str(
        "
cache:
  capacity: 8
batch:
  max_workers: 2
retrieval:
  result_ttl_secs: 30
  default_limit: 1
  default_min_confidence: 0.6
",
    )
    .unwrap();
    let coordinator = RetrievalCoordinator::builder(store(&dir, 1).await, SqliteRecordSource::new())
        .with_core_config(&config)
        .build();

    assert_eq!(coordinator.cache().config().name, "retrieval");
    assert_eq!(coordinator.cache().config().capacity, 8);
    assert_eq!(coordinator.cache().config().default_ttl, Duration::from_secs(30));
    assert_eq!(coordinator.config().default_limit, 1);

    let result = coordinator
        .retrieve(RetrievalRequest::new("x", "unused"))
        .await
        .unwrap();
    assert_eq!(result.len(), 1);
    assert!(result.records[0].confidence >= 0.6);
}
