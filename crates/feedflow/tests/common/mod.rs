// Each test binary uses its own subset of these helpers.
#![allow(dead_code)]

use feedflow::catalog::CatalogRepo;
use feedflow::db;
use feedflow::feed;
use feedflow::jobs::runner::BoxFuture;
use feedflow::jobs::{IngestHooks, JobsRepo, Metrics, QueueConfig, Worker};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tempfile::TempDir;

/// One isolated queue per test: fresh database file, migrated schema, and
/// the full producer/worker wiring.
pub struct TestQueue {
    // Held so the database file outlives the test.
    _dir: TempDir,
    pub pool: SqlitePool,
    pub metrics: Metrics,
    pub jobs: JobsRepo,
    pub catalog: CatalogRepo,
    pub worker: Worker,
}

pub async fn setup() -> TestQueue {
    setup_with(QueueConfig::default()).await
}

pub async fn setup_with(cfg: QueueConfig) -> TestQueue {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("feedflow_test.sqlite");

    let pool = db::make_pool(&path).await.expect("failed to open test db");
    db::run_migrations(&pool).await.expect("migrations failed");

    let metrics = Metrics::new();
    let jobs = JobsRepo::with_config(pool.clone(), metrics.clone(), cfg);
    let catalog = CatalogRepo::new(pool.clone());
    let worker = Worker::new(
        jobs.clone(),
        IngestHooks::catalog(catalog.clone()),
        metrics.clone(),
    );

    TestQueue {
        _dir: dir,
        pool,
        metrics,
        jobs,
        catalog,
        worker,
    }
}

/// A worker whose upsert collaborator always raises, for exercising the
/// retry/backoff path.
pub fn failing_worker(q: &TestQueue) -> Worker {
    Worker::new(q.jobs.clone(), failing_upsert_hooks(), q.metrics.clone())
}

pub fn failing_upsert_hooks() -> IngestHooks {
    IngestHooks::new(
        feed::validate_items,
        |_items, _submitter_id| -> BoxFuture<'static, anyhow::Result<(u64, Vec<String>)>> {
            Box::pin(async { Err(anyhow::anyhow!("catalog exploded")) })
        },
    )
}

pub fn widget_batch() -> Vec<Value> {
    vec![json!({
        "sku": "s1",
        "name": "Widget",
        "price_cents": 500,
        "stock": 3,
    })]
}

/// Make a retried job immediately claimable again.
pub async fn clear_next_run(pool: &SqlitePool, job_id: i64) {
    sqlx::query("UPDATE ingest_jobs SET next_run = NULL WHERE id = ?1")
        .bind(job_id)
        .execute(pool)
        .await
        .expect("failed to clear next_run");
}
