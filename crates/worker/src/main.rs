use feedflow::catalog::CatalogRepo;
use feedflow::config::Config;
use feedflow::db;
use feedflow::jobs::{IngestHooks, JobsRepo, Metrics, Worker};

use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = Config::from_env()?;

    tracing::info!(
        database_path = %cfg.database_path,
        poll_interval_ms = cfg.poll_interval_ms,
        max_attempts = cfg.default_max_attempts,
        migrate_on_startup = cfg.migrate_on_startup,
        "feedflow worker starting"
    );

    let pool = db::make_pool(&cfg.database_path).await?;
    if cfg.migrate_on_startup {
        db::run_migrations(&pool).await?;
    }

    let metrics = Metrics::new();
    let jobs = JobsRepo::with_config(pool.clone(), metrics.clone(), cfg.queue_config());
    let hooks = IngestHooks::catalog(CatalogRepo::new(pool.clone()));
    let worker = Worker::with_config(jobs.clone(), hooks, metrics.clone(), cfg.worker_config());

    let handle = worker.spawn();

    // Periodic visibility into counters and queue depth.
    let report_jobs = jobs.clone();
    let report_metrics = metrics.clone();
    let reporter = tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(30)).await;
            let snap = report_metrics.snapshot();
            let depth = report_jobs.pending_depth().await.unwrap_or(-1);
            tracing::info!(
                enqueued = snap.enqueued,
                processed = snap.processed,
                failed = snap.failed,
                retried = snap.retried,
                pending_depth = depth,
                "queue stats"
            );
        }
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested, draining current job");

    reporter.abort();
    handle.shutdown().await;

    let snap = metrics.snapshot();
    tracing::info!(
        enqueued = snap.enqueued,
        processed = snap.processed,
        failed = snap.failed,
        retried = snap.retried,
        "final counters"
    );

    Ok(())
}
