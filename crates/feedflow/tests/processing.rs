mod common;

use common::{setup, widget_batch};
use feedflow::jobs::{Diagnostics, JobDiagnostics, JobStatus};
use serde_json::json;

#[tokio::test]
async fn valid_batch_runs_to_done_and_reaches_the_catalog() {
    let q = setup().await;

    q.jobs
        .enqueue_items(7, &widget_batch(), None)
        .await
        .unwrap();

    let outcome = q.worker.process_next_job_once().await.unwrap().unwrap();
    assert_eq!(outcome.status, JobStatus::Done);
    assert_eq!(
        outcome.diagnostics,
        Some(JobDiagnostics::Inline(Diagnostics {
            accepted: 1,
            rejected: 0,
            errors: vec![],
        }))
    );
    assert!(outcome.error.is_none());

    let job = q.jobs.get_job(outcome.job_id).await.unwrap().unwrap();
    assert_eq!(job.status, "done");
    assert!(job.processed_at.is_some());
    assert_eq!(job.attempts, 1);

    let product = q.catalog.get_by_name("Widget").await.unwrap().unwrap();
    assert_eq!(product.price_cents, 500);
    assert_eq!(product.stock, 3);
    assert_eq!(product.sku.as_deref(), Some("s1"));
    assert_eq!(product.submitter_id, Some(7));

    assert_eq!(q.metrics.snapshot().processed, 1);
}

#[tokio::test]
async fn one_invalid_item_rejects_the_whole_batch() {
    let q = setup().await;

    let batch = vec![
        json!({"sku": "a", "name": "Alpha", "price_cents": 100, "stock": 1}),
        json!({"sku": "b", "name": "Bravo", "price_cents": -5, "stock": 1}),
        json!({"sku": "c", "name": "Charlie", "price_cents": 300, "stock": 1}),
    ];
    q.jobs.enqueue_items(1, &batch, None).await.unwrap();

    let outcome = q.worker.process_next_job_once().await.unwrap().unwrap();
    assert_eq!(outcome.status, JobStatus::Failed);

    match outcome.diagnostics.unwrap() {
        JobDiagnostics::Inline(summary) => {
            assert_eq!(summary.accepted, 0);
            assert_eq!(summary.rejected, 1);
            assert_eq!(summary.errors.len(), 1);
            assert!(summary.errors[0].starts_with("Item 1:"));
        }
        other => panic!("expected inline diagnostics, got {other:?}"),
    }

    let job = q.jobs.get_job(outcome.job_id).await.unwrap().unwrap();
    assert_eq!(job.status, "failed");
    assert!(job.error.as_deref().unwrap().contains("Item 1"));
    assert!(job.processed_at.is_none());

    // No partial apply: the two valid items must not reach the catalog.
    assert_eq!(q.catalog.count().await.unwrap(), 0);

    // Validation failure is data, not an exception: only the enqueue counter
    // has moved.
    let snap = q.metrics.snapshot();
    assert_eq!(snap.processed, 0);
    assert_eq!(snap.failed, 0);
    assert_eq!(snap.retried, 0);
}

#[tokio::test]
async fn empty_payload_is_a_noop_success() {
    let q = setup().await;

    q.jobs.enqueue_items(3, &[], None).await.unwrap();

    let outcome = q.worker.process_next_job_once().await.unwrap().unwrap();
    assert_eq!(outcome.status, JobStatus::Done);
    assert!(outcome.diagnostics.is_none());

    let job = q.jobs.get_job(outcome.job_id).await.unwrap().unwrap();
    assert_eq!(job.status, "done");
    assert!(job.processed_at.is_some());

    assert_eq!(q.catalog.count().await.unwrap(), 0);
    assert_eq!(q.metrics.snapshot().processed, 1);
}

#[tokio::test]
async fn single_shot_with_no_eligible_job_touches_nothing() {
    let q = setup().await;

    assert!(q.worker.process_next_job_once().await.unwrap().is_none());

    let snap = q.metrics.snapshot();
    assert_eq!(snap.enqueued, 0);
    assert_eq!(snap.processed, 0);
    assert_eq!(snap.failed, 0);
    assert_eq!(snap.retried, 0);
}

#[tokio::test]
async fn reingesting_a_sku_updates_the_existing_row() {
    let q = setup().await;

    q.jobs
        .enqueue_items(7, &widget_batch(), None)
        .await
        .unwrap();
    q.worker.process_next_job_once().await.unwrap().unwrap();

    let updated = vec![json!({
        "sku": "s1",
        "name": "Widget",
        "price_cents": 700,
        "stock": 9,
    })];
    q.jobs.enqueue_items(7, &updated, None).await.unwrap();
    let outcome = q.worker.process_next_job_once().await.unwrap().unwrap();
    assert_eq!(outcome.status, JobStatus::Done);

    assert_eq!(q.catalog.count().await.unwrap(), 1);
    let product = q.catalog.get_by_name("Widget").await.unwrap().unwrap();
    assert_eq!(product.price_cents, 700);
    assert_eq!(product.stock, 9);
}
