mod common;

use chrono::Utc;
use common::{clear_next_run, failing_worker, setup, widget_batch};
use feedflow::jobs::{JobStatus, NewJob};

async fn enqueue_with_max_attempts(q: &common::TestQueue, max_attempts: i64) -> i64 {
    q.jobs
        .enqueue(NewJob {
            submitter_id: 1,
            items: widget_batch(),
            feed_hash: None,
            max_attempts: Some(max_attempts),
        })
        .await
        .unwrap()
}

#[tokio::test]
async fn processing_exception_schedules_a_retry_with_backoff() {
    let q = setup().await;
    let worker = failing_worker(&q);

    let job_id = enqueue_with_max_attempts(&q, 3).await;

    let outcome = worker.tick().await.unwrap().unwrap();
    assert_eq!(outcome.job_id, job_id);
    assert_eq!(outcome.status, JobStatus::Pending);
    assert!(outcome.error.as_deref().unwrap().contains("catalog exploded"));

    let job = q.jobs.get_job(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, "pending");
    assert_eq!(job.attempts, 1);
    assert!(job.error.as_deref().unwrap().contains("catalog exploded"));
    let next_run = job.next_run.expect("retry must set next_run");
    assert!(next_run > Utc::now(), "next_run must be in the future");

    // Retries are also counted as failures; both counters move.
    let snap = q.metrics.snapshot();
    assert_eq!(snap.retried, 1);
    assert_eq!(snap.failed, 1);
    assert_eq!(snap.processed, 0);

    // Not claimable again until the backoff elapses.
    assert!(worker.tick().await.unwrap().is_none());
}

#[tokio::test]
async fn retries_exhaust_into_a_permanent_failure() {
    let q = setup().await;
    let worker = failing_worker(&q);

    let job_id = enqueue_with_max_attempts(&q, 3).await;

    for round in 1..=3i64 {
        let outcome = worker.tick().await.unwrap().unwrap();
        let job = q.jobs.get_job(job_id).await.unwrap().unwrap();
        assert_eq!(job.attempts, round);

        if round < 3 {
            assert_eq!(outcome.status, JobStatus::Pending);
            assert_eq!(job.status, "pending");
            clear_next_run(&q.pool, job_id).await;
        } else {
            assert_eq!(outcome.status, JobStatus::Failed);
            assert_eq!(job.status, "failed");
            assert!(job.next_run.is_none() || job.next_run.unwrap() <= Utc::now());
        }
    }

    // Permanently failed: nothing left to claim.
    assert!(worker.tick().await.unwrap().is_none());

    let job = q.jobs.get_job(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, "failed");
    assert_eq!(job.attempts, 3);
    assert!(job.attempts >= job.max_attempts);

    let snap = q.metrics.snapshot();
    assert_eq!(snap.retried, 2, "two scheduled retries");
    assert_eq!(snap.failed, 3, "every exception counts as a failure");
    assert_eq!(snap.processed, 0);
}

#[tokio::test]
async fn single_shot_exception_fails_without_rescheduling() {
    let q = setup().await;
    let worker = failing_worker(&q);

    let job_id = enqueue_with_max_attempts(&q, 5).await;

    let outcome = worker.process_next_job_once().await.unwrap().unwrap();
    assert_eq!(outcome.status, JobStatus::Failed);
    assert!(outcome.error.as_deref().unwrap().contains("catalog exploded"));

    let job = q.jobs.get_job(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, "failed");
    assert_eq!(job.attempts, 1);
    assert!(job.next_run.is_none(), "single-shot never reschedules");

    let snap = q.metrics.snapshot();
    assert_eq!(snap.failed, 1);
    assert_eq!(snap.retried, 0);
}
