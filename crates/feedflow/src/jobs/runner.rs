use crate::catalog::CatalogRepo;
use crate::feed::{self, FeedItem};
use crate::jobs::metrics::{Counter, Metrics};
use crate::jobs::model::{ClaimedJob, Diagnostics, JobDiagnostics, JobStatus};
use crate::jobs::repo::JobsRepo;
use crate::jobs::retry::{retry_delay_secs, RetryConfig};
use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::Value;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

pub type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

type ValidateFn = dyn Fn(&[Value]) -> (Vec<FeedItem>, Vec<String>) + Send + Sync;
type UpsertFn =
    dyn Fn(Vec<FeedItem>, i64) -> BoxFuture<'static, anyhow::Result<(u64, Vec<String>)>>
        + Send
        + Sync;

/// The worker's seam to its two collaborators: the batch validator and the
/// catalog upsert. Injectable so callers can stub either side.
#[derive(Clone)]
pub struct IngestHooks {
    validate: Arc<ValidateFn>,
    upsert: Arc<UpsertFn>,
}

impl IngestHooks {
    pub fn new<V, U>(validate: V, upsert: U) -> Self
    where
        V: Fn(&[Value]) -> (Vec<FeedItem>, Vec<String>) + Send + Sync + 'static,
        U: Fn(Vec<FeedItem>, i64) -> BoxFuture<'static, anyhow::Result<(u64, Vec<String>)>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            validate: Arc::new(validate),
            upsert: Arc::new(upsert),
        }
    }

    /// Default wiring: the feed validator plus the catalog repository.
    pub fn catalog(catalog: CatalogRepo) -> Self {
        Self::new(feed::validate_items, move |items, submitter_id| {
            let catalog = catalog.clone();
            Box::pin(async move { catalog.upsert_batch(&items, submitter_id).await })
        })
    }
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Sleep between polls when no job was claimed.
    pub poll_interval: Duration,
    pub retry: RetryConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(250),
            retry: RetryConfig::default(),
        }
    }
}

/// Cooperative stop flag, checked at the top of each poll iteration. An
/// in-flight claim/process cycle always completes before it is honored.
#[derive(Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Final word on one processed job.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub job_id: i64,
    pub status: JobStatus,
    pub diagnostics: Option<JobDiagnostics>,
    pub error: Option<String>,
}

/// Claims, processes and finalizes jobs against the shared store. Cloneable;
/// every clone shares the same pool and metrics.
#[derive(Clone)]
pub struct Worker {
    jobs: JobsRepo,
    hooks: IngestHooks,
    metrics: Metrics,
    cfg: WorkerConfig,
}

enum Processed {
    Done(Option<JobDiagnostics>),
    ValidationFailed {
        diagnostics: JobDiagnostics,
        error: String,
    },
}

impl Worker {
    pub fn new(jobs: JobsRepo, hooks: IngestHooks, metrics: Metrics) -> Self {
        Self::with_config(jobs, hooks, metrics, WorkerConfig::default())
    }

    pub fn with_config(
        jobs: JobsRepo,
        hooks: IngestHooks,
        metrics: Metrics,
        cfg: WorkerConfig,
    ) -> Self {
        Self {
            jobs,
            hooks,
            metrics,
            cfg,
        }
    }

    /// Poll until stopped. Processes at most one job per iteration; idle
    /// iterations and iteration errors both sleep one poll interval. Errors
    /// are logged, never propagated: the loop must outlive transient store
    /// failures.
    pub async fn run(&self, stop: StopSignal) {
        tracing::info!(
            poll_interval_ms = self.cfg.poll_interval.as_millis() as u64,
            "ingest worker started"
        );

        loop {
            if stop.is_stopped() {
                break;
            }

            match self.tick().await {
                Ok(Some(_)) => {}
                Ok(None) => tokio::time::sleep(self.cfg.poll_interval).await,
                Err(e) => {
                    tracing::error!(error = %e, "worker iteration error");
                    tokio::time::sleep(self.cfg.poll_interval).await;
                }
            }
        }

        tracing::info!("ingest worker stopped");
    }

    /// Spawn the poll loop on the runtime; the handle stops and joins it.
    pub fn spawn(&self) -> WorkerHandle {
        let stop = StopSignal::default();
        let worker = self.clone();
        let loop_stop = stop.clone();
        let handle = tokio::spawn(async move { worker.run(loop_stop).await });
        WorkerHandle { stop, handle }
    }

    /// One poll-loop iteration: claim and fully process a single job.
    /// `Ok(None)` means nothing was eligible. A processing error schedules a
    /// retry while `attempts < max_attempts`, and fails the job permanently
    /// after that.
    pub async fn tick(&self) -> anyhow::Result<Option<JobOutcome>> {
        let Some(job) = self.jobs.claim_one().await? else {
            return Ok(None);
        };

        match self.process_claimed(&job).await {
            Ok(processed) => Ok(Some(Self::outcome(job.id, processed))),
            Err(e) => Ok(Some(self.retry_or_fail(&job, e).await?)),
        }
    }

    /// Single-shot variant for manual or test-driven draining: same
    /// processing as the loop, but a processing error fails the job directly
    /// instead of re-enqueueing it.
    pub async fn process_next_job_once(&self) -> anyhow::Result<Option<JobOutcome>> {
        let Some(job) = self.jobs.claim_one().await? else {
            return Ok(None);
        };

        match self.process_claimed(&job).await {
            Ok(processed) => Ok(Some(Self::outcome(job.id, processed))),
            Err(e) => {
                tracing::error!(job_id = job.id, error = %e, "single-shot processing error");
                let error_text = e.to_string();
                self.jobs.mark_failed(job.id, &error_text, None).await?;
                self.metrics.incr(Counter::Failed);
                Ok(Some(JobOutcome {
                    job_id: job.id,
                    status: JobStatus::Failed,
                    diagnostics: None,
                    error: Some(error_text),
                }))
            }
        }
    }

    async fn process_claimed(&self, job: &ClaimedJob) -> anyhow::Result<Processed> {
        if job.items.is_empty() {
            // Scheduler-style empty payload: a valid no-op run.
            tracing::info!(
                job_id = job.id,
                submitter_id = job.submitter_id,
                "empty payload, marking done"
            );
            self.jobs.mark_done(job.id, None).await?;
            self.metrics.incr(Counter::Processed);
            return Ok(Processed::Done(None));
        }

        let (valid_items, validation_errors) = (self.hooks.validate)(&job.items);

        if !validation_errors.is_empty() {
            // Whole-batch rejection: nothing reaches the catalog.
            let error = serde_json::to_string(&validation_errors)?;
            let summary = Diagnostics::rejected_batch(validation_errors);
            let stored = self.jobs.store_diagnostics(job.id, &summary).await?;
            let column = serde_json::to_string(&stored)?;
            self.jobs.mark_failed(job.id, &error, Some(&column)).await?;
            tracing::warn!(
                job_id = job.id,
                submitter_id = job.submitter_id,
                rejected = summary.rejected,
                "batch rejected by validation"
            );
            return Ok(Processed::ValidationFailed {
                diagnostics: stored,
                error,
            });
        }

        let (applied, upsert_errors) = (self.hooks.upsert)(valid_items, job.submitter_id).await?;
        let summary = Diagnostics::applied(applied, upsert_errors);
        let stored = self.jobs.store_diagnostics(job.id, &summary).await?;
        let column = serde_json::to_string(&stored)?;
        self.jobs.mark_done(job.id, Some(&column)).await?;
        self.metrics.incr(Counter::Processed);
        tracing::info!(
            job_id = job.id,
            submitter_id = job.submitter_id,
            accepted = summary.accepted,
            rejected = summary.rejected,
            "job processed"
        );

        Ok(Processed::Done(Some(stored)))
    }

    async fn retry_or_fail(
        &self,
        job: &ClaimedJob,
        err: anyhow::Error,
    ) -> anyhow::Result<JobOutcome> {
        tracing::error!(job_id = job.id, error = %err, "ingest processing error");
        let error_text = err.to_string();

        // The counters may have moved since the claim; trust the row.
        let (attempts, max_attempts) = self
            .jobs
            .attempt_counters(job.id)
            .await?
            .unwrap_or((job.attempts + 1, job.max_attempts));

        let outcome = if attempts < max_attempts {
            let mut rng = StdRng::from_entropy();
            let delay_secs = retry_delay_secs(attempts, &self.cfg.retry, &mut rng);
            let next_run = Utc::now() + chrono::Duration::seconds(delay_secs);

            self.jobs
                .reschedule_for_retry(job.id, next_run, &error_text)
                .await?;
            self.metrics.incr(Counter::Retried);
            tracing::warn!(
                job_id = job.id,
                attempts,
                max_attempts,
                delay_secs,
                "retry scheduled"
            );

            JobOutcome {
                job_id: job.id,
                status: JobStatus::Pending,
                diagnostics: None,
                error: Some(error_text),
            }
        } else {
            self.jobs.mark_failed(job.id, &error_text, None).await?;
            tracing::warn!(job_id = job.id, attempts, "retries exhausted, job failed");

            JobOutcome {
                job_id: job.id,
                status: JobStatus::Failed,
                diagnostics: None,
                error: Some(error_text),
            }
        };

        // Every exception bumps the failed counter, including ones that only
        // scheduled a retry; callers observe failed >= terminal failures.
        self.metrics.incr(Counter::Failed);

        Ok(outcome)
    }

    fn outcome(job_id: i64, processed: Processed) -> JobOutcome {
        match processed {
            Processed::Done(diagnostics) => JobOutcome {
                job_id,
                status: JobStatus::Done,
                diagnostics,
                error: None,
            },
            Processed::ValidationFailed { diagnostics, error } => JobOutcome {
                job_id,
                status: JobStatus::Failed,
                diagnostics: Some(diagnostics),
                error: Some(error),
            },
        }
    }
}

pub struct WorkerHandle {
    stop: StopSignal,
    handle: JoinHandle<()>,
}

impl WorkerHandle {
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Signal the loop and wait for the current iteration to finish.
    pub async fn shutdown(self) {
        self.stop.stop();
        let _ = self.handle.await;
    }
}
