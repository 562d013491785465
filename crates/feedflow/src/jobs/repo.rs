use crate::db::is_store_busy;
use crate::jobs::metrics::{Counter, Metrics};
use crate::jobs::model::{
    ClaimedJob, Diagnostics, DiagnosticsRecord, Job, JobDiagnostics, NewJob,
};
use crate::jobs::retry::{enqueue_delay, EnqueueRetryConfig};
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::Value;
use sqlx::SqlitePool;

#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Retry ceiling applied when the producer does not set one.
    pub default_max_attempts: i64,
    /// Diagnostics summaries larger than this (serialized) are offloaded.
    pub inline_diagnostics_max_bytes: usize,
    pub enqueue_retry: EnqueueRetryConfig,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            default_max_attempts: 5,
            inline_diagnostics_max_bytes: 2000,
            enqueue_retry: EnqueueRetryConfig::default(),
        }
    }
}

#[derive(Clone)]
pub struct JobsRepo {
    pool: SqlitePool,
    metrics: Metrics,
    cfg: QueueConfig,
}

impl JobsRepo {
    pub fn new(pool: SqlitePool, metrics: Metrics) -> Self {
        Self::with_config(pool, metrics, QueueConfig::default())
    }

    pub fn with_config(pool: SqlitePool, metrics: Metrics, cfg: QueueConfig) -> Self {
        Self { pool, metrics, cfg }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.cfg
    }

    // ----------------------------
    // Enqueue
    // ----------------------------

    /// Persist one pending job and return its id.
    ///
    /// Concurrent writers are expected, so a busy store is handled here:
    /// the insert is retried with doubling, jittered delays up to the
    /// configured attempt ceiling. Any other error propagates immediately.
    pub async fn enqueue(&self, job: NewJob) -> anyhow::Result<i64> {
        let payload = serde_json::to_string(&job.items)?;
        let max_attempts = job.max_attempts.unwrap_or(self.cfg.default_max_attempts);

        let mut rng = StdRng::from_entropy();
        let mut attempt_no = 1u32;
        let job_id = loop {
            match self.try_insert(&job, &payload, max_attempts).await {
                Ok(id) => break id,
                Err(e) if is_store_busy(&e) && attempt_no < self.cfg.enqueue_retry.max_attempts => {
                    let delay = enqueue_delay(attempt_no, &self.cfg.enqueue_retry, &mut rng);
                    tracing::warn!(
                        attempt_no,
                        delay_ms = delay.as_millis() as u64,
                        "store busy during enqueue, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt_no += 1;
                }
                Err(e) => return Err(e.into()),
            }
        };

        self.metrics.incr(Counter::Enqueued);
        Ok(job_id)
    }

    /// Convenience wrapper over [`enqueue`](Self::enqueue) for the common
    /// producer call shape.
    pub async fn enqueue_items(
        &self,
        submitter_id: i64,
        items: &[Value],
        feed_hash: Option<&str>,
    ) -> anyhow::Result<i64> {
        self.enqueue(NewJob {
            submitter_id,
            items: items.to_vec(),
            feed_hash: feed_hash.map(str::to_string),
            max_attempts: None,
        })
        .await
    }

    async fn try_insert(
        &self,
        job: &NewJob,
        payload: &str,
        max_attempts: i64,
    ) -> Result<i64, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO ingest_jobs
                (submitter_id, payload, status, attempts, max_attempts, feed_hash, created_at)
            VALUES (?1, ?2, 'pending', 0, ?3, ?4, ?5)
            RETURNING id
            "#,
        )
        .bind(job.submitter_id)
        .bind(payload)
        .bind(max_attempts)
        .bind(job.feed_hash.as_deref())
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(id)
    }

    // ----------------------------
    // Claim protocol
    // ----------------------------

    /// Claim the oldest eligible pending job: flip it to `in_progress` and
    /// bump `attempts`, atomically.
    ///
    /// Correctness: the select-then-update runs as a single UPDATE statement,
    /// which the store executes under its write lock, so concurrent claimers
    /// can never take the same row.
    pub async fn claim_one(&self) -> anyhow::Result<Option<ClaimedJob>> {
        let mut tx = self.pool.begin().await?;
        let claimed = sqlx::query_as::<_, Job>(
            r#"
            UPDATE ingest_jobs
            SET status = 'in_progress',
                attempts = attempts + 1
            WHERE id = (
                SELECT id
                FROM ingest_jobs
                WHERE status = 'pending'
                  AND (next_run IS NULL OR next_run <= ?1)
                ORDER BY id
                LIMIT 1
            )
            RETURNING *
            "#,
        )
        .bind(Utc::now())
        .fetch_optional(&mut *tx)
        .await?;
        tx.commit().await?;

        let Some(job) = claimed else {
            return Ok(None);
        };

        // A payload that no longer parses (out-of-band edits, partial
        // writes) must not wedge the row in `in_progress`: fail it here and
        // report nothing claimed.
        let items: Vec<Value> = match serde_json::from_str(&job.payload) {
            Ok(items) => items,
            Err(e) => {
                tracing::error!(job_id = job.id, error = %e, "unreadable payload, failing job");
                self.mark_failed(job.id, &format!("unreadable payload: {e}"), None)
                    .await?;
                return Ok(None);
            }
        };

        Ok(Some(ClaimedJob {
            id: job.id,
            submitter_id: job.submitter_id,
            items,
            // attempts as seen before this claim bumped it
            attempts: job.attempts - 1,
            max_attempts: job.max_attempts,
        }))
    }

    // ----------------------------
    // Reads
    // ----------------------------

    pub async fn get_job(&self, job_id: i64) -> anyhow::Result<Option<Job>> {
        let job = sqlx::query_as::<_, Job>("SELECT * FROM ingest_jobs WHERE id = ?1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(job)
    }

    /// Current `(attempts, max_attempts)` for a job. Re-read on the failure
    /// path because the counters may have moved since the claim.
    pub async fn attempt_counters(&self, job_id: i64) -> anyhow::Result<Option<(i64, i64)>> {
        let row = sqlx::query_as::<_, (i64, i64)>(
            "SELECT attempts, max_attempts FROM ingest_jobs WHERE id = ?1",
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Jobs currently eligible for claiming.
    pub async fn pending_depth(&self) -> anyhow::Result<i64> {
        let depth = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM ingest_jobs
            WHERE status = 'pending'
              AND (next_run IS NULL OR next_run <= ?1)
            "#,
        )
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        Ok(depth)
    }

    // ----------------------------
    // State transitions
    // ----------------------------

    pub async fn mark_done(
        &self,
        job_id: i64,
        diagnostics: Option<&str>,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE ingest_jobs
            SET status = 'done',
                processed_at = ?2,
                diagnostics = ?3
            WHERE id = ?1
            "#,
        )
        .bind(job_id)
        .bind(Utc::now())
        .bind(diagnostics)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn mark_failed(
        &self,
        job_id: i64,
        error: &str,
        diagnostics: Option<&str>,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE ingest_jobs
            SET status = 'failed',
                error = ?2,
                diagnostics = ?3
            WHERE id = ?1
            "#,
        )
        .bind(job_id)
        .bind(error)
        .bind(diagnostics)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn reschedule_for_retry(
        &self,
        job_id: i64,
        next_run: DateTime<Utc>,
        error: &str,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE ingest_jobs
            SET status = 'pending',
                next_run = ?2,
                error = ?3
            WHERE id = ?1
            "#,
        )
        .bind(job_id)
        .bind(next_run)
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ----------------------------
    // Diagnostics offloading
    // ----------------------------

    /// Decide where a diagnostics summary lives: inline on the job row when
    /// its serialized form fits the configured threshold, otherwise as a row
    /// in `ingest_diagnostics` with a pointer stored in its place.
    pub async fn store_diagnostics(
        &self,
        job_id: i64,
        summary: &Diagnostics,
    ) -> anyhow::Result<JobDiagnostics> {
        let serialized = serde_json::to_string(summary)?;

        if serialized.len() <= self.cfg.inline_diagnostics_max_bytes {
            return Ok(JobDiagnostics::Inline(summary.clone()));
        }

        let mut tx = self.pool.begin().await?;
        let record_id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO ingest_diagnostics (job_id, diagnostics, created_at)
            VALUES (?1, ?2, ?3)
            RETURNING id
            "#,
        )
        .bind(job_id)
        .bind(&serialized)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        tracing::debug!(
            job_id,
            record_id,
            bytes = serialized.len(),
            "diagnostics offloaded"
        );

        Ok(JobDiagnostics::Offloaded {
            diagnostics_ref: record_id,
        })
    }

    pub async fn get_diagnostics(
        &self,
        record_id: i64,
    ) -> anyhow::Result<Option<DiagnosticsRecord>> {
        let record = sqlx::query_as::<_, DiagnosticsRecord>(
            "SELECT * FROM ingest_diagnostics WHERE id = ?1",
        )
        .bind(record_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }
}
