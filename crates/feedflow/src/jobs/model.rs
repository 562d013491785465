use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One durable ingest job, as persisted in `ingest_jobs`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Job {
    pub id: i64,
    pub submitter_id: i64,
    pub payload: String,
    pub status: String,
    pub attempts: i64,
    pub max_attempts: i64,

    pub next_run: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub diagnostics: Option<String>,
    pub feed_hash: Option<String>,

    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Parsed view of the `diagnostics` column (inline summary or offload
    /// pointer); `None` if nothing has been recorded yet.
    pub fn job_diagnostics(&self) -> Option<JobDiagnostics> {
        self.diagnostics
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
    }
}

#[derive(Debug, Clone)]
pub struct NewJob {
    pub submitter_id: i64,
    pub items: Vec<Value>,
    pub feed_hash: Option<String>,
    /// `None` falls back to the queue default (5).
    pub max_attempts: Option<i64>,
}

/// What `claim_one` hands to the worker: the row flipped to `in_progress`
/// with its payload already deserialized. `attempts` is the pre-claim count.
#[derive(Debug, Clone)]
pub struct ClaimedJob {
    pub id: i64,
    pub submitter_id: i64,
    pub items: Vec<Value>,
    pub attempts: i64,
    pub max_attempts: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    InProgress,
    Done,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::InProgress => "in_progress",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
        }
    }
}

/// Per-job result summary recorded after processing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub accepted: u64,
    pub rejected: u64,
    pub errors: Vec<String>,
}

impl Diagnostics {
    pub fn rejected_batch(errors: Vec<String>) -> Self {
        Self {
            accepted: 0,
            rejected: errors.len() as u64,
            errors,
        }
    }

    pub fn applied(accepted: u64, errors: Vec<String>) -> Self {
        Self {
            accepted,
            rejected: errors.len() as u64,
            errors,
        }
    }
}

/// The `diagnostics` column stores either the summary itself or, when the
/// serialized summary is too large for the row, a pointer into
/// `ingest_diagnostics`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JobDiagnostics {
    Offloaded { diagnostics_ref: i64 },
    Inline(Diagnostics),
}

/// Offloaded diagnostics payload, read-only after creation.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DiagnosticsRecord {
    pub id: i64,
    pub job_id: i64,
    pub diagnostics: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_diagnostics_roundtrips_inline_and_pointer() {
        let inline = JobDiagnostics::Inline(Diagnostics::applied(3, vec!["Item 1: bad".into()]));
        let raw = serde_json::to_string(&inline).unwrap();
        assert_eq!(serde_json::from_str::<JobDiagnostics>(&raw).unwrap(), inline);

        let ptr = JobDiagnostics::Offloaded { diagnostics_ref: 42 };
        let raw = serde_json::to_string(&ptr).unwrap();
        assert!(raw.contains("diagnostics_ref"));
        assert_eq!(serde_json::from_str::<JobDiagnostics>(&raw).unwrap(), ptr);
    }
}
