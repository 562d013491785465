pub mod metrics;
pub mod model;
pub mod repo;
pub mod retry;
pub mod runner;

pub use metrics::{Counter, Metrics, MetricsSnapshot};
pub use model::{
    ClaimedJob, Diagnostics, DiagnosticsRecord, Job, JobDiagnostics, JobStatus, NewJob,
};
pub use repo::{JobsRepo, QueueConfig};
pub use runner::{IngestHooks, JobOutcome, StopSignal, Worker, WorkerConfig, WorkerHandle};
