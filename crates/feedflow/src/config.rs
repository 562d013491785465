use crate::jobs::repo::QueueConfig;
use crate::jobs::retry::{EnqueueRetryConfig, RetryConfig};
use crate::jobs::runner::WorkerConfig;
use std::time::Duration;

/// Runtime configuration for the worker daemon, loaded from `FEEDFLOW_*`
/// environment variables (with bare fallbacks) and `.env` via dotenvy.
#[derive(Clone, Debug)]
pub struct Config {
    pub database_path: String,
    pub poll_interval_ms: u64,
    pub default_max_attempts: i64,
    pub inline_diagnostics_max_bytes: usize,
    pub enqueue_retry_max_attempts: u32,
    pub enqueue_retry_base_delay_ms: u64,
    pub migrate_on_startup: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_path = env_or_fallback("FEEDFLOW_DB", "DATABASE_PATH")
            .unwrap_or_else(|| "feedflow.sqlite".to_string());

        let poll_interval_ms = env_or_fallback("FEEDFLOW_POLL_INTERVAL_MS", "POLL_INTERVAL_MS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(250);

        let default_max_attempts = env_or_fallback("FEEDFLOW_MAX_ATTEMPTS", "MAX_ATTEMPTS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(5);

        let inline_diagnostics_max_bytes =
            env_or_fallback("FEEDFLOW_INLINE_DIAGNOSTICS_MAX_BYTES", "INLINE_DIAGNOSTICS_MAX_BYTES")
                .and_then(|s| s.parse().ok())
                .unwrap_or(2000);

        let enqueue_retry_max_attempts =
            env_or_fallback("FEEDFLOW_ENQUEUE_RETRY_MAX_ATTEMPTS", "ENQUEUE_RETRY_MAX_ATTEMPTS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(5);

        let enqueue_retry_base_delay_ms =
            env_or_fallback("FEEDFLOW_ENQUEUE_RETRY_BASE_DELAY_MS", "ENQUEUE_RETRY_BASE_DELAY_MS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(50);

        let migrate_on_startup = env_bool("FEEDFLOW_MIGRATE_ON_STARTUP").unwrap_or(true);

        Ok(Self {
            database_path,
            poll_interval_ms,
            default_max_attempts,
            inline_diagnostics_max_bytes,
            enqueue_retry_max_attempts,
            enqueue_retry_base_delay_ms,
            migrate_on_startup,
        })
    }

    pub fn queue_config(&self) -> QueueConfig {
        QueueConfig {
            default_max_attempts: self.default_max_attempts,
            inline_diagnostics_max_bytes: self.inline_diagnostics_max_bytes,
            enqueue_retry: EnqueueRetryConfig {
                max_attempts: self.enqueue_retry_max_attempts,
                base_delay: Duration::from_millis(self.enqueue_retry_base_delay_ms),
                ..EnqueueRetryConfig::default()
            },
        }
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            retry: RetryConfig::default(),
        }
    }
}

fn env_or_fallback(primary: &str, fallback: &str) -> Option<String> {
    std::env::var(primary)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .or_else(|| std::env::var(fallback).ok().filter(|s| !s.trim().is_empty()))
}

fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}
