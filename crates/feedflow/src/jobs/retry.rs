use rand::Rng;
use std::time::Duration;

/// Backoff for the enqueue-side contention retry (insert hit a busy store).
#[derive(Debug, Clone)]
pub struct EnqueueRetryConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub jitter_pct: f64,
}

impl Default for EnqueueRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(50),
            jitter_pct: 0.15,
        }
    }
}

/// Delay before insert attempt `attempt_no + 1` (so `attempt_no` starts at 1):
/// base doubling per attempt, with multiplicative jitter in
/// `[1 - jitter_pct, 1 + jitter_pct]`.
pub fn enqueue_delay(attempt_no: u32, cfg: &EnqueueRetryConfig, rng: &mut impl Rng) -> Duration {
    let exp = attempt_no.max(1) - 1;
    let base_ms = cfg.base_delay.as_millis() as u64;
    let delay_ms = base_ms.saturating_mul(1u64.checked_shl(exp).unwrap_or(u64::MAX));

    let factor = rng.gen_range(1.0 - cfg.jitter_pct..=1.0 + cfg.jitter_pct);
    Duration::from_millis(((delay_ms as f64) * factor).round() as u64)
}

/// Backoff for rescheduling a job after a processing exception.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub jitter_low: f64,
    pub jitter_high: f64,
    pub max_delay_secs: i64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            jitter_low: 0.5,
            jitter_high: 1.5,
            max_delay_secs: 15 * 60,
        }
    }
}

/// Seconds until the job becomes claimable again: `max(1, 2^attempts)`
/// stretched by a uniform multiplier in `[jitter_low, jitter_high]`, floor 1s,
/// capped at `max_delay_secs`. `attempts` here is the post-claim count.
pub fn retry_delay_secs(attempts: i64, cfg: &RetryConfig, rng: &mut impl Rng) -> i64 {
    let exp = attempts.clamp(0, 62) as u32;
    let base = 1_i64.checked_shl(exp).unwrap_or(i64::MAX).max(1);

    let factor = rng.gen_range(cfg.jitter_low..=cfg.jitter_high);
    let jittered = ((base as f64) * factor).round() as i64;
    jittered.clamp(1, cfg.max_delay_secs)
}
