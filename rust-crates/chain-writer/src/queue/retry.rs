use rand::Rng;
use std::time::Duration;

/// Backoff schedule for failed submissions.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_millis(30_000),
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt` (0-indexed): exponential from
    /// `base_delay`, capped at `max_delay`, plus up to 10% random jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.min(32);
        let base_ms = self.base_delay.as_millis() as u64;
        let cap_ms = self.max_delay.as_millis() as u64;
        let delay_ms = base_ms.saturating_mul(factor).min(cap_ms);
        let jitter_ms = (delay_ms as f64 * rand::rng().random_range(0.0..=0.1)) as u64;
        Duration::from_millis(delay_ms + jitter_ms)
    }
}
