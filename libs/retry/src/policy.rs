use std::time::Duration;

use bridge_core::CoordinationConfig;

const MAX_SHIFT: u32 = 16;

/// Bounded exponential backoff: `base_delay * 2^(attempt-1)`, never above `max_delay`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; total attempts are `max_retries + 1`.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(cfg: &CoordinationConfig) -> Self {
        Self {
            max_retries: cfg.retry_max_retries,
            base_delay: cfg.retry_base_delay,
            max_delay: cfg.retry_max_delay.max(cfg.retry_base_delay),
        }
    }

    /// Sleep before the retry that follows failed attempt `attempt` (1-based).
    ///
    /// ```
    /// use std::time::Duration;
    /// use bridge_retry::RetryPolicy;
    ///
    /// let policy = RetryPolicy::default();
    /// assert_eq!(policy.delay_for(1), Duration::from_secs(1));
    /// assert_eq!(policy.delay_for(3), Duration::from_secs(4));
    /// assert_eq!(policy.delay_for(12), Duration::from_secs(30));
    /// ```
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(MAX_SHIFT); // prevent overflow
        let base_ms = self.base_delay.as_millis().min(u128::from(u64::MAX)) as u64;
        let delay = Duration::from_millis(base_ms.saturating_mul(1u64 << shift));
        delay.min(self.max_delay)
    }
}
