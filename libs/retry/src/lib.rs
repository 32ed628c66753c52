//! Retry executor wrapping outbound calls to partner platforms.
//!
//! Failures are classified exactly once, at the call site, through the executor's
//! retryability predicate. Callers above the executor only see the final error.

mod error;
mod policy;

use std::{fmt::Display, future::Future};

use tracing::{error, warn};

pub use error::{RemoteError, TransportFailure};
pub use policy::RetryPolicy;

/// Runs fallible async operations under a [`RetryPolicy`].
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Retries `op` while it fails with a retryable [`RemoteError`].
    pub async fn execute<T, F, Fut>(&self, label: &str, op: F) -> Result<T, RemoteError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        self.execute_with(label, RemoteError::is_retryable, op).await
    }

    /// Retries `op` while `is_retryable` accepts the error and attempts remain.
    ///
    /// Attempt `n` (1-based) that fails is followed by a sleep of
    /// `base_delay * 2^(n-1)`, capped at `max_delay`. Non-retryable errors are returned
    /// immediately and unchanged.
    pub async fn execute_with<T, E, F, Fut, P>(
        &self,
        label: &str,
        is_retryable: P,
        mut op: F,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: Display,
    {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if !is_retryable(&err) {
                        return Err(err);
                    }
                    if attempt > self.policy.max_retries {
                        error!(operation = label, attempts = attempt, error = %err, "retries exhausted");
                        return Err(err);
                    }
                    let delay = self.policy.delay_for(attempt);
                    warn!(
                        operation = label,
                        attempt,
                        max_retries = self.policy.max_retries,
                        next_retry_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying after transient failure"
                    );
                    metrics::counter!("retry_attempt_total", "operation" => label.to_string())
                        .increment(1);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
