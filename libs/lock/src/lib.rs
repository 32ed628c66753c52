//! Distributed lock manager.
//!
//! Locks are plain store keys (`lock:{resource}`) holding a random ownership token and an
//! expiry. Any party may try to acquire; only the token holder may release or renew.
//! Expiry bounds how long a crashed holder can block a resource, at the price that two
//! holders may each believe they own the lock in disjoint windows after an expiry.
//! Critical sections must re-validate state after acquiring.

use std::time::Duration;

use bridge_core::{CoordinationConfig, KeySpace};
use bridge_store::{SharedTtlStore, StoreError};
use rand::Rng;
use thiserror::Error;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

const MAX_RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock on {resource} busy after {attempts} attempts")]
    Busy { resource: String, attempts: u32 },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl LockError {
    pub fn is_busy(&self) -> bool {
        matches!(self, LockError::Busy { .. })
    }
}

/// Ownership proof returned by [`LockManager::acquire`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockToken {
    resource: String,
    token: String,
}

impl LockToken {
    pub fn new(resource: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            token: token.into(),
        }
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockSettings {
    pub ttl: Duration,
    pub max_retries: u32,
    /// First backoff between acquisition attempts; doubles per attempt up to 1s.
    pub retry_delay: Duration,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(5),
            max_retries: 3,
            retry_delay: Duration::from_millis(100),
        }
    }
}

impl LockSettings {
    pub fn from_config(cfg: &CoordinationConfig) -> Self {
        Self {
            ttl: cfg.lock_ttl,
            max_retries: cfg.lock_retry_count,
            retry_delay: cfg.lock_retry_delay,
        }
    }
}

#[derive(Clone)]
pub struct LockManager {
    store: SharedTtlStore,
    keys: KeySpace,
    settings: LockSettings,
}

impl LockManager {
    pub fn new(store: SharedTtlStore, keys: KeySpace, settings: LockSettings) -> Self {
        Self {
            store,
            keys,
            settings,
        }
    }

    pub fn settings(&self) -> &LockSettings {
        &self.settings
    }

    /// Acquires `resource` with the configured TTL and retry count.
    pub async fn acquire_default(&self, resource: &str) -> Result<LockToken, LockError> {
        self.acquire(resource, self.settings.ttl, self.settings.max_retries)
            .await
    }

    /// Tries `1 + max_retries` times to create the lock key, backing off with jitter
    /// between attempts.
    #[instrument(name = "lock.acquire", skip(self, resource), fields(resource = %resource))]
    pub async fn acquire(
        &self,
        resource: &str,
        ttl: Duration,
        max_retries: u32,
    ) -> Result<LockToken, LockError> {
        let key = self.keys.lock(resource);
        let token = Uuid::new_v4().to_string();
        let mut attempt: u32 = 0;
        loop {
            if self.store.set_if_absent(&key, &token, ttl).await? {
                debug!(attempt, ttl_ms = ttl.as_millis() as u64, "lock acquired");
                return Ok(LockToken::new(resource, token));
            }
            if attempt >= max_retries {
                break;
            }
            let delay = self.backoff(attempt);
            attempt += 1;
            debug!(attempt, max_retries, delay_ms = delay.as_millis() as u64, "lock busy, retrying");
            tokio::time::sleep(delay).await;
        }
        metrics::counter!("lock_busy_total").increment(1);
        if max_retries > 0 {
            warn!(attempts = attempt + 1, "failed to acquire lock after retries");
        } else {
            debug!("lock busy");
        }
        Err(LockError::Busy {
            resource: resource.to_string(),
            attempts: attempt + 1,
        })
    }

    /// Deletes the lock only if `lock` still owns it. Returns `false` when the lock had
    /// already expired or passed to another holder.
    pub async fn release(&self, lock: &LockToken) -> Result<bool, LockError> {
        let key = self.keys.lock(&lock.resource);
        let released = self.store.compare_and_delete(&key, &lock.token).await?;
        if released {
            debug!(resource = %lock.resource, "lock released");
        } else {
            warn!(resource = %lock.resource, "lock no longer owned at release");
        }
        Ok(released)
    }

    /// Extends the expiry only if `lock` still owns it.
    pub async fn renew(&self, lock: &LockToken, ttl: Duration) -> Result<bool, LockError> {
        let key = self.keys.lock(&lock.resource);
        let renewed = self
            .store
            .compare_and_expire(&key, &lock.token, ttl)
            .await?;
        if !renewed {
            metrics::counter!("lock_lost_total").increment(1);
            warn!(resource = %lock.resource, "lock lost before renewal");
        }
        Ok(renewed)
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let exp = self
            .settings
            .retry_delay
            .saturating_mul(1u32 << attempt.min(10))
            .min(MAX_RETRY_DELAY);
        let half = (exp.as_millis() / 2) as u64;
        Duration::from_millis(half + rand::rng().random_range(0..=half))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bridge_store::{MemoryTtlStore, TtlStore};

    use super::*;

    fn manager(store: Arc<MemoryTtlStore>) -> LockManager {
        LockManager::new(store, KeySpace::default(), LockSettings::default())
    }

    #[tokio::test(start_paused = true)]
    async fn second_acquirer_gets_busy() {
        let store = Arc::new(MemoryTtlStore::new());
        let locks = manager(store.clone());
        let held = locks.acquire_default("tenant:t1:mapping:wa-1").await.unwrap();
        assert_eq!(held.resource(), "tenant:t1:mapping:wa-1");
        assert_eq!(
            store.live_keys().await,
            vec!["lock:tenant:t1:mapping:wa-1".to_string()]
        );

        let err = locks
            .acquire("tenant:t1:mapping:wa-1", Duration::from_secs(30), 3)
            .await
            .unwrap_err();
        match err {
            LockError::Busy { attempts, .. } => assert_eq!(attempts, 4),
            other => panic!("expected busy, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn release_requires_owner_token() {
        let store = Arc::new(MemoryTtlStore::new());
        let locks = manager(store.clone());
        let held = locks.acquire_default("r").await.unwrap();
        let forged = LockToken::new("r", "holder-b");
        assert!(!locks.release(&forged).await.unwrap());
        assert!(store.get("lock:r").await.unwrap().is_some());
        assert!(locks.release(&held).await.unwrap());
        assert!(store.get("lock:r").await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn expired_lock_can_be_taken_and_stale_holder_loses_it() {
        let store = Arc::new(MemoryTtlStore::new());
        let locks = manager(store);
        let a = locks.acquire("r", Duration::from_secs(5), 0).await.unwrap();
        tokio::time::advance(Duration::from_secs(6)).await;

        let b = locks.acquire("r", Duration::from_secs(5), 0).await.unwrap();
        assert_ne!(a.token(), b.token());
        assert!(!locks.renew(&a, Duration::from_secs(5)).await.unwrap());
        assert!(!locks.release(&a).await.unwrap());
        assert!(locks.release(&b).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn renew_extends_expiry() {
        let store = Arc::new(MemoryTtlStore::new());
        let locks = manager(store);
        let a = locks.acquire("r", Duration::from_secs(5), 0).await.unwrap();
        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(locks.renew(&a, Duration::from_secs(5)).await.unwrap());
        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(locks.acquire("r", Duration::from_secs(5), 0).await.unwrap_err().is_busy());
    }

    #[tokio::test]
    async fn store_failure_is_not_busy() {
        let store = Arc::new(MemoryTtlStore::new());
        store.set_offline(true);
        let err = manager(store).acquire_default("r").await.unwrap_err();
        assert!(matches!(err, LockError::Store(_)));
    }

    #[test]
    fn backoff_is_capped() {
        let locks = manager(Arc::new(MemoryTtlStore::new()));
        for attempt in 0..20 {
            let delay = locks.backoff(attempt);
            assert!(delay <= MAX_RETRY_DELAY);
            assert!(delay >= Duration::from_millis(50));
        }
    }
}
