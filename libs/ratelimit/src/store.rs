use std::time::Duration;

use async_trait::async_trait;
use bridge_core::{KeySpace, TenantId};
use bridge_store::{SharedTtlStore, StoreError};
use tracing::{debug, instrument};

use crate::{RateLimiter, reject, window_secs};

/// Fixed-window limiter shared by every process attached to the store.
#[derive(Clone)]
pub struct StoreRateLimiter {
    store: SharedTtlStore,
    keys: KeySpace,
}

impl StoreRateLimiter {
    pub fn new(store: SharedTtlStore, keys: KeySpace) -> Self {
        Self { store, keys }
    }
}

#[async_trait]
impl RateLimiter for StoreRateLimiter {
    #[instrument(
        name = "ratelimit.store.try_acquire",
        skip(self, tenant, window),
        fields(tenant = %tenant)
    )]
    async fn try_acquire(
        &self,
        tenant: &TenantId,
        resource: &str,
        limit: u64,
        window: Duration,
    ) -> Result<bool, StoreError> {
        let secs = window_secs(window);
        let key = self.keys.rate_limit(tenant, resource, secs);
        let count = self.store.increment(&key, Duration::from_secs(secs)).await?;
        if count > limit {
            debug!(count, limit, "rate limit exceeded");
            reject(tenant, resource);
            return Ok(false);
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bridge_store::MemoryTtlStore;

    use super::*;

    fn limiter() -> (Arc<MemoryTtlStore>, StoreRateLimiter) {
        let store = Arc::new(MemoryTtlStore::new());
        (store.clone(), StoreRateLimiter::new(store, KeySpace::default()))
    }

    #[tokio::test(start_paused = true)]
    async fn admits_exactly_limit_then_resets_with_window() {
        let (store, limiter) = limiter();
        let tenant = TenantId::from("t1");
        let window = Duration::from_secs(60);

        let mut admitted = 0;
        for _ in 0..10 {
            if limiter.try_acquire(&tenant, "api", 5, window).await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 5);
        assert_eq!(
            store.live_keys().await,
            vec!["tenant:t1:ratelimit:api:60".to_string()]
        );

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(!limiter.try_acquire(&tenant, "api", 5, window).await.unwrap());

        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(limiter.try_acquire(&tenant, "api", 5, window).await.unwrap());
    }

    #[tokio::test]
    async fn budgets_are_scoped_per_tenant_and_resource() {
        let (_store, limiter) = limiter();
        let window = Duration::from_secs(60);
        let t1 = TenantId::from("t1");
        let t2 = TenantId::from("t2");

        assert!(limiter.try_acquire(&t1, "api", 1, window).await.unwrap());
        assert!(!limiter.try_acquire(&t1, "api", 1, window).await.unwrap());
        assert!(limiter.try_acquire(&t1, "token", 1, window).await.unwrap());
        assert!(limiter.try_acquire(&t2, "api", 1, window).await.unwrap());
    }

    #[tokio::test]
    async fn zero_limit_rejects_everything() {
        let (_store, limiter) = limiter();
        assert!(
            !limiter
                .try_acquire(&TenantId::from("t1"), "api", 0, Duration::from_secs(1))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn store_outage_is_an_error() {
        let (store, limiter) = limiter();
        store.set_offline(true);
        let err = limiter
            .try_acquire(&TenantId::from("t1"), "api", 5, Duration::from_secs(60))
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }
}
