use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use bridge_core::{KeySpace, TenantId};
use bridge_store::{SharedTtlStore, StoreError};
use tracing::{info, warn};

use crate::{LocalRateLimiter, RateLimiter, StoreRateLimiter};

/// Store-backed limiter that degrades to [`LocalRateLimiter`] while the store fails
/// with a transient error.
pub struct HybridRateLimiter {
    remote: Arc<dyn RateLimiter>,
    local: LocalRateLimiter,
    remote_failed: AtomicBool,
}

impl HybridRateLimiter {
    pub fn new(remote: Arc<dyn RateLimiter>) -> Self {
        Self {
            remote,
            local: LocalRateLimiter::new(),
            remote_failed: AtomicBool::new(false),
        }
    }

    pub fn over_store(store: SharedTtlStore, keys: KeySpace) -> Arc<Self> {
        Arc::new(Self::new(Arc::new(StoreRateLimiter::new(store, keys))))
    }

    /// Whether the last shared-store attempt failed.
    pub fn is_degraded(&self) -> bool {
        self.remote_failed.load(Ordering::Acquire)
    }
}

#[async_trait]
impl RateLimiter for HybridRateLimiter {
    async fn try_acquire(
        &self,
        tenant: &TenantId,
        resource: &str,
        limit: u64,
        window: Duration,
    ) -> Result<bool, StoreError> {
        match self.remote.try_acquire(tenant, resource, limit, window).await {
            Ok(admitted) => {
                if self.remote_failed.swap(false, Ordering::AcqRel) {
                    info!("shared rate limiter recovered");
                }
                return Ok(admitted);
            }
            Err(err) if err.is_transient() => {
                if !self.remote_failed.swap(true, Ordering::AcqRel) {
                    warn!(error = %err, "shared rate limiter failed, switching to local fallback");
                }
            }
            Err(err) => return Err(err),
        }
        self.local.try_acquire(tenant, resource, limit, window).await
    }
}
