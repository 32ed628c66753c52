//! Per-tenant rate limiting for outbound partner calls.
//!
//! The shared limiter is a fixed-window counter in the TTL store: the first caller in a
//! window creates `tenant:{tenant}:ratelimit:{resource}:{window}` with the window as TTL,
//! later callers increment it, and the window resets when the key expires. Over-limit
//! calls are reported as `Ok(false)`; rejection is a control-flow signal, not an error.
//!
//! [`HybridRateLimiter`] keeps admission working on a per-process budget while the
//! store is unreachable.

mod hybrid;
mod limits;
mod local;
mod store;

use std::time::Duration;

use async_trait::async_trait;
use bridge_core::TenantId;
use bridge_store::StoreError;

pub use hybrid::HybridRateLimiter;
pub use limits::{RateLimit, RateLimits};
pub use local::LocalRateLimiter;
pub use store::StoreRateLimiter;

#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Counts one call against `(tenant, resource, window)` and reports whether it is
    /// within `limit`. Rejected calls are still counted.
    async fn try_acquire(
        &self,
        tenant: &TenantId,
        resource: &str,
        limit: u64,
        window: Duration,
    ) -> Result<bool, StoreError>;
}

/// Windows shorter than a second are rounded up; keys and TTLs use whole seconds.
pub(crate) fn window_secs(window: Duration) -> u64 {
    window.as_secs().max(1)
}

pub(crate) fn reject(tenant: &TenantId, resource: &str) {
    metrics::counter!(
        "ratelimit_rejected_total",
        "tenant" => tenant.to_string(),
        "resource" => resource.to_string()
    )
    .increment(1);
}
