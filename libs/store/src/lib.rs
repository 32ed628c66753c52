//! Atomic TTL key-value store used as the single coordination primitive.
//!
//! Every component of the coordination core (locks, mappings, token cache, rate
//! counters) goes through [`TtlStore`]. Each operation is a single-key atomic
//! operation so adapters stay swappable and no multi-key transaction is required.

mod error;
mod memory;
#[cfg(feature = "redis-store")]
mod redis_store;

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use bridge_core::CoordinationConfig;
#[cfg(not(feature = "redis-store"))]
use tracing::warn;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryTtlStore;
#[cfg(feature = "redis-store")]
pub use redis_store::RedisTtlStore;

/// Shared store handle passed explicitly to every component.
pub type SharedTtlStore = Arc<dyn TtlStore>;

#[async_trait]
pub trait TtlStore: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Unconditionally writes `value` with the given expiry.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()>;

    /// Writes `value` only when no live entry exists. Returns `Ok(true)` when this call
    /// created the key.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool>;

    async fn delete(&self, key: &str) -> StoreResult<()>;

    /// Deletes the key only when it currently holds `expected`.
    async fn compare_and_delete(&self, key: &str, expected: &str) -> StoreResult<bool>;

    /// Resets the expiry only when the key currently holds `expected`.
    async fn compare_and_expire(&self, key: &str, expected: &str, ttl: Duration)
    -> StoreResult<bool>;

    /// Resets the expiry of a live key. Returns `Ok(false)` when the key is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool>;

    /// Atomically increments an integer counter. The TTL is applied only when this call
    /// created the counter, so the window is never extended by later increments.
    async fn increment(&self, key: &str, ttl: Duration) -> StoreResult<u64>;
}

/// Returns an in-memory store wrapped in an [`Arc`].
pub fn shared_memory_store() -> SharedTtlStore {
    Arc::new(MemoryTtlStore::new())
}

/// Builds a store from configuration.
///
/// If `REDIS_URL` is configured and the `redis-store` feature is enabled, a Redis-backed
/// store is created. Otherwise the function falls back to the in-memory implementation,
/// which only coordinates callers inside one process.
pub async fn store_from_config(cfg: &CoordinationConfig) -> StoreResult<SharedTtlStore> {
    match cfg.redis_url.as_deref() {
        Some(url) => build_redis_store(url).await,
        None => Ok(shared_memory_store()),
    }
}

#[cfg(feature = "redis-store")]
async fn build_redis_store(url: &str) -> StoreResult<SharedTtlStore> {
    let store = RedisTtlStore::connect(url).await?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "redis-store"))]
async fn build_redis_store(_url: &str) -> StoreResult<SharedTtlStore> {
    warn!("redis-store feature disabled; using in-memory ttl store");
    Ok(shared_memory_store())
}

/// Redis rejects zero expiries; anything shorter than a millisecond is rounded up.
pub(crate) fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis())
        .unwrap_or(u64::MAX)
        .clamp(1, i64::MAX as u64)
}
