use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use anyhow::anyhow;
use async_trait::async_trait;
use tokio::{sync::Mutex, time::Instant};

use crate::{StoreError, StoreResult, TtlStore};

/// Inserts sweep expired entries once the map holds this many keys.
const PRUNE_THRESHOLD: usize = 4096;
/// Longest expiry the store will track; larger TTLs are clamped.
const MAX_TTL: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn new(value: impl Into<String>, now: Instant, ttl: Duration) -> Self {
        Self {
            value: value.into(),
            expires_at: expiry(now, ttl),
        }
    }

    fn live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

fn expiry(now: Instant, ttl: Duration) -> Instant {
    now + ttl.min(MAX_TTL)
}

fn prune(map: &mut HashMap<String, Entry>, now: Instant) {
    if map.len() >= PRUNE_THRESHOLD {
        map.retain(|_, entry| entry.live(now));
    }
}

/// Process-local store used in tests or when Redis is not configured.
///
/// Reads skip expired entries; inserts sweep them out once the map grows past a threshold.
///
/// Expiries are tracked with [`tokio::time::Instant`], so paused-time tests can drive them
/// with `tokio::time::advance`.
#[derive(Clone, Default)]
pub struct MemoryTtlStore {
    inner: Arc<Mutex<HashMap<String, Entry>>>,
    offline: Arc<AtomicBool>,
}

impl MemoryTtlStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent operation fail with [`StoreError::Unavailable`] until reset.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub async fn purge_expired(&self) {
        let now = Instant::now();
        let mut guard = self.inner.lock().await;
        guard.retain(|_, entry| entry.live(now));
    }

    /// Sorted list of keys that have not expired.
    pub async fn live_keys(&self) -> Vec<String> {
        let now = Instant::now();
        let guard = self.inner.lock().await;
        let mut keys: Vec<String> = guard
            .iter()
            .filter(|(_, entry)| entry.live(now))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    fn check(&self, op: &'static str) -> StoreResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable(op, anyhow!("memory store offline")));
        }
        Ok(())
    }
}

#[async_trait]
impl TtlStore for MemoryTtlStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.check("get")?;
        let now = Instant::now();
        let guard = self.inner.lock().await;
        Ok(guard
            .get(key)
            .filter(|entry| entry.live(now))
            .map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        self.check("set")?;
        let now = Instant::now();
        let mut guard = self.inner.lock().await;
        prune(&mut guard, now);
        guard.insert(key.to_string(), Entry::new(value, now, ttl));
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool> {
        self.check("set_if_absent")?;
        let now = Instant::now();
        let mut guard = self.inner.lock().await;
        match guard.get(key) {
            Some(entry) if entry.live(now) => Ok(false),
            _ => {
                prune(&mut guard, now);
                guard.insert(key.to_string(), Entry::new(value, now, ttl));
                Ok(true)
            }
        }
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.check("delete")?;
        self.inner.lock().await.remove(key);
        Ok(())
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> StoreResult<bool> {
        self.check("compare_and_delete")?;
        let now = Instant::now();
        let mut guard = self.inner.lock().await;
        match guard.get(key) {
            Some(entry) if entry.live(now) && entry.value == expected => {
                guard.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn compare_and_expire(
        &self,
        key: &str,
        expected: &str,
        ttl: Duration,
    ) -> StoreResult<bool> {
        self.check("compare_and_expire")?;
        let now = Instant::now();
        let mut guard = self.inner.lock().await;
        match guard.get_mut(key) {
            Some(entry) if entry.live(now) && entry.value == expected => {
                entry.expires_at = expiry(now, ttl);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        self.check("expire")?;
        let now = Instant::now();
        let mut guard = self.inner.lock().await;
        match guard.get_mut(key) {
            Some(entry) if entry.live(now) => {
                entry.expires_at = expiry(now, ttl);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn increment(&self, key: &str, ttl: Duration) -> StoreResult<u64> {
        self.check("increment")?;
        let now = Instant::now();
        let mut guard = self.inner.lock().await;
        match guard.get_mut(key) {
            Some(entry) if entry.live(now) => {
                let current: u64 = entry.value.parse().map_err(|_| StoreError::InvalidValue {
                    key: key.to_string(),
                    reason: format!("counter holds non-integer {:?}", entry.value),
                })?;
                let next = current.saturating_add(1);
                entry.value = next.to_string();
                Ok(next)
            }
            _ => {
                prune(&mut guard, now);
                guard.insert(key.to_string(), Entry::new("1", now, ttl));
                Ok(1)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(5);

    #[tokio::test(start_paused = true)]
    async fn set_if_absent_respects_expiry() {
        let store = MemoryTtlStore::new();
        assert!(store.set_if_absent("k", "a", TTL).await.unwrap());
        assert!(!store.set_if_absent("k", "b", TTL).await.unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("a"));

        tokio::time::advance(TTL + Duration::from_millis(1)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(store.set_if_absent("k", "b", TTL).await.unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn compare_and_delete_requires_matching_value() {
        let store = MemoryTtlStore::new();
        store.set("k", "owner-a", TTL).await.unwrap();
        assert!(!store.compare_and_delete("k", "owner-b").await.unwrap());
        assert!(store.compare_and_delete("k", "owner-a").await.unwrap());
        assert!(!store.compare_and_delete("k", "owner-a").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn compare_and_expire_extends_only_for_owner() {
        let store = MemoryTtlStore::new();
        store.set("k", "owner-a", TTL).await.unwrap();
        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(!store.compare_and_expire("k", "owner-b", TTL).await.unwrap());
        assert!(store.compare_and_expire("k", "owner-a", TTL).await.unwrap());
        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("owner-a"));
    }

    #[tokio::test(start_paused = true)]
    async fn increment_keeps_first_window() {
        let store = MemoryTtlStore::new();
        assert_eq!(store.increment("c", TTL).await.unwrap(), 1);
        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(store.increment("c", TTL).await.unwrap(), 2);
        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(store.increment("c", TTL).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn increment_rejects_non_integer() {
        let store = MemoryTtlStore::new();
        store.set("c", "abc", TTL).await.unwrap();
        let err = store.increment("c", TTL).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidValue { .. }));
        assert!(!err.is_transient());
    }

    #[tokio::test(start_paused = true)]
    async fn expire_and_purge() {
        let store = MemoryTtlStore::new();
        store.set("a", "1", Duration::from_secs(1)).await.unwrap();
        store.set("b", "1", Duration::from_secs(10)).await.unwrap();
        assert!(store.expire("a", Duration::from_secs(20)).await.unwrap());
        assert!(!store.expire("missing", TTL).await.unwrap());
        tokio::time::advance(Duration::from_secs(11)).await;
        store.purge_expired().await;
        assert_eq!(store.live_keys().await, vec!["a".to_string()]);
        assert_eq!(store.inner.lock().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn inserts_sweep_expired_entries_past_threshold() {
        let store = MemoryTtlStore::new();
        for i in 0..PRUNE_THRESHOLD {
            store
                .set(&format!("k{i}"), "1", Duration::from_secs(1))
                .await
                .unwrap();
        }
        store.set("keep", "1", Duration::from_secs(60)).await.unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;

        assert_eq!(store.increment("counter", TTL).await.unwrap(), 1);
        assert_eq!(store.inner.lock().await.len(), 2);
        assert_eq!(
            store.live_keys().await,
            vec!["counter".to_string(), "keep".to_string()]
        );
    }

    #[tokio::test]
    async fn oversized_ttl_is_clamped() {
        let store = MemoryTtlStore::new();
        store.set("k", "v", Duration::MAX).await.unwrap();
        assert!(store.set_if_absent("n", "v", Duration::MAX).await.unwrap());
        assert!(store.expire("k", Duration::MAX).await.unwrap());
        assert!(store.compare_and_expire("n", "v", Duration::MAX).await.unwrap());
        assert_eq!(store.increment("c", Duration::MAX).await.unwrap(), 1);
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn offline_store_reports_unavailable() {
        let store = MemoryTtlStore::new();
        store.set_offline(true);
        let err = store.get("k").await.unwrap_err();
        assert!(err.is_transient());
        store.set_offline(false);
        assert_eq!(store.get("k").await.unwrap(), None);
    }
}
