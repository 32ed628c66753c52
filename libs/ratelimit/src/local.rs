use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use bridge_core::TenantId;
use bridge_store::StoreError;
use tokio::{sync::Mutex, time::Instant};

use crate::{RateLimiter, reject, window_secs};

const PRUNE_THRESHOLD: usize = 1024;

/// Process-local fixed windows. Each process enforces the full budget on its own, so a
/// fleet of N processes admits up to N times the limit.
#[derive(Clone, Default)]
pub struct LocalRateLimiter {
    windows: Arc<Mutex<HashMap<String, Window>>>,
}

#[derive(Debug)]
struct Window {
    started: Instant,
    length: Duration,
    count: u64,
}

impl Window {
    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.started) >= self.length
    }
}

impl LocalRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RateLimiter for LocalRateLimiter {
    async fn try_acquire(
        &self,
        tenant: &TenantId,
        resource: &str,
        limit: u64,
        window: Duration,
    ) -> Result<bool, StoreError> {
        let secs = window_secs(window);
        let key = format!("{tenant}:{resource}:{secs}");
        let now = Instant::now();

        let mut guard = self.windows.lock().await;
        if guard.len() >= PRUNE_THRESHOLD {
            guard.retain(|_, window| !window.is_expired(now));
        }
        let entry = guard.entry(key).or_insert(Window {
            started: now,
            length: Duration::from_secs(secs),
            count: 0,
        });
        if entry.is_expired(now) {
            entry.started = now;
            entry.count = 0;
        }
        entry.count += 1;
        let admitted = entry.count <= limit;
        drop(guard);

        if !admitted {
            reject(tenant, resource);
        }
        Ok(admitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn local_windows_reset() {
        let limiter = LocalRateLimiter::new();
        let tenant = TenantId::from("t1");
        let window = Duration::from_secs(10);

        for _ in 0..3 {
            assert!(limiter.try_acquire(&tenant, "api", 3, window).await.unwrap());
        }
        assert!(!limiter.try_acquire(&tenant, "api", 3, window).await.unwrap());
        assert!(limiter.try_acquire(&tenant, "other", 3, window).await.unwrap());

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(limiter.try_acquire(&tenant, "api", 3, window).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn expired_windows_are_pruned() {
        let limiter = LocalRateLimiter::new();
        let window = Duration::from_secs(1);
        for n in 0..PRUNE_THRESHOLD {
            let tenant = TenantId::new(format!("t{n}"));
            limiter.try_acquire(&tenant, "api", 1, window).await.unwrap();
        }
        tokio::time::advance(Duration::from_secs(2)).await;
        limiter
            .try_acquire(&TenantId::from("fresh"), "api", 1, window)
            .await
            .unwrap();
        assert_eq!(limiter.windows.lock().await.len(), 1);
    }
}
