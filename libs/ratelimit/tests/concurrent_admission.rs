use std::{sync::Arc, time::Duration};

use bridge_core::{CoordinationConfig, KeySpace, TenantId};
use bridge_ratelimit::{RateLimit, RateLimiter, RateLimits, StoreRateLimiter};
use bridge_store::MemoryTtlStore;
use futures::future::join_all;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_never_exceed_the_limit() {
    let store = Arc::new(MemoryTtlStore::new());
    let limiter = Arc::new(StoreRateLimiter::new(store, KeySpace::default()));

    let handles = (0..50)
        .map(|_| {
            let limiter = limiter.clone();
            tokio::spawn(async move {
                limiter
                    .try_acquire(&TenantId::from("t1"), "genesys", 10, Duration::from_secs(60))
                    .await
            })
        })
        .collect::<Vec<_>>();

    let admitted = join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.expect("task panicked").expect("store failed"))
        .filter(|admitted| *admitted)
        .count();
    assert_eq!(admitted, 10);
}

#[tokio::test]
async fn configured_budgets_apply_through_check() {
    let store = Arc::new(MemoryTtlStore::new());
    let limiter = StoreRateLimiter::new(store, KeySpace::new(Some("bridge".into())));
    let limits = RateLimits::from_lookup(&CoordinationConfig::default(), |_| None).with_override(
        "t1",
        "genesys",
        RateLimit {
            limit: 2,
            window: Duration::from_secs(60),
        },
    );
    let tenant = TenantId::from("t1");

    assert!(limits.check(&limiter, &tenant, "genesys").await.unwrap());
    assert!(limits.check(&limiter, &tenant, "genesys").await.unwrap());
    assert!(!limits.check(&limiter, &tenant, "genesys").await.unwrap());
    assert!(limits.check(&limiter, &tenant, "whatsapp").await.unwrap());
}
