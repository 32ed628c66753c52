use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use bridge_core::{CoordinationConfig, ManualClock, TenantId};
use bridge_retry::RemoteError;
use bridge_store::{MemoryTtlStore, SharedTtlStore};
use bridge_token::{FetchedToken, TokenCache};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn instances_on_one_store_share_tokens() {
    let store: SharedTtlStore = Arc::new(MemoryTtlStore::new());
    let clock = Arc::new(ManualClock::new(1_700_000_000_000));
    let cfg = CoordinationConfig::default();
    let first = TokenCache::from_config(store.clone(), &cfg).with_clock(clock.clone());
    let second = TokenCache::from_config(store.clone(), &cfg).with_clock(clock.clone());

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let fetcher = move |_tenant: TenantId| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(30)).await;
            Ok::<_, RemoteError>(FetchedToken::new("shared", Duration::from_secs(3600)))
        }
    };
    let tenant = TenantId::from("t1");

    let (a, b) = tokio::join!(
        first.get_token(&tenant, &fetcher),
        second.get_token(&tenant, &fetcher)
    );
    assert_eq!(a.unwrap(), "shared");
    assert_eq!(b.unwrap(), "shared");
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    first.invalidate(&tenant).await.unwrap();
    assert!(second.peek(&tenant).await.unwrap().is_none());

    clock.advance(Duration::from_secs(3600));
    second.get_token(&tenant, &fetcher).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}
