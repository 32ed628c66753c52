#![cfg(feature = "redis-store")]

use std::time::Duration;

use bridge_store::{RedisTtlStore, TtlStore};

async fn connect() -> Option<RedisTtlStore> {
    let url = std::env::var("REDIS_URL").ok()?;
    Some(RedisTtlStore::connect(&url).await.expect("connect redis"))
}

fn unique(prefix: &str) -> String {
    format!("bridge-test:{prefix}:{}", std::process::id())
}

#[tokio::test]
#[ignore = "requires REDIS_URL"]
async fn redis_set_if_absent_and_compare_and_delete() {
    let Some(store) = connect().await else {
        return;
    };
    let key = unique("lock");
    store.delete(&key).await.unwrap();
    assert!(
        store
            .set_if_absent(&key, "a", Duration::from_secs(5))
            .await
            .unwrap()
    );
    assert!(
        !store
            .set_if_absent(&key, "b", Duration::from_secs(5))
            .await
            .unwrap()
    );
    assert!(!store.compare_and_delete(&key, "b").await.unwrap());
    assert!(
        store
            .compare_and_expire(&key, "a", Duration::from_secs(10))
            .await
            .unwrap()
    );
    assert!(store.compare_and_delete(&key, "a").await.unwrap());
    assert_eq!(store.get(&key).await.unwrap(), None);
}

#[tokio::test]
#[ignore = "requires REDIS_URL"]
async fn redis_increment_sets_ttl_once() {
    let Some(store) = connect().await else {
        return;
    };
    let key = unique("counter");
    store.delete(&key).await.unwrap();
    assert_eq!(
        store
            .increment(&key, Duration::from_millis(300))
            .await
            .unwrap(),
        1
    );
    assert_eq!(
        store
            .increment(&key, Duration::from_secs(60))
            .await
            .unwrap(),
        2
    );
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(store.get(&key).await.unwrap(), None);
}
