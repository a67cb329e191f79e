//! Integration tests against a live Redis
//!
//! These tests require a running Redis instance.
//! Run with: cargo test -p notification-bus --test redis_integration_tests -- --ignored

use broadcast_channel::{BroadcastPublisher, BroadcastSubscriber};
use notification_bus::{
    remote_unread_feed, NotificationBus, NotificationObserver, RedisStorage, Storage,
};
use std::sync::Arc;
use std::time::Duration;

const REDIS_URL: &str = "redis://127.0.0.1:6379";

fn unique(prefix: &str) -> String {
    format!(
        "{}-{}-{}",
        prefix,
        std::process::id(),
        chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
    )
}

#[tokio::test]
#[ignore] // Requires Redis server
async fn test_redis_compare_and_swap() {
    let storage = RedisStorage::new(REDIS_URL, unique("cas"))
        .await
        .expect("Failed to connect to Redis");

    assert!(storage.compare_and_swap("k", None, "v1").await.unwrap());
    assert!(!storage.compare_and_swap("k", None, "v2").await.unwrap());
    assert!(!storage.compare_and_swap("k", Some("stale"), "v2").await.unwrap());
    assert!(storage.compare_and_swap("k", Some("v1"), "v2").await.unwrap());
    assert_eq!(storage.get("k").await.unwrap().as_deref(), Some("v2"));

    storage.remove("k").await.unwrap();
    assert_eq!(storage.get("k").await.unwrap(), None);
}

#[tokio::test]
#[ignore] // Requires Redis server
async fn test_two_buses_share_redis_state() {
    let prefix = unique("shared");
    let a = NotificationBus::new(Arc::new(RedisStorage::new(REDIS_URL, &prefix).await.unwrap()));
    let b = NotificationBus::new(Arc::new(RedisStorage::new(REDIS_URL, &prefix).await.unwrap()));

    let mut tasks = Vec::new();
    for (name, bus) in [("a", Arc::new(a)), ("b", Arc::new(b))] {
        tasks.push(tokio::spawn(async move {
            for i in 0..10 {
                bus.publish_info(format!("{}-{}", name, i)).await.unwrap();
            }
            bus
        }));
    }

    let mut buses = Vec::new();
    for task in tasks {
        buses.push(task.await.unwrap());
    }

    assert_eq!(buses[0].list().await.len(), 20);
    buses[1].clear_all().await.unwrap();
    assert_eq!(buses[0].hydrate().await.unread, 0);
}

#[tokio::test]
#[ignore] // Requires Redis server
async fn test_observer_refreshes_on_cross_process_broadcast() {
    let prefix = unique("observer");
    let channel = unique("lynkr_notifications");

    let writer_storage = Arc::new(RedisStorage::new(REDIS_URL, &prefix).await.unwrap());
    let publisher = BroadcastPublisher::new(REDIS_URL, &channel, "writer".to_string())
        .await
        .unwrap();
    let writer = NotificationBus::new(writer_storage).with_broadcaster(Arc::new(publisher));

    let reader = Arc::new(NotificationBus::new(Arc::new(
        RedisStorage::new(REDIS_URL, &prefix).await.unwrap(),
    )));
    let subscriber = BroadcastSubscriber::new(REDIS_URL, &channel)
        .await
        .unwrap()
        .ignoring_origin("reader");
    let (feed, handle) = remote_unread_feed(&subscriber).await.unwrap();

    let observer = NotificationObserver::spawn(reader, Some(feed)).await;
    let mut views = observer.watch();

    // let the subscription settle before publishing
    tokio::time::sleep(Duration::from_millis(200)).await;
    writer.publish_info("over the wire").await.unwrap();

    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            views.changed().await.unwrap();
            if views.borrow_and_update().unread == 1 {
                break;
            }
        }
    })
    .await
    .expect("Cross-process update never arrived");

    observer.shutdown().await;
    subscriber.unsubscribe(handle);
}
