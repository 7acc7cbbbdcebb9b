use proxypool_core::lease::{AcquireFilters, LeaseManager};
use proxypool_core::models::ProxyRecord;
use proxypool_core::storage::ProxyStore;
use std::sync::Arc;
use std::time::Duration;

fn candidate(endpoint: &str, score: i32) -> ProxyRecord {
    let mut r = ProxyRecord::new_candidate(endpoint, 0);
    r.score = score;
    r
}

async fn seeded_manager(records: Vec<ProxyRecord>) -> Arc<LeaseManager> {
    let store = Arc::new(ProxyStore::open_in_memory().unwrap());
    store.upsert(records).await.unwrap();
    let manager = Arc::new(LeaseManager::new(store));
    manager.load().await.unwrap();
    manager
}

#[tokio::test]
async fn concurrent_acquire_is_exclusive() {
    let manager = seeded_manager(vec![candidate("1.1.1.1:80", 90)]).await;

    let a = manager.clone();
    let b = manager.clone();
    let (first, second) = tokio::join!(
        a.acquire(AcquireFilters::default(), "task-a".to_string(), 1_000),
        b.acquire(AcquireFilters::default(), "task-b".to_string(), 1_000),
    );

    let successes = [first.is_ok(), second.is_ok()].iter().filter(|ok| **ok).count();
    assert_eq!(successes, 1, "exactly one concurrent acquire should win the single idle proxy");
}

#[tokio::test]
async fn release_with_mismatched_task_id_still_transitions() {
    let manager = seeded_manager(vec![candidate("2.2.2.2:80", 90)]).await;
    manager
        .acquire(AcquireFilters::default(), "real-task".to_string(), 1_000)
        .await
        .unwrap();

    manager.release("2.2.2.2:80", "someone-elses-task", true, 1_001).await.unwrap();

    let reacquired = manager
        .acquire(AcquireFilters::default(), "task-2".to_string(), 1_002)
        .await;
    assert!(reacquired.is_ok(), "mismatched release still frees the slot");
}

#[tokio::test]
async fn heartbeat_mismatch_does_not_free_the_lease() {
    let manager = seeded_manager(vec![candidate("3.3.3.3:80", 90)]).await;
    manager
        .acquire(AcquireFilters::default(), "real-task".to_string(), 1_000)
        .await
        .unwrap();

    assert!(manager.heartbeat("3.3.3.3:80", "wrong-task", 1_001).await.is_err());

    let reacquired = manager
        .acquire(AcquireFilters::default(), "task-2".to_string(), 1_002)
        .await;
    assert!(reacquired.is_err(), "lease remains busy after a rejected heartbeat");
}

#[tokio::test]
async fn reaper_reclaims_and_frees_stale_leases() {
    let manager = seeded_manager(vec![candidate("4.4.4.4:80", 90)]).await;
    manager
        .acquire(AcquireFilters::default(), "real-task".to_string(), 1_000)
        .await
        .unwrap();

    let reaped = manager.reap_stale_leases(1, 1_000 + 2).await;
    assert_eq!(reaped, 1);

    // Reaping marks the lease dead but does not free the slot for reuse.
    let still_exhausted = manager
        .acquire(AcquireFilters::default(), "task-2".to_string(), 1_003)
        .await;
    assert!(still_exhausted.is_err(), "a dead proxy is not selectable");

    // The sixth-cycle cleanup removes it from the index entirely.
    let cleaned = manager.cleanup_dead().await;
    assert_eq!(cleaned, 1);
    let after_cleanup = manager
        .acquire(AcquireFilters::default(), "task-3".to_string(), 1_005)
        .await;
    assert!(after_cleanup.is_err(), "the endpoint is gone from the index, not reselectable");
}

#[tokio::test]
async fn acquire_filters_by_min_score_and_protocol() {
    let mut low = candidate("5.5.5.5:80", 10);
    low.protocols.insert(proxypool_core::models::Protocol::Http);
    let mut high = candidate("6.6.6.6:80", 90);
    high.protocols.insert(proxypool_core::models::Protocol::Socks5);
    let manager = seeded_manager(vec![low, high]).await;

    let filters = AcquireFilters {
        min_score: Some(50),
        protocol: Some(proxypool_core::models::Protocol::Socks5),
        ..Default::default()
    };
    let result = manager.acquire(filters, "task-1".to_string(), 1_000).await.unwrap();
    assert_eq!(result.endpoint, "6.6.6.6:80");
}

// Give the reaper path a tick to breathe in CI without flaking.
#[tokio::test]
async fn spawned_reaper_tick_runs_without_panicking() {
    let manager = seeded_manager(vec![candidate("7.7.7.7:80", 90)]).await;
    let store = Arc::new(ProxyStore::open_in_memory().unwrap());
    let signal = proxypool_core::signal::SignalBus::new();
    let handle = LeaseManager::spawn_reaper(manager.clone(), store, signal.clone(), Duration::from_millis(20), 3_600);
    tokio::time::sleep(Duration::from_millis(60)).await;
    signal.trip();
    let _ = tokio::time::timeout(Duration::from_secs(1), handle).await;
}
