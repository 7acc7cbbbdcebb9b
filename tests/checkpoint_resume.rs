use proxypool_core::checkpoint::CheckpointManager;
use proxypool_core::config::InterruptConfig;
use proxypool_core::models::{CheckpointKind, ProxyRecord};
use proxypool_core::storage::ProxyStore;
use tempfile::tempdir;

fn config_for(dir: &std::path::Path) -> InterruptConfig {
    InterruptConfig {
        interrupt_dir: dir.to_string_lossy().to_string(),
        ..InterruptConfig::default()
    }
}

/// A crawl interrupted mid-batch resumes with exactly the unvisited
/// remainder on the next startup, and the file disappears once the last
/// candidate is scored.
#[tokio::test]
async fn interrupted_crawl_resumes_with_exact_remainder() {
    let tmp = tempdir().unwrap();
    let manager = CheckpointManager::new(&config_for(tmp.path())).unwrap();
    let store = ProxyStore::open_in_memory().unwrap();

    let mut record = manager
        .start(
            CheckpointKind::Crawl,
            "auto",
            vec!["1.1.1.1:80".into(), "2.2.2.2:80".into(), "3.3.3.3:80".into()],
        )
        .unwrap();

    record.remainder.remove(0);
    manager.rewrite(&record).unwrap();

    let outcome = manager.startup(CheckpointKind::Crawl, &store).await.unwrap();
    let resumed = outcome.record.expect("two candidates remain");
    assert_eq!(resumed.remainder, vec!["2.2.2.2:80".to_string(), "3.3.3.3:80".to_string()]);

    let mut finishing = resumed;
    finishing.remainder.clear();
    manager.rewrite(&finishing).unwrap();
    manager.finish(CheckpointKind::Crawl).unwrap();

    let after_finish = manager.startup(CheckpointKind::Crawl, &store).await.unwrap();
    assert!(after_finish.record.is_none());
}

/// A security-refresh checkpoint whose remainder references an endpoint
/// that has since been purged from the Store is filtered on startup, and
/// the dropped endpoints are reported back for logging.
#[tokio::test]
async fn security_checkpoint_drops_purged_endpoints_on_resume() {
    let tmp = tempdir().unwrap();
    let manager = CheckpointManager::new(&config_for(tmp.path())).unwrap();
    let store = ProxyStore::open_in_memory().unwrap();

    let mut surviving = ProxyRecord::new_candidate("9.9.9.9:80", 0);
    surviving.score = 40;
    store.upsert(vec![surviving]).await.unwrap();

    manager
        .start(
            CheckpointKind::Security,
            "{}",
            vec!["9.9.9.9:80".into(), "8.8.8.8:80".into()],
        )
        .unwrap();

    let outcome = manager.startup(CheckpointKind::Security, &store).await.unwrap();
    assert_eq!(outcome.dropped, vec!["8.8.8.8:80".to_string()]);
    assert_eq!(outcome.record.unwrap().remainder, vec!["9.9.9.9:80".to_string()]);
}
