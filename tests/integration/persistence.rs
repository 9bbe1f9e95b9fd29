//! Logs survive a trip through a content store.
//!
//! - FileStore round trip through a heads snapshot
//! - Loading with a length bound
//! - JSON nodes
//! - Replicas rebuilt from snapshots during sync

use std::sync::Arc;

use kelp_integration_tests::{ReplicaSet, payloads, test_identity};
use kelp_log::{AppendOptions, Log};
use kelp_store::{ContentStore, FileStore};
use kelp_types::{CodecFormat, LogConfig};

fn file_log(store: Arc<FileStore>, config: &LogConfig) -> Log {
    Log::builder()
        .id("disk")
        .identity(test_identity(1))
        .store(store)
        .config(config)
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_file_store_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let config = LogConfig {
        pointer_count: 8,
        ..LogConfig::default()
    };

    let address = {
        let store = Arc::new(FileStore::new(dir.path()).unwrap());
        let mut log = file_log(store, &config);
        for n in 0..40 {
            log.append(format!("entry-{n}"), AppendOptions::from(&config))
                .await
                .unwrap();
        }
        log.to_address().await.unwrap()
    };

    // a fresh store handle over the same directory
    let store = Arc::new(FileStore::new(dir.path()).unwrap());
    let loaded = Log::builder()
        .identity(test_identity(2))
        .store(store)
        .config(&config)
        .load_from_address(address)
        .await
        .unwrap();

    assert_eq!(loaded.id(), "disk");
    assert_eq!(loaded.len(), 40);
    let values = payloads(&loaded.values().unwrap());
    assert_eq!(values.first().unwrap(), "entry-0");
    assert_eq!(values.last().unwrap(), "entry-39");
    assert_eq!(loaded.clock().time(), 40);
    assert_eq!(loaded.clock().id(), test_identity(2).public_key());
}

#[tokio::test]
async fn test_loaded_log_keeps_appending() {
    let dir = tempfile::tempdir().unwrap();
    let config = LogConfig::default();
    let store = Arc::new(FileStore::new(dir.path()).unwrap());

    let mut log = file_log(store.clone(), &config);
    log.append("one", AppendOptions::default()).await.unwrap();
    let address = log.to_address().await.unwrap();

    let mut loaded = Log::builder()
        .identity(test_identity(1))
        .store(store.clone())
        .load_from_address(address)
        .await
        .unwrap();
    let two = loaded.append("two", AppendOptions::default()).await.unwrap();

    assert_eq!(two.clock.time(), 2);
    assert_eq!(loaded.to_string(), "two\n└─one");

    // the original replica picks it up with a join
    log.join(&loaded, None).unwrap();
    assert_eq!(log.heads().keys().copied().collect::<Vec<_>>(), vec![two.hash]);
}

#[tokio::test]
async fn test_load_with_length_keeps_newest() {
    let dir = tempfile::tempdir().unwrap();
    let config = LogConfig::default();
    let store = Arc::new(FileStore::new(dir.path()).unwrap());
    let mut log = file_log(store.clone(), &config);
    for n in 0..20 {
        log.append(format!("e{n}"), AppendOptions::default()).await.unwrap();
    }
    let address = log.to_address().await.unwrap();

    let bounded = LogConfig {
        length: Some(5),
        ..config
    };
    let loaded = Log::builder()
        .identity(test_identity(1))
        .store(store)
        .config(&bounded)
        .load_from_address(address)
        .await
        .unwrap();

    assert_eq!(loaded.len(), 5);
    assert_eq!(
        payloads(&loaded.values().unwrap()),
        vec!["e15", "e16", "e17", "e18", "e19"]
    );
    assert_eq!(loaded.tail_hashes().len(), 1);
}

#[tokio::test]
async fn test_json_nodes_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let config = LogConfig {
        codec: CodecFormat::Json,
        ..LogConfig::default()
    };
    let store = Arc::new(FileStore::new(dir.path()).unwrap());
    let mut log = file_log(store.clone(), &config);
    let entry = log.append("readable", AppendOptions::default()).await.unwrap();

    let bytes = store.get(entry.hash).await.unwrap().unwrap();
    let text = std::str::from_utf8(&bytes).unwrap();
    assert!(text.contains("\"id\":\"disk\""));

    let address = log.to_address().await.unwrap();
    let loaded = Log::builder()
        .identity(test_identity(1))
        .store(store)
        .config(&config)
        .load_from_address(address)
        .await
        .unwrap();
    assert_eq!(payloads(&loaded.values().unwrap()), vec!["readable"]);
}

#[tokio::test]
async fn test_sync_via_snapshot_converges() {
    let mut set = ReplicaSet::new(3, "snap");
    for i in 0..3 {
        set.append(i, &format!("w{i}-a")).await;
        set.append(i, &format!("w{i}-b")).await;
    }

    for from in 0..3 {
        for to in 0..3 {
            if from != to {
                set.sync_via_snapshot(from, to).await;
            }
        }
    }

    set.assert_converged();
    assert_eq!(set.log(0).len(), 6);
    assert!(set.store(1).len() >= 6);
}
