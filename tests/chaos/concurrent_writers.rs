//! Chaos test: writers appending and gossiping concurrently.
//!
//! Five writer tasks share one store. Each appends on its own replica and
//! every few appends joins a snapshot of a random peer. After the writers
//! stop, a final exchange must leave every replica identical.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use kelp_integration_tests::test_identity;
use kelp_log::{AppendOptions, Log};
use kelp_store::MemoryStore;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::Mutex;

const WRITERS: usize = 5;
const APPENDS: usize = 40;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ntest::timeout(60000)]
async fn test_concurrent_writers_converge() {
    let store = Arc::new(MemoryStore::new());
    let replicas: Arc<Vec<Mutex<Log>>> = Arc::new(
        (0..WRITERS)
            .map(|i| {
                Mutex::new(
                    Log::builder()
                        .id("gossip")
                        .identity(test_identity(i as u8 + 1))
                        .store(store.clone())
                        .build()
                        .unwrap(),
                )
            })
            .collect(),
    );
    let appended = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for writer in 0..WRITERS {
        let replicas = replicas.clone();
        let appended = appended.clone();
        handles.push(tokio::spawn(async move {
            let mut rng = StdRng::seed_from_u64(writer as u64);
            let options = AppendOptions { pointer_count: 8 };
            for n in 0..APPENDS {
                replicas[writer]
                    .lock()
                    .await
                    .append(format!("w{writer}-{n}"), options)
                    .await
                    .unwrap();
                appended.fetch_add(1, Ordering::Relaxed);

                if rng.random_bool(0.3) {
                    let peer = rng.random_range(0..WRITERS);
                    if peer != writer {
                        // snapshot the peer first; never hold two locks
                        let snapshot = replicas[peer].lock().await.clone();
                        replicas[writer].lock().await.join(&snapshot, None).unwrap();
                    }
                }
                tokio::task::yield_now().await;
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    assert_eq!(appended.load(Ordering::Relaxed), WRITERS * APPENDS);

    // final exchange: fold everyone into one, then hand it back out
    let mut merged = replicas[0].lock().await.clone();
    for replica in replicas.iter().skip(1) {
        merged.join(&*replica.lock().await, None).unwrap();
    }
    for replica in replicas.iter() {
        replica.lock().await.join(&merged, None).unwrap();
    }

    let expected: Vec<_> = merged.values().unwrap().iter().map(|e| e.hash).collect();
    assert_eq!(expected.len(), WRITERS * APPENDS);
    for (i, replica) in replicas.iter().enumerate() {
        let log = replica.lock().await;
        let values: Vec<_> = log.values().unwrap().iter().map(|e| e.hash).collect();
        assert_eq!(values, expected, "replica {i} diverges");
        assert_eq!(log.heads().len(), merged.heads().len());
    }
}

/// Every entry's clock is above all of its parents, whatever the
/// interleaving.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ntest::timeout(60000)]
async fn test_causality_survives_concurrency() {
    let store = Arc::new(MemoryStore::new());
    let mut logs = Vec::new();
    for i in 0..3u8 {
        logs.push(
            Log::builder()
                .id("causal")
                .identity(test_identity(i + 1))
                .store(store.clone())
                .build()
                .unwrap(),
        );
    }

    for round in 0..10 {
        let mut tasks = tokio::task::JoinSet::new();
        for (i, mut log) in logs.drain(..).enumerate() {
            tasks.spawn(async move {
                for n in 0..3 {
                    log.append(format!("r{round}-w{i}-{n}"), AppendOptions::default())
                        .await
                        .unwrap();
                }
                (i, log)
            });
        }
        let mut done: Vec<(usize, Log)> = tasks.join_all().await;
        done.sort_by_key(|(i, _)| *i);
        logs = done.into_iter().map(|(_, log)| log).collect();

        // ring gossip
        let snapshot = logs[round % 3].clone();
        logs[(round + 1) % 3].join(&snapshot, None).unwrap();
    }

    let mut merged = logs[0].clone();
    merged.join(&logs[1], None).unwrap();
    merged.join(&logs[2], None).unwrap();

    assert_eq!(merged.len(), 90);
    for entry in merged.values().unwrap() {
        for parent in entry.next.iter().chain(&entry.refs) {
            let parent = merged.get(parent).unwrap();
            assert!(parent.clock.time() < entry.clock.time());
        }
    }
}
