//! Replicas converge regardless of how and in which order they sync.
//!
//! - Join laws: idempotence, commutativity, associativity
//! - Randomized interleavings of appends and pairwise syncs, with heads
//!   checked after every step
//! - Random join orders of the same set of replicas
//! - Sort policy choices that still converge

use kelp_integration_tests::{ReplicaSet, payloads};
use kelp_log::Log;
use kelp_types::{LogConfig, SortKind};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

fn hashes(log: &Log) -> Vec<kelp_types::Address> {
    log.values().unwrap().iter().map(|e| e.hash).collect()
}

// =========================================================================
// 1. Join laws
// =========================================================================

#[tokio::test]
async fn test_join_laws_hold_for_divergent_histories() {
    let mut set = ReplicaSet::new(3, "laws");
    for round in 0..5 {
        for i in 0..3 {
            set.append(i, &format!("r{round}-w{i}")).await;
        }
        // partial sharing so the three histories interleave
        set.sync(round % 3, (round + 1) % 3).await;
    }
    set.sync_all().await;

    let (a, b, c) = (set.log(0).clone(), set.log(1).clone(), set.log(2).clone());

    // idempotent
    let mut aa = a.clone();
    aa.join(&a, None).unwrap();
    assert_eq!(hashes(&aa), hashes(&a));

    // commutative
    let mut ab = a.clone();
    ab.join(&b, None).unwrap();
    let mut ba = b.clone();
    ba.join(&a, None).unwrap();
    assert_eq!(hashes(&ab), hashes(&ba));

    // associative
    let mut ab_c = ab.clone();
    ab_c.join(&c, None).unwrap();
    let mut bc = b.clone();
    bc.join(&c, None).unwrap();
    let mut a_bc = a.clone();
    a_bc.join(&bc, None).unwrap();
    assert_eq!(hashes(&ab_c), hashes(&a_bc));
    assert_eq!(ab_c.len(), 15);
}

#[tokio::test]
async fn test_fully_synced_replicas_agree() {
    let mut set = ReplicaSet::new(4, "mesh");
    for i in 0..4 {
        for n in 0..3 {
            set.append(i, &format!("w{i}-{n}")).await;
        }
    }

    set.sync_all().await;

    set.assert_converged();
    assert_eq!(set.log(0).len(), 12);
    assert_eq!(set.log(0).heads().len(), 4);
}

#[tokio::test]
async fn test_append_after_sync_collapses_heads() {
    let mut set = ReplicaSet::new(3, "collapse");
    for i in 0..3 {
        set.append(i, &format!("w{i}")).await;
    }
    set.sync_all().await;

    let merged = set.append(0, "merge").await;
    assert_eq!(merged.next.len(), 3);
    assert_eq!(merged.clock.time(), 2);

    set.sync_all().await;
    set.assert_converged();
    assert_eq!(set.heads(1), vec![merged.hash]);
}

// =========================================================================
// 2. Randomized interleavings
// =========================================================================

/// Random appends and syncs. With `truncate_to` set, about a third of the
/// syncs keep only that many entries. Heads are checked after every step.
async fn random_workload(
    seed: u64,
    writers: usize,
    steps: usize,
    truncate_to: Option<usize>,
) -> ReplicaSet {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut set = ReplicaSet::new(writers, "random");

    for step in 0..steps {
        let i = rng.random_range(0..writers);
        if rng.random_bool(0.6) {
            set.append(i, &format!("s{step}-w{i}")).await;
        } else {
            let j = rng.random_range(0..writers);
            match truncate_to {
                Some(size) if rng.random_bool(0.3) => set.sync_truncated(i, j, size).await,
                _ => set.sync(i, j).await,
            }
        }
        set.assert_heads_unreferenced();
    }
    set
}

#[tokio::test]
#[ntest::timeout(60000)]
async fn test_random_interleavings_converge() {
    for seed in 0..8 {
        let mut set = random_workload(seed, 4, 60, None).await;
        let total: usize = {
            let mut all = std::collections::HashSet::new();
            for i in 0..set.len() {
                all.extend(set.log(i).entries().keys().copied());
            }
            all.len()
        };

        set.sync_all().await;

        set.assert_converged();
        assert_eq!(set.log(0).len(), total, "seed {seed} lost entries");
    }
}

#[tokio::test]
#[ntest::timeout(60000)]
async fn test_heads_stay_unreferenced_through_truncating_joins() {
    for seed in 0..8 {
        let mut set = random_workload(seed, 4, 60, Some(5)).await;
        for round in 0..3 {
            set.sync_truncated(round, round + 1, 3).await;
            set.assert_heads_unreferenced();
        }
        set.sync_all().await;
        set.assert_heads_unreferenced();
    }
}

#[tokio::test]
async fn test_clock_never_runs_backwards() {
    let mut rng = StdRng::seed_from_u64(42);
    let mut set = ReplicaSet::new(3, "clock");

    for step in 0..50 {
        let i = rng.random_range(0..3);
        let before = set.log(i).clock().time();
        let entry = set.append(i, &format!("e{step}")).await;
        assert!(entry.clock.time() > before);
        for next in &entry.next {
            let parent = set.log(i).get(next).unwrap();
            assert!(parent.clock.time() < entry.clock.time());
        }
        set.sync(i, rng.random_range(0..3)).await;
    }
}

// =========================================================================
// 3. Join order
// =========================================================================

#[tokio::test]
#[ntest::timeout(60000)]
async fn test_join_order_does_not_matter() {
    let mut set = ReplicaSet::new(5, "order");
    for i in 0..5 {
        for n in 0..4 {
            set.append(i, &format!("w{i}-{n}")).await;
        }
    }
    set.sync(0, 1).await;
    set.append(1, "after-sync").await;

    let logs: Vec<Log> = (0..5).map(|i| set.log(i).clone()).collect();
    let mut rng = StdRng::seed_from_u64(7);
    let mut reference: Option<(Vec<kelp_types::Address>, String)> = None;

    for _ in 0..10 {
        let mut order: Vec<usize> = (0..5).collect();
        order.shuffle(&mut rng);

        let mut merged = logs[order[0]].clone();
        for &i in &order[1..] {
            merged.join(&logs[i], None).unwrap();
        }

        let result = (hashes(&merged), merged.to_string());
        match &reference {
            None => reference = Some(result),
            Some(expected) => assert_eq!(&result, expected, "order {order:?}"),
        }
    }

    let (values, _) = reference.unwrap();
    assert_eq!(values.len(), 21);
}

// =========================================================================
// 4. Sort policies
// =========================================================================

#[tokio::test]
async fn test_first_write_wins_reverses_concurrent_order() {
    let lww = {
        let mut set = ReplicaSet::new(2, "fww");
        set.append(0, "a").await;
        set.append(1, "b").await;
        set.sync_all().await;
        payloads(&set.log(0).values().unwrap())
    };

    let config = LogConfig {
        sort: SortKind::FirstWriteWins,
        ..LogConfig::default()
    };
    let mut set = ReplicaSet::with_config(2, "fww", config);
    set.append(0, "a").await;
    set.append(1, "b").await;
    set.sync_all().await;
    set.assert_converged();

    let mut fww = payloads(&set.log(0).values().unwrap());
    fww.reverse();
    assert_eq!(fww, lww);
}

#[tokio::test]
async fn test_entry_hash_order_converges_with_refs() {
    let config = LogConfig {
        sort: SortKind::EntryHash,
        pointer_count: 16,
        ..LogConfig::default()
    };
    let mut set = ReplicaSet::with_config(3, "hash-order", config);
    for step in 0..30 {
        set.append(step % 3, &format!("e{step}")).await;
        if step % 4 == 0 {
            set.sync(step % 3, (step + 1) % 3).await;
        }
    }

    set.sync_all().await;
    set.assert_converged();
    assert_eq!(set.log(2).len(), 30);
}
