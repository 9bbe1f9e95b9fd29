//! Shared test harness for kelp integration tests.
//!
//! Provides [`ReplicaSet`]: N replicas of one log, each with its own
//! writer identity and its own content store. Replicas only learn about
//! each other through [`ReplicaSet::sync`], which ships the missing nodes
//! between stores and then joins, the way two peers would.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use kelp_identity::{Ed25519Provider, Identity};
use kelp_log::{AppendOptions, Entry, Log, find_heads};
use kelp_store::{ContentStore, MemoryStore, StoreError};
use kelp_types::{Address, LogConfig};
use tokio::sync::RwLock;

// =========================================================================
// Flaky store
// =========================================================================

/// Store wrapper with failure injection.
///
/// Hidden addresses read as missing; while the store is down every
/// operation fails with an I/O error.
pub struct FlakyStore {
    inner: Arc<dyn ContentStore>,
    hidden: RwLock<HashSet<Address>>,
    down: RwLock<bool>,
}

impl FlakyStore {
    pub fn new(inner: Arc<dyn ContentStore>) -> Self {
        Self {
            inner,
            hidden: RwLock::new(HashSet::new()),
            down: RwLock::new(false),
        }
    }

    /// Make `address` read as missing.
    pub async fn hide(&self, address: Address) {
        self.hidden.write().await.insert(address);
    }

    pub async fn set_down(&self, down: bool) {
        *self.down.write().await = down;
    }

    async fn check(&self) -> Result<(), StoreError> {
        if *self.down.read().await {
            return Err(StoreError::Io(std::io::Error::other("store is down")));
        }
        Ok(())
    }
}

#[async_trait]
impl ContentStore for FlakyStore {
    async fn put(&self, data: Bytes) -> Result<Address, StoreError> {
        self.check().await?;
        self.inner.put(data).await
    }

    async fn get(&self, address: Address) -> Result<Option<Bytes>, StoreError> {
        self.check().await?;
        if self.hidden.read().await.contains(&address) {
            return Ok(None);
        }
        self.inner.get(address).await
    }

    async fn delete(&self, address: Address) -> Result<(), StoreError> {
        self.check().await?;
        self.inner.delete(address).await
    }

    async fn contains(&self, address: Address) -> Result<bool, StoreError> {
        self.check().await?;
        if self.hidden.read().await.contains(&address) {
            return Ok(false);
        }
        self.inner.contains(address).await
    }

    async fn list(&self) -> Result<Vec<Address>, StoreError> {
        self.check().await?;
        let hidden = self.hidden.read().await;
        let mut all = self.inner.list().await?;
        all.retain(|a| !hidden.contains(a));
        Ok(all)
    }
}

// =========================================================================
// Replica set
// =========================================================================

/// One writer: a log replica and the store it writes to.
pub struct Replica {
    pub store: Arc<MemoryStore>,
    pub log: Log,
}

/// N replicas of the same log.
pub struct ReplicaSet {
    replicas: Vec<Replica>,
    config: LogConfig,
}

impl ReplicaSet {
    /// `n` replicas of log `id` with default options.
    pub fn new(n: usize, id: &str) -> Self {
        Self::with_config(n, id, LogConfig::default())
    }

    pub fn with_config(n: usize, id: &str, config: LogConfig) -> Self {
        let replicas = (0..n)
            .map(|i| {
                let store = Arc::new(MemoryStore::new());
                let log = Log::builder()
                    .id(id)
                    .identity(test_identity(i as u8 + 1))
                    .store(store.clone())
                    .config(&config)
                    .build()
                    .unwrap();
                Replica { store, log }
            })
            .collect();
        Self { replicas, config }
    }

    pub fn len(&self) -> usize {
        self.replicas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.replicas.is_empty()
    }

    pub fn log(&self, i: usize) -> &Log {
        &self.replicas[i].log
    }

    pub fn store(&self, i: usize) -> &Arc<MemoryStore> {
        &self.replicas[i].store
    }

    /// Append on replica `i` with the set's configured pointer count.
    pub async fn append(&mut self, i: usize, payload: &str) -> Entry {
        let options = AppendOptions::from(&self.config);
        self.replicas[i].log.append(payload, options).await.unwrap()
    }

    /// Ship every node `to` lacks from `from`'s store, then join.
    pub async fn sync(&mut self, from: usize, to: usize) {
        if from == to {
            return;
        }
        self.transfer(from, to).await;
        let other = self.replicas[from].log.clone();
        self.replicas[to].log.join(&other, None).unwrap();
    }

    /// [`sync`](Self::sync) that keeps only the newest `size` entries on
    /// `to`.
    pub async fn sync_truncated(&mut self, from: usize, to: usize, size: usize) {
        if from == to {
            return;
        }
        self.transfer(from, to).await;
        let other = self.replicas[from].log.clone();
        self.replicas[to].log.join(&other, Some(size)).unwrap();
    }

    /// Like [`sync`](Self::sync), but `to` rebuilds `from`'s replica from
    /// its heads snapshot in its own store instead of receiving the log
    /// object.
    pub async fn sync_via_snapshot(&mut self, from: usize, to: usize) {
        let address = self.replicas[from].log.to_address().await.unwrap();
        self.transfer(from, to).await;
        let snapshot = self.replicas[from].store.get(address).await.unwrap().unwrap();
        self.replicas[to].store.put(snapshot).await.unwrap();

        let to_replica = &self.replicas[to];
        let remote = Log::builder()
            .identity(to_replica.log.identity().clone())
            .store(to_replica.store.clone())
            .config(&self.config)
            .load_from_address(address)
            .await
            .unwrap();
        self.replicas[to].log.join(&remote, None).unwrap();
    }

    /// Every replica syncs from every other one, twice around so that
    /// everyone ends up with everything.
    pub async fn sync_all(&mut self) {
        for _ in 0..2 {
            for from in 0..self.len() {
                for to in 0..self.len() {
                    self.sync(from, to).await;
                }
            }
        }
    }

    async fn transfer(&self, from: usize, to: usize) {
        let source = &self.replicas[from];
        let target = &self.replicas[to];
        for entry in source.log.entries() {
            if target.store.contains(entry.hash).await.unwrap() {
                continue;
            }
            let bytes = source.store.get(entry.hash).await.unwrap().unwrap();
            target.store.put(bytes).await.unwrap();
        }
    }

    /// Linearized hashes of replica `i`.
    pub fn values(&self, i: usize) -> Vec<Address> {
        self.log(i).values().unwrap().iter().map(|e| e.hash).collect()
    }

    /// Head hashes of replica `i`, sorted.
    pub fn heads(&self, i: usize) -> Vec<Address> {
        let mut heads: Vec<Address> = self.log(i).heads().keys().copied().collect();
        heads.sort();
        heads
    }

    /// Panic unless every replica's heads are exactly its entries that no
    /// other held entry names in `next`.
    pub fn assert_heads_unreferenced(&self) {
        for i in 0..self.len() {
            let log = self.log(i);
            let expected: HashSet<Address> =
                find_heads(log.entries()).iter().map(|e| e.hash).collect();
            let actual: HashSet<Address> = log.heads().keys().copied().collect();
            assert_eq!(actual, expected, "heads of replica {i}");

            for entry in log.entries() {
                for hash in &entry.next {
                    assert!(!actual.contains(hash), "replica {i} head {hash} has a child");
                }
            }
        }
    }

    /// Panic unless every replica holds the same values and heads.
    pub fn assert_converged(&self) {
        let values = self.values(0);
        let heads = self.heads(0);
        for i in 1..self.len() {
            assert_eq!(self.values(i), values, "values of replica {i} diverge");
            assert_eq!(self.heads(i), heads, "heads of replica {i} diverge");
            assert_eq!(self.log(i).to_string(), self.log(0).to_string());
        }
    }
}

// =========================================================================
// Helpers
// =========================================================================

/// Deterministic writer identity for `seed`.
pub fn test_identity(seed: u8) -> Identity {
    Ed25519Provider::new()
        .identity_from_seed(&format!("writer-{seed}"), [seed; 32])
        .unwrap()
}

pub fn payloads(entries: &[Entry]) -> Vec<String> {
    entries
        .iter()
        .map(|e| String::from_utf8_lossy(&e.payload).into_owned())
        .collect()
}
