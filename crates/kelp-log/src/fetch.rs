//! Loading entries from a content store by walking the DAG.

use std::collections::{BinaryHeap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use kelp_store::ContentStore;
use kelp_types::{Address, LogConfig};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::codec::EntryCodec;
use crate::entry::Entry;
use crate::error::LogError;

/// Bounds on a DAG fetch.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Stop after this many entries.
    pub length: Option<usize>,
    /// Hashes that are already known and must not be fetched.
    pub exclude: Vec<Address>,
    /// Maximum concurrent store reads.
    pub concurrency: usize,
    /// Give up on a single read after this long.
    pub timeout: Option<Duration>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self::from_config(&LogConfig::default())
    }
}

impl FetchOptions {
    pub fn from_config(config: &LogConfig) -> Self {
        Self {
            length: config.length,
            exclude: Vec::new(),
            concurrency: config.fetch_concurrency,
            timeout: (config.fetch_timeout_ms > 0)
                .then(|| Duration::from_millis(config.fetch_timeout_ms)),
        }
    }
}

enum Outcome {
    Loaded(Bytes),
    Missing,
    TimedOut,
}

/// Fetch entries reachable from `roots`, following `next` and `refs`.
///
/// Reads run on a pool of at most `options.concurrency` tasks. Pending
/// hashes are prioritized by the clock time of the entry that referenced
/// them, so the newest part of the DAG arrives first and a `length` bound
/// keeps the most recent entries. Hashes the store does not have, or that
/// time out, are skipped; the result then simply lacks them. Store and
/// decode errors abort the fetch.
///
/// Entries are returned in the order they were fetched.
pub async fn fetch_all(
    store: Arc<dyn ContentStore>,
    codec: EntryCodec,
    roots: &[Address],
    options: &FetchOptions,
) -> Result<Vec<Entry>, LogError> {
    let permits = Arc::new(Semaphore::new(options.concurrency.max(1)));
    let mut seen: HashSet<Address> = options.exclude.iter().copied().collect();
    let mut pending: BinaryHeap<(u64, Address)> = BinaryHeap::new();
    for root in roots {
        if seen.insert(*root) {
            pending.push((u64::MAX, *root));
        }
    }

    let mut in_flight: JoinSet<(Address, Result<Outcome, LogError>)> = JoinSet::new();
    let mut fetched: Vec<Entry> = Vec::new();

    loop {
        while options
            .length
            .is_none_or(|n| fetched.len() + in_flight.len() < n)
        {
            let Some((_, address)) = pending.pop() else {
                break;
            };
            let store = store.clone();
            let permits = permits.clone();
            let timeout = options.timeout;
            in_flight.spawn(async move { (address, read(store, permits, address, timeout).await) });
        }

        let Some(joined) = in_flight.join_next().await else {
            break;
        };
        let (address, outcome) = joined.map_err(|e| LogError::Fetch(e.to_string()))?;

        match outcome? {
            Outcome::Loaded(bytes) => {
                let entry = codec.decode_entry(address, &bytes)?;
                for link in entry.next.iter().chain(&entry.refs) {
                    if seen.insert(*link) {
                        pending.push((entry.clock.time(), *link));
                    }
                }
                fetched.push(entry);
            }
            Outcome::Missing => debug!(%address, "entry not in store, skipping"),
            Outcome::TimedOut => warn!(%address, "fetch timed out, skipping"),
        }
    }

    debug!(roots = roots.len(), fetched = fetched.len(), "fetch complete");
    Ok(fetched)
}

async fn read(
    store: Arc<dyn ContentStore>,
    permits: Arc<Semaphore>,
    address: Address,
    timeout: Option<Duration>,
) -> Result<Outcome, LogError> {
    let _permit = permits
        .acquire_owned()
        .await
        .map_err(|e| LogError::Fetch(e.to_string()))?;

    let found = match timeout {
        Some(limit) => match tokio::time::timeout(limit, store.get(address)).await {
            Ok(found) => found?,
            Err(_) => return Ok(Outcome::TimedOut),
        },
        None => store.get(address).await?,
    };

    Ok(found.map_or(Outcome::Missing, Outcome::Loaded))
}
