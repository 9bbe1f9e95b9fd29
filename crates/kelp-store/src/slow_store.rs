//! Latency injection for exercising fetch timeouts and read concurrency.
//!
//! ```ignore
//! let slow = SlowStore::new(inner)
//!     .read_latency(5, 20)
//!     .write_latency(10, 30)
//!     .seed(42);
//! let fetched = fetch_all(Arc::new(slow), ..).await?;
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use kelp_types::Address;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::error::StoreError;
use crate::traits::ContentStore;

/// Uniform delay range in milliseconds. `(0, 0)` means no delay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Latency {
    min_ms: u64,
    max_ms: u64,
}

impl Latency {
    fn sample(&self, rng: &Mutex<StdRng>) -> Result<Duration, StoreError> {
        let ms = if self.min_ms >= self.max_ms {
            self.max_ms
        } else {
            rng.lock()
                .map_err(|_| StoreError::Poisoned)?
                .random_range(self.min_ms..=self.max_ms)
        };
        Ok(Duration::from_millis(ms))
    }
}

/// Decrements the in-flight read count when a read finishes or is dropped
/// by a caller's timeout.
struct ReadGuard<'a>(&'a AtomicUsize);

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Wraps another store and sleeps before every read and write.
///
/// Also records how many reads were ever in flight at once, so tests can
/// check that a reader honours its concurrency bound.
pub struct SlowStore {
    inner: Arc<dyn ContentStore>,
    reads: Latency,
    writes: Latency,
    rng: Mutex<StdRng>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl SlowStore {
    /// Pass-through until a latency is configured.
    pub fn new(inner: Arc<dyn ContentStore>) -> Self {
        Self {
            inner,
            reads: Latency::default(),
            writes: Latency::default(),
            rng: Mutex::new(StdRng::seed_from_u64(0)),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn read_latency(mut self, min_ms: u64, max_ms: u64) -> Self {
        self.reads = Latency { min_ms, max_ms };
        self
    }

    pub fn write_latency(mut self, min_ms: u64, max_ms: u64) -> Self {
        self.writes = Latency { min_ms, max_ms };
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    /// Largest number of `get`/`contains` calls that overlapped.
    pub fn peak_concurrent_reads(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    async fn slow_write(&self) -> Result<(), StoreError> {
        let delay = self.writes.sample(&self.rng)?;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    async fn slow_read(&self) -> Result<ReadGuard<'_>, StoreError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        let guard = ReadGuard(&self.in_flight);

        let delay = self.reads.sample(&self.rng)?;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(guard)
    }
}

#[async_trait::async_trait]
impl ContentStore for SlowStore {
    async fn put(&self, data: Bytes) -> Result<Address, StoreError> {
        self.slow_write().await?;
        self.inner.put(data).await
    }

    async fn get(&self, address: Address) -> Result<Option<Bytes>, StoreError> {
        let _guard = self.slow_read().await?;
        self.inner.get(address).await
    }

    async fn delete(&self, address: Address) -> Result<(), StoreError> {
        self.slow_write().await?;
        self.inner.delete(address).await
    }

    async fn contains(&self, address: Address) -> Result<bool, StoreError> {
        let _guard = self.slow_read().await?;
        self.inner.contains(address).await
    }

    async fn list(&self) -> Result<Vec<Address>, StoreError> {
        self.inner.list().await
    }
}
