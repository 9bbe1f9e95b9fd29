//! Content-addressed node storage.
//!
//! This crate defines the [`ContentStore`] trait the log writes entries
//! and heads snapshots through, along with three implementations:
//!
//! - [`MemoryStore`]: in-memory storage backed by a `RwLock<HashMap>`.
//! - [`FileStore`]: one file per node with a 2-level fan-out directory layout.
//! - [`SlowStore`]: wraps another store and injects read/write latency.

mod error;
mod file_store;
mod memory_store;
mod slow_store;
mod traits;

pub use error::StoreError;
pub use file_store::FileStore;
pub use memory_store::MemoryStore;
pub use slow_store::SlowStore;
pub use traits::ContentStore;
