//! Core trait for content-addressed storage.

use bytes::Bytes;
use kelp_types::Address;

use crate::error::StoreError;

/// Trait for storing and retrieving content-addressed nodes.
///
/// The address of a node is always `blake3(bytes)`: [`put`] derives it,
/// never the caller, so identical nodes land on the same address.
/// All implementations must be `Send + Sync` for use across async tasks.
///
/// [`put`]: ContentStore::put
#[async_trait::async_trait]
pub trait ContentStore: Send + Sync {
    /// Store a node and return its content address.
    async fn put(&self, data: Bytes) -> Result<Address, StoreError>;

    /// Retrieve a node by address. Returns `None` if not found.
    async fn get(&self, address: Address) -> Result<Option<Bytes>, StoreError>;

    /// Delete a node by address. Deleting a missing node is not an error.
    async fn delete(&self, address: Address) -> Result<(), StoreError>;

    /// Check whether a node exists.
    async fn contains(&self, address: Address) -> Result<bool, StoreError>;

    /// List all stored addresses.
    async fn list(&self) -> Result<Vec<Address>, StoreError>;
}
