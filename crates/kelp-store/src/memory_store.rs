//! In-memory node storage backend.

use std::collections::HashMap;
use std::sync::RwLock;

use bytes::Bytes;
use kelp_types::Address;
use tracing::debug;

use crate::error::StoreError;
use crate::traits::ContentStore;

/// In-memory content store backed by a `RwLock<HashMap>`.
///
/// Useful for tests and for replicas that never persist. Several logs may
/// share one `MemoryStore` behind an `Arc`, which is how replicas "see"
/// each other's entries when loading from heads.
#[derive(Default)]
pub struct MemoryStore {
    nodes: RwLock<HashMap<Address, Bytes>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored nodes.
    pub fn len(&self) -> usize {
        self.nodes.read().map(|map| map.len()).unwrap_or(0)
    }

    /// Whether the store holds no nodes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Overwrite the bytes under an address without re-hashing.
    ///
    /// Only for tests that need to simulate on-disk corruption.
    #[cfg(test)]
    pub(crate) fn insert_raw(&self, address: Address, data: Bytes) {
        self.nodes.write().unwrap().insert(address, data);
    }
}

#[async_trait::async_trait]
impl ContentStore for MemoryStore {
    async fn put(&self, data: Bytes) -> Result<Address, StoreError> {
        let address = Address::from_data(&data);
        let mut map = self.nodes.write().map_err(|_| StoreError::Poisoned)?;

        debug!(%address, size = data.len(), "storing node in memory");
        map.insert(address, data);
        Ok(address)
    }

    async fn get(&self, address: Address) -> Result<Option<Bytes>, StoreError> {
        let map = self.nodes.read().map_err(|_| StoreError::Poisoned)?;

        match map.get(&address) {
            Some(data) => {
                let actual = Address::from_data(data);

                if actual != address {
                    return Err(StoreError::Corrupt {
                        expected: address,
                        actual,
                    });
                }

                Ok(Some(data.clone()))
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, address: Address) -> Result<(), StoreError> {
        let mut map = self.nodes.write().map_err(|_| StoreError::Poisoned)?;
        map.remove(&address);
        debug!(%address, "deleted node from memory");
        Ok(())
    }

    async fn contains(&self, address: Address) -> Result<bool, StoreError> {
        let map = self.nodes.read().map_err(|_| StoreError::Poisoned)?;
        Ok(map.contains_key(&address))
    }

    async fn list(&self) -> Result<Vec<Address>, StoreError> {
        let map = self.nodes.read().map_err(|_| StoreError::Poisoned)?;
        Ok(map.keys().copied().collect())
    }
}
