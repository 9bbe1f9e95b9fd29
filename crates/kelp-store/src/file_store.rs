//! File-based node storage backend.
//!
//! Stores one file per node with a 2-level fan-out directory structure:
//! `{base_dir}/{hex[0..2]}/{hex[2..4]}/{hex}`.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use kelp_types::Address;
use tracing::{debug, error};

use crate::error::StoreError;
use crate::traits::ContentStore;

/// File-based content store with 2-level fan-out directory layout.
///
/// Each node is stored as a file at:
/// `{base_dir}/{hex(address)[0..2]}/{hex(address)[2..4]}/{hex(address)}`.
///
/// Writes are atomic: data is written to a temporary file first, then
/// renamed into place, so a crash never leaves a half-written node behind.
pub struct FileStore {
    base_dir: PathBuf,
}

impl FileStore {
    /// Create a new file store rooted at the given directory.
    ///
    /// The directory is created if it does not exist.
    pub fn new(base_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let base_dir = base_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_dir)?;
        Ok(Self { base_dir })
    }

    /// Root directory of the store.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn node_path(&self, address: &Address) -> PathBuf {
        let hex = address.to_string();
        self.base_dir.join(&hex[0..2]).join(&hex[2..4]).join(&hex)
    }
}

#[async_trait::async_trait]
impl ContentStore for FileStore {
    async fn put(&self, data: Bytes) -> Result<Address, StoreError> {
        let address = Address::from_data(&data);
        let path = self.node_path(&address);

        // Content addressing: an existing file already holds these bytes.
        if tokio::fs::try_exists(&path).await? {
            return Ok(address);
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp_path = path.with_extension("tmp");
        tokio::fs::write(&tmp_path, &data).await?;
        tokio::fs::rename(&tmp_path, &path).await?;

        debug!(%address, path = %path.display(), size = data.len(), "stored node to file");
        Ok(address)
    }

    async fn get(&self, address: Address) -> Result<Option<Bytes>, StoreError> {
        let path = self.node_path(&address);

        match tokio::fs::read(&path).await {
            Ok(data) => {
                // Verify-on-read: a corrupt node is an error, never returned.
                let actual = Address::from_data(&data);

                if actual != address {
                    error!(expected = %address, %actual, "node corruption detected on read");
                    return Err(StoreError::Corrupt {
                        expected: address,
                        actual,
                    });
                }

                Ok(Some(Bytes::from(data)))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    async fn delete(&self, address: Address) -> Result<(), StoreError> {
        let path = self.node_path(&address);

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(%address, "deleted node file");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    async fn contains(&self, address: Address) -> Result<bool, StoreError> {
        Ok(tokio::fs::try_exists(self.node_path(&address)).await?)
    }

    async fn list(&self) -> Result<Vec<Address>, StoreError> {
        let mut addresses = Vec::new();
        // (directory, depth below base_dir); nodes only live at depth 2
        let mut pending = vec![(self.base_dir.clone(), 0usize)];

        while let Some((dir, depth)) = pending.pop() {
            let mut listing = tokio::fs::read_dir(&dir).await?;
            while let Some(item) = listing.next_entry().await? {
                let kind = item.file_type().await?;
                if depth < 2 {
                    if kind.is_dir() {
                        pending.push((item.path(), depth + 1));
                    }
                    continue;
                }
                if !kind.is_file() {
                    continue;
                }
                // skips leftover `.tmp` files from interrupted writes
                if let Some(address) = item
                    .file_name()
                    .to_str()
                    .and_then(|name| name.parse::<Address>().ok())
                {
                    addresses.push(address);
                }
            }
        }

        Ok(addresses)
    }
}
