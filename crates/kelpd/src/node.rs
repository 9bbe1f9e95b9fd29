//! On-disk layout of a kelpd data directory.
//!
//! ```text
//! {data_dir}/identity.key     32-byte ed25519 seed of the writer
//! {data_dir}/blocks/          FileStore holding entries and heads snapshots
//! {data_dir}/logs/{name}.head hex address of the latest heads snapshot
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use kelp_identity::{Ed25519Provider, Identity};
use kelp_log::{Log, LogBuilder};
use kelp_store::{ContentStore, FileStore};
use kelp_types::{Address, LogConfig};
use tracing::{debug, info};

use crate::config::CliConfig;

/// A data directory opened for reading and writing logs.
pub struct Node {
    data_dir: PathBuf,
    store: Arc<FileStore>,
    identity: Identity,
    log_config: LogConfig,
}

impl Node {
    /// Open (or initialize) the data directory named by the config.
    pub fn open(config: &CliConfig) -> Result<Self> {
        let data_dir = config.node.data_dir.clone();
        std::fs::create_dir_all(data_dir.join("logs"))
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let store = Arc::new(FileStore::new(data_dir.join("blocks")).context("failed to open store")?);
        let seed = load_or_create_seed(&data_dir)?;
        let identity = Ed25519Provider::new()
            .identity_from_seed(&config.node.identity, seed)
            .context("failed to create identity")?;

        Ok(Self {
            data_dir,
            store,
            identity,
            log_config: config.log.clone(),
        })
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn log_config(&self) -> &LogConfig {
        &self.log_config
    }

    fn builder(&self, store: Arc<dyn ContentStore>) -> LogBuilder {
        Log::builder()
            .identity(self.identity.clone())
            .store(store)
            .config(&self.log_config)
    }

    /// Open the named log, loading it from its head pointer when one exists.
    pub async fn open_log(&self, name: &str) -> Result<Log> {
        let builder = self.builder(self.store.clone()).id(name);
        match read_head_pointer(&self.data_dir, name)? {
            Some(address) => {
                let log = builder
                    .load_from_address(address)
                    .await
                    .with_context(|| format!("failed to load log {name}"))?;
                debug!(log = name, %address, entries = log.len(), "opened log");
                Ok(log)
            }
            None => Ok(builder.build()?),
        }
    }

    /// Store the log's heads snapshot and move its head pointer to it.
    pub async fn save_log(&self, log: &Log) -> Result<Address> {
        let address = log.to_address().await?;
        write_head_pointer(&self.data_dir, log.id(), address)?;
        info!(log = log.id(), %address, heads = log.heads().len(), "saved log");
        Ok(address)
    }

    /// Head pointer of the named log, if it was ever saved.
    pub fn head(&self, name: &str) -> Result<Option<Address>> {
        read_head_pointer(&self.data_dir, name)
    }

    /// Load the named log from another data directory and copy its
    /// entries into this node's store.
    pub async fn import(&self, other_dir: &Path, name: &str) -> Result<Log> {
        let address = read_head_pointer(other_dir, name)?
            .with_context(|| format!("no log {name} in {}", other_dir.display()))?;
        let remote_store: Arc<dyn ContentStore> =
            Arc::new(FileStore::new(other_dir.join("blocks")).context("failed to open remote store")?);

        let remote = self
            .builder(remote_store.clone())
            .id(name)
            .load_from_address(address)
            .await
            .with_context(|| format!("failed to load log {name} from {}", other_dir.display()))?;

        for entry in remote.entries() {
            let bytes = remote_store
                .get(entry.hash)
                .await?
                .with_context(|| format!("entry {} vanished from remote store", entry.hash))?;
            self.store.put(bytes).await?;
        }

        info!(log = name, from = %other_dir.display(), entries = remote.len(), "imported log");
        Ok(remote)
    }
}

/// Load the writer seed from `identity.key`, generating it on first use.
///
/// Different data directories get different writers; the same directory
/// keeps its writer across runs.
pub fn load_or_create_seed(data_dir: &Path) -> Result<[u8; 32]> {
    let key_path = data_dir.join("identity.key");
    if key_path.exists() {
        let bytes = std::fs::read(&key_path).context("failed to read identity.key")?;
        anyhow::ensure!(bytes.len() == 32, "identity.key must be exactly 32 bytes");
        let mut seed = [0u8; 32];
        seed.copy_from_slice(&bytes);
        debug!(path = %key_path.display(), "loaded writer key");
        Ok(seed)
    } else {
        use rand::RngCore;
        let mut seed = [0u8; 32];
        rand::rng().fill_bytes(&mut seed);
        std::fs::write(&key_path, seed).context("failed to write identity.key")?;
        info!(path = %key_path.display(), "generated new writer key");
        Ok(seed)
    }
}

fn head_path(data_dir: &Path, name: &str) -> Result<PathBuf> {
    anyhow::ensure!(
        !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            && !name.starts_with('.'),
        "invalid log name {name:?}: use letters, digits, '-', '_' or '.'"
    );
    Ok(data_dir.join("logs").join(format!("{name}.head")))
}

fn read_head_pointer(data_dir: &Path, name: &str) -> Result<Option<Address>> {
    let path = head_path(data_dir, name)?;
    if !path.exists() {
        return Ok(None);
    }
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let address = text
        .trim()
        .parse::<Address>()
        .with_context(|| format!("corrupt head pointer {}", path.display()))?;
    Ok(Some(address))
}

fn write_head_pointer(data_dir: &Path, name: &str, address: Address) -> Result<()> {
    let path = head_path(data_dir, name)?;
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, format!("{address}\n"))?;
    std::fs::rename(&tmp, &path)
        .with_context(|| format!("failed to update {}", path.display()))?;
    Ok(())
}
