//! Write permission checks.

use std::collections::HashSet;

use kelp_identity::Identity;

use crate::entry::Entry;

/// Why an access controller refused an entry.
#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    /// Writer key is not on the allow-list.
    #[error("key {key} is not allowed to write")]
    NotAllowed { key: String },

    /// The identity attached to the entry does not verify.
    #[error("identity {id} could not be verified")]
    InvalidIdentity { id: String },

    /// Refused for a controller-specific reason.
    #[error("{0}")]
    Denied(String),
}

/// Decides whether an entry may be added to a log.
///
/// Consulted on every append and for every incoming entry on join. The
/// `identity` argument is the local replica's identity.
pub trait AccessController: Send + Sync {
    fn can_append(&self, entry: &Entry, identity: &Identity) -> Result<(), AccessError>;
}

/// Accepts every entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl AccessController for AllowAll {
    fn can_append(&self, _: &Entry, _: &Identity) -> Result<(), AccessError> {
        Ok(())
    }
}

/// Allow-list of writer public keys.
///
/// An entry is accepted when its writer key is listed (or the list is
/// open to anyone) and the identity it carries verifies.
#[derive(Debug, Clone, Default)]
pub struct WriteAccess {
    writers: HashSet<Vec<u8>>,
    anyone: bool,
}

impl WriteAccess {
    pub fn new<I, K>(writers: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<Vec<u8>>,
    {
        Self {
            writers: writers.into_iter().map(Into::into).collect(),
            anyone: false,
        }
    }

    /// Accept any writer whose identity verifies.
    pub fn anyone() -> Self {
        Self {
            writers: HashSet::new(),
            anyone: true,
        }
    }

    /// Parse a list of hex public keys; `"*"` opens the log to anyone.
    pub fn from_hex<S: AsRef<str>>(keys: &[S]) -> Result<Self, hex::FromHexError> {
        let mut access = Self::default();
        for key in keys {
            match key.as_ref() {
                "*" => access.anyone = true,
                key => {
                    access.writers.insert(hex::decode(key)?);
                }
            }
        }
        Ok(access)
    }

    pub fn grant(&mut self, key: impl Into<Vec<u8>>) {
        self.writers.insert(key.into());
    }

    pub fn revoke(&mut self, key: &[u8]) {
        self.writers.remove(key);
    }

    pub fn is_writer(&self, key: &[u8]) -> bool {
        self.anyone || self.writers.contains(key)
    }
}

impl AccessController for WriteAccess {
    fn can_append(&self, entry: &Entry, identity: &Identity) -> Result<(), AccessError> {
        let key = entry
            .identity
            .as_ref()
            .map_or(entry.key.as_slice(), |record| record.public_key.as_slice());

        if !self.is_writer(key) {
            return Err(AccessError::NotAllowed {
                key: hex::encode(key),
            });
        }

        if let Some(record) = &entry.identity
            && !identity.provider().verify_identity(record)
        {
            return Err(AccessError::InvalidIdentity {
                id: record.id.clone(),
            });
        }

        Ok(())
    }
}
