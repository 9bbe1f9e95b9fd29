//! Error types for the log crate.

use kelp_identity::IdentityError;
use kelp_store::StoreError;
use kelp_types::Address;

use crate::access::AccessError;

/// Errors that can occur during log operations.
///
/// None of these are retried inside the log; retry policy for missing or
/// slow nodes belongs to the content store.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    /// No content store was configured.
    #[error("content store not defined")]
    ContentStoreNotDefined,

    /// No identity was configured.
    #[error("identity not defined")]
    IdentityNotDefined,

    /// Entry payload is empty.
    #[error("payload not defined")]
    PayloadNotDefined,

    /// Log id is empty.
    #[error("log id not defined")]
    LogIdNotDefined,

    /// The access controller refused an entry.
    #[error("entry {hash} not allowed: {source}")]
    AccessDenied {
        /// Hash of the refused entry.
        hash: Address,
        /// Controller's reason.
        #[source]
        source: AccessError,
    },

    /// Entry carries no signature.
    #[error("signature not defined for entry {0}")]
    SignatureNotDefined(Address),

    /// Entry signature does not verify against its key.
    #[error("could not validate signature for entry {hash} and key {key}")]
    InvalidSignature {
        /// Hash of the entry.
        hash: Address,
        /// Hex of the claimed signer key.
        key: String,
    },

    /// A received entry fails structural validation.
    #[error("invalid entry {hash}: {source}")]
    InvalidEntry {
        /// Hash of the rejected entry.
        hash: Address,
        /// The failed check.
        #[source]
        source: Box<LogError>,
    },

    /// Entry version is newer than this crate understands.
    #[error("unsupported entry version: {0}")]
    UnsupportedVersion(u8),

    /// The configured tiebreaker returned `Equal` for two distinct entries.
    #[error("log tiebreaker returned zero for distinct entries {a} and {b}")]
    NonDecidingTiebreaker {
        /// First compared entry.
        a: Address,
        /// Second compared entry.
        b: Address,
    },

    /// A node required to continue is not in the content store.
    #[error("entry not found: {0}")]
    EntryNotFound(Address),

    /// Serialization or deserialization of a node failed.
    #[error("codec error: {0}")]
    Codec(String),

    /// A background fetch task failed to complete.
    #[error("fetch failed: {0}")]
    Fetch(String),

    /// Content store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Identity provider error.
    #[error("identity error: {0}")]
    Identity(#[from] IdentityError),
}

impl From<postcard::Error> for LogError {
    fn from(e: postcard::Error) -> Self {
        Self::Codec(e.to_string())
    }
}

impl From<serde_json::Error> for LogError {
    fn from(e: serde_json::Error) -> Self {
        Self::Codec(e.to_string())
    }
}
