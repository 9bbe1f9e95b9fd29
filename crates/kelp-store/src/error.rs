//! Error types for node storage operations.

use kelp_types::Address;

/// Errors that can occur during node storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// An I/O error occurred.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A lock guarding in-memory state was poisoned by a panicking writer.
    #[error("store lock poisoned")]
    Poisoned,

    /// Stored bytes do not hash to the address they were read under.
    ///
    /// The node is not returned to the caller.
    #[error("node corruption detected: expected {expected}, actual hash {actual}")]
    Corrupt {
        /// The address that was requested.
        expected: Address,
        /// The address computed from the bytes actually stored.
        actual: Address,
    },
}
