//! Error types for identity and signing operations.

/// Errors that can occur while creating identities or signing.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    /// No signing key is stored for the identity's public key.
    #[error("no signing key for public key {0}")]
    KeyNotFound(String),

    /// Public key bytes do not decode to a valid key.
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    /// The keystore lock was poisoned by a panicking writer.
    #[error("keystore lock poisoned")]
    Poisoned,
}
