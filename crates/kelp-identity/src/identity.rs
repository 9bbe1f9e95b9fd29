//! Identity handle and its public projection.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::IdentityError;
use crate::provider::IdentityProvider;

/// Signatures an identity provider issued for an identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdentitySignatures {
    /// Signature over the identity id.
    pub id: Vec<u8>,
    /// Signature over `public_key || signatures.id`.
    pub public_key: Vec<u8>,
}

/// Public, serializable part of an identity.
///
/// This is what gets stored on entries; it holds no private material.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdentityRecord {
    /// Human-chosen identity id.
    pub id: String,
    /// Public key bytes of the writer.
    pub public_key: Vec<u8>,
    /// Provider-issued signatures binding id and key.
    pub signatures: IdentitySignatures,
    /// Provider type, e.g. `"ed25519"`.
    pub kind: String,
}

/// An identity that can sign: public record plus provider.
#[derive(Clone)]
pub struct Identity {
    record: IdentityRecord,
    provider: Arc<dyn IdentityProvider>,
}

impl Identity {
    /// Pair a record with the provider holding its key.
    pub fn new(record: IdentityRecord, provider: Arc<dyn IdentityProvider>) -> Self {
        Self { record, provider }
    }

    pub fn id(&self) -> &str {
        &self.record.id
    }

    pub fn public_key(&self) -> &[u8] {
        &self.record.public_key
    }

    pub fn signatures(&self) -> &IdentitySignatures {
        &self.record.signatures
    }

    pub fn kind(&self) -> &str {
        &self.record.kind
    }

    /// The provider that signs and verifies for this identity.
    pub fn provider(&self) -> &Arc<dyn IdentityProvider> {
        &self.provider
    }

    /// Public-only projection stored on entries.
    pub fn filtered(&self) -> IdentityRecord {
        self.record.clone()
    }

    /// Sign `data` with this identity's key.
    pub fn sign(&self, data: &[u8]) -> Result<Vec<u8>, IdentityError> {
        self.provider.sign(&self.record, data)
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("id", &self.record.id)
            .field("public_key", &hex::encode(&self.record.public_key))
            .field("kind", &self.record.kind)
            .finish()
    }
}
