//! Signing providers and the keystore behind them.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use tracing::debug;

use crate::error::IdentityError;
use crate::identity::{Identity, IdentityRecord, IdentitySignatures};

/// Signs and verifies on behalf of identities.
///
/// Logs only rely on these operations; where keys live and how identities
/// are issued is up to the implementation.
pub trait IdentityProvider: Send + Sync {
    /// Provider type recorded on identities it issues.
    fn kind(&self) -> &str;

    /// Sign `data` with the key belonging to `identity`.
    fn sign(&self, identity: &IdentityRecord, data: &[u8]) -> Result<Vec<u8>, IdentityError>;

    /// Decode public key bytes as stored on entries.
    fn unmarshal_public_key(&self, bytes: &[u8]) -> Result<VerifyingKey, IdentityError>;

    /// Check `signature` over `data` against `public_key`.
    fn verify(&self, public_key: &VerifyingKey, data: &[u8], signature: &[u8]) -> bool;

    /// Check the signatures binding an identity's id to its public key.
    fn verify_identity(&self, identity: &IdentityRecord) -> bool {
        let Ok(key) = self.unmarshal_public_key(&identity.public_key) else {
            return false;
        };

        let mut bound = identity.public_key.clone();
        bound.extend_from_slice(&identity.signatures.id);

        self.verify(&key, identity.id.as_bytes(), &identity.signatures.id)
            && self.verify(&key, &bound, &identity.signatures.public_key)
    }
}

/// In-memory map from public key to ed25519 signing key.
#[derive(Default)]
pub struct Keystore {
    keys: RwLock<HashMap<Vec<u8>, SigningKey>>,
}

impl Keystore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a signing key, indexed by its public key.
    pub fn insert(&self, key: SigningKey) -> Result<VerifyingKey, IdentityError> {
        let verifying_key = key.verifying_key();
        self.keys
            .write()
            .map_err(|_| IdentityError::Poisoned)?
            .insert(verifying_key.to_bytes().to_vec(), key);
        Ok(verifying_key)
    }

    /// Whether a signing key exists for `public_key`.
    pub fn has_key(&self, public_key: &[u8]) -> Result<bool, IdentityError> {
        Ok(self
            .keys
            .read()
            .map_err(|_| IdentityError::Poisoned)?
            .contains_key(public_key))
    }

    fn sign(&self, public_key: &[u8], data: &[u8]) -> Result<Vec<u8>, IdentityError> {
        let keys = self.keys.read().map_err(|_| IdentityError::Poisoned)?;
        let key = keys
            .get(public_key)
            .ok_or_else(|| IdentityError::KeyNotFound(hex::encode(public_key)))?;
        let signature: Signature = key.sign(data);
        Ok(signature.to_bytes().to_vec())
    }
}

/// ed25519 identity provider backed by a shared [`Keystore`].
///
/// Cloning is cheap and clones share the keystore, so identities created
/// from any clone can be signed for by every other clone.
#[derive(Clone, Default)]
pub struct Ed25519Provider {
    keystore: Arc<Keystore>,
}

impl Ed25519Provider {
    /// Provider type string recorded on issued identities.
    pub const KIND: &'static str = "ed25519";

    pub fn new() -> Self {
        Self::default()
    }

    /// Provider over an existing keystore.
    pub fn with_keystore(keystore: Arc<Keystore>) -> Self {
        Self { keystore }
    }

    pub fn keystore(&self) -> &Arc<Keystore> {
        &self.keystore
    }

    /// Create an identity with a freshly generated key.
    pub fn create_identity(&self, id: &str) -> Result<Identity, IdentityError> {
        self.identity_from_seed(id, rand::random())
    }

    /// Create an identity whose key is derived from a fixed 32-byte seed.
    ///
    /// The same seed always yields the same public key.
    pub fn identity_from_seed(&self, id: &str, seed: [u8; 32]) -> Result<Identity, IdentityError> {
        let verifying_key = self.keystore.insert(SigningKey::from_bytes(&seed))?;
        let public_key = verifying_key.to_bytes().to_vec();

        let id_signature = self.keystore.sign(&public_key, id.as_bytes())?;
        let mut bound = public_key.clone();
        bound.extend_from_slice(&id_signature);
        let key_signature = self.keystore.sign(&public_key, &bound)?;

        let record = IdentityRecord {
            id: id.to_string(),
            public_key,
            signatures: IdentitySignatures {
                id: id_signature,
                public_key: key_signature,
            },
            kind: Self::KIND.to_string(),
        };

        debug!(id, public_key = %hex::encode(&record.public_key), "created identity");

        Ok(Identity::new(record, Arc::new(self.clone())))
    }
}

impl IdentityProvider for Ed25519Provider {
    fn kind(&self) -> &str {
        Self::KIND
    }

    fn sign(&self, identity: &IdentityRecord, data: &[u8]) -> Result<Vec<u8>, IdentityError> {
        self.keystore.sign(&identity.public_key, data)
    }

    fn unmarshal_public_key(&self, bytes: &[u8]) -> Result<VerifyingKey, IdentityError> {
        let bytes: [u8; 32] = bytes.try_into().map_err(|_| {
            IdentityError::InvalidPublicKey(format!("expected 32 bytes, got {}", bytes.len()))
        })?;
        VerifyingKey::from_bytes(&bytes).map_err(|e| IdentityError::InvalidPublicKey(e.to_string()))
    }

    fn verify(&self, public_key: &VerifyingKey, data: &[u8], signature: &[u8]) -> bool {
        let Ok(signature) = Signature::from_slice(signature) else {
            return false;
        };
        public_key.verify(data, &signature).is_ok()
    }
}
