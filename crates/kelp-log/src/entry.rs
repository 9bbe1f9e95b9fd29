//! Log entries: immutable, signed, content-addressed DAG nodes.

use std::cmp::Ordering;

use bytes::Bytes;
use kelp_identity::{Identity, IdentityProvider, IdentityRecord};
use kelp_store::ContentStore;
use kelp_types::{Address, LamportClock};
use serde::Serialize;
use tracing::debug;

use crate::codec::EntryCodec;
use crate::error::LogError;

/// Entry format written by this crate.
///
/// Version 1 entries carry no `refs`; version 2 adds them. Both decode.
pub const ENTRY_VERSION: u8 = 2;

/// A single node of the log DAG.
///
/// `hash` is the content address of the encoded node as returned by the
/// store; an entry is immutable once it has one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Format version.
    pub version: u8,
    /// Id of the log this entry belongs to.
    pub log_id: String,
    /// Opaque user data.
    pub payload: Vec<u8>,
    /// Direct predecessors.
    pub next: Vec<Address>,
    /// Additional back-references to older ancestors, for fast traversal.
    pub refs: Vec<Address>,
    /// Writer clock at the time of the append.
    pub clock: LamportClock,
    /// Public key of the signer.
    pub key: Vec<u8>,
    /// Signature over the signable projection.
    pub sig: Vec<u8>,
    /// Public record of the signing identity.
    pub identity: Option<IdentityRecord>,
    /// Content address of the encoded node.
    pub hash: Address,
}

/// The projection of an entry that gets signed.
///
/// `hash` is always absent and `refs` only exists from version 2 on.
#[derive(Serialize)]
struct SignableContent<'a> {
    hash: Option<&'a str>,
    id: &'a str,
    payload: &'a [u8],
    next: Vec<String>,
    refs: Option<Vec<String>>,
    v: u8,
    clock: &'a LamportClock,
    key: &'a [u8],
}

impl Entry {
    /// Canonical bytes covered by `sig`.
    pub fn signable_bytes(&self) -> Result<Vec<u8>, LogError> {
        let content = SignableContent {
            hash: None,
            id: &self.log_id,
            payload: &self.payload,
            next: self.next.iter().map(Address::to_string).collect(),
            refs: (self.version >= 2).then(|| self.refs.iter().map(Address::to_string).collect()),
            v: self.version,
            clock: &self.clock,
            key: &self.key,
        };
        Ok(postcard::to_allocvec(&content)?)
    }

    /// Structural checks: version, log id and payload.
    pub fn validate(&self) -> Result<(), LogError> {
        if self.version == 0 || self.version > ENTRY_VERSION {
            return Err(LogError::UnsupportedVersion(self.version));
        }
        if self.log_id.is_empty() {
            return Err(LogError::LogIdNotDefined);
        }
        if self.payload.is_empty() {
            return Err(LogError::PayloadNotDefined);
        }
        Ok(())
    }

    /// [`validate`](Self::validate) for an entry that came from another
    /// replica or the store, naming the entry in the error.
    pub fn validate_received(&self) -> Result<(), LogError> {
        self.validate().map_err(|source| LogError::InvalidEntry {
            hash: self.hash,
            source: Box::new(source),
        })
    }

    /// Whether [`validate`](Self::validate) passes.
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Check `sig` against `key` with the given provider.
    pub fn verify(&self, provider: &dyn IdentityProvider) -> Result<(), LogError> {
        if self.sig.is_empty() {
            return Err(LogError::SignatureNotDefined(self.hash));
        }

        let invalid = || LogError::InvalidSignature {
            hash: self.hash,
            key: hex::encode(&self.key),
        };
        let key = provider.unmarshal_public_key(&self.key).map_err(|_| invalid())?;
        let data = self.signable_bytes()?;
        if !provider.verify(&key, &data, &self.sig) {
            return Err(invalid());
        }
        Ok(())
    }

    /// Whether `self` is a direct predecessor of `child`.
    pub fn is_parent(&self, child: &Entry) -> bool {
        child.next.contains(&self.hash)
    }

    /// Follow the chain of children of `entry` within `values`.
    ///
    /// At each step the first entry of `values` that lists the previous one
    /// in its `next` is taken. The chain is returned ordered by clock time.
    pub fn find_children<'a>(entry: &Entry, values: &'a [Entry]) -> Vec<&'a Entry> {
        let mut chain: Vec<&Entry> = Vec::new();
        let mut prev = entry.hash;

        while let Some(child) = values.iter().find(|e| e.next.contains(&prev)) {
            if chain.len() >= values.len() {
                break;
            }
            chain.push(child);
            prev = child.hash;
        }

        chain.sort_by_key(|e| e.clock.time());
        chain
    }

    /// Order by clock: time, then clock id.
    pub fn compare(a: &Entry, b: &Entry) -> Ordering {
        a.clock.compare(&b.clock)
    }
}

/// Builds, signs and stores a new [`Entry`].
///
/// ```ignore
/// let entry = EntryBuilder::new()
///     .store(store.as_ref())
///     .identity(&identity)
///     .log_id("A")
///     .payload("hello")
///     .build()
///     .await?;
/// ```
#[derive(Default)]
pub struct EntryBuilder<'a> {
    store: Option<&'a dyn ContentStore>,
    identity: Option<&'a Identity>,
    codec: EntryCodec,
    log_id: String,
    payload: Vec<u8>,
    next: Vec<Address>,
    refs: Vec<Address>,
    clock: Option<LamportClock>,
    version: Option<u8>,
}

impl<'a> EntryBuilder<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(mut self, store: &'a dyn ContentStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn identity(mut self, identity: &'a Identity) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn codec(mut self, codec: EntryCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn log_id(mut self, log_id: impl Into<String>) -> Self {
        self.log_id = log_id.into();
        self
    }

    pub fn payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload = payload.into();
        self
    }

    pub fn next(mut self, next: Vec<Address>) -> Self {
        self.next = next;
        self
    }

    pub fn refs(mut self, refs: Vec<Address>) -> Self {
        self.refs = refs;
        self
    }

    /// Clock to stamp the entry with. Defaults to the identity's key at time 0.
    pub fn clock(mut self, clock: LamportClock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Entry format version. Defaults to [`ENTRY_VERSION`].
    pub fn version(mut self, version: u8) -> Self {
        self.version = Some(version);
        self
    }

    /// Sign the entry, write it to the store and return it with its hash.
    pub async fn build(self) -> Result<Entry, LogError> {
        let store = self.store.ok_or(LogError::ContentStoreNotDefined)?;
        let identity = self.identity.ok_or(LogError::IdentityNotDefined)?;
        if self.payload.is_empty() {
            return Err(LogError::PayloadNotDefined);
        }
        if self.log_id.is_empty() {
            return Err(LogError::LogIdNotDefined);
        }

        let version = self.version.unwrap_or(ENTRY_VERSION);
        let refs = if version >= 2 { self.refs } else { Vec::new() };
        let clock = self
            .clock
            .unwrap_or_else(|| LamportClock::new(identity.public_key()));

        let mut entry = Entry {
            version,
            log_id: self.log_id,
            payload: self.payload,
            next: self.next,
            refs,
            clock,
            key: identity.public_key().to_vec(),
            sig: Vec::new(),
            identity: Some(identity.filtered()),
            hash: Address::from([0u8; 32]),
        };
        entry.validate()?;

        entry.sig = identity.sign(&entry.signable_bytes()?)?;

        let encoded = self.codec.encode_entry(&entry)?;
        entry.hash = store.put(Bytes::from(encoded)).await?;

        debug!(
            hash = %entry.hash,
            log_id = %entry.log_id,
            time = entry.clock.time(),
            next = entry.next.len(),
            refs = entry.refs.len(),
            "created entry"
        );

        Ok(entry)
    }
}
