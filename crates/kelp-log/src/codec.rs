//! Wire encoding of entries and heads snapshots.
//!
//! Nodes are written in one of two serializations ([`CodecFormat`]). Every
//! entry node starts with its version field `v`, which selects the decoder
//! from [`DECODERS`]. Binary fields (keys, signatures, payloads) travel as
//! hex strings so the JSON form stays readable, and addresses as their hex
//! display form.

use kelp_identity::{IdentityRecord, IdentitySignatures};
use kelp_types::{Address, CodecFormat, LamportClock};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::entry::Entry;
use crate::error::LogError;
use crate::snapshot::HeadsSnapshot;

type DecodeFn = fn(&EntryCodec, &[u8]) -> Result<Entry, LogError>;

/// Known entry versions and their decoders.
const DECODERS: &[(u8, DecodeFn)] = &[(1, decode_v1), (2, decode_v2)];

/// Encodes and decodes nodes in a fixed [`CodecFormat`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntryCodec {
    format: CodecFormat,
}

impl EntryCodec {
    pub fn new(format: CodecFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> CodecFormat {
        self.format
    }

    /// Encode an entry node. The entry's own hash is never part of the node.
    pub fn encode_entry(&self, entry: &Entry) -> Result<Vec<u8>, LogError> {
        let clock = WireClock::from(&entry.clock);
        let identity = entry.identity.as_ref().map(WireIdentity::from);
        let next = hex_addresses(&entry.next);

        match entry.version {
            1 => self.to_bytes(&NodeV1 {
                v: 1,
                id: entry.log_id.clone(),
                key: hex::encode(&entry.key),
                sig: hex::encode(&entry.sig),
                hash: None,
                next,
                clock,
                payload: hex::encode(&entry.payload),
                identity,
            }),
            2 => self.to_bytes(&NodeV2 {
                v: 2,
                id: entry.log_id.clone(),
                key: hex::encode(&entry.key),
                sig: hex::encode(&entry.sig),
                hash: None,
                next,
                refs: hex_addresses(&entry.refs),
                clock,
                payload: hex::encode(&entry.payload),
                identity,
            }),
            v => Err(LogError::UnsupportedVersion(v)),
        }
    }

    /// Decode an entry node fetched from `address`.
    ///
    /// Nodes that decode but fail [`Entry::validate`] are rejected.
    pub fn decode_entry(&self, address: Address, bytes: &[u8]) -> Result<Entry, LogError> {
        let version = self.peek_version(bytes)?;
        let decode = DECODERS
            .iter()
            .find(|(v, _)| *v == version)
            .map(|(_, decode)| *decode)
            .ok_or(LogError::UnsupportedVersion(version))?;

        let mut entry = decode(self, bytes)?;
        entry.hash = address;
        entry.validate_received()?;
        Ok(entry)
    }

    /// Encode the `{id, heads}` document a log is addressed by.
    pub fn encode_heads(&self, snapshot: &HeadsSnapshot) -> Result<Vec<u8>, LogError> {
        self.to_bytes(&WireHeads {
            id: snapshot.id.clone(),
            heads: hex_addresses(&snapshot.heads),
        })
    }

    pub fn decode_heads(&self, bytes: &[u8]) -> Result<HeadsSnapshot, LogError> {
        let wire: WireHeads = self.from_bytes(bytes)?;
        Ok(HeadsSnapshot {
            id: wire.id,
            heads: parse_addresses("heads", &wire.heads)?,
        })
    }

    fn peek_version(&self, bytes: &[u8]) -> Result<u8, LogError> {
        match self.format {
            // postcard writes a u8 as a single raw byte, and `v` is the first field
            CodecFormat::Postcard => bytes
                .first()
                .copied()
                .ok_or_else(|| LogError::Codec("empty node".into())),
            CodecFormat::Json => Ok(serde_json::from_slice::<VersionProbe>(bytes)?.v),
        }
    }

    fn to_bytes<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, LogError> {
        match self.format {
            CodecFormat::Postcard => Ok(postcard::to_allocvec(value)?),
            CodecFormat::Json => Ok(serde_json::to_vec(value)?),
        }
    }

    fn from_bytes<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, LogError> {
        match self.format {
            CodecFormat::Postcard => Ok(postcard::from_bytes(bytes)?),
            CodecFormat::Json => Ok(serde_json::from_slice(bytes)?),
        }
    }
}

fn decode_v1(codec: &EntryCodec, bytes: &[u8]) -> Result<Entry, LogError> {
    let node: NodeV1 = codec.from_bytes(bytes)?;
    Ok(Entry {
        version: node.v,
        log_id: node.id,
        payload: parse_hex("payload", &node.payload)?,
        next: parse_addresses("next", &node.next)?,
        refs: Vec::new(),
        clock: LamportClock::try_from(node.clock)?,
        key: parse_hex("key", &node.key)?,
        sig: parse_hex("sig", &node.sig)?,
        identity: node.identity.map(IdentityRecord::try_from).transpose()?,
        hash: Address::from([0u8; 32]),
    })
}

fn decode_v2(codec: &EntryCodec, bytes: &[u8]) -> Result<Entry, LogError> {
    let node: NodeV2 = codec.from_bytes(bytes)?;
    Ok(Entry {
        version: node.v,
        log_id: node.id,
        payload: parse_hex("payload", &node.payload)?,
        next: parse_addresses("next", &node.next)?,
        refs: parse_addresses("refs", &node.refs)?,
        clock: LamportClock::try_from(node.clock)?,
        key: parse_hex("key", &node.key)?,
        sig: parse_hex("sig", &node.sig)?,
        identity: node.identity.map(IdentityRecord::try_from).transpose()?,
        hash: Address::from([0u8; 32]),
    })
}

fn hex_addresses(addresses: &[Address]) -> Vec<String> {
    addresses.iter().map(Address::to_string).collect()
}

fn parse_hex(field: &str, value: &str) -> Result<Vec<u8>, LogError> {
    hex::decode(value).map_err(|e| LogError::Codec(format!("{field}: {e}")))
}

fn parse_addresses(field: &str, values: &[String]) -> Result<Vec<Address>, LogError> {
    values
        .iter()
        .map(|v| {
            v.parse()
                .map_err(|e| LogError::Codec(format!("{field}: {e}")))
        })
        .collect()
}

#[derive(Deserialize)]
struct VersionProbe {
    v: u8,
}

#[derive(Serialize, Deserialize)]
struct WireClock {
    id: String,
    time: u64,
}

impl From<&LamportClock> for WireClock {
    fn from(clock: &LamportClock) -> Self {
        Self {
            id: hex::encode(clock.id()),
            time: clock.time(),
        }
    }
}

impl TryFrom<WireClock> for LamportClock {
    type Error = LogError;

    fn try_from(wire: WireClock) -> Result<Self, Self::Error> {
        Ok(LamportClock::with_time(parse_hex("clock.id", &wire.id)?, wire.time))
    }
}

#[derive(Serialize, Deserialize)]
struct WireSignatures {
    id: String,
    #[serde(rename = "publicKey")]
    public_key: String,
}

#[derive(Serialize, Deserialize)]
struct WireIdentity {
    id: String,
    #[serde(rename = "publicKey")]
    public_key: String,
    signatures: WireSignatures,
    #[serde(rename = "type")]
    kind: String,
}

impl From<&IdentityRecord> for WireIdentity {
    fn from(record: &IdentityRecord) -> Self {
        Self {
            id: record.id.clone(),
            public_key: hex::encode(&record.public_key),
            signatures: WireSignatures {
                id: hex::encode(&record.signatures.id),
                public_key: hex::encode(&record.signatures.public_key),
            },
            kind: record.kind.clone(),
        }
    }
}

impl TryFrom<WireIdentity> for IdentityRecord {
    type Error = LogError;

    fn try_from(wire: WireIdentity) -> Result<Self, Self::Error> {
        Ok(IdentityRecord {
            id: wire.id,
            public_key: parse_hex("identity.publicKey", &wire.public_key)?,
            signatures: IdentitySignatures {
                id: parse_hex("identity.signatures.id", &wire.signatures.id)?,
                public_key: parse_hex(
                    "identity.signatures.publicKey",
                    &wire.signatures.public_key,
                )?,
            },
            kind: wire.kind,
        })
    }
}

/// Version 1 node: no back-references.
#[derive(Serialize, Deserialize)]
struct NodeV1 {
    v: u8,
    id: String,
    key: String,
    sig: String,
    hash: Option<String>,
    next: Vec<String>,
    clock: WireClock,
    payload: String,
    identity: Option<WireIdentity>,
}

#[derive(Serialize, Deserialize)]
struct NodeV2 {
    v: u8,
    id: String,
    key: String,
    sig: String,
    hash: Option<String>,
    next: Vec<String>,
    refs: Vec<String>,
    clock: WireClock,
    payload: String,
    identity: Option<WireIdentity>,
}

#[derive(Serialize, Deserialize)]
struct WireHeads {
    id: String,
    heads: Vec<String>,
}
