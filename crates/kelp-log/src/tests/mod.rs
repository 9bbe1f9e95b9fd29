//! Tests for the log crate.


use std::sync::Arc;

use bytes::Bytes;
use kelp_identity::{Ed25519Provider, Identity};
use kelp_store::{ContentStore, MemoryStore};
use kelp_types::{Address, LamportClock};

use crate::codec::EntryCodec;
use crate::entry::Entry;
use crate::log::{AppendOptions, Log};

/// Deterministic identity derived from a seed.
fn test_identity(seed: u8) -> Identity {
    Ed25519Provider::new()
        .identity_from_seed(&format!("user-{seed}"), [seed; 32])
        .unwrap()
}

fn test_store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::new())
}

/// A log with id `id` written by the identity for `seed`.
fn test_log(store: &Arc<MemoryStore>, seed: u8, id: &str) -> Log {
    Log::builder()
        .id(id)
        .identity(test_identity(seed))
        .store(store.clone())
        .build()
        .unwrap()
}

/// Append each payload with default options.
async fn append_all(log: &mut Log, payloads: &[&str]) -> Vec<Entry> {
    let mut entries = Vec::new();
    for payload in payloads {
        entries.push(log.append(*payload, AppendOptions::default()).await.unwrap());
    }
    entries
}

fn payloads(entries: &[Entry]) -> Vec<String> {
    entries
        .iter()
        .map(|e| String::from_utf8_lossy(&e.payload).into_owned())
        .collect()
}

fn hashes(entries: &[Entry]) -> Vec<Address> {
    entries.iter().map(|e| e.hash).collect()
}

/// An unsigned entry for exercising ordering and traversal without a store.
fn fake_entry(name: &str, writer: u8, time: u64, next: &[&Entry]) -> Entry {
    Entry {
        version: 2,
        log_id: "fake".to_string(),
        payload: name.as_bytes().to_vec(),
        next: next.iter().map(|e| e.hash).collect(),
        refs: Vec::new(),
        clock: LamportClock::with_time(vec![writer], time),
        key: vec![writer],
        sig: Vec::new(),
        identity: None,
        hash: Address::from_data(name.as_bytes()),
    }
}

/// A correctly signed and stored entry that skips the builder's checks, so
/// it may carry an empty payload or log id.
async fn signed_raw_entry(
    store: &Arc<MemoryStore>,
    identity: &Identity,
    log_id: &str,
    payload: &[u8],
) -> Entry {
    let mut entry = Entry {
        version: 2,
        log_id: log_id.to_string(),
        payload: payload.to_vec(),
        next: Vec::new(),
        refs: Vec::new(),
        clock: LamportClock::with_time(identity.public_key(), 1),
        key: identity.public_key().to_vec(),
        sig: Vec::new(),
        identity: Some(identity.filtered()),
        hash: Address::from([0u8; 32]),
    };
    entry.sig = identity.sign(&entry.signable_bytes().unwrap()).unwrap();
    let encoded = EntryCodec::default().encode_entry(&entry).unwrap();
    entry.hash = store.put(Bytes::from(encoded)).await.unwrap();
    entry
}
