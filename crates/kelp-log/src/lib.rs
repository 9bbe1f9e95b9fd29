//! Append-only, replicated Merkle-DAG log.
//!
//! A [`Log`] is one replica of a log identified by a string id. Replicas
//! accumulate immutable, signed [`Entry`] nodes, each referencing its
//! predecessors by content address, and can be merged pairwise with
//! [`Log::join`] in any order and any number of times. Join is a CRDT
//! merge: every replica that has seen the same entries ends up with the
//! same entry set and the same linearization.
//!
//! Ordering comes from per-writer [`LamportClock`]s plus a configurable
//! total [`SortPolicy`]; the default is last-write-wins. Reads
//! ([`Log::values`], [`Log::iterator`]) walk the DAG backward from the
//! heads with a bounded [`traverse`], which tolerates entries that have not
//! been fetched yet.
//!
//! Storage, identities and access control are collaborators: the log talks
//! to a [`ContentStore`](kelp_store::ContentStore), an
//! [`Identity`](kelp_identity::Identity) and an [`AccessController`].

mod access;
mod codec;
mod entry;
mod entry_set;
mod error;
mod fetch;
mod iter;
mod log;
mod snapshot;
mod sort;
mod traverse;

#[cfg(test)]
mod tests;

pub use access::{AccessController, AccessError, AllowAll, WriteAccess};
pub use codec::EntryCodec;
pub use entry::{ENTRY_VERSION, Entry, EntryBuilder};
pub use entry_set::OrderedEntrySet;
pub use error::LogError;
pub use fetch::{FetchOptions, fetch_all};
pub use iter::{IteratorOptions, LogIterator};
pub use kelp_types::{Address, LamportClock};
pub use log::{AppendOptions, Log, LogBuilder};
pub use snapshot::{HeadsSnapshot, Snapshot};
pub use sort::{
    AlwaysGreater, ByClock, ByClockId, EntryHashOrder, FirstWriteWins, FnPolicy, LastWriteWins,
    NoZeroes, SortPolicy, by_clock, by_clock_id, no_zeroes, policy_fn, policy_for, sort_entries,
};
pub use traverse::{find_heads, find_tails, tail_hashes, traverse};
