//! Exported views of a log.

use kelp_types::{Address, LamportClock};

use crate::entry::Entry;

/// The `{id, heads}` document a log is stored and addressed by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadsSnapshot {
    pub id: String,
    pub heads: Vec<Address>,
}

/// Full in-memory export of a log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub id: String,
    /// Head hashes.
    pub heads: Vec<Address>,
    /// Every reachable entry, oldest first.
    pub values: Vec<Entry>,
    pub clock: LamportClock,
}
