//! Lamport clock used to order log entries.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// A `(writer id, logical time)` pair.
///
/// `id` is the writer's public key bytes. `time` starts at 0 and grows by
/// exactly one per entry the writer authors. Clocks are values: [`tick`]
/// and [`merge`] return new clocks and never mutate in place.
///
/// The ordering compares `time` first and falls back to a byte-wise
/// comparison of `id`, so two clocks only compare equal when both the
/// writer and the time match.
///
/// [`tick`]: LamportClock::tick
/// [`merge`]: LamportClock::merge
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LamportClock {
    id: Vec<u8>,
    time: u64,
}

impl LamportClock {
    /// Clock at time 0 for the given writer.
    pub fn new(id: impl Into<Vec<u8>>) -> Self {
        Self::with_time(id, 0)
    }

    /// Clock at an explicit time.
    pub fn with_time(id: impl Into<Vec<u8>>, time: u64) -> Self {
        Self {
            id: id.into(),
            time,
        }
    }

    /// Writer id (public key bytes).
    pub fn id(&self) -> &[u8] {
        &self.id
    }

    /// Logical time.
    pub fn time(&self) -> u64 {
        self.time
    }

    /// Same writer, `time + 1`.
    pub fn tick(&self) -> Self {
        Self {
            id: self.id.clone(),
            time: self.time + 1,
        }
    }

    /// Same writer, `max(self.time, other.time)`.
    pub fn merge(&self, other: &LamportClock) -> Self {
        Self {
            id: self.id.clone(),
            time: self.time.max(other.time),
        }
    }

    /// Total-order comparison: time, then id.
    pub fn compare(&self, other: &LamportClock) -> Ordering {
        self.time
            .cmp(&other.time)
            .then_with(|| self.id.as_slice().cmp(other.id.as_slice()))
    }
}

impl PartialOrd for LamportClock {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LamportClock {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}
