//! Configuration knobs for opening a log.
//!
//! Every field has a default so that an empty TOML table is a valid
//! configuration.

use serde::{Deserialize, Serialize};

/// Which total order a log linearizes its entries with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKind {
    /// Clock time, then clock id; the later write sorts last.
    #[default]
    LastWriteWins,
    /// Inverse of [`SortKind::LastWriteWins`].
    FirstWriteWins,
    /// Clock time, then clock id, then entry hash.
    EntryHash,
}

/// Serialization used for nodes written to the content store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodecFormat {
    /// Compact binary encoding (postcard).
    #[default]
    Postcard,
    /// Human-readable JSON.
    Json,
}

/// Options a log is opened with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// How many ancestors an append walks to build back-references.
    pub pointer_count: usize,
    /// Tiebreaker used to linearize concurrent entries.
    pub sort: SortKind,
    /// Node encoding for the content store.
    pub codec: CodecFormat,
    /// Maximum number of concurrent store reads while loading a log.
    pub fetch_concurrency: usize,
    /// Per-read timeout while loading, in milliseconds. `0` disables it.
    pub fetch_timeout_ms: u64,
    /// Keep only the newest `length` entries when loading.
    pub length: Option<usize>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            pointer_count: 1,
            sort: SortKind::LastWriteWins,
            codec: CodecFormat::Postcard,
            fetch_concurrency: 16,
            fetch_timeout_ms: 0,
            length: None,
        }
    }
}
