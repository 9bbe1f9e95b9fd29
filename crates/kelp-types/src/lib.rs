//! Shared types for kelp.
//!
//! This crate defines the small value types every other kelp crate agrees
//! on: the content [`Address`] of a stored node, the [`LamportClock`] used
//! to order entries, and the [`LogConfig`] knobs a log is opened with.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

mod clock;
mod config;

pub use clock::LamportClock;
pub use config::{CodecFormat, LogConfig, SortKind};

// ---------------------------------------------------------------------------
// Content address
// ---------------------------------------------------------------------------

/// Content address of a stored node: `blake3(serialized_node)`.
///
/// Two nodes with identical bytes always share an address, which is what
/// lets a log deduplicate entries by address alone.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct Address([u8; 32]);

impl Address {
    /// Derive the address of arbitrary data by hashing it with BLAKE3.
    pub fn from_data(data: &[u8]) -> Self {
        Self(blake3::hash(data).into())
    }

    /// Return the raw 32-byte representation.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl From<[u8; 32]> for Address {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl FromStr for Address {
    type Err = hex::FromHexError;

    /// Parse the 64-character lowercase or uppercase hex form.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
