//! Insertion-ordered map from entry hash to entry.

use std::collections::HashMap;

use kelp_types::Address;

use crate::entry::Entry;

/// Entries keyed by hash, remembering insertion order.
///
/// Setting an existing key replaces the entry in place without moving it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderedEntrySet {
    order: Vec<Entry>,
    index: HashMap<Address, usize>,
}

impl OrderedEntrySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn get(&self, hash: &Address) -> Option<&Entry> {
        self.index.get(hash).map(|&i| &self.order[i])
    }

    pub fn contains(&self, hash: &Address) -> bool {
        self.index.contains_key(hash)
    }

    /// Insert or replace the entry stored under `entry.hash`.
    pub fn set(&mut self, entry: Entry) {
        match self.index.get(&entry.hash) {
            Some(&i) => self.order[i] = entry,
            None => {
                self.index.insert(entry.hash, self.order.len());
                self.order.push(entry);
            }
        }
    }

    pub fn delete(&mut self, hash: &Address) -> Option<Entry> {
        let i = self.index.remove(hash)?;
        let removed = self.order.remove(i);
        for entry in &self.order[i..] {
            if let Some(slot) = self.index.get_mut(&entry.hash) {
                *slot -= 1;
            }
        }
        Some(removed)
    }

    pub fn keys(&self) -> impl Iterator<Item = &Address> + '_ {
        self.order.iter().map(|e| &e.hash)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Entry> {
        self.order.iter()
    }

    /// Entries in insertion order.
    pub fn as_slice(&self) -> &[Entry] {
        &self.order
    }

    /// Entries in positions `start..end`, clamped to the set.
    pub fn slice(&self, start: usize, end: usize) -> &[Entry] {
        let end = end.min(self.order.len());
        &self.order[start.min(end)..end]
    }

    /// Union where `other` wins on shared keys.
    ///
    /// Keys of `self` keep their positions; keys only in `other` follow in
    /// `other`'s order.
    pub fn merge(&self, other: &OrderedEntrySet) -> OrderedEntrySet {
        let mut merged = self.clone();
        merged.extend(other.iter().cloned());
        merged
    }

    /// The `n` oldest insertions.
    pub fn first(&self, n: usize) -> &[Entry] {
        self.slice(0, n)
    }

    /// The `n` newest insertions.
    pub fn last(&self, n: usize) -> &[Entry] {
        &self.order[self.order.len().saturating_sub(n)..]
    }

    pub fn reverse(&self) -> OrderedEntrySet {
        self.order.iter().rev().cloned().collect()
    }

    pub fn into_vec(self) -> Vec<Entry> {
        self.order
    }
}

impl Extend<Entry> for OrderedEntrySet {
    fn extend<I: IntoIterator<Item = Entry>>(&mut self, iter: I) {
        for entry in iter {
            self.set(entry);
        }
    }
}

impl FromIterator<Entry> for OrderedEntrySet {
    fn from_iter<I: IntoIterator<Item = Entry>>(iter: I) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

impl<'a> IntoIterator for &'a OrderedEntrySet {
    type Item = &'a Entry;
    type IntoIter = std::slice::Iter<'a, Entry>;

    fn into_iter(self) -> Self::IntoIter {
        self.order.iter()
    }
}

impl IntoIterator for OrderedEntrySet {
    type Item = Entry;
    type IntoIter = std::vec::IntoIter<Entry>;

    fn into_iter(self) -> Self::IntoIter {
        self.order.into_iter()
    }
}
