//! Range reads over a log.

use kelp_types::Address;

use crate::entry::Entry;

/// Bounds for [`Log::iterator`](crate::Log::iterator).
///
/// All bounds are entry hashes. Hashes the log does not hold are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IteratorOptions {
    /// Stop before this entry.
    pub gt: Option<Address>,
    /// Stop at this entry, inclusive.
    pub gte: Option<Address>,
    /// Start below these entries.
    pub lt: Vec<Address>,
    /// Start at these entries, inclusive.
    pub lte: Vec<Address>,
    /// Upper bound on the number of entries. `Some(0)` yields nothing.
    pub amount: Option<usize>,
}

impl IteratorOptions {
    pub fn gt(mut self, hash: Address) -> Self {
        self.gt = Some(hash);
        self
    }

    pub fn gte(mut self, hash: Address) -> Self {
        self.gte = Some(hash);
        self
    }

    pub fn lt(mut self, hash: Address) -> Self {
        self.lt.push(hash);
        self
    }

    pub fn lte(mut self, hash: Address) -> Self {
        self.lte.push(hash);
        self
    }

    pub fn amount(mut self, amount: usize) -> Self {
        self.amount = Some(amount);
        self
    }
}

/// Finite sequence of entries, newest first.
#[derive(Debug)]
pub struct LogIterator {
    inner: std::vec::IntoIter<Entry>,
}

impl LogIterator {
    pub(crate) fn new(entries: Vec<Entry>) -> Self {
        Self {
            inner: entries.into_iter(),
        }
    }
}

impl Iterator for LogIterator {
    type Item = Entry;

    fn next(&mut self) -> Option<Entry> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for LogIterator {}
