//! Total orders over entries.
//!
//! A [`SortPolicy`] linearizes concurrent entries. Policies are built from
//! small combinators: [`by_clock`] and [`by_clock_id`] compare one clock
//! component and defer to a resolver on ties. Every policy a log uses is
//! wrapped in [`NoZeroes`], which turns an undecided comparison between
//! two distinct entries into [`LogError::NonDecidingTiebreaker`].

use std::borrow::Borrow;
use std::cmp::Ordering;
use std::sync::Arc;

use kelp_types::SortKind;

use crate::entry::Entry;
use crate::error::LogError;

/// A fallible total order over entries.
pub trait SortPolicy: Send + Sync {
    fn compare(&self, a: &Entry, b: &Entry) -> Result<Ordering, LogError>;
}

impl<P: SortPolicy + ?Sized> SortPolicy for &P {
    fn compare(&self, a: &Entry, b: &Entry) -> Result<Ordering, LogError> {
        (**self).compare(a, b)
    }
}

impl<P: SortPolicy + ?Sized> SortPolicy for Arc<P> {
    fn compare(&self, a: &Entry, b: &Entry) -> Result<Ordering, LogError> {
        (**self).compare(a, b)
    }
}

impl<P: SortPolicy + ?Sized> SortPolicy for Box<P> {
    fn compare(&self, a: &Entry, b: &Entry) -> Result<Ordering, LogError> {
        (**self).compare(a, b)
    }
}

/// Compare clocks (time, then id); on a tie defer to `resolve`.
#[derive(Debug, Clone, Copy)]
pub struct ByClock<R>(R);

pub fn by_clock<R: SortPolicy>(resolve: R) -> ByClock<R> {
    ByClock(resolve)
}

impl<R: SortPolicy> SortPolicy for ByClock<R> {
    fn compare(&self, a: &Entry, b: &Entry) -> Result<Ordering, LogError> {
        match a.clock.compare(&b.clock) {
            Ordering::Equal => self.0.compare(a, b),
            ord => Ok(ord),
        }
    }
}

/// Compare clock ids byte-wise; on a tie defer to `resolve`.
#[derive(Debug, Clone, Copy)]
pub struct ByClockId<R>(R);

pub fn by_clock_id<R: SortPolicy>(resolve: R) -> ByClockId<R> {
    ByClockId(resolve)
}

impl<R: SortPolicy> SortPolicy for ByClockId<R> {
    fn compare(&self, a: &Entry, b: &Entry) -> Result<Ordering, LogError> {
        match a.clock.id().cmp(b.clock.id()) {
            Ordering::Equal => self.0.compare(a, b),
            ord => Ok(ord),
        }
    }
}

/// Always reports `Greater`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysGreater;

impl SortPolicy for AlwaysGreater {
    fn compare(&self, _: &Entry, _: &Entry) -> Result<Ordering, LogError> {
        Ok(Ordering::Greater)
    }
}

/// The default order: the later clock sorts last.
#[derive(Debug, Clone, Copy, Default)]
pub struct LastWriteWins;

impl SortPolicy for LastWriteWins {
    fn compare(&self, a: &Entry, b: &Entry) -> Result<Ordering, LogError> {
        by_clock(by_clock_id(AlwaysGreater)).compare(a, b)
    }
}

/// Reverse of [`LastWriteWins`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstWriteWins;

impl SortPolicy for FirstWriteWins {
    fn compare(&self, a: &Entry, b: &Entry) -> Result<Ordering, LogError> {
        LastWriteWins.compare(a, b).map(Ordering::reverse)
    }
}

/// Clock, then clock id, then entry hash.
#[derive(Debug, Clone, Copy, Default)]
pub struct EntryHashOrder;

impl SortPolicy for EntryHashOrder {
    fn compare(&self, a: &Entry, b: &Entry) -> Result<Ordering, LogError> {
        by_clock(by_clock_id(policy_fn(|a: &Entry, b: &Entry| Ok(a.hash.cmp(&b.hash)))))
            .compare(a, b)
    }
}

/// Adapts a closure into a [`SortPolicy`].
#[derive(Clone, Copy)]
pub struct FnPolicy<F>(F);

pub fn policy_fn<F>(f: F) -> FnPolicy<F>
where
    F: Fn(&Entry, &Entry) -> Result<Ordering, LogError> + Send + Sync,
{
    FnPolicy(f)
}

impl<F> SortPolicy for FnPolicy<F>
where
    F: Fn(&Entry, &Entry) -> Result<Ordering, LogError> + Send + Sync,
{
    fn compare(&self, a: &Entry, b: &Entry) -> Result<Ordering, LogError> {
        (self.0)(a, b)
    }
}

/// Rejects `Equal` between entries with different hashes.
#[derive(Debug, Clone, Copy)]
pub struct NoZeroes<P>(P);

pub fn no_zeroes<P: SortPolicy>(policy: P) -> NoZeroes<P> {
    NoZeroes(policy)
}

impl<P: SortPolicy> SortPolicy for NoZeroes<P> {
    fn compare(&self, a: &Entry, b: &Entry) -> Result<Ordering, LogError> {
        let ord = self.0.compare(a, b)?;
        if ord == Ordering::Equal && a.hash != b.hash {
            return Err(LogError::NonDecidingTiebreaker {
                a: a.hash,
                b: b.hash,
            });
        }
        Ok(ord)
    }
}

/// The built-in policy selected by configuration.
pub fn policy_for(kind: SortKind) -> Arc<dyn SortPolicy> {
    match kind {
        SortKind::LastWriteWins => Arc::new(LastWriteWins),
        SortKind::FirstWriteWins => Arc::new(FirstWriteWins),
        SortKind::EntryHash => Arc::new(EntryHashOrder),
    }
}

/// Stable ascending sort under a fallible policy.
///
/// The first comparison error aborts the sort and is returned; the slice
/// is left in an unspecified order.
pub fn sort_entries<T, P>(items: &mut [T], policy: &P) -> Result<(), LogError>
where
    T: Borrow<Entry> + Clone,
    P: SortPolicy + ?Sized,
{
    if items.len() < 2 {
        return Ok(());
    }

    let mid = items.len() / 2;
    sort_entries(&mut items[..mid], policy)?;
    sort_entries(&mut items[mid..], policy)?;

    let mut merged = Vec::with_capacity(items.len());
    let (mut i, mut j) = (0, mid);
    while i < mid && j < items.len() {
        // ties keep the left element first
        if policy.compare(items[j].borrow(), items[i].borrow())? == Ordering::Less {
            merged.push(items[j].clone());
            j += 1;
        } else {
            merged.push(items[i].clone());
            i += 1;
        }
    }
    merged.extend_from_slice(&items[i..mid]);
    merged.extend_from_slice(&items[j..]);
    items.clone_from_slice(&merged);
    Ok(())
}
