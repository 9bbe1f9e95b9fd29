//! Walking the DAG: bounded traversal, heads, tails and set difference.

use std::collections::{HashSet, VecDeque};

use kelp_types::Address;

use crate::entry::Entry;
use crate::entry_set::OrderedEntrySet;
use crate::error::LogError;
use crate::sort::{SortPolicy, sort_entries};

/// Walk backward from `frontier`, newest first under `policy`.
///
/// The pending set is kept sorted so that the greatest entry is always
/// visited next. Each entry is visited at most once. Predecessors that
/// `lookup` cannot resolve are skipped, so partially fetched logs can be
/// traversed. The walk ends when the pending set is empty, when `amount`
/// entries have been collected, or right after the entry whose hash is
/// `stop` has been collected.
pub fn traverse<'a, F, P>(
    lookup: F,
    frontier: Vec<&'a Entry>,
    amount: Option<usize>,
    stop: Option<&Address>,
    policy: &P,
) -> Result<Vec<&'a Entry>, LogError>
where
    F: Fn(&Address) -> Option<&'a Entry>,
    P: SortPolicy + ?Sized,
{
    let mut visited: HashSet<Address> = HashSet::new();
    let mut stack: Vec<&'a Entry> = frontier
        .into_iter()
        .filter(|e| visited.insert(e.hash))
        .collect();
    sort_entries(&mut stack, policy)?;
    stack.reverse();

    let mut result = Vec::new();
    while !stack.is_empty() && amount.is_none_or(|n| result.len() < n) {
        let entry = stack.remove(0);
        result.push(entry);

        if stop == Some(&entry.hash) {
            break;
        }

        for hash in &entry.next {
            let Some(parent) = lookup(hash) else {
                continue;
            };
            if !visited.insert(parent.hash) {
                continue;
            }
            stack.insert(0, parent);
            sort_entries(&mut stack, policy)?;
            stack.reverse();
        }
    }

    Ok(result)
}

/// Entries not referenced by any other entry's `next`.
///
/// Sorted by clock id ascending; entries from the same writer keep their
/// input order.
pub fn find_heads<'a, I>(entries: I) -> Vec<&'a Entry>
where
    I: IntoIterator<Item = &'a Entry>,
{
    let entries: Vec<&Entry> = entries.into_iter().collect();
    let referenced: HashSet<&Address> = entries.iter().flat_map(|e| e.next.iter()).collect();

    let mut heads: Vec<&Entry> = entries
        .into_iter()
        .filter(|e| !referenced.contains(&e.hash))
        .collect();
    heads.sort_by(|a, b| a.clock.id().cmp(b.clock.id()));
    heads
}

/// Entries that have a predecessor outside the set, or none at all.
///
/// Ordered by clock.
pub fn find_tails<'a, I>(entries: I) -> Vec<&'a Entry>
where
    I: IntoIterator<Item = &'a Entry>,
{
    let entries: Vec<&Entry> = entries.into_iter().collect();
    let hashes: HashSet<&Address> = entries.iter().map(|e| &e.hash).collect();

    let mut seen = HashSet::new();
    let mut tails: Vec<&Entry> = entries
        .into_iter()
        .filter(|e| e.next.is_empty() || e.next.iter().any(|n| !hashes.contains(n)))
        .filter(|e| seen.insert(e.hash))
        .collect();
    tails.sort_by(|a, b| Entry::compare(a, b));
    tails
}

/// Hashes referenced by `next` that are missing from the set.
pub fn tail_hashes<'a, I>(entries: I) -> Vec<Address>
where
    I: IntoIterator<Item = &'a Entry>,
{
    let entries: Vec<&Entry> = entries.into_iter().collect();
    let hashes: HashSet<&Address> = entries.iter().map(|e| &e.hash).collect();

    let mut missing: Vec<Address> = Vec::new();
    for entry in &entries {
        for hash in entry.next.iter().rev() {
            if !hashes.contains(hash) && !missing.contains(hash) {
                missing.insert(0, *hash);
            }
        }
    }
    missing
}

/// Entries reachable from `heads` in `entries` that `known` lacks.
///
/// Follows `next` and also `refs`, and only collects entries of `log_id`.
/// A ref always names an ancestor, so the result holds the same kind of
/// entries a `next`-only walk finds. It can also hold ancestors that sit
/// behind a hole in `entries`, or behind an entry `known` already has.
/// Results are in breadth-first encounter order.
pub(crate) fn difference<'a>(
    entries: &'a OrderedEntrySet,
    heads: &OrderedEntrySet,
    known: &OrderedEntrySet,
    log_id: &str,
) -> Vec<&'a Entry> {
    let mut queue: VecDeque<Address> = heads.keys().copied().collect();
    let mut traversed: HashSet<Address> = queue.iter().copied().collect();
    let mut result = Vec::new();

    while let Some(hash) = queue.pop_front() {
        let Some(entry) = entries.get(&hash) else {
            continue;
        };
        if known.contains(&hash) || entry.log_id != log_id {
            continue;
        }
        result.push(entry);

        for link in entry.next.iter().chain(&entry.refs) {
            if !known.contains(link) && traversed.insert(*link) {
                queue.push_back(*link);
            }
        }
    }

    result
}
