//! The replicated log: append, join and reads.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use kelp_identity::Identity;
use kelp_store::ContentStore;
use kelp_types::{Address, CodecFormat, LamportClock, LogConfig, SortKind};
use tracing::{debug, warn};

use crate::access::{AccessController, AllowAll};
use crate::codec::EntryCodec;
use crate::entry::{Entry, EntryBuilder};
use crate::entry_set::OrderedEntrySet;
use crate::error::LogError;
use crate::fetch::{FetchOptions, fetch_all};
use crate::iter::{IteratorOptions, LogIterator};
use crate::snapshot::{HeadsSnapshot, Snapshot};
use crate::sort::{LastWriteWins, NoZeroes, SortPolicy, no_zeroes, policy_for, sort_entries};
use crate::traverse::{difference, find_heads, find_tails, tail_hashes, traverse};

type Result<T> = std::result::Result<T, LogError>;

/// Options for [`Log::append`].
#[derive(Debug, Clone, Copy)]
pub struct AppendOptions {
    /// How many of the newest entries to consider for back-references.
    pub pointer_count: usize,
}

impl Default for AppendOptions {
    fn default() -> Self {
        Self { pointer_count: 1 }
    }
}

impl From<&LogConfig> for AppendOptions {
    fn from(config: &LogConfig) -> Self {
        Self {
            pointer_count: config.pointer_count,
        }
    }
}

/// One replica of an append-only log.
///
/// A replica holds every entry it has seen, the current heads (entries no
/// other local entry points to) and a local Lamport clock. [`append`] adds
/// an entry authored by this replica's identity; [`join`] merges another
/// replica of the same log. Both leave the replica unchanged when they
/// fail.
///
/// [`append`]: Log::append
/// [`join`]: Log::join
#[derive(Clone)]
pub struct Log {
    id: String,
    identity: Identity,
    store: Arc<dyn ContentStore>,
    codec: EntryCodec,
    access: Arc<dyn AccessController>,
    sort: NoZeroes<Arc<dyn SortPolicy>>,
    clock: LamportClock,
    entries: OrderedEntrySet,
    heads: OrderedEntrySet,
    /// predecessor hash -> hash of an entry whose `next` contains it
    next_index: HashMap<Address, Address>,
}

impl Log {
    pub fn builder() -> LogBuilder {
        LogBuilder::default()
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn clock(&self) -> &LamportClock {
        &self.clock
    }

    pub fn store(&self) -> &Arc<dyn ContentStore> {
        &self.store
    }

    pub fn codec(&self) -> EntryCodec {
        self.codec
    }

    /// Number of entries held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, hash: &Address) -> Option<&Entry> {
        self.entries.get(hash)
    }

    pub fn has(&self, hash: &Address) -> bool {
        self.entries.contains(hash)
    }

    /// Hold `entry` without any checks and recompute the heads.
    ///
    /// Only for tests that need a replica carrying a malformed entry.
    #[cfg(test)]
    pub(crate) fn insert_unchecked(&mut self, entry: Entry) {
        for hash in &entry.next {
            self.next_index.insert(*hash, entry.hash);
        }
        self.entries.set(entry);
        self.heads = find_heads(&self.entries).into_iter().cloned().collect();
    }

    /// All held entries, in insertion order.
    pub fn entries(&self) -> &OrderedEntrySet {
        &self.entries
    }

    /// Entries no other held entry points to, by clock id.
    pub fn heads(&self) -> &OrderedEntrySet {
        &self.heads
    }

    /// Entries whose predecessors are not held, ordered by clock.
    pub fn tails(&self) -> Vec<Entry> {
        find_tails(&self.entries).into_iter().cloned().collect()
    }

    /// Predecessor hashes referenced by held entries but not held.
    pub fn tail_hashes(&self) -> Vec<Address> {
        tail_hashes(&self.entries)
    }

    /// Walk backward from `frontier`, newest first.
    ///
    /// See [`traverse`](crate::traverse()) for the exact visiting rules.
    pub fn traverse(
        &self,
        frontier: &OrderedEntrySet,
        amount: Option<usize>,
        stop: Option<&Address>,
    ) -> Result<Vec<Entry>> {
        let visited = traverse(
            |hash: &Address| self.entries.get(hash),
            frontier.iter().collect(),
            amount,
            stop,
            &self.sort,
        )?;
        Ok(visited.into_iter().cloned().collect())
    }

    /// Entries of `a` that `b` lacks, in the order a join would admit them.
    ///
    /// Empty when the two logs have different ids.
    pub fn difference(a: &Log, b: &Log) -> Vec<Entry> {
        if a.id != b.id {
            return Vec::new();
        }
        difference(&a.entries, &a.heads, &b.entries, &b.id)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Every entry reachable from the heads, oldest first.
    pub fn values(&self) -> Result<Vec<Entry>> {
        let mut values = self.traverse(&self.heads, None, None)?;
        values.reverse();
        Ok(values)
    }

    /// Append `payload` as a new entry authored by this replica.
    ///
    /// The new entry points at all current heads and becomes the only head.
    /// Back-references go to the entries at distances 1, 2, 4, ... up to
    /// `pointer_count` from the heads, so readers can skip through long
    /// histories. If the store write or the access check fails nothing
    /// about the log changes.
    pub async fn append(
        &mut self,
        payload: impl Into<Vec<u8>>,
        options: AppendOptions,
    ) -> Result<Entry> {
        let newest = max_time(&self.heads);
        let clock = LamportClock::with_time(self.clock.id(), self.clock.time().max(newest) + 1);

        let mut heads: Vec<&Entry> = self.heads.iter().collect();
        sort_entries(&mut heads, &self.sort)?;
        let next: Vec<Address> = heads.iter().map(|e| e.hash).collect();

        let depth = options.pointer_count.max(heads.len());
        let recent = traverse(
            |hash: &Address| self.entries.get(hash),
            heads,
            Some(depth),
            None,
            &self.sort,
        )?;
        let refs = back_references(&recent, options.pointer_count, &next);

        let entry = EntryBuilder::new()
            .store(self.store.as_ref())
            .identity(&self.identity)
            .codec(self.codec)
            .log_id(self.id.as_str())
            .payload(payload)
            .next(next)
            .refs(refs)
            .clock(clock.clone())
            .build()
            .await?;

        self.access
            .can_append(&entry, &self.identity)
            .map_err(|source| LogError::AccessDenied {
                hash: entry.hash,
                source,
            })?;

        self.clock = clock;
        for head in self.heads.keys() {
            self.next_index.insert(*head, entry.hash);
        }
        self.entries.set(entry.clone());
        self.heads = OrderedEntrySet::from_iter([entry.clone()]);

        debug!(
            log_id = %self.id,
            hash = %entry.hash,
            time = entry.clock.time(),
            refs = entry.refs.len(),
            "appended entry"
        );

        Ok(entry)
    }

    /// Merge `other` into this replica.
    ///
    /// Replicas of a different log are ignored. Every entry `other` has
    /// that this replica lacks must be well formed, pass the access check and
    /// verify its signature before anything is merged; one bad entry rejects the whole
    /// join. With `size` set, only the newest `size` entries are kept.
    ///
    /// Join is idempotent, commutative and associative with respect to the
    /// resulting entries, heads and [`values`](Log::values).
    pub fn join(&mut self, other: &Log, size: Option<usize>) -> Result<()> {
        if self.id != other.id {
            debug!(log_id = %self.id, other = %other.id, "ignoring join of a different log");
            return Ok(());
        }

        let incoming = difference(&other.entries, &other.heads, &self.entries, &self.id);
        for entry in &incoming {
            entry.validate_received()?;
            self.access
                .can_append(entry, &self.identity)
                .map_err(|source| LogError::AccessDenied {
                    hash: entry.hash,
                    source,
                })?;
            entry.verify(self.identity.provider().as_ref())?;
        }

        let by_hash: HashMap<Address, &Entry> = incoming.iter().map(|e| (e.hash, *e)).collect();
        let lookup =
            |hash: &Address| self.entries.get(hash).or_else(|| by_hash.get(hash).copied());

        let superseded: HashSet<Address> = incoming
            .iter()
            .flat_map(|e| e.next.iter().copied())
            .chain(self.next_index.keys().copied())
            .collect();

        let mut seen = HashSet::new();
        let candidates: Vec<&Entry> = self
            .heads
            .iter()
            .chain(other.heads.iter())
            .filter(|e| seen.insert(e.hash) && lookup(&e.hash).is_some())
            .collect();
        let heads: Vec<&Entry> = find_heads(candidates)
            .into_iter()
            .filter(|e| !superseded.contains(&e.hash))
            .collect();

        let kept = match size {
            Some(size) => {
                let mut values = traverse(&lookup, heads.clone(), None, None, &self.sort)?;
                values.reverse();
                let start = values.len().saturating_sub(size);
                Some(values.split_off(start).into_iter().cloned().collect::<Vec<_>>())
            }
            None => None,
        };
        let heads: Vec<Entry> = heads.into_iter().cloned().collect();
        let incoming: Vec<Entry> = incoming.into_iter().cloned().collect();

        let added = incoming.len();
        for entry in &incoming {
            for hash in &entry.next {
                self.next_index.insert(*hash, entry.hash);
            }
        }
        self.entries.extend(incoming);
        self.heads = heads.into_iter().collect();

        if let Some(kept) = kept {
            self.entries = kept.into_iter().collect();
            self.heads = find_heads(&self.entries).into_iter().cloned().collect();
            // drop reverse edges from entries that are no longer held
            self.next_index = index_next(&self.entries);
        }

        self.clock = LamportClock::with_time(
            self.clock.id(),
            self.clock.time().max(max_time(&self.heads)),
        );

        debug!(
            log_id = %self.id,
            added,
            entries = self.entries.len(),
            heads = self.heads.len(),
            "joined log"
        );

        Ok(())
    }

    /// Entries walked from an explicit range, newest first.
    ///
    /// - `lte` / `lt`: start from these entries (`lt` starts from their
    ///   predecessors); otherwise start from the heads.
    /// - `gte` / `gt`: stop once this entry is reached (`gt` excludes it).
    /// - `amount`: at most this many entries; with a lower bound set the
    ///   oldest `amount` entries before the bound are kept.
    pub fn iterator(&self, options: IteratorOptions) -> Result<LogIterator> {
        if options.amount == Some(0) {
            return Ok(LogIterator::new(Vec::new()));
        }

        let lookup = |hash: &Address| self.entries.get(hash);
        let frontier: Vec<&Entry> = if !options.lte.is_empty() {
            options.lte.iter().filter_map(lookup).collect()
        } else if !options.lt.is_empty() {
            options
                .lt
                .iter()
                .filter_map(lookup)
                .flat_map(|e| e.next.iter().filter_map(lookup))
                .collect()
        } else {
            self.heads.iter().collect()
        };

        let stop = options.gte.or(options.gt);
        let count = if stop.is_some() { None } else { options.amount };
        let mut walked = traverse(lookup, frontier, count, stop.as_ref(), &self.sort)?;

        if let Some(gt) = options.gt
            && walked.last().is_some_and(|e| e.hash == gt)
        {
            walked.pop();
        }

        if stop.is_some()
            && let Some(amount) = options.amount
        {
            let start = walked.len().saturating_sub(amount);
            walked.drain(..start);
        }

        Ok(LogIterator::new(walked.into_iter().cloned().collect()))
    }

    /// Render the log newest first, one line per entry, indenting each
    /// entry by the length of its chain of descendants.
    pub fn render<F>(&self, payload: F) -> Result<String>
    where
        F: Fn(&[u8]) -> String,
    {
        let values = self.values()?;
        let lines: Vec<String> = values
            .iter()
            .rev()
            .map(|entry| {
                let depth = Entry::find_children(entry, &values).len();
                let mut line = "  ".repeat(depth.saturating_sub(1));
                if depth > 0 {
                    line.push_str("└─");
                }
                line.push_str(&payload(&entry.payload));
                line
            })
            .collect();
        Ok(lines.join("\n"))
    }

    /// `{id, heads}` for storing or sharing this replica.
    pub fn heads_snapshot(&self) -> HeadsSnapshot {
        HeadsSnapshot {
            id: self.id.clone(),
            heads: self.heads.keys().copied().collect(),
        }
    }

    /// Full in-memory export.
    pub fn to_snapshot(&self) -> Result<Snapshot> {
        Ok(Snapshot {
            id: self.id.clone(),
            heads: self.heads.keys().copied().collect(),
            values: self.values()?,
            clock: self.clock.clone(),
        })
    }

    /// The heads snapshot as JSON.
    pub fn to_json(&self) -> Result<String> {
        let bytes = EntryCodec::new(CodecFormat::Json).encode_heads(&self.heads_snapshot())?;
        String::from_utf8(bytes).map_err(|e| LogError::Codec(e.to_string()))
    }

    /// Write the heads snapshot to the store and return its address.
    ///
    /// [`LogBuilder::load_from_address`] restores the log from it.
    pub async fn to_address(&self) -> Result<Address> {
        let bytes = self.codec.encode_heads(&self.heads_snapshot())?;
        let address = self.store.put(Bytes::from(bytes)).await?;
        debug!(log_id = %self.id, %address, heads = self.heads.len(), "stored heads snapshot");
        Ok(address)
    }
}

impl fmt::Display for Log {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = self
            .render(|payload| String::from_utf8_lossy(payload).into_owned())
            .map_err(|_| fmt::Error)?;
        f.write_str(&rendered)
    }
}

impl fmt::Debug for Log {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Log")
            .field("id", &self.id)
            .field("identity", &self.identity)
            .field("clock", &self.clock)
            .field("entries", &self.entries.len())
            .field("heads", &self.heads.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Largest clock time among `entries`, or 0.
fn max_time(entries: &OrderedEntrySet) -> u64 {
    entries.iter().map(|e| e.clock.time()).max().unwrap_or(0)
}

/// Predecessor hash -> hash of a held entry whose `next` contains it.
fn index_next(entries: &OrderedEntrySet) -> HashMap<Address, Address> {
    let mut index = HashMap::new();
    for entry in entries {
        for hash in &entry.next {
            index.insert(*hash, entry.hash);
        }
    }
    index
}

/// Pick back-references from `recent` (newest first).
///
/// Takes the entries at distances 1, 2, 4, ... up to `pointer_count`, plus
/// the oldest one walked when the walk came up short, minus anything
/// already in `next`.
fn back_references(recent: &[&Entry], pointer_count: usize, next: &[Address]) -> Vec<Address> {
    let Some(oldest) = recent.last() else {
        return Vec::new();
    };

    let mut refs: Vec<Address> = Vec::new();
    let reach = pointer_count.min(recent.len());
    let mut distance = 1;
    while distance <= reach {
        let hash = recent[(distance - 1).min(recent.len() - 1)].hash;
        if !refs.contains(&hash) {
            refs.push(hash);
        }
        distance *= 2;
    }

    if recent.len() < pointer_count && !refs.contains(&oldest.hash) {
        refs.push(oldest.hash);
    }

    refs.retain(|hash| !next.contains(hash));
    refs
}

fn default_log_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    millis.to_string()
}

/// Configures and opens a [`Log`].
///
/// A store and an identity are required. The log id defaults to the
/// current time in milliseconds, the sort policy to last-write-wins and
/// access control to [`AllowAll`].
#[derive(Default)]
pub struct LogBuilder {
    id: Option<String>,
    identity: Option<Identity>,
    store: Option<Arc<dyn ContentStore>>,
    access: Option<Arc<dyn AccessController>>,
    sort: Option<Arc<dyn SortPolicy>>,
    codec: EntryCodec,
    entries: Vec<Entry>,
    heads: Option<Vec<Entry>>,
    clock: Option<LamportClock>,
    fetch: FetchOptions,
}

impl LogBuilder {
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn identity(mut self, identity: Identity) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn store(mut self, store: Arc<dyn ContentStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn access(mut self, access: Arc<dyn AccessController>) -> Self {
        self.access = Some(access);
        self
    }

    /// Custom sort policy. It is always wrapped so that it may not return
    /// `Equal` for distinct entries.
    pub fn sort(mut self, sort: Arc<dyn SortPolicy>) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn sort_kind(self, kind: SortKind) -> Self {
        self.sort(policy_for(kind))
    }

    pub fn codec(mut self, codec: EntryCodec) -> Self {
        self.codec = codec;
        self
    }

    /// Apply sort, codec and fetch settings from a config.
    pub fn config(self, config: &LogConfig) -> Self {
        let mut builder = self
            .sort_kind(config.sort)
            .codec(EntryCodec::new(config.codec));
        builder.fetch = FetchOptions::from_config(config);
        builder
    }

    pub fn fetch_options(mut self, fetch: FetchOptions) -> Self {
        self.fetch = fetch;
        self
    }

    /// Start from these entries. Each must pass [`Entry::validate`].
    pub fn entries(mut self, entries: Vec<Entry>) -> Self {
        self.entries = entries;
        self
    }

    /// Explicit heads. Computed from the entries when not given.
    pub fn heads(mut self, heads: Vec<Entry>) -> Self {
        self.heads = Some(heads);
        self
    }

    /// Starting clock. Its id is replaced by the identity's key and its
    /// time raised to the newest head.
    pub fn clock(mut self, clock: LamportClock) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> Result<Log> {
        let store = self.store.ok_or(LogError::ContentStoreNotDefined)?;
        let identity = self.identity.ok_or(LogError::IdentityNotDefined)?;
        let id = self.id.unwrap_or_else(default_log_id);
        if id.is_empty() {
            return Err(LogError::LogIdNotDefined);
        }

        for entry in &self.entries {
            entry.validate_received()?;
        }
        let entries: OrderedEntrySet = self.entries.into_iter().collect();
        let heads: OrderedEntrySet = match self.heads {
            Some(heads) => heads.into_iter().collect(),
            None => find_heads(&entries).into_iter().cloned().collect(),
        };

        let start = self.clock.map_or(0, |c| c.time());
        let clock = LamportClock::with_time(identity.public_key(), start.max(max_time(&heads)));

        let next_index = index_next(&entries);

        let sort = self.sort.unwrap_or_else(|| Arc::new(LastWriteWins));

        Ok(Log {
            id,
            identity,
            store,
            codec: self.codec,
            access: self.access.unwrap_or_else(|| Arc::new(AllowAll)),
            sort: no_zeroes(sort),
            clock,
            entries,
            heads,
            next_index,
        })
    }

    /// Open a log from a heads snapshot previously written with
    /// [`Log::to_address`], fetching its entries from the store.
    pub async fn load_from_address(mut self, address: Address) -> Result<Log> {
        let store = self.store.clone().ok_or(LogError::ContentStoreNotDefined)?;
        if self.identity.is_none() {
            return Err(LogError::IdentityNotDefined);
        }

        let bytes = store
            .get(address)
            .await?
            .ok_or(LogError::EntryNotFound(address))?;
        let snapshot = self.codec.decode_heads(&bytes)?;

        if let Some(id) = &self.id
            && *id != snapshot.id
        {
            warn!(requested = %id, stored = %snapshot.id, "log id differs from snapshot, using snapshot");
        }
        self.id = Some(snapshot.id);
        self.load_from_entry_hashes(&snapshot.heads).await
    }

    /// Open a log by fetching everything reachable from `hashes`.
    ///
    /// Without an explicit id the log takes the id of the first fetched
    /// entry. Entries of other logs are dropped, and with a fetch `length`
    /// only the newest entries are kept.
    pub async fn load_from_entry_hashes(mut self, hashes: &[Address]) -> Result<Log> {
        let store = self.store.clone().ok_or(LogError::ContentStoreNotDefined)?;
        if self.identity.is_none() {
            return Err(LogError::IdentityNotDefined);
        }

        let mut fetched = fetch_all(store, self.codec, hashes, &self.fetch).await?;

        let id = match self.id.take() {
            Some(id) => id,
            None => fetched
                .first()
                .map(|e| e.log_id.clone())
                .ok_or(LogError::LogIdNotDefined)?,
        };
        fetched.retain(|e| e.log_id == id);

        let sort = no_zeroes(self.sort.clone().unwrap_or_else(|| Arc::new(LastWriteWins)));
        sort_entries(&mut fetched, &sort)?;
        if let Some(length) = self.fetch.length {
            let start = fetched.len().saturating_sub(length);
            fetched.drain(..start);
        }

        debug!(log_id = %id, entries = fetched.len(), "loaded log");

        self.id = Some(id);
        self.entries = fetched;
        self.heads = None;
        self.build()
    }
}

