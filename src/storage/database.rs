//! Sharded Keyspace with Expiry
//!
//! A [`Database`] maps keys to [`Entry`] values (a typed [`Value`] plus an
//! optional absolute deadline). The map is split across shards so sessions
//! touching different keys rarely contend:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                        Database                          │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐       ┌─────────┐   │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │  ...  │ Shard 63│   │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │       │ RwLock  │   │
//! │  │ HashMap │ │ HashMap │ │ HashMap │       │ HashMap │   │
//! │  └─────────┘ └─────────┘ └─────────┘       └─────────┘   │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Atomicity
//!
//! Every compound operation (`merge`, `update`, `expire_at`, ...) runs its
//! check and its write under the same shard write lock, so two sessions can
//! never interleave on one key. Reads take the shared lock first and only
//! escalate when they find a stale entry.
//!
//! ## Expiry
//!
//! Any access that finds an entry whose deadline has passed removes it
//! before answering. The background sweeper goes through [`Database::sweep`],
//! which uses the same lookup, so lazy and active expiry cannot disagree.
//!
//! Deadlines are [`tokio::time::Instant`]s, which lets tests drive expiry
//! with a paused clock.

use crate::storage::value::Value;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Number of shards per database.
const NUM_SHARDS: usize = 64;

/// A stored value together with its optional deadline.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub value: Value,
    pub expires_at: Option<Instant>,
}

impl Entry {
    /// An entry that never expires.
    pub fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    pub fn with_expiry(value: Value, expires_at: Option<Instant>) -> Self {
        Self { value, expires_at }
    }

    /// Convenience for a plain string entry.
    pub fn string(data: impl Into<Bytes>) -> Self {
        Self::new(Value::String(data.into()))
    }

    #[inline]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| now >= deadline)
    }

    #[inline]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    /// Time left before the deadline, `None` for persistent entries.
    pub fn time_to_live(&self) -> Option<Duration> {
        self.expires_at
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }
}

/// What an [`Database::update`] closure wants done with the key slot.
#[derive(Debug)]
pub enum Write {
    /// Leave the slot untouched.
    Keep,
    /// Replace (or create) the entry.
    Put(Entry),
    /// Delete the key.
    Remove,
}

impl Write {
    /// Stores `value` with `expires_at`, or deletes the key when `value` is
    /// a collection that has become empty.
    pub fn store(value: Value, expires_at: Option<Instant>) -> Self {
        if value.is_empty_collection() {
            Write::Remove
        } else {
            Write::Put(Entry::with_expiry(value, expires_at))
        }
    }
}

/// Outcome of [`Database::rename`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rename {
    Moved,
    /// The source key is absent or expired
    NoSource,
    /// Only-if-absent move and the target already exists
    TargetExists,
}

#[derive(Debug)]
struct Shard {
    entries: RwLock<HashMap<Bytes, Entry>>,
}

impl Shard {
    fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

/// Snapshot of a database's counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatabaseStats {
    /// Keys currently stored, including expired ones not yet removed
    pub keys: usize,
    /// Keys carrying a deadline
    pub expires: usize,
    pub reads: u64,
    pub writes: u64,
    /// Keys removed because their deadline passed
    pub expired: u64,
}

/// One numbered keyspace.
///
/// Wrapped in an `Arc` and shared by every session that selects it; all
/// methods take `&self`.
///
/// ```
/// use emberkv::storage::{Database, Entry};
/// use bytes::Bytes;
///
/// let db = Database::new();
/// db.put(Bytes::from("name"), Entry::string("Ariz"));
/// assert!(db.get(b"name").is_some());
/// assert!(db.remove(b"name"));
/// assert!(db.is_empty());
/// ```
pub struct Database {
    shards: Vec<Shard>,
    reads: AtomicU64,
    writes: AtomicU64,
    expired: AtomicU64,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("shards", &self.shards.len())
            .field("keys", &self.size())
            .field("expired", &self.expired.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}

impl Database {
    pub fn new() -> Self {
        Self {
            shards: (0..NUM_SHARDS).map(|_| Shard::new()).collect(),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            expired: AtomicU64::new(0),
        }
    }

    #[inline]
    fn shard_index(&self, key: &[u8]) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % NUM_SHARDS
    }

    #[inline]
    fn shard(&self, key: &[u8]) -> &Shard {
        &self.shards[self.shard_index(key)]
    }

    /// Runs `f` on the live entry for `key`, removing the entry first if its
    /// deadline has passed. The flag reports whether a removal happened.
    fn lookup<T>(&self, key: &[u8], f: impl FnOnce(Option<&Entry>) -> T) -> (T, bool) {
        let shard = self.shard(key);

        {
            let entries = shard.entries.read();
            match entries.get(key) {
                Some(entry) if entry.is_expired() => {}
                live => return (f(live), false),
            }
        }

        // Stale under the shared lock; re-check under the exclusive one since
        // another session may have replaced it in between.
        let mut entries = shard.entries.write();
        let evicted = self.evict_if_expired(&mut entries, key);
        (f(entries.get(key)), evicted)
    }

    /// Drops a stale entry while the caller holds the shard write lock.
    fn evict_if_expired(&self, entries: &mut HashMap<Bytes, Entry>, key: &[u8]) -> bool {
        if !entries.get(key).is_some_and(Entry::is_expired) {
            return false;
        }
        entries.remove(key);
        self.expired.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Returns the live entry for `key`, or `None` if it is absent or expired.
    pub fn get(&self, key: &[u8]) -> Option<Entry> {
        self.read(key, |entry| entry.cloned())
    }

    /// Live value for `key`.
    pub fn get_value(&self, key: &[u8]) -> Option<Value> {
        self.get(key).map(|entry| entry.value)
    }

    /// Runs `f` on the live entry for `key` without copying it.
    ///
    /// `f` runs under the shard's read lock, so it should only inspect the
    /// entry. A stale entry is evicted first and `f` sees `None`.
    pub fn read<T, F>(&self, key: &[u8], f: F) -> T
    where
        F: FnOnce(Option<&Entry>) -> T,
    {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.lookup(key, f).0
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        self.read(key, |entry| entry.is_some())
    }

    /// Unconditional insert-or-replace. The previous deadline is dropped
    /// unless `entry` carries its own.
    pub fn put(&self, key: Bytes, entry: Entry) {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.shard(&key).entries.write().insert(key, entry);
    }

    /// Deletes a key. Returns `true` if a live entry was removed.
    pub fn remove(&self, key: &[u8]) -> bool {
        self.writes.fetch_add(1, Ordering::Relaxed);
        let mut entries = self.shard(key).entries.write();
        match entries.remove(key) {
            Some(entry) if entry.is_expired() => {
                self.expired.fetch_add(1, Ordering::Relaxed);
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    /// Installs `candidate` if the key is absent. Otherwise stores whatever
    /// `resolver(current, candidate)` returns. Returns the entry now stored.
    ///
    /// With `resolver = |old, _| old.clone()` this is set-if-absent; the
    /// caller learns whether it won by comparing the result to its candidate.
    pub fn merge<F>(&self, key: Bytes, candidate: Entry, resolver: F) -> Entry
    where
        F: FnOnce(&Entry, Entry) -> Entry,
    {
        self.writes.fetch_add(1, Ordering::Relaxed);
        let mut entries = self.shard(&key).entries.write();
        self.evict_if_expired(&mut entries, &key);

        let chosen = match entries.get(&key) {
            Some(current) => resolver(current, candidate),
            None => candidate,
        };
        entries.insert(key, chosen.clone());
        chosen
    }

    /// Read-modify-write on one key slot.
    ///
    /// `f` sees the live entry (if any) and decides what to write; the whole
    /// exchange happens under the shard's write lock. When `f` fails nothing
    /// is written.
    pub fn update<T, E, F>(&self, key: &Bytes, f: F) -> Result<T, E>
    where
        F: FnOnce(Option<&Entry>) -> Result<(Write, T), E>,
    {
        let mut entries = self.shard(key).entries.write();
        self.evict_if_expired(&mut entries, key);

        let (write, output) = f(entries.get(key))?;
        match write {
            Write::Keep => {}
            Write::Put(entry) => {
                self.writes.fetch_add(1, Ordering::Relaxed);
                entries.insert(key.clone(), entry);
            }
            Write::Remove => {
                self.writes.fetch_add(1, Ordering::Relaxed);
                entries.remove(key);
            }
        }
        Ok(output)
    }

    /// Attaches a deadline to a live key without touching its value.
    pub fn expire_at(&self, key: &[u8], deadline: Instant) -> bool {
        let mut entries = self.shard(key).entries.write();
        self.evict_if_expired(&mut entries, key);
        match entries.get_mut(key) {
            Some(entry) => {
                entry.expires_at = Some(deadline);
                true
            }
            None => false,
        }
    }

    /// Clears a live key's deadline. Returns `true` if there was one.
    pub fn persist(&self, key: &[u8]) -> bool {
        let mut entries = self.shard(key).entries.write();
        self.evict_if_expired(&mut entries, key);
        entries
            .get_mut(key)
            .and_then(|entry| entry.expires_at.take())
            .is_some()
    }

    /// Moves the entry at `source` to `target`, deadline included.
    ///
    /// Both shard locks are held for the whole move, taken in shard order,
    /// so no other operation on either key can interleave with it.
    pub fn rename(&self, source: &Bytes, target: &Bytes, only_if_absent: bool) -> Rename {
        let (from, to) = (self.shard_index(source), self.shard_index(target));

        if from == to {
            let mut entries = self.shards[from].entries.write();
            self.evict_if_expired(&mut entries, source);
            self.evict_if_expired(&mut entries, target);
            if !entries.contains_key(source) {
                return Rename::NoSource;
            }
            if only_if_absent && entries.contains_key(target) {
                return Rename::TargetExists;
            }
            if source != target {
                if let Some(entry) = entries.remove(source) {
                    self.writes.fetch_add(1, Ordering::Relaxed);
                    entries.insert(target.clone(), entry);
                }
            }
            return Rename::Moved;
        }

        let mut low = self.shards[from.min(to)].entries.write();
        let mut high = self.shards[from.max(to)].entries.write();
        let (src, dst) = if from < to {
            (&mut *low, &mut *high)
        } else {
            (&mut *high, &mut *low)
        };

        self.evict_if_expired(src, source);
        self.evict_if_expired(dst, target);
        if only_if_absent && src.contains_key(source) && dst.contains_key(target) {
            return Rename::TargetExists;
        }
        match src.remove(source) {
            Some(entry) => {
                self.writes.fetch_add(1, Ordering::Relaxed);
                dst.insert(target.clone(), entry);
                Rename::Moved
            }
            None => Rename::NoSource,
        }
    }

    /// Point-in-time snapshot of all keys in byte order.
    ///
    /// Expired keys that have not been looked up yet may still appear;
    /// callers filter them through [`Database::get`].
    pub fn keys(&self) -> Vec<Bytes> {
        let mut keys: Vec<Bytes> = self
            .shards
            .iter()
            .flat_map(|shard| shard.entries.read().keys().cloned().collect::<Vec<_>>())
            .collect();
        keys.sort();
        keys
    }

    /// Number of stored keys, counting expired ones not yet removed.
    pub fn size(&self) -> usize {
        self.shards.iter().map(|s| s.entries.read().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|s| s.entries.read().is_empty())
    }

    /// Number of keys with a deadline.
    pub fn expires_count(&self) -> usize {
        self.shards
            .iter()
            .map(|s| {
                s.entries
                    .read()
                    .values()
                    .filter(|e| e.expires_at.is_some())
                    .count()
            })
            .sum()
    }

    pub fn clear(&self) {
        for shard in &self.shards {
            shard.entries.write().clear();
        }
    }

    /// Runs every key of a snapshot through the lazy-expiry lookup.
    /// Returns how many keys were found expired and removed.
    pub fn sweep(&self) -> usize {
        self.keys()
            .iter()
            .filter(|key| self.lookup(key, |_| ()).1)
            .count()
    }

    pub fn stats(&self) -> DatabaseStats {
        DatabaseStats {
            keys: self.size(),
            expires: self.expires_count(),
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
        }
    }
}
