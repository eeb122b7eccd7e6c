//! Thread-Safe Container Storage
//!
//! This module implements the core of FlashMap: a concurrent, insertion-ordered
//! map whose values may themselves be containers.
//!
//! ## Design Decisions
//!
//! 1. **Sharded Locks**: Values live in independent `RwLock<HashMap>` shards, so
//!    reads and overwrites of different keys never contend.
//! 2. **Bookkeeping Mutex**: The insertion-order list and the timer table are
//!    guarded by a single mutex, taken only when a key is added or removed.
//! 3. **Lock Order**: Bookkeeping first, then a shard. Overwrites of an existing
//!    key take only the shard lock.
//! 4. **Snapshot Iteration**: `range` and `read_all` copy one shard at a time and
//!    release its lock before visiting, so visitors may re-enter the container.
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Container                            │
//! │  ┌──────────────────────────┐                               │
//! │  │ Mutex<Bookkeeping>       │  order: [k1, k2, k3, ...]     │
//! │  │                          │  timers: {k2 => TimerHandle}  │
//! │  └──────────────────────────┘                               │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐           │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │ Shard N │           │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ RwLock  │           │
//! │  │ HashMap │ │ HashMap │ │ HashMap │ │ HashMap │           │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Nested containers are independent lock domains: touching a child never
//! takes the parent's locks.

use crate::storage::expiry::{ExpiryConfig, TimerHandle};
use crate::value::{Key, Value};
use std::collections::hash_map::{DefaultHasher, Entry as MapEntry};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
};
use tracing::{debug, trace};

/// Default number of shards per container.
///
/// Containers are often small and deeply nested, so this is far lower than
/// what a single top-level store would use.
pub const DEFAULT_SHARDS: usize = 16;

/// Configuration shared by a container and every child it creates.
#[derive(Debug, Clone)]
pub struct ContainerConfig {
    /// Number of value shards (minimum 1)
    pub shards: usize,

    /// Where expiry timers run
    pub expiry: ExpiryConfig,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            shards: DEFAULT_SHARDS,
            expiry: ExpiryConfig::default(),
        }
    }
}

/// A single shard holding a portion of the entries.
#[derive(Debug, Default)]
struct Shard {
    data: RwLock<HashMap<Key, Value>>,
}

impl Shard {
    #[inline]
    fn read(&self) -> RwLockReadGuard<'_, HashMap<Key, Value>> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    #[inline]
    fn write(&self) -> RwLockWriteGuard<'_, HashMap<Key, Value>> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Live keys in insertion order.
///
/// Each key is tagged with a monotonically increasing sequence number, so
/// removing any key is a hash lookup plus a B-tree removal instead of a scan.
#[derive(Debug, Default)]
pub(crate) struct InsertionOrder {
    next_seq: u64,
    by_seq: BTreeMap<u64, Key>,
    seq_of: HashMap<Key, u64>,
}

impl InsertionOrder {
    /// Appends `key`; a key already present keeps its position.
    pub(crate) fn push(&mut self, key: Key) {
        if self.seq_of.contains_key(&key) {
            return;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.by_seq.insert(seq, key.clone());
        self.seq_of.insert(key, seq);
    }

    pub(crate) fn remove(&mut self, key: &Key) -> bool {
        match self.seq_of.remove(key) {
            Some(seq) => self.by_seq.remove(&seq).is_some(),
            None => false,
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.seq_of.len()
    }

    pub(crate) fn clear(&mut self) {
        self.by_seq.clear();
        self.seq_of.clear();
    }

    pub(crate) fn to_vec(&self) -> Vec<Key> {
        self.by_seq.values().cloned().collect()
    }
}

/// State that must change together with the key set.
#[derive(Default)]
pub(crate) struct Bookkeeping {
    /// Live keys in insertion order
    pub(crate) order: InsertionOrder,
    /// Armed expiry timers, at most one per key
    pub(crate) timers: HashMap<Key, TimerHandle>,
}

pub(crate) struct Inner {
    shards: Vec<Shard>,
    /// Mirrors `order.len()`, readable without the mutex
    count: AtomicUsize,
    book: Mutex<Bookkeeping>,
    config: Arc<ContainerConfig>,
}

/// A concurrent, insertion-ordered, nestable map with per-key TTL.
///
/// `Container` is a handle: cloning it is cheap and yields another reference
/// to the same entries. Identity is reference identity, see
/// [`Container::ptr_eq`].
///
/// # Example
///
/// ```
/// use flashmap::{Container, Value};
///
/// let m = Container::new();
/// m.set("x", 1);
/// m.set("y", "s");
///
/// assert_eq!(m.get("x"), Some(Value::Int(1)));
/// assert_eq!(m.len(), 2);
/// assert_eq!(m.to_string(), r#"{"x":1,"y":"s"}"#);
/// ```
///
/// Cycles (a container reachable from itself) are allowed in memory but are
/// rejected by marshalling with [`Error::Cycle`](crate::Error::Cycle).
#[derive(Clone)]
pub struct Container {
    pub(crate) inner: Arc<Inner>,
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("shards", &self.inner.shards.len())
            .field("len", &self.len())
            .finish()
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl Container {
    /// Creates an empty container with default settings.
    pub fn new() -> Self {
        Self::with_config(ContainerConfig::default())
    }

    /// Creates an empty container with the given configuration.
    pub fn with_config(config: ContainerConfig) -> Self {
        Self::with_shared_config(Arc::new(config))
    }

    fn with_shared_config(config: Arc<ContainerConfig>) -> Self {
        let shards = (0..config.shards.max(1)).map(|_| Shard::default()).collect();

        Self {
            inner: Arc::new(Inner {
                shards,
                count: AtomicUsize::new(0),
                book: Mutex::new(Bookkeeping::default()),
                config,
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<Inner>) -> Self {
        Self { inner }
    }

    /// Creates an empty container sharing this container's configuration.
    pub(crate) fn child(&self) -> Container {
        Self::with_shared_config(Arc::clone(&self.inner.config))
    }

    /// The configuration shared with every child this container creates.
    pub fn config(&self) -> &ContainerConfig {
        &self.inner.config
    }

    /// Returns `true` if both handles refer to the same container.
    pub fn ptr_eq(a: &Container, b: &Container) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    /// A stable identity for the lifetime of the container.
    pub(crate) fn id(&self) -> usize {
        Arc::as_ptr(&self.inner) as usize
    }

    #[inline]
    fn shard(&self, key: &Key) -> &Shard {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let shards = &self.inner.shards;
        &shards[(hasher.finish() as usize) % shards.len()]
    }

    pub(crate) fn lock_book(&self) -> MutexGuard<'_, Bookkeeping> {
        self.inner.book.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inspects the current value of `key` and optionally replaces it, atomically
    /// with respect to other writers of the same key.
    ///
    /// `f` receives the current value (`None` if absent) and returns the value
    /// to store (`None` leaves the entry untouched) plus an output for the caller.
    pub(crate) fn upsert<R, F>(&self, key: Key, f: F) -> R
    where
        F: FnOnce(Option<&Value>) -> (Option<Value>, R),
    {
        let shard = self.shard(&key);

        // Fast path: existing keys only need the shard lock
        {
            let mut data = shard.write();
            if let Some(slot) = data.get_mut(&key) {
                let (replacement, out) = f(Some(&*slot));
                if let Some(value) = replacement {
                    *slot = value;
                }
                return out;
            }
        }

        let mut book = self.lock_book();
        let mut data = shard.write();
        match data.entry(key) {
            MapEntry::Occupied(mut entry) => {
                let (replacement, out) = f(Some(entry.get()));
                if let Some(value) = replacement {
                    entry.insert(value);
                }
                out
            }
            MapEntry::Vacant(entry) => {
                let (replacement, out) = f(None);
                if let Some(value) = replacement {
                    book.order.push(entry.key().clone());
                    entry.insert(value);
                    self.inner.count.store(book.order.len(), Ordering::Release);
                }
                out
            }
        }
    }

    /// Removes `key` from the shard and the order list. Caller holds the
    /// bookkeeping lock; timers are left to the caller.
    pub(crate) fn remove_locked(&self, book: &mut Bookkeeping, key: &Key) -> Option<Value> {
        let removed = self.shard(key).write().remove(key);
        if removed.is_some() {
            book.order.remove(key);
            self.inner.count.store(book.order.len(), Ordering::Release);
        }
        removed
    }

    /// Sets a key-value pair.
    ///
    /// If the key already exists, its value is overwritten and its position in
    /// the insertion order is kept. An armed expiry timer keeps running.
    ///
    /// # Returns
    ///
    /// Returns `true` if a new key was created, `false` if an existing key was updated.
    pub fn set(&self, key: impl Into<Key>, value: impl Into<Value>) -> bool {
        let value = value.into();
        self.upsert(key.into(), |current| (Some(value), current.is_none()))
    }

    /// Gets the value for a key, or `None` if it doesn't exist.
    pub fn get(&self, key: impl Into<Key>) -> Option<Value> {
        let key = key.into();
        self.shard(&key).read().get(&key).cloned()
    }

    /// Checks if a key exists.
    pub fn has(&self, key: impl Into<Key>) -> bool {
        self.contains(&key.into())
    }

    pub(crate) fn contains(&self, key: &Key) -> bool {
        self.shard(key).read().contains_key(key)
    }

    /// Reads a value and its presence in one step.
    ///
    /// Absent keys yield `(Value::Null, false)`.
    pub fn get_has(&self, key: impl Into<Key>) -> (Value, bool) {
        match self.get(key) {
            Some(value) => (value, true),
            None => (Value::Null, false),
        }
    }

    /// Gets the value for a key, falling back to `default` when the key is
    /// absent or holds [`Value::Null`].
    pub fn get_or_default(&self, key: impl Into<Key>, default: impl Into<Value>) -> Value {
        match self.get(key) {
            Some(value) if !value.is_null() => value,
            _ => default.into(),
        }
    }

    /// Deletes a key.
    ///
    /// If an expiry timer is armed for the key it is stopped, and its callback
    /// (if any) is dispatched in the background with the deleted value.
    ///
    /// # Returns
    ///
    /// Returns `true` if the key was deleted, `false` if it didn't exist.
    pub fn del(&self, key: impl Into<Key>) -> bool {
        let key = key.into();

        let (removed, timer) = {
            let mut book = self.lock_book();
            let removed = self.remove_locked(&mut book, &key);
            (removed, book.timers.remove(&key))
        };

        let existed = removed.is_some();
        if let Some(timer) = timer {
            trace!(key = %key, "Deleted key with armed timer");
            timer.evict(removed.unwrap_or_default());
        }
        existed
    }

    /// Deletes each key in turn. The batch is not atomic.
    pub fn dels<I>(&self, keys: I)
    where
        I: IntoIterator,
        I::Item: Into<Key>,
    {
        for key in keys {
            self.del(key);
        }
    }

    /// Returns the number of keys.
    #[inline]
    pub fn len(&self) -> usize {
        self.inner.count.load(Ordering::Acquire)
    }

    /// Returns `true` if the container has no keys.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the live keys in insertion order.
    pub fn keys(&self) -> Vec<Key> {
        self.lock_book().order.to_vec()
    }

    /// Returns the live entries in insertion order.
    ///
    /// Keys deleted between reading the order and reading their value are
    /// skipped.
    pub fn entries(&self) -> Vec<(Key, Value)> {
        self.keys()
            .into_iter()
            .filter_map(|key| {
                let value = self.shard(&key).read().get(&key).cloned()?;
                Some((key, value))
            })
            .collect()
    }

    /// Returns a shallow snapshot of every entry.
    ///
    /// Nested containers in the snapshot are shared with this container.
    pub fn read_all(&self) -> HashMap<Key, Value> {
        let mut snapshot = HashMap::with_capacity(self.len());
        for shard in &self.inner.shards {
            let data = shard.read();
            snapshot.extend(data.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        snapshot
    }

    /// Visits every entry until `visit` returns `false`.
    ///
    /// Entries are visited in storage order, not insertion order. Each shard is
    /// copied before its entries are visited, so `visit` may call back into the
    /// container.
    pub fn range<F>(&self, mut visit: F)
    where
        F: FnMut(&Key, &Value) -> bool,
    {
        for shard in &self.inner.shards {
            let snapshot: Vec<(Key, Value)> = shard
                .read()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();

            for (key, value) in &snapshot {
                if !visit(key, value) {
                    return;
                }
            }
        }
    }

    /// Removes every entry and stops every timer.
    ///
    /// Callbacks of armed timers are dispatched in the background with the
    /// value their key held at the time of the reset.
    pub fn reset(&self) {
        let evicted: Vec<(TimerHandle, Option<Value>)> = {
            let mut book = self.lock_book();
            let timers = std::mem::take(&mut book.timers);

            let mut drained: HashMap<Key, Value> = HashMap::new();
            for shard in &self.inner.shards {
                drained.extend(std::mem::take(&mut *shard.write()));
            }

            book.order.clear();
            self.inner.count.store(0, Ordering::Release);

            timers
                .into_iter()
                .map(|(key, timer)| {
                    let value = drained.remove(&key);
                    (timer, value)
                })
                .collect()
        };

        debug!(timers = evicted.len(), "Container reset");

        for (timer, value) in evicted {
            timer.evict(value.unwrap_or_default());
        }
    }
}
