//! A lock-guarded dictionary for sharing one trie between threads.

use parking_lot::{RwLock, RwLockReadGuard};

use crate::config::Config;
use crate::error::Result;
use crate::trie::DaTrie;
use crate::value::Value;

/// A [`DaTrie`] behind a reader-writer lock.
///
/// Lookups take the shared lock and may run in parallel; every mutation takes
/// the exclusive lock, so there is a single writer at any time.
///
/// ```rust
/// use dat_rs::SharedDict;
///
/// let dict: SharedDict<u64> = SharedDict::new();
/// dict.insert(b"user:1001", 42).unwrap();
/// assert_eq!(dict.get(b"user:1001"), Some(42));
/// ```
pub struct SharedDict<V: Value = ()> {
    inner: RwLock<DaTrie<V>>,
}

impl<V: Value> SharedDict<V> {
    /// Create an empty dictionary with the default configuration.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        Self::from_trie(DaTrie::with_config(config))
    }

    pub fn from_trie(trie: DaTrie<V>) -> Self {
        Self {
            inner: RwLock::new(trie),
        }
    }

    /// Insert a key-value pair.
    ///
    /// Returns the previous value if the key already existed.
    pub fn insert(&self, key: impl AsRef<[u8]>, value: V) -> Result<Option<V>> {
        self.inner.write().insert(key.as_ref(), value)
    }

    pub fn get(&self, key: impl AsRef<[u8]>) -> Option<V> {
        self.inner.read().get(key.as_ref())
    }

    pub fn contains_key(&self, key: impl AsRef<[u8]>) -> bool {
        self.inner.read().contains_key(key.as_ref())
    }

    /// Remove a key, returning its value if it existed.
    pub fn remove(&self, key: impl AsRef<[u8]>) -> Option<V> {
        self.inner.write().remove(key.as_ref())
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// All keys starting with `prefix`, collected under one read lock.
    pub fn prefix(&self, prefix: impl AsRef<[u8]>) -> Vec<(Vec<u8>, V)> {
        self.inner.read().predictive_search(prefix.as_ref()).collect()
    }

    /// Rebuild under the write lock. See [`DaTrie::rebuild`].
    pub fn rebuild(&self) -> Result<bool> {
        self.inner.write().rebuild()
    }

    /// Hold the read lock for a batch of lookups.
    pub fn read(&self) -> RwLockReadGuard<'_, DaTrie<V>> {
        self.inner.read()
    }

    pub fn into_inner(self) -> DaTrie<V> {
        self.inner.into_inner()
    }
}

impl<V: Value> Default for SharedDict<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Value> From<DaTrie<V>> for SharedDict<V> {
    fn from(trie: DaTrie<V>) -> Self {
        Self::from_trie(trie)
    }
}
