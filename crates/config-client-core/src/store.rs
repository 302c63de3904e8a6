//! Cache of accepted configuration snapshots.
//!
//! The store maps a `"{application}-{profile}"` key to the most recently
//! accepted [`Configuration`]. It is the pluggable persistence seam: the
//! default implementation keeps everything in memory, and embedders can swap
//! in their own by implementing [`ConfigStore`].

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use crate::model::Configuration;

/// Concurrency-safe store of configuration snapshots keyed by
/// application/profile pair.
///
/// A completed `put` for a key is visible to every subsequent `get` for that
/// key. Entries are replaced whole; readers holding an `Arc` to a superseded
/// snapshot keep a consistent view until they drop it.
pub trait ConfigStore: Send + Sync + fmt::Debug {
    /// Returns the snapshot stored under `key`, if any.
    fn get(&self, key: &str) -> Option<Arc<Configuration>>;

    /// Stores `configuration` under `key`, replacing any previous entry.
    fn put(&self, key: &str, configuration: Arc<Configuration>);

    /// Removes every entry.
    fn clear(&self);

    /// Number of stored entries.
    fn len(&self) -> usize;

    /// Whether the store holds no entries.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether an entry exists under `key`.
    fn contains_key(&self, key: &str) -> bool;

    /// Defensive copy of the full key-to-snapshot mapping.
    fn snapshot(&self) -> HashMap<String, Arc<Configuration>>;
}

/// Default in-memory store.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: RwLock<HashMap<String, Arc<Configuration>>>,
}

impl InMemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConfigStore for InMemoryStore {
    fn get(&self, key: &str) -> Option<Arc<Configuration>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn put(&self, key: &str, configuration: Arc<Configuration>) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_owned(), configuration);
    }

    fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn contains_key(&self, key: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    fn snapshot(&self) -> HashMap<String, Arc<Configuration>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
