//! Cache types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tokio::sync::watch;

/// Outcome of the streaming write backing a cache entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteState {
    Pending,
    Complete,
    Failed,
}

/// In-memory bookkeeping record for one cached key
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Hashed form of the caller's key, also the on-disk base filename
    pub identifier: String,
    /// Size of the data payload in bytes
    pub data_size: u64,
    /// Size of the serialized metadata sidecar in bytes, zero if absent
    pub meta_size: u64,
    /// Access time used for eviction ordering and TTL gating
    pub last_access: DateTime<Utc>,
    /// Whether a `<identifier>.json` sidecar exists alongside the data file
    pub has_metadata: bool,
    pub(crate) write_id: u64,
    pub(crate) completion: watch::Receiver<WriteState>,
}

impl CacheEntry {
    /// The size counted against the cache footprint: payload plus metadata
    pub fn stored_size(&self) -> u64 {
        self.data_size + self.meta_size
    }

    /// An entry whose write already settled, as rebuilt from disk on open
    pub(crate) fn settled(
        identifier: String,
        data_size: u64,
        meta_size: u64,
        last_access: DateTime<Utc>,
        has_metadata: bool,
    ) -> Self {
        // The sender is dropped immediately; receivers still observe the
        // stored Complete value.
        let (_tx, completion) = watch::channel(WriteState::Complete);
        Self {
            identifier,
            data_size,
            meta_size,
            last_access,
            has_metadata,
            write_id: 0,
            completion,
        }
    }
}

/// Ordered index over all entries in one cache directory
///
/// Identifiers in `ordered` go from oldest access time at the front to newest
/// at the back; newly inserted entries are appended. `total_size` always
/// equals the sum of `stored_size` over `entries`.
#[derive(Debug, Default)]
pub struct CacheIndex {
    ordered: VecDeque<String>,
    entries: HashMap<String, CacheEntry>,
    total_size: u64,
}

impl CacheIndex {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn get(&self, identifier: &str) -> Option<&CacheEntry> {
        self.entries.get(identifier)
    }

    /// The entry with the oldest access time
    pub fn oldest(&self) -> Option<&CacheEntry> {
        self.ordered.front().and_then(|id| self.entries.get(id))
    }

    /// Append an entry as the newest; an existing entry for the same
    /// identifier is removed first and returned
    pub(crate) fn insert(&mut self, entry: CacheEntry) -> Option<CacheEntry> {
        let previous = self.remove(&entry.identifier);
        self.total_size += entry.stored_size();
        self.ordered.push_back(entry.identifier.clone());
        self.entries.insert(entry.identifier.clone(), entry);
        previous
    }

    /// Remove an entry, subtracting exactly the stored size recorded at
    /// insertion time
    pub(crate) fn remove(&mut self, identifier: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(identifier)?;
        if let Some(pos) = self.ordered.iter().position(|id| id == identifier) {
            self.ordered.remove(pos);
        }
        self.total_size -= entry.stored_size();
        Some(entry)
    }

    pub(crate) fn pop_oldest(&mut self) -> Option<CacheEntry> {
        let identifier = self.ordered.front()?.clone();
        self.remove(&identifier)
    }

    pub(crate) fn clear(&mut self) {
        self.ordered.clear();
        self.entries.clear();
        self.total_size = 0;
    }

    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        assert_eq!(self.ordered.len(), self.entries.len());
        let mut sum = 0;
        for identifier in &self.ordered {
            let entry = self
                .entries
                .get(identifier)
                .unwrap_or_else(|| panic!("ordered identifier {} missing from map", identifier));
            sum += entry.stored_size();
        }
        assert_eq!(sum, self.total_size);
    }
}

/// Statistics about the cache
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub total_size: u64,
}

/// A cached value handed back by `get`
///
/// `size` is the payload size only; metadata bytes are not included.
#[derive(Debug)]
pub struct CachedStream {
    pub reader: tokio::fs::File,
    pub size: u64,
    pub metadata: Option<serde_json::Value>,
}
