//! MemTable implementation
//!
//! BTreeMap-based memtable with RwLock for concurrency.
//!
//! ## Data Structure Choice
//! - Ordered keys (required for SSTable generation)
//! - Many concurrent readers, writers serialized by the write lock
//! - Tombstones are stored like any other value so they shadow older SSTables

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;

use crate::key::Key;

use super::{Entry, ValueState};

/// Fixed per-entry overhead counted towards the flush threshold
const ENTRY_OVERHEAD: usize = 16;

/// In-memory table for recent writes
pub struct MemTable {
    data: RwLock<BTreeMap<Key, ValueState>>,
    /// Approximate size in bytes (keys + values + overhead)
    size: AtomicUsize,
}

impl MemTable {
    /// Create a new empty MemTable
    pub fn new() -> Self {
        Self {
            data: RwLock::new(BTreeMap::new()),
            size: AtomicUsize::new(0),
        }
    }

    /// Get the entry for a key (read lock)
    pub fn get(&self, key: &[u8]) -> Option<ValueState> {
        self.data.read().get(key).cloned()
    }

    /// Insert or replace an entry (write lock)
    ///
    /// Returns the approximate table size after the insert.
    pub fn insert(&self, entry: Entry) -> usize {
        let mut data = self.data.write();
        let added = Self::footprint(&entry.key, &entry.value);
        let removed = data
            .get(&entry.key)
            .map(|old| Self::footprint(&entry.key, old))
            .unwrap_or(0);
        data.insert(entry.key, entry.value);

        // Only touched while the write lock is held
        let current = self.size.load(Ordering::Acquire);
        let updated = (current + added).saturating_sub(removed);
        self.size.store(updated, Ordering::Release);
        updated
    }

    /// Get approximate size in bytes
    pub fn size(&self) -> usize {
        self.size.load(Ordering::Acquire)
    }

    /// Get entry count
    pub fn entry_count(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Snapshot of all entries in sorted key order (for flush)
    pub fn entries(&self) -> Vec<Entry> {
        self.data
            .read()
            .iter()
            .map(|(key, value)| Entry::new(key.clone(), value.clone()))
            .collect()
    }

    /// Clear all entries (after successful flush)
    pub fn clear(&self) {
        let mut data = self.data.write();
        data.clear();
        self.size.store(0, Ordering::Release);
    }

    fn footprint(key: &Key, value: &ValueState) -> usize {
        key.len() + value.size() + ENTRY_OVERHEAD
    }
}

impl Default for MemTable {
    fn default() -> Self {
        Self::new()
    }
}
