//! Storage Module
//!
//! The storage engine adapter consumed by the request handlers, plus the
//! embedded engine that implements it.
//!
//! ## Contract
//! - `get(key)` returns the newest [`Entry`] for the key, **tombstones
//!   included**. Filtering deleted keys is the caller's job: a read that sees
//!   [`ValueState::Tombstone`] must report the key as absent.
//! - `upsert(entry)` writes either value state. Deletes are upserts of a
//!   tombstone, never a separate operation.
//! - `close()` is called once, after every caller has finished.
//!
//! ## Embedded engine layout
//! ```text
//!   upsert ──► WAL (append, CRC framed) ──► MemTable ──(flush threshold)──► SSTable
//!   get    ──► MemTable ──miss──► SSTables newest → oldest
//! ```

mod disk;
mod memtable;
mod sstable;
mod wal;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::key::Key;

pub use disk::DiskStore;
pub use memtable::MemTable;
pub use sstable::{SSTable, SSTableBuilder, SSTableReader};
pub use wal::{RecoveryResult, WalRecord, WalRecovery, WalWriter};

/// State of a key's value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueState {
    /// A live value (may be empty)
    Present(Bytes),

    /// A logical delete marker
    Tombstone,
}

impl ValueState {
    /// Approximate in-memory footprint of the value
    pub fn size(&self) -> usize {
        match self {
            ValueState::Present(value) => value.len(),
            ValueState::Tombstone => 0,
        }
    }
}

/// A key paired with its value state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub key: Key,
    pub value: ValueState,
}

impl Entry {
    pub fn new(key: Key, value: ValueState) -> Self {
        Self { key, value }
    }

    /// Entry carrying a live value
    pub fn present(key: Key, value: impl Into<Bytes>) -> Self {
        Self::new(key, ValueState::Present(value.into()))
    }

    /// Entry marking the key deleted
    pub fn tombstone(key: Key) -> Self {
        Self::new(key, ValueState::Tombstone)
    }

    pub fn is_tombstone(&self) -> bool {
        matches!(self.value, ValueState::Tombstone)
    }

    /// The live value, or `None` for a tombstone
    pub fn value(&self) -> Option<&Bytes> {
        match &self.value {
            ValueState::Present(value) => Some(value),
            ValueState::Tombstone => None,
        }
    }
}

/// Storage engine adapter used by the request handlers
///
/// Implementations must be safe for concurrent `get`/`upsert` calls from many
/// worker threads. Ordering of concurrent upserts to one key is up to the
/// implementation.
pub trait Store: Send + Sync {
    /// Newest entry for `key`, tombstones included; `None` if never written
    fn get(&self, key: &Key) -> Result<Option<Entry>>;

    /// Write a value or a tombstone
    fn upsert(&self, entry: Entry) -> Result<()>;

    /// Release the engine's resources
    fn close(&self) -> Result<()>;
}
