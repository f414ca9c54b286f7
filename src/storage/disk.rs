//! Disk-backed store
//!
//! The embedded engine behind the HTTP service: WAL for durability, a
//! memtable for recent writes and immutable SSTables for flushed data.
//!
//! ## Concurrency Model: Single-Writer / Multiple-Reader
//! - **Upserts** and flushes are serialized by `write_lock`
//!   (write_lock → WAL → memtable → SSTables)
//! - **Reads** take no writer lock: the memtable and the SSTable list each
//!   have their own RwLock, and each SSTable reader its own file mutex

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};

use crate::config::StoreConfig;
use crate::error::{KvError, Result};
use crate::key::Key;

use super::memtable::MemTable;
use super::sstable::{SSTableBuilder, SSTableReader};
use super::wal::{WalRecovery, WalWriter};
use super::{Entry, Store};

/// Embedded LSM-style store
pub struct DiskStore {
    config: StoreConfig,

    /// Directory holding SSTable files
    sstable_dir: PathBuf,

    /// Write-ahead log (exclusive access needed)
    wal: Mutex<WalWriter>,

    /// Recent writes, tombstones included
    memtable: MemTable,

    /// Open SSTable readers, ordered newest → oldest
    sstables: RwLock<Vec<SSTableReader>>,

    /// Next ID for creating new SSTables
    next_sstable_id: AtomicU64,

    /// Serializes upserts and flushes
    write_lock: Mutex<()>,

    closed: AtomicBool,
}

impl DiskStore {
    const WAL_FILENAME: &'static str = "wal.log";
    const SSTABLE_DIR: &'static str = "sstables";

    /// Open or create a store in `config.data_dir`
    ///
    /// On startup:
    /// 1. Create the data and SSTable directories
    /// 2. Open existing SSTables (newest first)
    /// 3. Replay the WAL into the memtable
    /// 4. Flush recovered entries so the WAL can start empty
    pub fn open(config: StoreConfig) -> Result<Self> {
        if config.flush_threshold == 0 {
            return Err(KvError::Config(
                "flush_threshold must be greater than zero".to_string(),
            ));
        }

        let sstable_dir = config.data_dir.join(Self::SSTABLE_DIR);
        fs::create_dir_all(&sstable_dir)?;

        let (sstables, next_id) = Self::load_sstables(&sstable_dir)?;
        let memtable = MemTable::new();

        let wal_path = config.data_dir.join(Self::WAL_FILENAME);
        let mut last_lsn = 0;
        if wal_path.exists() {
            let (records, result) = WalRecovery::recover(&wal_path)?;
            if result.entries_recovered > 0 || result.entries_corrupted > 0 {
                tracing::info!(
                    recovered = result.entries_recovered,
                    corrupted = result.entries_corrupted,
                    last_lsn = result.last_lsn,
                    "WAL recovery complete"
                );
            }
            last_lsn = result.last_lsn;
            for record in records {
                memtable.insert(record.entry);
            }
        }

        let wal = WalWriter::open(&wal_path, config.wal_sync_strategy, last_lsn)?;

        let store = Self {
            config,
            sstable_dir,
            wal: Mutex::new(wal),
            memtable,
            sstables: RwLock::new(sstables),
            next_sstable_id: AtomicU64::new(next_id),
            write_lock: Mutex::new(()),
            closed: AtomicBool::new(false),
        };

        // Recovered data goes straight to an SSTable; the WAL is then truncated
        if !store.memtable.is_empty() {
            tracing::debug!(
                entries = store.memtable.entry_count(),
                "Flushing recovered entries"
            );
            let _guard = store.write_lock.lock();
            store.flush_internal()?;
        }

        let sstable_entries: u64 = store.sstables.read().iter().map(|t| t.entry_count()).sum();
        tracing::debug!(
            data_dir = %store.config.data_dir.display(),
            sstables = store.sstable_count(),
            sstable_entries,
            "Store opened"
        );
        Ok(store)
    }

    /// Open with default settings in `path`
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(StoreConfig::new(path))
    }

    /// Force the memtable out to an SSTable
    pub fn flush(&self) -> Result<()> {
        self.ensure_open()?;
        let _guard = self.write_lock.lock();
        self.flush_internal()
    }

    /// Flush with `write_lock` held
    fn flush_internal(&self) -> Result<()> {
        if self.memtable.is_empty() {
            return Ok(());
        }

        let id = self.next_sstable_id.fetch_add(1, Ordering::SeqCst);
        let path = Self::sstable_path(&self.sstable_dir, id);
        let entries = self.memtable.entries();

        let meta = SSTableBuilder::write_all(&path, &entries)?;
        let reader = SSTableReader::open(&path)?;

        // Publish the table before clearing the memtable so readers never miss a key
        self.sstables.write().insert(0, reader);
        self.memtable.clear();
        self.wal.lock().truncate()?;

        tracing::debug!(
            sstable = %meta.path.display(),
            entries = meta.entry_count,
            bytes = meta.file_size,
            "Flushed memtable"
        );
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(KvError::StoreClosed);
        }
        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    pub fn memtable_size(&self) -> usize {
        self.memtable.size()
    }

    pub fn memtable_entry_count(&self) -> usize {
        self.memtable.entry_count()
    }

    pub fn sstable_count(&self) -> usize {
        self.sstables.read().len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Open every `sstable_NNNNNN.sst` in `dir`, newest first
    fn load_sstables(dir: &Path) -> Result<(Vec<SSTableReader>, u64)> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            match Self::parse_sstable_id(&path) {
                Some(id) => ids.push(id),
                // Leftover from a flush that crashed before its rename
                None if path.extension().map_or(false, |e| e == "tmp") => {
                    tracing::warn!(path = %path.display(), "Removing incomplete SSTable");
                    fs::remove_file(&path)?;
                }
                None => {}
            }
        }

        ids.sort_unstable_by(|a, b| b.cmp(a));
        let readers = ids
            .iter()
            .map(|id| SSTableReader::open(&Self::sstable_path(dir, *id)))
            .collect::<Result<Vec<_>>>()?;

        let next_id = ids.first().map(|id| id + 1).unwrap_or(1);
        Ok((readers, next_id))
    }

    fn sstable_path(dir: &Path, id: u64) -> PathBuf {
        dir.join(format!("sstable_{:06}.sst", id))
    }

    /// "sstable_000042.sst" → Some(42)
    fn parse_sstable_id(path: &Path) -> Option<u64> {
        if path.extension()? != "sst" {
            return None;
        }
        let name = path.file_stem()?.to_str()?;
        name.strip_prefix("sstable_")?.parse().ok()
    }
}

impl Store for DiskStore {
    /// Memtable first, then SSTables newest → oldest
    fn get(&self, key: &Key) -> Result<Option<Entry>> {
        self.ensure_open()?;

        if let Some(value) = self.memtable.get(key.as_bytes()) {
            return Ok(Some(Entry::new(key.clone(), value)));
        }

        let sstables = self.sstables.read();
        for reader in sstables.iter() {
            if !reader.might_contain(key.as_bytes()) {
                continue;
            }
            if let Some(value) = reader.get(key.as_bytes())? {
                return Ok(Some(Entry::new(key.clone(), value)));
            }
        }
        Ok(None)
    }

    fn upsert(&self, entry: Entry) -> Result<()> {
        let _guard = self.write_lock.lock();
        // Checked under the lock: close() flips the flag while holding it
        self.ensure_open()?;

        self.wal.lock().append(entry.clone())?;
        let size = self.memtable.insert(entry);

        // The write is durable in the WAL already; a failed flush is retried
        // on the next upsert that crosses the threshold
        if size >= self.config.flush_threshold {
            if let Err(e) = self.flush_internal() {
                tracing::warn!(
                    error = %e,
                    memtable_bytes = size,
                    "Flush failed; keeping entries in memtable and WAL"
                );
            }
        }
        Ok(())
    }

    /// Flush pending writes, sync the WAL and refuse further calls
    fn close(&self) -> Result<()> {
        let _guard = self.write_lock.lock();
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(KvError::StoreClosed);
        }

        self.flush_internal()?;
        self.wal.lock().sync()?;

        tracing::debug!(data_dir = %self.config.data_dir.display(), "Store closed");
        Ok(())
    }
}
