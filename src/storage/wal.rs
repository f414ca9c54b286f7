//! Write-Ahead Log (WAL)
//!
//! Every upsert is appended here before it reaches the memtable, so entries
//! that were never flushed to an SSTable survive a crash.
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ Record 1                                │
//! │ ┌─────────┬─────────┬─────────────────┐ │
//! │ │ CRC (4) │ Len (4) │ bincode(record) │ │
//! │ └─────────┴─────────┴─────────────────┘ │
//! ├─────────────────────────────────────────┤
//! │ Record 2 ...                            │
//! └─────────────────────────────────────────┘
//! ```
//! The CRC covers the encoded record only. Recovery stops at the first torn
//! or corrupt record and truncates the file there.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::config::WalSyncStrategy;
use crate::error::{KvError, Result};

use super::Entry;

/// Frame header: CRC (4) + Len (4)
pub const HEADER_SIZE: usize = 8;

/// A single logged upsert
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalRecord {
    /// Log Sequence Number - monotonically increasing
    pub lsn: u64,

    /// Timestamp (unix millis) when the record was created
    pub timestamp: u64,

    /// The upserted entry (value or tombstone)
    pub entry: Entry,
}

impl WalRecord {
    pub fn new(lsn: u64, entry: Entry) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self {
            lsn,
            timestamp,
            entry,
        }
    }

    /// Encode as a framed record: [crc][len][data]
    pub fn encode(&self) -> Result<Vec<u8>> {
        let data = bincode::serialize(self)?;
        let crc = crc32fast::hash(&data);

        let mut frame = Vec::with_capacity(HEADER_SIZE + data.len());
        frame.extend_from_slice(&crc.to_le_bytes());
        frame.extend_from_slice(&(data.len() as u32).to_le_bytes());
        frame.extend_from_slice(&data);
        Ok(frame)
    }
}

/// Appends records to the WAL file
pub struct WalWriter {
    writer: BufWriter<File>,
    next_lsn: u64,
    sync_strategy: WalSyncStrategy,
    /// Records appended since the last fsync
    unsynced: usize,
}

impl WalWriter {
    /// Open or create a WAL file, continuing after `last_lsn`
    pub fn open(path: &Path, sync_strategy: WalSyncStrategy, last_lsn: u64) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            writer: BufWriter::new(file),
            next_lsn: last_lsn + 1,
            sync_strategy,
            unsynced: 0,
        })
    }

    /// Append an entry, returning its LSN
    pub fn append(&mut self, entry: Entry) -> Result<u64> {
        let lsn = self.next_lsn;
        let frame = WalRecord::new(lsn, entry).encode()?;

        self.writer.write_all(&frame)?;
        self.writer.flush()?;
        self.next_lsn += 1;
        self.unsynced += 1;

        let due = match self.sync_strategy {
            WalSyncStrategy::EveryWrite => true,
            WalSyncStrategy::EveryNEntries { count } => self.unsynced >= count,
        };
        if due {
            self.sync()?;
        }

        Ok(lsn)
    }

    /// Force sync to disk
    pub fn sync(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        self.unsynced = 0;
        Ok(())
    }

    /// Drop all records (their entries are durable in an SSTable now)
    pub fn truncate(&mut self) -> Result<()> {
        self.writer.flush()?;
        let file = self.writer.get_mut();
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        file.sync_all()?;
        self.unsynced = 0;
        Ok(())
    }
}

/// Result of a recovery operation
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecoveryResult {
    /// Number of records successfully recovered
    pub entries_recovered: u64,

    /// Number of corrupted records found (recovery stops at the first)
    pub entries_corrupted: u64,

    /// Last valid LSN (0 if none)
    pub last_lsn: u64,

    /// Whether the WAL was truncated (torn or corrupt tail removed)
    pub was_truncated: bool,
}

/// Crash recovery by replaying the WAL
pub struct WalRecovery;

impl WalRecovery {
    /// Recover records from a WAL file
    ///
    /// Reads every valid record in order, then truncates the file after the
    /// last one so the writer appends to a clean tail.
    pub fn recover(path: &Path) -> Result<(Vec<WalRecord>, RecoveryResult)> {
        let (records, mut result, valid_len) = Self::scan(path)?;

        let file_len = fs::metadata(path)?.len();
        if valid_len < file_len {
            let file = OpenOptions::new().write(true).open(path)?;
            file.set_len(valid_len)?;
            file.sync_all()?;
            result.was_truncated = true;
            tracing::warn!(
                path = %path.display(),
                kept = valid_len,
                dropped = file_len - valid_len,
                "Truncated damaged WAL tail"
            );
        }

        Ok((records, result))
    }

    /// Verify integrity of a WAL file without modifying it
    pub fn verify(path: &Path) -> Result<RecoveryResult> {
        let (_, mut result, valid_len) = Self::scan(path)?;
        result.was_truncated = valid_len < fs::metadata(path)?.len();
        Ok(result)
    }

    /// Parse frames until the end or the first bad one
    ///
    /// Returns the records, stats, and the byte length of the valid prefix.
    fn scan(path: &Path) -> Result<(Vec<WalRecord>, RecoveryResult, u64)> {
        let data = fs::read(path)?;
        let mut records = Vec::new();
        let mut result = RecoveryResult::default();
        let mut pos = 0usize;

        while pos < data.len() {
            if data.len() - pos < HEADER_SIZE {
                break; // torn header
            }
            let crc = u32::from_le_bytes(le_array(&data[pos..pos + 4])?);
            let len = u32::from_le_bytes(le_array(&data[pos + 4..pos + 8])?) as usize;
            let start = pos + HEADER_SIZE;

            if data.len() - start < len {
                break; // torn body
            }
            let body = &data[start..start + len];

            if crc32fast::hash(body) != crc {
                result.entries_corrupted += 1;
                break;
            }
            let record: WalRecord = match bincode::deserialize(body) {
                Ok(record) => record,
                Err(_) => {
                    result.entries_corrupted += 1;
                    break;
                }
            };

            result.entries_recovered += 1;
            result.last_lsn = record.lsn;
            records.push(record);
            pos = start + len;
        }

        Ok((records, result, pos as u64))
    }
}

fn le_array(slice: &[u8]) -> Result<[u8; 4]> {
    slice
        .try_into()
        .map_err(|_| KvError::WalCorruption("short frame header".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::Key;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn wal_path(dir: &TempDir) -> PathBuf {
        dir.path().join("wal.log")
    }

    #[test]
    fn test_append_and_recover() {
        let dir = TempDir::new().unwrap();
        let path = wal_path(&dir);

        let mut wal = WalWriter::open(&path, WalSyncStrategy::EveryWrite, 0).unwrap();
        assert_eq!(wal.append(Entry::present(Key::from_id("a"), &b"1"[..])).unwrap(), 1);
        assert_eq!(wal.append(Entry::tombstone(Key::from_id("a"))).unwrap(), 2);
        drop(wal);

        let (records, result) = WalRecovery::recover(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(result.last_lsn, 2);
        assert!(!result.was_truncated);
        assert!(records[1].entry.is_tombstone());
    }

    #[test]
    fn test_torn_tail_is_truncated() {
        let dir = TempDir::new().unwrap();
        let path = wal_path(&dir);

        let mut wal = WalWriter::open(&path, WalSyncStrategy::EveryWrite, 0).unwrap();
        wal.append(Entry::present(Key::from_id("a"), &b"1"[..])).unwrap();
        drop(wal);
        let good_len = fs::metadata(&path).unwrap().len();

        // Simulate a crash halfway through the next frame
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&[7, 7, 7, 7, 100, 0, 0, 0, 1, 2]).unwrap();
        drop(file);

        let (records, result) = WalRecovery::recover(&path).unwrap();
        assert_eq!(records.len(), 1);
        assert!(result.was_truncated);
        assert_eq!(fs::metadata(&path).unwrap().len(), good_len);
    }

    #[test]
    fn test_crc_mismatch_stops_recovery() {
        let dir = TempDir::new().unwrap();
        let path = wal_path(&dir);

        let mut wal = WalWriter::open(&path, WalSyncStrategy::EveryWrite, 0).unwrap();
        wal.append(Entry::present(Key::from_id("a"), &b"1"[..])).unwrap();
        wal.append(Entry::present(Key::from_id("b"), &b"2"[..])).unwrap();
        drop(wal);

        // Flip the last byte of the second record
        let mut data = fs::read(&path).unwrap();
        let last = data.len() - 1;
        data[last] ^= 0xFF;
        fs::write(&path, &data).unwrap();

        let result = WalRecovery::verify(&path).unwrap();
        assert_eq!(result.entries_recovered, 1);
        assert_eq!(result.entries_corrupted, 1);
        assert!(result.was_truncated);
    }

    #[test]
    fn test_truncate_resets_file() {
        let dir = TempDir::new().unwrap();
        let path = wal_path(&dir);

        let strategy = WalSyncStrategy::EveryNEntries { count: 10 };
        let mut wal = WalWriter::open(&path, strategy, 0).unwrap();
        wal.append(Entry::present(Key::from_id("a"), &b"1"[..])).unwrap();
        wal.truncate().unwrap();
        wal.append(Entry::present(Key::from_id("b"), &b"2"[..])).unwrap();
        wal.sync().unwrap();

        let (records, _) = WalRecovery::recover(&path).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].lsn, 2);
    }
}
