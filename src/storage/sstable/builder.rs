//! SSTable Builder
//!
//! Writes sorted entries to a new SSTable file.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::{KvError, Result};
use crate::storage::{Entry, ValueState};

use super::{SSTable, HEADER_SIZE, MAGIC, TOMBSTONE_MARKER, VERSION};

/// Builder for creating new SSTables from sorted entries
///
/// Writes go to `<path>.tmp`; `finish()` renames it into place so a crash
/// mid-flush never leaves a half-written table under the final name.
pub struct SSTableBuilder {
    /// Final file path
    path: PathBuf,
    /// Temporary file path while building
    tmp_path: PathBuf,
    /// Buffered writer for performance
    writer: BufWriter<File>,
    /// Number of entries written
    entry_count: u64,
    /// Current write position (for index)
    current_offset: u64,
    /// Index: key → file offset of entry
    index: Vec<(Vec<u8>, u64)>,
    /// Track min/max keys for metadata
    min_key: Option<Vec<u8>>,
    max_key: Option<Vec<u8>>,
    /// Running CRC hasher for data section
    data_hasher: crc32fast::Hasher,
}

impl SSTableBuilder {
    /// Create a new SSTable builder
    ///
    /// Writes header immediately; call `add()` in sorted key order, then
    /// `finish()` to write index and footer.
    pub fn new(path: &Path) -> Result<Self> {
        let tmp_path = path.with_extension("tmp");
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;

        let mut writer = BufWriter::new(file);

        // Entry count is patched in finish()
        writer.write_all(MAGIC)?;
        writer.write_all(&VERSION.to_le_bytes())?;
        writer.write_all(&0u64.to_le_bytes())?;

        Ok(Self {
            path: path.to_path_buf(),
            tmp_path,
            writer,
            entry_count: 0,
            current_offset: HEADER_SIZE,
            index: Vec::new(),
            min_key: None,
            max_key: None,
            data_hasher: crc32fast::Hasher::new(),
        })
    }

    /// Build a complete table from entries already in sorted key order
    pub fn write_all(path: &Path, entries: &[Entry]) -> Result<SSTable> {
        let mut builder = Self::new(path)?;
        for entry in entries {
            builder.add(entry)?;
        }
        builder.finish()
    }

    /// Add an entry (must be called in strictly increasing key order)
    pub fn add(&mut self, entry: &Entry) -> Result<()> {
        let key = entry.key.as_bytes();

        if let Some(last) = &self.max_key {
            if key <= last.as_slice() {
                return Err(KvError::Storage(
                    "SSTable entries must be added in increasing key order".to_string(),
                ));
            }
        }

        let value = match &entry.value {
            ValueState::Present(v) => Some(v.as_ref()),
            ValueState::Tombstone => None,
        };
        if value.map_or(false, |v| v.len() >= TOMBSTONE_MARKER as usize) {
            return Err(KvError::Storage("Value too large for SSTable".to_string()));
        }

        self.index.push((key.to_vec(), self.current_offset));
        if self.min_key.is_none() {
            self.min_key = Some(key.to_vec());
        }
        self.max_key = Some(key.to_vec());

        // [key_len(4)][val_len(4)][key][value]
        let key_len_bytes = (key.len() as u32).to_le_bytes();
        let val_len_bytes = match value {
            Some(v) => (v.len() as u32).to_le_bytes(),
            None => TOMBSTONE_MARKER.to_le_bytes(),
        };

        self.writer.write_all(&key_len_bytes)?;
        self.writer.write_all(&val_len_bytes)?;
        self.writer.write_all(key)?;
        self.data_hasher.update(&key_len_bytes);
        self.data_hasher.update(&val_len_bytes);
        self.data_hasher.update(key);

        let mut entry_size: u64 = 8 + key.len() as u64;
        if let Some(v) = value {
            self.writer.write_all(v)?;
            self.data_hasher.update(v);
            entry_size += v.len() as u64;
        }

        self.current_offset += entry_size;
        self.entry_count += 1;
        Ok(())
    }

    /// Finish building: write index block, footer, and return metadata
    pub fn finish(mut self) -> Result<SSTable> {
        let index_offset = self.current_offset;

        for (key, offset) in &self.index {
            self.writer.write_all(&(key.len() as u32).to_le_bytes())?;
            self.writer.write_all(&offset.to_le_bytes())?;
            self.writer.write_all(key)?;
        }

        let data_crc = self.data_hasher.finalize();
        self.writer.write_all(&index_offset.to_le_bytes())?;
        self.writer.write_all(&data_crc.to_le_bytes())?;
        self.writer.write_all(&[0u8; 4])?;
        self.writer.flush()?;

        let mut file = self
            .writer
            .into_inner()
            .map_err(|e| KvError::Storage(format!("Failed to flush SSTable: {}", e)))?;
        file.seek(SeekFrom::Start(6))?; // After magic + version
        file.write_all(&self.entry_count.to_le_bytes())?;
        file.sync_all()?;
        let file_size = file.metadata()?.len();
        drop(file);

        fs::rename(&self.tmp_path, &self.path)?;

        Ok(SSTable {
            path: self.path,
            entry_count: self.entry_count,
            min_key: self.min_key.unwrap_or_default(),
            max_key: self.max_key.unwrap_or_default(),
            file_size,
        })
    }
}
