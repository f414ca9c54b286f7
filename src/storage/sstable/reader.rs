//! SSTable Reader
//!
//! Opens SSTable files and provides O(log n) key lookups via in-memory index.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::error::{KvError, Result};
use crate::storage::ValueState;

use super::{
    read_u16, read_u32, read_u64, FOOTER_SIZE, HEADER_SIZE, MAGIC, TOMBSTONE_MARKER, VERSION,
};

/// Reader for SSTable files with in-memory index for O(log n) lookups
///
/// The file handle sits behind its own mutex, so `get` takes `&self` and
/// readers of different tables never contend.
pub struct SSTableReader {
    /// File handle for reading entries
    file: Mutex<BufReader<File>>,
    /// In-memory index: key → file offset
    index: BTreeMap<Vec<u8>, u64>,
    entry_count: u64,
}

impl SSTableReader {
    /// Open an SSTable for reading
    ///
    /// Validates header and data CRC, then loads the index into memory.
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = File::open(path)?;
        let file_size = file.metadata()?.len();
        if file_size < HEADER_SIZE + FOOTER_SIZE {
            return Err(KvError::Storage(format!(
                "SSTable {} too small ({} bytes)",
                path.display(),
                file_size
            )));
        }

        let mut contents = Vec::with_capacity(file_size as usize);
        file.read_to_end(&mut contents)?;

        if &contents[0..4] != MAGIC {
            return Err(KvError::Storage(format!(
                "Invalid SSTable magic: expected EKV1, got {:?}",
                &contents[0..4]
            )));
        }
        let version = read_u16(&contents, 4)?;
        if version != VERSION {
            return Err(KvError::Storage(format!(
                "Unsupported SSTable version: {}",
                version
            )));
        }
        let entry_count = read_u64(&contents, 6)?;

        let footer_at = (file_size - FOOTER_SIZE) as usize;
        let index_offset = read_u64(&contents, footer_at)?;
        let data_crc = read_u32(&contents, footer_at + 8)?;
        if index_offset < HEADER_SIZE || index_offset > footer_at as u64 {
            return Err(KvError::Storage(format!(
                "SSTable {} has invalid index offset {}",
                path.display(),
                index_offset
            )));
        }

        let data_block = &contents[HEADER_SIZE as usize..index_offset as usize];
        if crc32fast::hash(data_block) != data_crc {
            return Err(KvError::Storage(format!(
                "SSTable {} failed data checksum",
                path.display()
            )));
        }

        // Parse index entries: [key_len(4)][offset(8)][key]
        let index_block = &contents[index_offset as usize..footer_at];
        let mut index = BTreeMap::new();
        let mut pos = 0;
        while pos < index_block.len() {
            let key_len = read_u32(index_block, pos)? as usize;
            let offset = read_u64(index_block, pos + 4)?;
            pos += 12;
            let key = index_block
                .get(pos..pos + key_len)
                .ok_or_else(|| KvError::Storage("SSTable index truncated".to_string()))?;
            index.insert(key.to_vec(), offset);
            pos += key_len;
        }

        if index.len() as u64 != entry_count {
            return Err(KvError::Storage(format!(
                "SSTable {} index has {} keys, header says {}",
                path.display(),
                index.len(),
                entry_count
            )));
        }

        file.seek(SeekFrom::Start(0))?;

        Ok(Self {
            file: Mutex::new(BufReader::new(file)),
            index,
            entry_count,
        })
    }

    /// Look up a key in O(log n) via the in-memory index
    ///
    /// Returns:
    /// - `Ok(None)`: key not in this SSTable
    /// - `Ok(Some(ValueState::Tombstone))`: key deleted here
    /// - `Ok(Some(ValueState::Present(_)))`: key found with value
    pub fn get(&self, key: &[u8]) -> Result<Option<ValueState>> {
        let offset = match self.index.get(key) {
            Some(&off) => off,
            None => return Ok(None),
        };

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;

        let mut header = [0u8; 8];
        file.read_exact(&mut header)?;
        let key_len = read_u32(&header, 0)? as i64;
        let val_len = read_u32(&header, 4)?;

        // Skip the key (the index already matched it)
        file.seek_relative(key_len)?;

        if val_len == TOMBSTONE_MARKER {
            return Ok(Some(ValueState::Tombstone));
        }

        let mut value = vec![0u8; val_len as usize];
        file.read_exact(&mut value)?;
        Ok(Some(ValueState::Present(Bytes::from(value))))
    }

    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    /// Quick check if a key might be in this SSTable (range check)
    pub fn might_contain(&self, key: &[u8]) -> bool {
        match (self.index.keys().next(), self.index.keys().next_back()) {
            (Some(min), Some(max)) => key >= min.as_slice() && key <= max.as_slice(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::Key;
    use crate::storage::{Entry, SSTableBuilder};
    use tempfile::TempDir;

    fn sample_entries() -> Vec<Entry> {
        vec![
            Entry::present(Key::from_id("apple"), &b"red"[..]),
            Entry::tombstone(Key::from_id("banana")),
            Entry::present(Key::from_id("cherry"), Bytes::new()),
        ]
    }

    #[test]
    fn test_build_and_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sstable_000001.sst");

        let meta = SSTableBuilder::write_all(&path, &sample_entries()).unwrap();
        assert_eq!(meta.entry_count, 3);
        assert_eq!(meta.min_key, b"apple");
        assert_eq!(meta.max_key, b"cherry");
        assert!(!path.with_extension("tmp").exists());

        let reader = SSTableReader::open(&path).unwrap();
        assert_eq!(reader.entry_count(), 3);
        assert_eq!(
            reader.get(b"apple").unwrap(),
            Some(ValueState::Present(Bytes::from_static(b"red")))
        );
        assert_eq!(reader.get(b"banana").unwrap(), Some(ValueState::Tombstone));
        assert_eq!(
            reader.get(b"cherry").unwrap(),
            Some(ValueState::Present(Bytes::new()))
        );
        assert_eq!(reader.get(b"durian").unwrap(), None);
    }

    #[test]
    fn test_rejects_unsorted_input() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sstable_000001.sst");

        let mut builder = SSTableBuilder::new(&path).unwrap();
        builder.add(&Entry::present(Key::from_id("b"), &b"1"[..])).unwrap();
        assert!(builder.add(&Entry::present(Key::from_id("a"), &b"2"[..])).is_err());
    }

    #[test]
    fn test_detects_corrupt_data_block() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sstable_000001.sst");
        SSTableBuilder::write_all(&path, &sample_entries()).unwrap();

        let mut data = std::fs::read(&path).unwrap();
        data[HEADER_SIZE as usize + 9] ^= 0xFF;
        std::fs::write(&path, &data).unwrap();

        assert!(matches!(SSTableReader::open(&path), Err(KvError::Storage(_))));
    }
}
