//! Tests for DiskStore
//!
//! These tests verify:
//! - get/upsert semantics, tombstones included
//! - Flush to SSTable at the configured threshold
//! - Crash recovery from the WAL
//! - Close semantics
//! - Concurrent access

use std::sync::Arc;
use std::thread;

use bytes::Bytes;
use entitykv::config::{StoreConfig, WalSyncStrategy};
use entitykv::storage::WalRecovery;
use entitykv::{DiskStore, Entry, Key, KvError, Store, ValueState};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn store_config(dir: &TempDir, flush_threshold: usize) -> StoreConfig {
    StoreConfig {
        data_dir: dir.path().to_path_buf(),
        flush_threshold,
        wal_sync_strategy: WalSyncStrategy::EveryWrite,
    }
}

fn setup_temp_store() -> (TempDir, DiskStore) {
    let temp_dir = TempDir::new().unwrap();
    let store = DiskStore::open(store_config(&temp_dir, 1024 * 1024)).unwrap();
    (temp_dir, store)
}

fn setup_temp_store_with_small_threshold() -> (TempDir, DiskStore) {
    let temp_dir = TempDir::new().unwrap();
    let store = DiskStore::open(store_config(&temp_dir, 100)).unwrap();
    (temp_dir, store)
}

fn put(store: &DiskStore, id: &str, value: &str) {
    store
        .upsert(Entry::present(Key::from_id(id), Bytes::copy_from_slice(value.as_bytes())))
        .unwrap();
}

fn value_of(store: &DiskStore, id: &str) -> Option<ValueState> {
    store.get(&Key::from_id(id)).unwrap().map(|e| e.value)
}

fn present(value: &str) -> Option<ValueState> {
    Some(ValueState::Present(Bytes::copy_from_slice(value.as_bytes())))
}

// =============================================================================
// Basic Operations Tests
// =============================================================================

#[test]
fn test_open_creates_directories() {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = temp_dir.path().join("mydb");

    let _store = DiskStore::open_path(&data_dir).unwrap();

    assert!(data_dir.exists());
    assert!(data_dir.join("sstables").exists());
    assert!(data_dir.join("wal.log").exists());
}

#[test]
fn test_upsert_get() {
    let (_temp, store) = setup_temp_store();

    put(&store, "hello", "world");

    assert_eq!(value_of(&store, "hello"), present("world"));
}

#[test]
fn test_get_nonexistent_key() {
    let (_temp, store) = setup_temp_store();

    assert_eq!(store.get(&Key::from_id("nonexistent")).unwrap(), None);
}

#[test]
fn test_upsert_overwrite() {
    let (_temp, store) = setup_temp_store();

    put(&store, "key", "value1");
    put(&store, "key", "value2");

    assert_eq!(value_of(&store, "key"), present("value2"));
}

#[test]
fn test_get_returns_tombstone_entry() {
    let (_temp, store) = setup_temp_store();

    put(&store, "key", "value");
    store.upsert(Entry::tombstone(Key::from_id("key"))).unwrap();

    // The store reports tombstones; it does not filter them
    let entry = store.get(&Key::from_id("key")).unwrap().unwrap();
    assert!(entry.is_tombstone());
    assert_eq!(entry.value(), None);
}

#[test]
fn test_tombstone_for_never_written_key() {
    let (_temp, store) = setup_temp_store();

    store.upsert(Entry::tombstone(Key::from_id("ghost"))).unwrap();

    assert_eq!(value_of(&store, "ghost"), Some(ValueState::Tombstone));
}

// =============================================================================
// Flush Tests
// =============================================================================

#[test]
fn test_manual_flush() {
    let (_temp, store) = setup_temp_store();

    put(&store, "key", "value");
    assert_eq!(store.memtable_entry_count(), 1);
    assert_eq!(store.sstable_count(), 0);

    store.flush().unwrap();

    assert_eq!(store.memtable_entry_count(), 0);
    assert_eq!(store.sstable_count(), 1);
    assert_eq!(value_of(&store, "key"), present("value"));
}

#[test]
fn test_flush_empty_memtable_is_noop() {
    let (_temp, store) = setup_temp_store();

    store.flush().unwrap();
    assert_eq!(store.sstable_count(), 0);
}

#[test]
fn test_auto_flush_on_threshold() {
    let (_temp, store) = setup_temp_store_with_small_threshold();

    for i in 0..10 {
        put(
            &store,
            &format!("key{:02}", i),
            &format!("value_that_is_definitely_long_enough_{:02}", i),
        );
    }

    assert!(
        store.sstable_count() >= 1,
        "Expected at least 1 SSTable after exceeding the flush threshold, got {}",
        store.sstable_count()
    );
    assert!(store.memtable_size() < 100);

    for i in 0..10 {
        let id = format!("key{:02}", i);
        assert!(value_of(&store, &id).is_some(), "Key {} should exist", id);
    }
}

#[test]
fn test_failed_flush_keeps_write_and_retries() {
    let temp_dir = TempDir::new().unwrap();
    // A directory squatting on the first table's temp path makes that flush fail
    let blocker = temp_dir.path().join("sstables").join("sstable_000001.tmp");
    std::fs::create_dir_all(&blocker).unwrap();

    let store = DiskStore::open(store_config(&temp_dir, 8)).unwrap();

    put(&store, "a", "hello");
    assert_eq!(value_of(&store, "a"), present("hello"));
    assert_eq!(store.sstable_count(), 0);
    assert_eq!(store.memtable_entry_count(), 1);

    // The next flush picks a fresh table id and succeeds
    put(&store, "b", "world");
    assert_eq!(store.sstable_count(), 1);
    assert_eq!(store.memtable_entry_count(), 0);
    assert_eq!(value_of(&store, "a"), present("hello"));
    assert_eq!(value_of(&store, "b"), present("world"));
}

#[test]
fn test_tombstone_in_memtable_shadows_sstable_value() {
    let (_temp, store) = setup_temp_store();

    put(&store, "key", "old");
    store.flush().unwrap();
    store.upsert(Entry::tombstone(Key::from_id("key"))).unwrap();

    assert_eq!(value_of(&store, "key"), Some(ValueState::Tombstone));
}

#[test]
fn test_newer_sstable_shadows_older() {
    let (_temp, store) = setup_temp_store();

    put(&store, "key", "v1");
    store.flush().unwrap();
    put(&store, "key", "v2");
    store.flush().unwrap();
    store.upsert(Entry::tombstone(Key::from_id("other"))).unwrap();
    store.flush().unwrap();

    assert_eq!(store.sstable_count(), 3);
    assert_eq!(value_of(&store, "key"), present("v2"));
    assert_eq!(value_of(&store, "other"), Some(ValueState::Tombstone));
}

// =============================================================================
// Crash Recovery Tests
// =============================================================================

#[test]
fn test_recovery_from_wal() {
    let temp_dir = TempDir::new().unwrap();

    // First store - write data, never close (simulating crash)
    {
        let store = DiskStore::open(store_config(&temp_dir, 1024 * 1024)).unwrap();
        put(&store, "key1", "value1");
        put(&store, "key2", "value2");
        store.upsert(Entry::tombstone(Key::from_id("key1"))).unwrap();
        put(&store, "key3", "value3");
        drop(store);
    }

    // Second store - recovers from the WAL and flushes immediately
    {
        let store = DiskStore::open(store_config(&temp_dir, 1024 * 1024)).unwrap();
        assert_eq!(store.sstable_count(), 1);
        assert_eq!(store.memtable_entry_count(), 0);

        assert_eq!(value_of(&store, "key1"), Some(ValueState::Tombstone));
        assert_eq!(value_of(&store, "key2"), present("value2"));
        assert_eq!(value_of(&store, "key3"), present("value3"));
    }

    let wal = temp_dir.path().join("wal.log");
    assert_eq!(WalRecovery::verify(&wal).unwrap().entries_recovered, 0);
}

#[test]
fn test_data_survives_close_and_reopen() {
    let temp_dir = TempDir::new().unwrap();

    {
        let store = DiskStore::open(store_config(&temp_dir, 1024 * 1024)).unwrap();
        put(&store, "a", "1");
        put(&store, "b", "2");
        store.upsert(Entry::tombstone(Key::from_id("b"))).unwrap();
        store.close().unwrap();
    }

    let store = DiskStore::open(store_config(&temp_dir, 1024 * 1024)).unwrap();
    assert_eq!(value_of(&store, "a"), present("1"));
    assert_eq!(value_of(&store, "b"), Some(ValueState::Tombstone));
}

#[test]
fn test_leftover_tmp_file_is_removed() {
    let temp_dir = TempDir::new().unwrap();
    let sstables = temp_dir.path().join("sstables");
    std::fs::create_dir_all(&sstables).unwrap();
    std::fs::write(sstables.join("sstable_000007.tmp"), b"half written").unwrap();

    let store = DiskStore::open_path(temp_dir.path()).unwrap();

    assert_eq!(store.sstable_count(), 0);
    assert!(!sstables.join("sstable_000007.tmp").exists());
}

// =============================================================================
// Close Tests
// =============================================================================

#[test]
fn test_calls_after_close_fail() {
    let (_temp, store) = setup_temp_store();
    put(&store, "key", "value");

    store.close().unwrap();
    assert!(store.is_closed());

    assert!(matches!(
        store.get(&Key::from_id("key")),
        Err(KvError::StoreClosed)
    ));
    assert!(matches!(
        store.upsert(Entry::tombstone(Key::from_id("key"))),
        Err(KvError::StoreClosed)
    ));
    assert!(matches!(store.close(), Err(KvError::StoreClosed)));
}

#[test]
fn test_close_flushes_memtable() {
    let (temp, store) = setup_temp_store();
    put(&store, "key", "value");

    store.close().unwrap();
    assert_eq!(store.sstable_count(), 1);

    let wal = temp.path().join("wal.log");
    assert_eq!(std::fs::metadata(wal).unwrap().len(), 0);
}

#[test]
fn test_zero_flush_threshold_rejected() {
    let temp_dir = TempDir::new().unwrap();
    assert!(matches!(
        DiskStore::open(store_config(&temp_dir, 0)),
        Err(KvError::Config(_))
    ));
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_concurrent_readers_and_writers() {
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(DiskStore::open(store_config(&temp_dir, 4096)).unwrap());

    let writers: Vec<_> = (0..4)
        .map(|t| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 0..100 {
                    put(&store, &format!("t{}-k{}", t, i), &format!("v{}", i));
                }
            })
        })
        .collect();

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 0..100 {
                    // Either absent yet or the exact value; never anything else
                    if let Some(value) = value_of(&store, &format!("t0-k{}", i)) {
                        assert_eq!(Some(value), present(&format!("v{}", i)));
                    }
                }
            })
        })
        .collect();

    for handle in writers.into_iter().chain(readers) {
        handle.join().unwrap();
    }

    assert!(store.sstable_count() >= 1);
    for t in 0..4 {
        for i in 0..100 {
            assert_eq!(
                value_of(&store, &format!("t{}-k{}", t, i)),
                present(&format!("v{}", i))
            );
        }
    }
}
