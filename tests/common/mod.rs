//! Shared test double for the storage adapter
//!
//! An in-memory store that counts calls, can be slowed down or made to fail,
//! and records any call that arrives after `close()`.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use entitykv::{Entry, Key, KvError, Result, Store};
use parking_lot::Mutex;

#[derive(Default)]
pub struct TestStore {
    data: Mutex<HashMap<Key, Entry>>,
    delay: Mutex<Option<Duration>>,
    fail: AtomicBool,
    closed: AtomicBool,

    pub gets: AtomicUsize,
    pub upserts: AtomicUsize,
    pub closes: AtomicUsize,
    pub calls_after_close: AtomicUsize,
}

impl TestStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every get/upsert sleeps this long
    pub fn with_delay(delay: Duration) -> Self {
        let store = Self::new();
        *store.delay.lock() = Some(delay);
        store
    }

    /// Make every get/upsert fail with an I/O error
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Total get + upsert calls
    pub fn calls(&self) -> usize {
        self.gets.load(Ordering::SeqCst) + self.upserts.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn enter(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            self.calls_after_close.fetch_add(1, Ordering::SeqCst);
        }
        if let Some(delay) = *self.delay.lock() {
            thread::sleep(delay);
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(KvError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "injected failure",
            )));
        }
        Ok(())
    }
}

impl Store for TestStore {
    fn get(&self, key: &Key) -> Result<Option<Entry>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.enter()?;
        Ok(self.data.lock().get(key).cloned())
    }

    fn upsert(&self, entry: Entry) -> Result<()> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        self.enter()?;
        self.data.lock().insert(entry.key.clone(), entry);
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
