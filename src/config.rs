//! Configuration for entitykv
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use crate::error::{KvError, Result};

/// Default flush threshold: 1 MiB of memtable data
pub const DEFAULT_FLUSH_THRESHOLD: usize = 1 << 20;

/// Default number of requests allowed to wait for a free worker
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Default bound on draining the worker pool at shutdown
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Main configuration for an entitykv service instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all data files
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── wal.log          (write-ahead log)
    ///     └── sstables/        (sorted table files)
    pub data_dir: PathBuf,

    /// Memtable size (in bytes) at which it is flushed to a sorted table
    pub flush_threshold: usize,

    /// Sync strategy: how often to fsync the WAL
    pub wal_sync_strategy: WalSyncStrategy,

    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// Host the HTTP listener binds to
    pub host: String,

    /// HTTP listen port (0 picks an ephemeral port)
    pub port: u16,

    // -------------------------------------------------------------------------
    // Admission Configuration
    // -------------------------------------------------------------------------
    /// Number of worker threads executing requests
    pub pool_size: usize,

    /// Number of requests that may wait for a free worker
    pub queue_capacity: usize,

    /// Upper bound on draining in-flight and queued requests at shutdown
    pub shutdown_timeout: Duration,
}

/// WAL sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalSyncStrategy {
    /// fsync after every write (safest, slowest)
    EveryWrite,

    /// fsync after N unsynced entries (balanced durability/performance)
    EveryNEntries { count: usize },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./entitykv_data"),
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
            wal_sync_strategy: WalSyncStrategy::EveryNEntries { count: 100 },
            host: "127.0.0.1".to_string(),
            port: 8080,
            pool_size: available_workers(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// `host:port` string for the listener
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Storage-only view of this config
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            data_dir: self.data_dir.clone(),
            flush_threshold: self.flush_threshold,
            wal_sync_strategy: self.wal_sync_strategy,
        }
    }

    /// Reject settings the service cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.pool_size == 0 {
            return Err(KvError::Config("pool_size must be at least 1".to_string()));
        }
        if self.flush_threshold == 0 {
            return Err(KvError::Config(
                "flush_threshold must be greater than zero".to_string(),
            ));
        }
        if let WalSyncStrategy::EveryNEntries { count: 0 } = self.wal_sync_strategy {
            return Err(KvError::Config(
                "WAL sync interval must be at least 1 entry".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration consumed by the storage engine
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub data_dir: PathBuf,
    pub flush_threshold: usize,
    pub wal_sync_strategy: WalSyncStrategy,
}

impl StoreConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
            wal_sync_strategy: WalSyncStrategy::EveryNEntries { count: 100 },
        }
    }
}

/// Number of available processing units, falling back to 1
pub fn available_workers() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all storage)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the memtable flush threshold (in bytes)
    pub fn flush_threshold(mut self, bytes: usize) -> Self {
        self.config.flush_threshold = bytes;
        self
    }

    /// Set the WAL sync strategy
    pub fn wal_sync_strategy(mut self, strategy: WalSyncStrategy) -> Self {
        self.config.wal_sync_strategy = strategy;
        self
    }

    /// Set the listen host
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Set the listen port
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Set the number of worker threads
    pub fn pool_size(mut self, size: usize) -> Self {
        self.config.pool_size = size;
        self
    }

    /// Set the admission queue capacity
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    /// Set the shutdown drain timeout
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.config.shutdown_timeout = timeout;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
