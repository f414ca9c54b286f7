//! Error types for entitykv
//!
//! Provides a unified error type for storage, dispatch and lifecycle operations.

use std::time::Duration;

use thiserror::Error;

/// Result type alias using KvError
pub type Result<T> = std::result::Result<T, KvError>;

/// Unified error type for entitykv operations
#[derive(Debug, Error)]
pub enum KvError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    #[error("WAL corruption detected: {0}")]
    WalCorruption(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Store is closed")]
    StoreClosed,

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Dispatch Errors
    // -------------------------------------------------------------------------
    #[error("Worker pool did not drain within {0:?}")]
    ShutdownTimeout(Duration),

    // -------------------------------------------------------------------------
    // Lifecycle / Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Lifecycle error: {0}")]
    Lifecycle(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<bincode::Error> for KvError {
    fn from(e: bincode::Error) -> Self {
        KvError::Serialization(e.to_string())
    }
}
