//! # entitykv
//!
//! A single-node HTTP key-value service with:
//! - Admission-controlled dispatch: a fixed worker pool behind a bounded queue,
//!   answering 503 instead of queueing without limit
//! - Tombstone-based deletes written through the ordinary upsert path
//! - Ordered start-up and shutdown of listener, pool and store
//! - An embedded WAL + memtable + SSTable store
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                HTTP listener (axum / tokio)                  │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │  Request
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │          Admission ── queue full ──► 503                     │
//! │      (WorkerPool: P threads, queue of Q)                     │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │  on a worker
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │     Router: validate id → Key → get / upsert(value|tombstone)│
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │     WAL     │          │  MemTable   │ ──flush──► SSTables
//!   └─────────────┘          └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod key;

pub mod network;
pub mod pool;
pub mod protocol;
pub mod router;
pub mod service;
pub mod storage;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use config::Config;
pub use error::{KvError, Result};
pub use key::Key;
pub use pool::{Rejected, WorkerPool};
pub use service::{Service, State};
pub use storage::{DiskStore, Entry, Store, ValueState};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of entitykv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
