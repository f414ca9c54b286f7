//! Admission Controller: bounded worker pool
//!
//! A fixed set of worker threads fed by a bounded queue. Submission never
//! blocks: a job either goes to a free worker, waits in the queue, or is
//! rejected with [`Rejected::Overloaded`].
//!
//! ## Capacity
//! ```text
//!   submit ──try_send──► [ queue: capacity Q ] ──recv──► worker 1..P
//!                 │
//!                 └── full ──► Rejected::Overloaded
//! ```
//! At most `P` jobs run and `Q` wait at any time. With `Q = 0` the queue is a
//! rendezvous: a job is accepted only if a worker is idle.
//!
//! ## Shutdown
//! Dropping the sender closes the queue to new jobs. Workers keep receiving
//! until the queue is empty, then exit. Each worker holds a clone of a `done`
//! sender, so the `done` receiver disconnects exactly when the last worker has
//! exited; `shutdown` waits for that with a deadline.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TrySendError};
use parking_lot::{Mutex, RwLock};
use thiserror::Error;

use crate::error::{KvError, Result};

/// A unit of work executed on a worker thread
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Why a job was not admitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejected {
    #[error("worker pool overloaded: queue is full")]
    Overloaded,

    #[error("worker pool is shut down")]
    ShutDown,
}

/// Fixed-size worker pool with a bounded queue
pub struct WorkerPool {
    /// `None` once shutdown has begun
    sender: RwLock<Option<Sender<Job>>>,

    /// Kept for `queued()`; workers own their own clones
    receiver: Receiver<Job>,

    /// Disconnects once every worker has exited
    done: Receiver<()>,

    handles: Mutex<Vec<JoinHandle<()>>>,

    /// Jobs currently executing
    active: Arc<AtomicUsize>,

    size: usize,
    queue_capacity: usize,
}

impl WorkerPool {
    /// Spawn `size` workers behind a queue of `queue_capacity` slots
    pub fn new(size: usize, queue_capacity: usize) -> Result<Self> {
        if size == 0 {
            return Err(KvError::Config("pool_size must be at least 1".to_string()));
        }

        let (sender, receiver) = channel::bounded::<Job>(queue_capacity);
        let (done_tx, done_rx) = channel::bounded::<()>(0);
        let active = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::with_capacity(size);
        for id in 0..size {
            let jobs = receiver.clone();
            let done = done_tx.clone();
            let active = Arc::clone(&active);

            let spawned = thread::Builder::new()
                .name(format!("entitykv-worker-{}", id))
                .spawn(move || run_worker(id, jobs, active, done));

            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    // Closing the queue lets the workers spawned so far exit
                    drop(sender);
                    return Err(e.into());
                }
            }
        }
        drop(done_tx);

        tracing::debug!(size, queue_capacity, "Worker pool started");

        Ok(Self {
            sender: RwLock::new(Some(sender)),
            receiver,
            done: done_rx,
            handles: Mutex::new(handles),
            active,
            size,
            queue_capacity,
        })
    }

    /// Hand a job to the pool without blocking
    pub fn submit<F>(&self, job: F) -> std::result::Result<(), Rejected>
    where
        F: FnOnce() + Send + 'static,
    {
        let sender = self.sender.read();
        let Some(sender) = sender.as_ref() else {
            return Err(Rejected::ShutDown);
        };

        match sender.try_send(Box::new(job)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                tracing::debug!(
                    active = self.active(),
                    queued = self.queued(),
                    "Rejecting job: pool saturated"
                );
                Err(Rejected::Overloaded)
            }
            Err(TrySendError::Disconnected(_)) => Err(Rejected::ShutDown),
        }
    }

    /// Stop accepting jobs and wait up to `timeout` for queued and running
    /// jobs to finish
    ///
    /// On timeout every job still waiting in the queue is discarded, the jobs
    /// already running are left to finish in the background and
    /// [`KvError::ShutdownTimeout`] is returned.
    pub fn shutdown(&self, timeout: Duration) -> Result<()> {
        if self.sender.write().take().is_some() {
            tracing::debug!(
                active = self.active(),
                queued = self.queued(),
                "Worker pool draining"
            );
        }

        let deadline = Instant::now() + timeout;
        loop {
            match self.done.recv_deadline(deadline) {
                // Workers never send on `done`; they only drop it
                Ok(()) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {
                    // Queued jobs never start; their reply channels close unanswered
                    let abandoned = self.receiver.try_iter().count();
                    tracing::warn!(
                        active = self.active(),
                        abandoned,
                        "Worker pool drain timed out"
                    );
                    return Err(KvError::ShutdownTimeout(timeout));
                }
            }
        }

        for handle in self.handles.lock().drain(..) {
            if handle.join().is_err() {
                tracing::error!("Worker thread panicked outside a job");
            }
        }
        tracing::debug!("Worker pool stopped");
        Ok(())
    }

    /// Number of worker threads
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of queue slots
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// Jobs currently executing
    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Jobs waiting for a worker
    pub fn queued(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_shut_down(&self) -> bool {
        self.sender.read().is_none()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Workers drain what is left and exit; nobody waits for them here
        self.sender.get_mut().take();
    }
}

fn run_worker(id: usize, jobs: Receiver<Job>, active: Arc<AtomicUsize>, _done: Sender<()>) {
    // `recv` fails only once the queue is closed and empty
    while let Ok(job) = jobs.recv() {
        active.fetch_add(1, Ordering::AcqRel);
        let outcome = panic::catch_unwind(AssertUnwindSafe(job));
        active.fetch_sub(1, Ordering::AcqRel);

        if outcome.is_err() {
            tracing::error!(worker = id, "Job panicked; worker continues");
        }
    }
    tracing::trace!(worker = id, "Worker exiting");
}
