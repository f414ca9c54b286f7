//! Lifecycle Manager
//!
//! Owns the store, the worker pool and the HTTP listener, and starts and
//! stops them in strict order:
//!
//! ```text
//! start: open store → start pool → bind listener
//! stop:  stop listener → drain pool (bounded) → close store
//! ```
//!
//! States move `Stopped → Starting → Running → Stopping → Stopped`. The store
//! is closed only after the pool has drained or the drain has timed out, so
//! no worker touches a closed store on the normal path.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::runtime::Runtime;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::error::{KvError, Result};
use crate::network::{self, Admission};
use crate::pool::WorkerPool;
use crate::storage::{DiskStore, Store};

/// Opens the store at start-up
pub type StoreOpener = Box<dyn Fn(&Config) -> Result<Arc<dyn Store>> + Send + Sync>;

/// Threads accepting connections and parsing HTTP
const ACCEPTOR_THREADS: usize = 2;

/// Time left for writing out responses once the drain used up the deadline
const RESPONSE_GRACE: Duration = Duration::from_millis(100);

/// Lifecycle state of a [`Service`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            State::Stopped => "stopped",
            State::Starting => "starting",
            State::Running => "running",
            State::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

/// Resources held while running
struct Running {
    store: Arc<dyn Store>,
    pool: Arc<WorkerPool>,
    runtime: Runtime,
    shutdown: oneshot::Sender<()>,
    server: JoinHandle<std::io::Result<()>>,
    local_addr: SocketAddr,
}

/// The HTTP key-value service
pub struct Service {
    config: Config,
    opener: StoreOpener,
    state: State,
    running: Option<Running>,
}

impl Service {
    /// Service backed by a [`DiskStore`] in `config.data_dir`
    pub fn new(config: Config) -> Self {
        Self::with_store_opener(
            config,
            Box::new(|config: &Config| {
                let store: Arc<dyn Store> = Arc::new(DiskStore::open(config.store_config())?);
                Ok(store)
            }),
        )
    }

    /// Service backed by whatever store `opener` returns
    pub fn with_store_opener(config: Config, opener: StoreOpener) -> Self {
        Self {
            config,
            opener,
            state: State::Stopped,
            running: None,
        }
    }

    /// Open the store, start the pool and bind the listener
    ///
    /// Returns the bound address. On failure everything acquired so far is
    /// released again and the service stays `Stopped`.
    pub fn start(&mut self) -> Result<SocketAddr> {
        if self.state != State::Stopped {
            return Err(KvError::Lifecycle(format!(
                "cannot start a {} service",
                self.state
            )));
        }
        self.config.validate()?;

        self.state = State::Starting;
        match self.acquire() {
            Ok(running) => {
                let addr = running.local_addr;
                self.running = Some(running);
                self.state = State::Running;
                tracing::info!(
                    %addr,
                    workers = self.config.pool_size,
                    queue = self.config.queue_capacity,
                    "Service started"
                );
                Ok(addr)
            }
            Err(e) => {
                self.state = State::Stopped;
                tracing::error!(error = %e, "Service failed to start");
                Err(e)
            }
        }
    }

    fn acquire(&self) -> Result<Running> {
        let store = (self.opener)(&self.config)?;

        let pool = match WorkerPool::new(self.config.pool_size, self.config.queue_capacity) {
            Ok(pool) => Arc::new(pool),
            Err(e) => {
                close_store(store.as_ref());
                return Err(e);
            }
        };

        let bound = build_runtime().and_then(|runtime| -> Result<_> {
            let addr = self.config.listen_addr();
            let listener = runtime.block_on(tokio::net::TcpListener::bind(addr))?;
            let local_addr = listener.local_addr()?;
            Ok((runtime, listener, local_addr))
        });
        let (runtime, listener, local_addr) = match bound {
            Ok(bound) => bound,
            Err(e) => {
                drain_pool(&pool, self.config.shutdown_timeout);
                close_store(store.as_ref());
                return Err(e);
            }
        };

        let app = network::app(Admission::new(Arc::clone(&pool), Arc::clone(&store)));
        let (shutdown, signal) = oneshot::channel::<()>();
        let server = runtime.spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = signal.await;
                })
                .await
        });

        Ok(Running {
            store,
            pool,
            runtime,
            shutdown,
            server,
            local_addr,
        })
    }

    /// Stop the listener, drain the pool, close the store
    ///
    /// The store is closed even if the drain timed out; the first error is
    /// returned afterwards.
    pub fn stop(&mut self) -> Result<()> {
        if self.state != State::Running {
            return Err(KvError::Lifecycle(format!(
                "cannot stop a {} service",
                self.state
            )));
        }
        let Some(running) = self.running.take() else {
            self.state = State::Stopped;
            return Err(KvError::Lifecycle("running service without resources".to_string()));
        };
        self.state = State::Stopping;
        let timeout = self.config.shutdown_timeout;
        let deadline = Instant::now() + timeout;
        tracing::info!(addr = %running.local_addr, "Service stopping");

        // 1. No new connections
        let _ = running.shutdown.send(());

        // 2. Finish everything already admitted
        let drained = running.pool.shutdown(timeout);
        if let Err(e) = &drained {
            tracing::error!(error = %e, "Worker pool did not drain; closing store anyway");
        }

        // Let open connections write out the responses produced above,
        // within what is left of the same deadline
        let remaining = deadline
            .saturating_duration_since(Instant::now())
            .max(RESPONSE_GRACE);
        let server = running.server;
        let served = running
            .runtime
            .block_on(async move { tokio::time::timeout(remaining, server).await });
        match served {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => tracing::warn!(error = %e, "HTTP server exited with error"),
            Ok(Err(e)) => tracing::warn!(error = %e, "HTTP server task failed"),
            Err(_) => tracing::warn!("Connections still open after {:?}", timeout),
        }
        running.runtime.shutdown_background();

        // 3. Storage last
        let closed = running.store.close();
        if let Err(e) = &closed {
            tracing::error!(error = %e, "Failed to close store");
        }

        self.state = State::Stopped;
        tracing::info!("Service stopped");
        drained.and(closed)
    }

    /// Block until Ctrl-C is received
    pub fn wait_for_ctrl_c(&self) -> Result<()> {
        let running = self
            .running
            .as_ref()
            .ok_or_else(|| KvError::Lifecycle("service is not running".to_string()))?;
        running.runtime.block_on(tokio::signal::ctrl_c())?;
        Ok(())
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Address the listener is bound to while running
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|r| r.local_addr)
    }
}

impl Drop for Service {
    fn drop(&mut self) {
        if self.state == State::Running {
            if let Err(e) = self.stop() {
                tracing::error!(error = %e, "Error stopping service on drop");
            }
        }
    }
}

fn build_runtime() -> Result<Runtime> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(ACCEPTOR_THREADS)
        .thread_name("entitykv-acceptor")
        .enable_all()
        .build()?;
    Ok(runtime)
}

fn drain_pool(pool: &WorkerPool, timeout: Duration) {
    if let Err(e) = pool.shutdown(timeout) {
        tracing::error!(error = %e, "Worker pool did not drain during start-up unwind");
    }
}

fn close_store(store: &dyn Store) {
    if let Err(e) = store.close() {
        tracing::error!(error = %e, "Failed to close store during start-up unwind");
    }
}
