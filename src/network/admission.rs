//! Admission wrapper
//!
//! Sits between the transport and the router: receives a raw request and
//! either enqueues it on the worker pool or rejects it. Rejection is a value,
//! converted to a 503 here; it never reaches the accepting thread as a fault.

use std::sync::Arc;

use tokio::sync::oneshot;

use crate::pool::{Rejected, WorkerPool};
use crate::protocol::{Request, Response};
use crate::router;
use crate::storage::Store;

/// Admission-controlled dispatcher
#[derive(Clone)]
pub struct Admission {
    pool: Arc<WorkerPool>,
    store: Arc<dyn Store>,
}

impl Admission {
    pub fn new(pool: Arc<WorkerPool>, store: Arc<dyn Store>) -> Self {
        Self { pool, store }
    }

    /// Enqueue a request, returning a receiver for its response
    pub fn submit(&self, request: Request) -> Result<oneshot::Receiver<Response>, Rejected> {
        let (tx, rx) = oneshot::channel();
        let store = Arc::clone(&self.store);

        self.pool.submit(move || {
            let response = router::handle(store.as_ref(), &request);
            // The client may have gone away; nothing left to do then
            let _ = tx.send(response);
        })?;

        Ok(rx)
    }

    /// Run a request through the pool; always yields a response
    pub async fn dispatch(&self, request: Request) -> Response {
        match self.submit(request) {
            Ok(rx) => match rx.await {
                Ok(response) => response,
                Err(_) => {
                    // The job dropped its sender without answering (it panicked)
                    tracing::error!("Request dropped by worker without a response");
                    Response::internal_error()
                }
            },
            Err(Rejected::Overloaded) => Response::overloaded(),
            Err(Rejected::ShutDown) => {
                tracing::debug!("Rejecting request: shutting down");
                Response::overloaded()
            }
        }
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }
}
