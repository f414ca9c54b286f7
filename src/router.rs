//! Request Router & Handlers
//!
//! Maps `(method, path)` to read, write or delete, validates the identifier
//! and turns store results into responses. Runs on a pool worker thread.
//!
//! Every failure of a single request ends here as a response; nothing
//! propagates to the worker or to other requests.

use crate::key::Key;
use crate::protocol::{Method, Request, Response};
use crate::storage::{Entry, Store, ValueState};

/// The only routed path
pub const ENTITY_PATH: &str = "/v0/entity";

/// Operation selected for a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Read,
    Write,
    Delete,
    Unmatched,
}

impl Route {
    pub fn of(request: &Request) -> Self {
        if request.path != ENTITY_PATH {
            return Route::Unmatched;
        }
        match request.method {
            Method::Get => Route::Read,
            Method::Put => Route::Write,
            Method::Delete => Route::Delete,
            Method::Other => Route::Unmatched,
        }
    }
}

/// Execute a request against the store
pub fn handle(store: &dyn Store, request: &Request) -> Response {
    match Route::of(request) {
        Route::Read => handle_get(store, request),
        Route::Write => handle_put(store, request),
        Route::Delete => handle_delete(store, request),
        Route::Unmatched => {
            tracing::debug!(method = ?request.method, path = %request.path, "Unmatched route");
            Response::bad_request()
        }
    }
}

fn handle_get(store: &dyn Store, request: &Request) -> Response {
    let Some(id) = request.valid_id() else {
        return Response::bad_request();
    };

    match store.get(&Key::from_id(id)) {
        Ok(Some(Entry {
            value: ValueState::Present(value),
            ..
        })) => Response::ok(value),
        Ok(Some(Entry {
            value: ValueState::Tombstone,
            ..
        }))
        | Ok(None) => Response::not_found(),
        Err(e) => {
            tracing::error!(id, error = %e, "Read failed");
            Response::internal_error()
        }
    }
}

fn handle_put(store: &dyn Store, request: &Request) -> Response {
    let Some(id) = request.valid_id() else {
        return Response::bad_request();
    };
    let Some(body) = request.body.clone() else {
        return Response::bad_request();
    };

    match store.upsert(Entry::present(Key::from_id(id), body)) {
        Ok(()) => Response::created(),
        Err(e) => {
            tracing::error!(id, error = %e, "Write failed");
            Response::internal_error()
        }
    }
}

fn handle_delete(store: &dyn Store, request: &Request) -> Response {
    let Some(id) = request.valid_id() else {
        return Response::bad_request();
    };

    match store.upsert(Entry::tombstone(Key::from_id(id))) {
        Ok(()) => Response::accepted(),
        Err(e) => {
            tracing::error!(id, error = %e, "Delete failed");
            Response::internal_error()
        }
    }
}
