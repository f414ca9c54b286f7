//! Network Module
//!
//! HTTP front end and the admission wrapper between it and the workers.
//!
//! ## Architecture
//! - Tokio acceptor threads parse HTTP (axum/hyper)
//! - [`Admission`] either enqueues a request on the worker pool or answers
//!   503 on the spot
//! - Pool workers run the router synchronously and hand the response back
//!   over a oneshot channel

mod admission;
mod http;

pub use admission::Admission;
pub use http::{app, into_request};
