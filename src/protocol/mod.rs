//! Protocol Module
//!
//! Transport-independent request and response types exchanged between the
//! HTTP layer, the admission controller and the router.
//!
//! ## Surface
//! ```text
//! GET    /v0/entity?id=K          → 200 value | 400 | 404
//! PUT    /v0/entity?id=K  body=V  → 201       | 400
//! DELETE /v0/entity?id=K          → 202       | 400
//! anything else                   → 400
//! saturated pool                  → 503
//! storage failure                 → 500
//! ```

mod request;
mod response;

pub use request::{Method, Request};
pub use response::{Response, Status};
