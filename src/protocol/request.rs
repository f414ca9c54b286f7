//! Request definitions
//!
//! A request as the router sees it, already stripped of HTTP framing.

use bytes::Bytes;

/// Request methods the router distinguishes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Put,
    Delete,
    /// Any other method; always unmatched
    Other,
}

/// A parsed request
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,

    /// URI path without the query string
    pub path: String,

    /// Value of the `id` query parameter, if present
    pub id: Option<String>,

    /// Request body (`None` when the transport saw no body)
    pub body: Option<Bytes>,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            id: None,
            body: None,
        }
    }

    /// `GET /v0/entity?id=<id>`
    pub fn get(id: impl Into<String>) -> Self {
        Self::new(Method::Get, crate::router::ENTITY_PATH).with_id(id)
    }

    /// `PUT /v0/entity?id=<id>` with a body
    pub fn put(id: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self::new(Method::Put, crate::router::ENTITY_PATH)
            .with_id(id)
            .with_body(body)
    }

    /// `DELETE /v0/entity?id=<id>`
    pub fn delete(id: impl Into<String>) -> Self {
        Self::new(Method::Delete, crate::router::ENTITY_PATH).with_id(id)
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// The identifier, unless missing or empty
    pub fn valid_id(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !id.is_empty())
    }
}
