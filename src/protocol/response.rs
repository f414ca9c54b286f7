//! Response definitions
//!
//! Represents responses to clients.

use bytes::Bytes;

/// Response status classes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Missing/empty identifier or unmatched route
    BadRequest,
    /// Absent or tombstoned key
    NotFound,
    Ok,
    Created,
    Accepted,
    /// Admission queue full or pool shutting down
    ServiceUnavailable,
    /// Storage failure
    InternalError,
}

impl Status {
    /// HTTP status code
    pub fn code(self) -> u16 {
        match self {
            Status::Ok => 200,
            Status::Created => 201,
            Status::Accepted => 202,
            Status::BadRequest => 400,
            Status::NotFound => 404,
            Status::InternalError => 500,
            Status::ServiceUnavailable => 503,
        }
    }
}

/// A response to send to the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: Status,

    /// Stored value for a successful read, empty otherwise
    pub body: Bytes,
}

impl Response {
    fn empty(status: Status) -> Self {
        Self {
            status,
            body: Bytes::new(),
        }
    }

    /// 200 with the value as body
    pub fn ok(body: Bytes) -> Self {
        Self {
            status: Status::Ok,
            body,
        }
    }

    pub fn created() -> Self {
        Self::empty(Status::Created)
    }

    pub fn accepted() -> Self {
        Self::empty(Status::Accepted)
    }

    pub fn bad_request() -> Self {
        Self::empty(Status::BadRequest)
    }

    pub fn not_found() -> Self {
        Self::empty(Status::NotFound)
    }

    pub fn overloaded() -> Self {
        Self::empty(Status::ServiceUnavailable)
    }

    pub fn internal_error() -> Self {
        Self::empty(Status::InternalError)
    }
}
