//! Key Codec
//!
//! Turns the externally supplied string identifier into the binary key the
//! store understands. Identifiers are validated by the router before they get
//! here, so a `Key` built from a request is never empty.

use std::borrow::Borrow;
use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Immutable binary key (UTF-8 bytes of the identifier)
///
/// Equality and ordering are byte-wise.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Key(Bytes);

impl Key {
    /// Derive the key for an identifier
    pub fn from_id(id: &str) -> Self {
        Self(Bytes::copy_from_slice(id.as_bytes()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Borrow<[u8]> for Key {
    fn borrow(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for Key {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(s) => write!(f, "Key({:?})", s),
            Err(_) => write!(f, "Key({:?})", self.0),
        }
    }
}
