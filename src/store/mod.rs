//! Document store for Farm and Animal records.
//!
//! Records are kept as JSON documents in SQLite, one row per document,
//! partitioned by collection. The store owns the document lifecycle fields:
//! it assigns `_id` (UUIDv7), stamps `createdAt`/`updatedAt`, and enforces the
//! record schema on every insert and update, so a document that reaches disk
//! always decodes back into its record type.
//!
//! There are no cross-document constraints. An animal's `farmId` is not
//! checked and deleting a farm leaves its animals in place.

use crate::model::ValidationError;
use serde::{de::DeserializeOwned, Serialize};
use std::fmt;
use std::time::Duration;

mod document;

pub use document::DocumentStore;

/// Named partition of the document table
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Collection {
    Farms,
    Animals,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Farms => "farms",
            Collection::Animals => "animals",
        }
    }
}

/// A record type persisted as a document.
pub trait Record: Serialize + DeserializeOwned + Send + 'static {
    const COLLECTION: Collection;

    fn id(&self) -> &str;

    /// Semantic checks beyond what decoding enforces (non-empty text, positive numbers).
    fn validate(&self) -> Result<(), ValidationError>;
}

/// Document store errors
#[derive(Debug)]
pub enum StoreError {
    /// Document rejected by the record schema
    Invalid(ValidationError),
    Database(rusqlite::Error),
    /// Stored body no longer decodes into its record type
    Corrupt { id: String, reason: String },
    Timeout(Duration),
    Unavailable(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Invalid(e) => write!(f, "{}", e),
            StoreError::Database(e) => write!(f, "database error: {}", e),
            StoreError::Corrupt { id, reason } => {
                write!(f, "stored document '{}' is corrupt: {}", id, reason)
            }
            StoreError::Timeout(d) => {
                write!(f, "store operation timed out after {}ms", d.as_millis())
            }
            StoreError::Unavailable(msg) => write!(f, "store unavailable: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Invalid(e) => Some(e),
            StoreError::Database(e) => Some(e),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e)
    }
}

impl From<ValidationError> for StoreError {
    fn from(e: ValidationError) -> Self {
        StoreError::Invalid(e)
    }
}
