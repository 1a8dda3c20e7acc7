//! Core type definitions for the liveedit engine.
//!
//! This crate defines the plain data types shared by the permission gate and
//! the sync engine:
//! - Record and field identifiers (`RecordKey`, `FieldKey`)
//! - Fetched records and field values
//! - Change notifications delivered by the backing store (`SyncEvent`)
//!
//! Nothing here performs I/O.

mod event;
mod ids;
mod record;

pub use event::{SubscriptionFilter, SyncEvent, SyncEventKind};
pub use ids::{FieldKey, RecordKey};
pub use record::{FieldValue, Record};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("record is not a JSON object")]
    NotAnObject,
}
