//! Error types for the edit engine.

use liveedit_types::RecordKey;
use thiserror::Error;

/// Result type for engine operations.
pub type EditResult<T> = Result<T, EditError>;

/// Result type for backing store calls.
pub type StoreResult<T> = Result<T, StoreError>;

/// Failures reported by the backing content store.
///
/// `Clone` so a single coalesced fetch can hand the same outcome to every
/// waiter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Transport-level failure.
    #[error("network error: {0}")]
    Network(String),

    /// The store answered and refused the request.
    #[error("rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The record does not exist.
    #[error("record not found: {0}")]
    NotFound(RecordKey),

    /// The store does not offer this capability (e.g. push subscriptions).
    #[error("operation not supported by the store")]
    Unsupported,

    /// An established push subscription dropped.
    #[error("subscription disconnected: {0}")]
    Disconnected(String),
}

/// Errors surfaced by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditError {
    /// Initial or refresh read failed.
    #[error("failed to load: {0}")]
    Fetch(StoreError),

    /// Initial read exceeded the load timeout.
    #[error("Loading timeout")]
    Timeout,

    /// Persisting a field failed.
    #[error("failed to save: {0}")]
    Save(StoreError),

    /// The push channel dropped. Retried by the reconciler, never stored on a field.
    #[error("connection error: {0}")]
    Connection(String),

    /// A command channel was closed.
    #[error("channel closed")]
    ChannelClosed,

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}
