//! Error types for capability table loading.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for auth operations.
pub type AuthResult<T> = Result<T, AuthError>;

/// Errors that can occur while loading a capability table.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The policy document is not valid TOML or has the wrong shape.
    #[error("invalid capability table: {0}")]
    Parse(#[from] toml::de::Error),

    /// The policy file could not be read.
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
