//! Error types for dashboard storage.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised by the host key/value stores.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The store could not be read.
    #[error("storage read error: {0}")]
    Read(String),

    /// The store could not be written.
    #[error("storage write error: {0}")]
    Write(String),

    /// Serialization/deserialization failures of the backing medium.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A lock guarding the store was poisoned.
    #[error("storage lock poisoned")]
    Poisoned,
}
