//! Platform interfaces for dashboard storage.
//!
//! The dashboard keeps two scopes of string key/value data: a persistent
//! per-profile store (account id, secret key, cached display names, the
//! account cookie) and a session store that is discarded when the tab or
//! process ends. Hosts provide both through [`KeyValueStore`].

mod error;
pub mod memory;

pub use error::{StorageError, StorageResult};
pub use memory::MemoryStore;

/// String key/value store provided by the host platform.
///
/// In a browser this maps onto `localStorage`, `sessionStorage` or
/// `document.cookie`; on native hosts any file or in-memory map will do.
pub trait KeyValueStore: Send + Sync {
    /// Reads the value stored under `key`, if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store cannot be read.
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails (e.g. quota exceeded).
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Removes `key`. Removing a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store cannot be written.
    fn remove(&self, key: &str) -> StorageResult<()>;
}
