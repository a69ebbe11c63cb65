//! Durable keyed cache and the storage it sits on.
//!
//! A [`Store`] persists opaque bytes under `(category, key)`.
//! [`KeyedCache`] adds JSON serialization, read-through `get` and the
//! invalidation operations the resolver needs.

mod atomic;
mod file;
mod keyed;
#[cfg(test)]
pub(crate) mod memory;
mod paths;

use std::path::PathBuf;

use thiserror::Error;

pub use atomic::write_atomic;
pub use file::FileStore;
pub use keyed::KeyedCache;
pub use paths::{CachePaths, hash_key, validate_category};

/// Errors returned by cache storage.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to read cache entry {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write cache entry {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to delete cache entry {path}: {source}")]
    Delete {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to serialize {category}/{key:?}: {source}")]
    Serialize {
        category: String,
        key: String,
        source: serde_json::Error,
    },
    #[error("failed to deserialize {category}/{key:?}: {source}")]
    Deserialize {
        category: String,
        key: String,
        source: serde_json::Error,
    },
    #[error("invalid cache category {category:?}: {reason}")]
    InvalidCategory {
        category: String,
        reason: &'static str,
    },
    /// The caller's cancellation token was set before the entry was touched.
    #[error("cache {0} cancelled")]
    Cancelled(&'static str),
}

/// Pluggable key/value storage under `(category, key)`.
///
/// Implementations must make `write` atomic: a concurrent `read` returns the
/// previous value or the new one, never a mix.
pub trait Store {
    /// Returns `None` when no entry exists.
    fn read(&self, category: &str, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    fn write(&self, category: &str, key: &str, value: &[u8]) -> Result<(), StoreError>;

    /// Succeeds when the entry is already absent.
    fn delete(&self, category: &str, key: &str) -> Result<(), StoreError>;

    fn exists(&self, category: &str, key: &str) -> Result<bool, StoreError>;
}
