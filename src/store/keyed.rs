use serde::Serialize;
use serde::de::DeserializeOwned;

use super::{Store, StoreError};
use crate::cancel::Cancel;

/// Read-through JSON cache over a [`Store`].
///
/// Entries never expire on their own; they disappear only through
/// [`invalidate_key`](Self::invalidate_key) or are overwritten by
/// [`put`](Self::put).
#[derive(Debug, Clone)]
pub struct KeyedCache<S> {
    store: S,
}

impl<S: Store> KeyedCache<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Return the cached value, or compute, persist and return it.
    ///
    /// The computed value is persisted even when it is empty or `None`.
    /// Nothing is persisted when `compute` fails.
    pub fn get<T, E, F>(&self, cancel: &Cancel, category: &str, key: &str, compute: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        E: From<StoreError>,
        F: FnOnce() -> Result<T, E>,
    {
        self.get_unless(cancel, category, key, |_| false, compute)
    }

    /// Like [`get`](Self::get), but a cached value for which `is_invalid`
    /// returns true is treated as a miss.
    pub fn get_unless<T, E, I, F>(
        &self,
        cancel: &Cancel,
        category: &str,
        key: &str,
        is_invalid: I,
        compute: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        E: From<StoreError>,
        I: FnOnce(&T) -> bool,
        F: FnOnce() -> Result<T, E>,
    {
        if let Some(value) = self.load::<T>(cancel, category, key)? {
            if !is_invalid(&value) {
                log::trace!("cache hit {}/{:?}", category, key);
                return Ok(value);
            }
            log::debug!("cache entry {}/{:?} is invalid, recomputing", category, key);
        } else {
            log::debug!("cache miss {}/{:?}", category, key);
        }

        let value = compute()?;
        self.put(cancel, category, key, &value)?;
        Ok(value)
    }

    /// Read and deserialize an entry without computing anything.
    pub fn load<T: DeserializeOwned>(
        &self,
        cancel: &Cancel,
        category: &str,
        key: &str,
    ) -> Result<Option<T>, StoreError> {
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled("read"));
        }
        let Some(bytes) = self.store.read(category, key)? else {
            return Ok(None);
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| StoreError::Deserialize {
                category: category.to_string(),
                key: key.to_string(),
                source,
            })
    }

    /// Unconditionally overwrite an entry.
    pub fn put<T: Serialize>(
        &self,
        cancel: &Cancel,
        category: &str,
        key: &str,
        value: &T,
    ) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(value).map_err(|source| StoreError::Serialize {
            category: category.to_string(),
            key: key.to_string(),
            source,
        })?;
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled("write"));
        }
        self.store.write(category, key, &bytes)
    }

    /// Remove an entry. Succeeds when it is already absent.
    pub fn invalidate_key(&self, category: &str, key: &str) -> Result<(), StoreError> {
        log::debug!("invalidating {}/{:?}", category, key);
        self.store.delete(category, key)
    }

    pub fn key_exists(&self, category: &str, key: &str) -> Result<bool, StoreError> {
        self.store.exists(category, key)
    }
}
