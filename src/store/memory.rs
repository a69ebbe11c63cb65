//! In-memory [`Store`] for tests.

use std::collections::HashMap;
use std::sync::Mutex;

use super::{Store, StoreError, validate_category};

#[derive(Debug, Default)]
pub(crate) struct MemoryStore {
    entries: Mutex<HashMap<(String, String), Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries in `category`.
    pub fn len(&self, category: &str) -> usize {
        self.entries
            .lock()
            .unwrap()
            .keys()
            .filter(|(c, _)| c == category)
            .count()
    }
}

impl Store for MemoryStore {
    fn read(&self, category: &str, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        validate_category(category)?;
        let entries = self.entries.lock().unwrap();
        Ok(entries
            .get(&(category.to_string(), key.to_string()))
            .cloned())
    }

    fn write(&self, category: &str, key: &str, value: &[u8]) -> Result<(), StoreError> {
        validate_category(category)?;
        let mut entries = self.entries.lock().unwrap();
        entries.insert((category.to_string(), key.to_string()), value.to_vec());
        Ok(())
    }

    fn delete(&self, category: &str, key: &str) -> Result<(), StoreError> {
        validate_category(category)?;
        let mut entries = self.entries.lock().unwrap();
        entries.remove(&(category.to_string(), key.to_string()));
        Ok(())
    }

    fn exists(&self, category: &str, key: &str) -> Result<bool, StoreError> {
        validate_category(category)?;
        let entries = self.entries.lock().unwrap();
        Ok(entries.contains_key(&(category.to_string(), key.to_string())))
    }
}
