use std::io;

use super::{CachePaths, Store, StoreError, validate_category, write_atomic};

/// Production [`Store`]: one JSON file per entry under [`CachePaths`].
#[derive(Debug, Clone)]
pub struct FileStore {
    paths: CachePaths,
}

impl FileStore {
    pub fn new(paths: CachePaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &CachePaths {
        &self.paths
    }
}

impl Store for FileStore {
    fn read(&self, category: &str, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        validate_category(category)?;
        let path = self.paths.entry_path(category, key);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Read { path, source }),
        }
    }

    fn write(&self, category: &str, key: &str, value: &[u8]) -> Result<(), StoreError> {
        validate_category(category)?;
        let path = self.paths.entry_path(category, key);
        write_atomic(&path, value).map_err(|source| StoreError::Write { path, source })
    }

    fn delete(&self, category: &str, key: &str) -> Result<(), StoreError> {
        validate_category(category)?;
        let path = self.paths.entry_path(category, key);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Delete { path, source }),
        }
    }

    fn exists(&self, category: &str, key: &str) -> Result<bool, StoreError> {
        validate_category(category)?;
        let path = self.paths.entry_path(category, key);
        path.try_exists()
            .map_err(|source| StoreError::Read { path, source })
    }
}
