//! Cache directory path management
//!
//! This module provides the `CachePaths` struct which manages all filesystem paths
//! for the cache directory layout:
//!
//! ```text
//! ~/.cache/l10n-tracker/
//! ├── <category>/
//! │   └── <sha256(key)>.json      # One cache entry
//! ├── reports/
//! │   └── <language>.json         # Latest detector run per language
//! └── locks/
//!     └── <name>.lock             # flock-based locking
//! ```

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use super::StoreError;

/// Hex SHA-256 of a logical cache key.
///
/// Keys are repository paths, commit ids or the empty string; hashing keeps
/// them safe as file names.
pub fn hash_key(key: &str) -> String {
    format!("{:x}", Sha256::digest(key.as_bytes()))
}

/// Validate that a category is usable as a single directory name.
///
/// Rejects:
/// - Empty strings
/// - Strings containing `..` (path traversal)
/// - Strings containing `/` or `\` (path separators)
/// - Strings starting with `-` or `.`
/// - Strings containing null bytes or control characters
pub fn validate_category(category: &str) -> Result<(), StoreError> {
    let reason = if category.is_empty() {
        Some("cannot be empty")
    } else if category.contains("..") {
        Some("cannot contain '..'")
    } else if category.contains('/') || category.contains('\\') {
        Some("cannot contain path separators")
    } else if category.starts_with('-') || category.starts_with('.') {
        Some("cannot start with '-' or '.'")
    } else if category.bytes().any(|b| b == 0 || b < 0x20) {
        Some("cannot contain null or control characters")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(StoreError::InvalidCategory {
            category: category.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

/// Manages all filesystem paths for the cache directory layout
#[derive(Debug, Clone)]
pub struct CachePaths {
    root: PathBuf,
}

impl CachePaths {
    /// Creates a new CachePaths with the specified root directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the root cache directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the partition for a category: `{root}/{category}`
    pub fn category_dir(&self, category: &str) -> PathBuf {
        self.root.join(category)
    }

    /// Returns the file for one entry: `{root}/{category}/{sha256(key)}.json`
    pub fn entry_path(&self, category: &str, key: &str) -> PathBuf {
        self.category_dir(category)
            .join(format!("{}.json", hash_key(key)))
    }

    /// Returns the reports directory path: `{root}/reports`
    pub fn reports_dir(&self) -> PathBuf {
        self.root.join("reports")
    }

    /// Returns the locks directory path: `{root}/locks`
    pub fn locks_dir(&self) -> PathBuf {
        self.root.join("locks")
    }

    /// Returns the lock file path: `{root}/locks/{name}.lock`
    pub fn lock_path(&self, name: &str) -> PathBuf {
        self.locks_dir().join(format!("{}.lock", name))
    }
}

impl Default for CachePaths {
    /// Creates a CachePaths using the system cache directory + "l10n-tracker"
    ///
    /// Uses `dirs::cache_dir()` which resolves to:
    /// - Linux: `~/.cache`
    /// - macOS: `~/Library/Caches`
    /// - Windows: `C:\Users\<user>\AppData\Local`
    fn default() -> Self {
        let cache_dir = dirs::cache_dir().unwrap_or_else(|| PathBuf::from(".cache"));
        Self::new(cache_dir.join("l10n-tracker"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_root_path() -> PathBuf {
        PathBuf::from("cache-root")
    }

    fn test_paths() -> CachePaths {
        CachePaths::new(test_root_path())
    }

    #[test]
    fn test_default() {
        let paths = CachePaths::default();
        assert!(paths.root().ends_with("l10n-tracker"));
    }

    #[test]
    fn test_hash_key_is_fixed_length_hex() {
        for key in ["", "content/ja/docs/index.md", "3f2c9a1b"] {
            let hash = hash_key(key);
            assert_eq!(hash.len(), 64);
            assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
        }
    }

    #[test]
    fn test_hash_key_empty_string() {
        assert_eq!(
            hash_key(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_hash_key_distinguishes_keys() {
        assert_ne!(hash_key("a/b.md"), hash_key("a_b.md"));
    }

    #[test]
    fn test_entry_path() {
        let paths = test_paths();
        assert_eq!(
            paths.entry_path("fork_commit", ""),
            test_root_path()
                .join("fork_commit")
                .join("e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855.json")
        );
    }

    #[test]
    fn test_entry_path_with_separators_stays_in_category() {
        let paths = test_paths();
        let path = paths.entry_path("file_last_commit", "../../etc/passwd");
        assert_eq!(path.parent().unwrap(), test_root_path().join("file_last_commit"));
    }

    #[test]
    fn test_lock_path() {
        let paths = test_paths();
        assert_eq!(
            paths.lock_path("refresh"),
            test_root_path().join("locks").join("refresh.lock")
        );
    }

    #[test]
    fn test_reports_dir() {
        assert_eq!(test_paths().reports_dir(), test_root_path().join("reports"));
    }

    #[test]
    fn validate_category_accepts_table_names() {
        assert!(validate_category("file_last_commit").is_ok());
        assert!(validate_category("main-branch-commits").is_ok());
    }

    #[test]
    fn validate_category_rejects_unsafe_names() {
        for bad in ["", "..", "a/b", "a\\b", "-x", ".hidden", "a\nb"] {
            assert!(
                matches!(validate_category(bad), Err(StoreError::InvalidCategory { .. })),
                "{:?} should be rejected",
                bad
            );
        }
    }
}
