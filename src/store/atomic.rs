//! Atomic file replacement for cache entries and reports.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// Global counter for unique temp file names within a process
static WRITE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Temp path for the next write to `path`: `{path}.tmp.{pid}.{counter}` with
/// the extension replaced, so it never matches an entry file name.
fn next_temp_path(path: &Path) -> PathBuf {
    let counter = WRITE_COUNTER.fetch_add(1, Ordering::Relaxed);
    let unique_id = format!("{}.{}", std::process::id(), counter);
    path.with_extension(format!("tmp.{}", unique_id))
}

/// Atomically replace the contents of `path` with `contents`.
///
/// Writes a temp file in the same directory, syncs it, then renames it over
/// `path`. The rename is atomic on POSIX, so readers see either the old
/// complete file or the new complete file.
pub fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    loop {
        // Retry if the temp path already exists (e.g., from a prior crash).
        let temp_path = next_temp_path(path);
        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        };

        let written = file.write_all(contents).and_then(|()| file.sync_all());
        drop(file);
        if let Err(e) = written {
            let _ = std::fs::remove_file(&temp_path);
            return Err(e);
        }

        if let Err(e) = std::fs::rename(&temp_path, path) {
            let _ = std::fs::remove_file(&temp_path);
            return Err(e);
        }

        return Ok(());
    }
}
