//! Repository backend: version-control queries against a working copy.
//!
//! The [`RepositoryBackend`] trait is the only way the resolver talks to
//! version control. [`GitBackend`] is the production implementation; tests
//! use the scripted double in `fake`.

mod format;
pub mod git;

#[cfg(test)]
pub(crate) mod fake;

use std::path::Path;

use thiserror::Error;

use crate::cancel::Cancel;
use crate::types::{CommitId, CommitRecord};

pub use format::{COMMIT_FORMAT, parse_commit_line, parse_commit_lines};
pub use git::GitBackend;

/// Errors returned by repository backend operations.
#[derive(Error, Debug)]
pub enum BackendError {
    /// A git subprocess exited unsuccessfully.
    #[error("{operation} failed (git {args}): {stderr}")]
    CommandFailed {
        operation: &'static str,
        args: String,
        stderr: String,
    },
    /// Output did not match the `<id> <timestamp> <subject>` contract.
    #[error("{operation}: malformed output line {line:?}")]
    Parse {
        operation: &'static str,
        line: String,
    },
    /// libgit2 reported an error while opening the working copy.
    #[error("git operation failed: {0}")]
    Git(#[from] git2::Error),
    /// Repository path does not contain a git repo.
    #[error("repository not found at {0}")]
    NotFound(String),
    /// Underlying IO error.
    #[error("{operation}: IO error: {source}")]
    Io {
        operation: &'static str,
        source: std::io::Error,
    },
    /// Invalid inputs were provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// The caller's cancellation token was set.
    #[error("{0} cancelled")]
    Cancelled(&'static str),
}

impl BackendError {
    pub(crate) fn io(operation: &'static str, source: std::io::Error) -> Self {
        Self::Io { operation, source }
    }
}

/// Version-control queries used by the commit graph resolver.
///
/// Paths are relative to the working copy root. Every method checks `cancel`
/// before doing any work. Only [`fetch`](Self::fetch) and
/// [`pull`](Self::pull) change the working copy.
pub trait RepositoryBackend {
    fn file_exists(&self, cancel: &Cancel, path: &Path) -> Result<bool, BackendError>;

    /// All files under `dir`, relative to `dir`, sorted. Skips `.git`.
    fn list_files(&self, cancel: &Cancel, dir: &Path) -> Result<Vec<String>, BackendError>;

    /// Most recent commit touching `path`, or `None` if it was never committed.
    fn find_file_last_commit(
        &self,
        cancel: &Cancel,
        path: &Path,
    ) -> Result<Option<CommitRecord>, BackendError>;

    /// Commits touching `path` strictly after `after`, oldest first.
    fn find_file_commits_after(
        &self,
        cancel: &Cancel,
        path: &Path,
        after: &CommitId,
    ) -> Result<Vec<CommitRecord>, BackendError>;

    /// First-parent history of the main branch, newest first.
    fn list_main_branch_commits(&self, cancel: &Cancel) -> Result<Vec<CommitRecord>, BackendError>;

    /// First-parent ancestry of `commit`, newest first, `commit` included.
    fn list_ancestor_commits(
        &self,
        cancel: &Cancel,
        commit: &CommitId,
    ) -> Result<Vec<CommitRecord>, BackendError>;

    /// Merge commits between `commit` and the main branch head on the
    /// ancestry path, oldest first.
    fn list_merge_points(
        &self,
        cancel: &Cancel,
        commit: &CommitId,
    ) -> Result<Vec<CommitRecord>, BackendError>;

    /// Files changed directly by `commit`. Empty for merges without
    /// conflict resolutions.
    fn list_files_in_commit(
        &self,
        cancel: &Cancel,
        commit: &CommitId,
    ) -> Result<Vec<String>, BackendError>;

    fn list_commit_parents(
        &self,
        cancel: &Cancel,
        commit: &CommitId,
    ) -> Result<Vec<CommitId>, BackendError>;

    /// Files that differ between two commits.
    fn list_files_between_commits(
        &self,
        cancel: &Cancel,
        from: &CommitId,
        to: &CommitId,
    ) -> Result<Vec<String>, BackendError>;

    /// Download upstream objects without touching the local branch.
    fn fetch(&self, cancel: &Cancel) -> Result<(), BackendError>;

    /// Fast-forward the local main branch to the fetched upstream head.
    fn pull(&self, cancel: &Cancel) -> Result<(), BackendError>;

    /// First-parent commits on the fetched upstream that the local main
    /// branch does not have yet, newest first.
    fn list_fresh_commits(&self, cancel: &Cancel) -> Result<Vec<CommitRecord>, BackendError>;

    /// Commit the local main branch points at, `None` before the first commit.
    fn resolve_main_head(&self, cancel: &Cancel) -> Result<Option<CommitId>, BackendError>;
}
