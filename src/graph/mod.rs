//! Commit graph resolver.
//!
//! Answers branch-membership questions about commits (fork point, merge
//! point, files a merge brought in) using a [`RepositoryBackend`] and
//! memoizing every answer in a [`KeyedCache`]. The resolver itself holds no
//! state between calls.

mod refresh;

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use thiserror::Error;

use crate::backend::{BackendError, RepositoryBackend};
use crate::cancel::Cancel;
use crate::config::repo_relative;
use crate::store::{KeyedCache, Store, StoreError};
use crate::types::{CommitId, CommitRecord};

pub use refresh::{REFRESH_STATE, RefreshOutcome, RefreshState};

pub const FILE_LAST_COMMIT: &str = "file_last_commit";
pub const FILE_COMMITS_AFTER: &str = "file_commits_after";
pub const MAIN_BRANCH_COMMITS: &str = "main_branch_commits";
pub const FORK_COMMIT: &str = "fork_commit";
pub const MERGE_COMMIT: &str = "merge_commit";

const MAIN_BRANCH_KEY: &str = "";

/// Errors returned by the resolver.
#[derive(Error, Debug)]
pub enum GraphError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The history does not have the shape the resolver relies on.
    #[error("commit graph consistency violation: {0}")]
    Consistency(String),
    #[error("merge commit {commit} has {parents} parents; octopus merges are not supported")]
    OctopusMerge { commit: CommitId, parents: usize },
}

impl GraphError {
    /// True for defects in the repository history or in the resolver's
    /// assumptions about it. Retrying will not help.
    pub fn is_consistency_violation(&self) -> bool {
        matches!(self, Self::Consistency(_) | Self::OctopusMerge { .. })
    }
}

/// First-parent history of the main branch with O(1) membership checks.
#[derive(Debug, Clone, Default)]
pub struct MainBranch {
    commits: Vec<CommitRecord>,
    ids: HashSet<CommitId>,
}

impl MainBranch {
    pub fn new(commits: Vec<CommitRecord>) -> Self {
        let ids = commits.iter().map(|c| c.id.clone()).collect();
        Self { commits, ids }
    }

    /// Newest first.
    pub fn commits(&self) -> &[CommitRecord] {
        &self.commits
    }

    pub fn head(&self) -> Option<&CommitRecord> {
        self.commits.first()
    }

    pub fn len(&self) -> usize {
        self.commits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commits.is_empty()
    }

    pub fn contains(&self, commit: &CommitId) -> bool {
        self.ids.contains(commit)
    }

    /// The main branch as it will look once `fresh` (newest first) has
    /// been pulled on top of it.
    pub fn extended_with(&self, fresh: &[CommitRecord]) -> Self {
        let commits = fresh
            .iter()
            .chain(self.commits.iter())
            .cloned()
            .collect();
        Self::new(commits)
    }
}

/// Reads and invalidations must agree on this key for a path.
fn path_key(path: &Path) -> String {
    repo_relative(path)
}

/// Cached view of the repository's commit graph.
pub struct CommitGraph<B, S> {
    backend: B,
    cache: KeyedCache<S>,
}

impl<B: RepositoryBackend, S: Store> CommitGraph<B, S> {
    pub fn new(backend: B, store: S) -> Self {
        Self {
            backend,
            cache: KeyedCache::new(store),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn cache(&self) -> &KeyedCache<S> {
        &self.cache
    }

    /// Most recent commit touching `path`, cached until a fresh commit
    /// touches it.
    pub fn find_file_last_commit(
        &self,
        cancel: &Cancel,
        path: &Path,
    ) -> Result<Option<CommitRecord>, GraphError> {
        self.cache
            .get(cancel, FILE_LAST_COMMIT, &path_key(path), || {
                Ok::<_, GraphError>(self.backend.find_file_last_commit(cancel, path)?)
            })
    }

    /// Commits touching `path` after `after`, oldest first.
    ///
    /// All start points queried for one path share a single entry, so
    /// invalidating the path drops every one of them.
    pub fn find_file_commits_after(
        &self,
        cancel: &Cancel,
        path: &Path,
        after: &CommitId,
    ) -> Result<Vec<CommitRecord>, GraphError> {
        let key = path_key(path);
        let mut by_start: BTreeMap<CommitId, Vec<CommitRecord>> = self
            .cache
            .load(cancel, FILE_COMMITS_AFTER, &key)?
            .unwrap_or_default();
        if let Some(commits) = by_start.get(after) {
            log::trace!("cache hit {}/{:?} after {}", FILE_COMMITS_AFTER, key, after);
            return Ok(commits.clone());
        }

        log::debug!("cache miss {}/{:?} after {}", FILE_COMMITS_AFTER, key, after);
        let commits = self.backend.find_file_commits_after(cancel, path, after)?;
        by_start.insert(after.clone(), commits.clone());
        self.cache.put(cancel, FILE_COMMITS_AFTER, &key, &by_start)?;
        Ok(commits)
    }

    /// Main-branch history, cached until a refresh pulls new commits.
    pub fn main_branch(&self, cancel: &Cancel) -> Result<MainBranch, GraphError> {
        let commits: Vec<CommitRecord> =
            self.cache
                .get(cancel, MAIN_BRANCH_COMMITS, MAIN_BRANCH_KEY, || {
                    Ok::<_, GraphError>(self.backend.list_main_branch_commits(cancel)?)
                })?;
        Ok(MainBranch::new(commits))
    }

    pub fn invalidate_main_branch(&self) -> Result<(), GraphError> {
        Ok(self
            .cache
            .invalidate_key(MAIN_BRANCH_COMMITS, MAIN_BRANCH_KEY)?)
    }

    /// Drop the cached history queries for one file.
    pub fn invalidate_file(&self, path: &str) -> Result<(), GraphError> {
        let key = path_key(Path::new(path));
        self.cache.invalidate_key(FILE_LAST_COMMIT, &key)?;
        self.cache.invalidate_key(FILE_COMMITS_AFTER, &key)?;
        Ok(())
    }

    pub fn is_main_branch_commit(&self, cancel: &Cancel, commit: &CommitId) -> Result<bool, GraphError> {
        Ok(self.main_branch(cancel)?.contains(commit))
    }

    /// Nearest main-branch ancestor of `commit`, or `None` when `commit` is
    /// itself on the main branch.
    pub fn find_fork_commit(
        &self,
        cancel: &Cancel,
        commit: &CommitId,
    ) -> Result<Option<CommitRecord>, GraphError> {
        let main = self.main_branch(cancel)?;
        self.fork_commit_within(cancel, &main, commit)
    }

    /// [`find_fork_commit`](Self::find_fork_commit) against an already
    /// loaded main branch.
    pub fn fork_commit_within(
        &self,
        cancel: &Cancel,
        main: &MainBranch,
        commit: &CommitId,
    ) -> Result<Option<CommitRecord>, GraphError> {
        if main.contains(commit) {
            return Ok(None);
        }
        self.cache.get(cancel, FORK_COMMIT, commit.as_str(), || {
            let ancestors = self.backend.list_ancestor_commits(cancel, commit)?;
            match ancestors.into_iter().find(|c| main.contains(&c.id)) {
                Some(fork) => Ok(Some(fork)),
                None => Err(GraphError::Consistency(format!(
                    "no ancestor of {} is on the main branch",
                    commit
                ))),
            }
        })
    }

    /// First main-branch commit that merges `commit` in, or `None` when
    /// `commit` is on the main branch or not merged yet.
    pub fn find_merge_commit(
        &self,
        cancel: &Cancel,
        commit: &CommitId,
    ) -> Result<Option<CommitRecord>, GraphError> {
        let main = self.main_branch(cancel)?;
        self.merge_commit_within(cancel, &main, commit)
    }

    /// [`find_merge_commit`](Self::find_merge_commit) against an already
    /// loaded main branch.
    ///
    /// A found merge never changes and stays cached. "Not merged yet" is
    /// stored too but treated as a miss on the next lookup.
    pub fn merge_commit_within(
        &self,
        cancel: &Cancel,
        main: &MainBranch,
        commit: &CommitId,
    ) -> Result<Option<CommitRecord>, GraphError> {
        if main.contains(commit) {
            return Ok(None);
        }
        self.cache.get_unless(
            cancel,
            MERGE_COMMIT,
            commit.as_str(),
            |merge: &Option<CommitRecord>| merge.is_none(),
            || {
                let merge_points = self.backend.list_merge_points(cancel, commit)?;
                Ok::<_, GraphError>(merge_points.into_iter().find(|c| main.contains(&c.id)))
            },
        )
    }

    /// Every file changed on the side branch that `merge` brought into the
    /// main branch. Empty when `merge` has a single parent.
    pub fn merge_commit_files(&self, cancel: &Cancel, merge: &CommitId) -> Result<Vec<String>, GraphError> {
        let main = self.main_branch(cancel)?;
        self.merge_commit_files_within(cancel, &main, merge)
    }

    pub fn merge_commit_files_within(
        &self,
        cancel: &Cancel,
        main: &MainBranch,
        merge: &CommitId,
    ) -> Result<Vec<String>, GraphError> {
        let parents = self.backend.list_commit_parents(cancel, merge)?;
        match parents.len() {
            0 | 1 => return Ok(Vec::new()),
            2 => {}
            n => {
                return Err(GraphError::OctopusMerge {
                    commit: merge.clone(),
                    parents: n,
                });
            }
        }

        let off_main: Vec<&CommitId> = parents.iter().filter(|p| !main.contains(p)).collect();
        let [branch] = off_main.as_slice() else {
            return Err(GraphError::Consistency(format!(
                "merge commit {} has {} parents off the main branch, expected 1",
                merge,
                off_main.len()
            )));
        };

        let Some(fork) = self.fork_commit_within(cancel, main, branch)? else {
            return Err(GraphError::Consistency(format!(
                "branch parent {} of {} has no fork commit",
                branch, merge
            )));
        };
        log::debug!("merge {} brings in {}..{}", merge, fork.id, branch);
        Ok(self
            .backend
            .list_files_between_commits(cancel, &fork.id, branch)?)
    }
}
