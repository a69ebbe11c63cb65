//! Keeping the cache coherent across fetch and pull.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::{CommitGraph, GraphError};
use crate::backend::RepositoryBackend;
use crate::cancel::Cancel;
use crate::store::Store;
use crate::types::{CommitId, CommitRecord};

pub const REFRESH_STATE: &str = "refresh_state";

const REFRESH_STATE_KEY: &str = "";

/// What the last successful refresh left behind. Persisted so a restarted
/// process knows where the working copy was.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshState {
    pub last_head: Option<CommitId>,
    pub refreshed_files: Vec<String>,
}

/// Result of one [`CommitGraph::pull_refresh`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshOutcome {
    /// Newest first.
    pub fresh_commits: Vec<CommitRecord>,
    /// Sorted and deduplicated.
    pub changed_files: Vec<String>,
    pub main_invalidated: bool,
}

impl<B: RepositoryBackend, S: Store> CommitGraph<B, S> {
    /// Fetch upstream, drop every cache entry the fetched commits make
    /// stale, then fast-forward the working copy.
    ///
    /// Invalidation always happens before the pull. If the pull fails the
    /// dropped entries are simply recomputed later.
    pub fn pull_refresh(&self, cancel: &Cancel) -> Result<RefreshOutcome, GraphError> {
        self.backend.fetch(cancel)?;
        let fresh = self.backend.list_fresh_commits(cancel)?;

        let mut changed = BTreeSet::new();
        let mut merges = Vec::new();
        for commit in &fresh {
            let files = self.backend.list_files_in_commit(cancel, &commit.id)?;
            if files.is_empty() {
                merges.push(&commit.id);
            } else {
                changed.extend(files);
            }
        }

        if !merges.is_empty() {
            // A fresh merge's first parent may itself be fresh.
            let main = self.main_branch(cancel)?.extended_with(&fresh);
            for merge in merges {
                let files = self.merge_commit_files_within(cancel, &main, merge)?;
                log::debug!("merge {} contributed {} files", merge, files.len());
                changed.extend(files);
            }
        }

        for path in &changed {
            self.invalidate_file(path)?;
        }

        self.backend.pull(cancel)?;

        let main_invalidated = !fresh.is_empty();
        if main_invalidated {
            self.invalidate_main_branch()?;
        }

        let changed_files: Vec<String> = changed.into_iter().collect();
        let state = RefreshState {
            last_head: self.backend.resolve_main_head(cancel)?,
            refreshed_files: changed_files.clone(),
        };
        self.cache
            .put(cancel, REFRESH_STATE, REFRESH_STATE_KEY, &state)?;

        log::info!(
            "refresh pulled {} commits, invalidated {} files",
            fresh.len(),
            changed_files.len()
        );
        Ok(RefreshOutcome {
            fresh_commits: fresh,
            changed_files,
            main_invalidated,
        })
    }

    /// State recorded by the last successful refresh, if any.
    pub fn last_refresh(&self, cancel: &Cancel) -> Result<Option<RefreshState>, GraphError> {
        Ok(self.cache.load(cancel, REFRESH_STATE, REFRESH_STATE_KEY)?)
    }
}
