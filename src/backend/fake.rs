//! Scripted in-memory backend for resolver, refresh and detector tests.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::path::Path;

use super::{BackendError, RepositoryBackend};
use crate::cancel::Cancel;
use crate::types::{CommitId, CommitRecord};

pub(crate) fn id(s: &str) -> CommitId {
    s.parse().unwrap()
}

pub(crate) fn commit(s: &str) -> CommitRecord {
    CommitRecord::new(id(s), "2024-01-01T00:00:00+00:00", format!("commit {}", s))
}

pub(crate) fn commits(ids: &[&str]) -> Vec<CommitRecord> {
    ids.iter().map(|s| commit(s)).collect()
}

fn path_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Every answer is looked up in a table the test fills in. Unknown keys
/// answer with "nothing" except parents, which fail like git does for an
/// unknown revision.
#[derive(Default)]
pub(crate) struct FakeBackend {
    pub files: RefCell<HashSet<String>>,
    pub dirs: RefCell<HashMap<String, Vec<String>>>,
    pub last_commits: RefCell<HashMap<String, CommitRecord>>,
    pub commits_after: RefCell<HashMap<(String, CommitId), Vec<CommitRecord>>>,
    pub main: RefCell<Vec<CommitRecord>>,
    pub ancestors: RefCell<HashMap<CommitId, Vec<CommitRecord>>>,
    pub merge_points: RefCell<HashMap<CommitId, Vec<CommitRecord>>>,
    pub files_in_commit: RefCell<HashMap<CommitId, Vec<String>>>,
    pub parents: RefCell<HashMap<CommitId, Vec<CommitId>>>,
    pub files_between: RefCell<HashMap<(CommitId, CommitId), Vec<String>>>,
    pub fresh: RefCell<Vec<CommitRecord>>,
    pub fail_pull: Cell<bool>,
    calls: RefCell<Vec<String>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_main(&self, ids: &[&str]) {
        *self.main.borrow_mut() = commits(ids);
    }

    pub fn add_file(&self, path: &str) {
        self.files.borrow_mut().insert(path.to_string());
    }

    pub fn set_last_commit(&self, path: &str, commit_id: &str) {
        self.last_commits
            .borrow_mut()
            .insert(path.to_string(), commit(commit_id));
    }

    pub fn set_commits_after(&self, path: &str, after: &str, ids: &[&str]) {
        self.commits_after
            .borrow_mut()
            .insert((path.to_string(), id(after)), commits(ids));
    }

    pub fn set_ancestors(&self, of: &str, ids: &[&str]) {
        self.ancestors.borrow_mut().insert(id(of), commits(ids));
    }

    pub fn set_merge_points(&self, of: &str, ids: &[&str]) {
        self.merge_points.borrow_mut().insert(id(of), commits(ids));
    }

    pub fn set_files_in_commit(&self, of: &str, files: &[&str]) {
        self.files_in_commit
            .borrow_mut()
            .insert(id(of), files.iter().map(|f| f.to_string()).collect());
    }

    pub fn set_parents(&self, of: &str, ids: &[&str]) {
        self.parents
            .borrow_mut()
            .insert(id(of), ids.iter().map(|s| id(s)).collect());
    }

    pub fn set_files_between(&self, from: &str, to: &str, files: &[&str]) {
        self.files_between.borrow_mut().insert(
            (id(from), id(to)),
            files.iter().map(|f| f.to_string()).collect(),
        );
    }

    pub fn set_fresh(&self, ids: &[&str]) {
        *self.fresh.borrow_mut() = commits(ids);
    }

    /// Number of calls to `operation` so far.
    pub fn calls(&self, operation: &str) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|call| call.as_str() == operation)
            .count()
    }

    /// Operation names in call order.
    pub fn call_log(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    fn record(&self, cancel: &Cancel, operation: &'static str) -> Result<(), BackendError> {
        if cancel.is_cancelled() {
            return Err(BackendError::Cancelled(operation));
        }
        self.calls.borrow_mut().push(operation.to_string());
        Ok(())
    }
}

impl RepositoryBackend for FakeBackend {
    fn file_exists(&self, cancel: &Cancel, path: &Path) -> Result<bool, BackendError> {
        self.record(cancel, "file_exists")?;
        Ok(self.files.borrow().contains(&path_key(path)))
    }

    fn list_files(&self, cancel: &Cancel, dir: &Path) -> Result<Vec<String>, BackendError> {
        self.record(cancel, "list_files")?;
        Ok(self
            .dirs
            .borrow()
            .get(&path_key(dir))
            .cloned()
            .unwrap_or_default())
    }

    fn find_file_last_commit(
        &self,
        cancel: &Cancel,
        path: &Path,
    ) -> Result<Option<CommitRecord>, BackendError> {
        self.record(cancel, "find_file_last_commit")?;
        Ok(self.last_commits.borrow().get(&path_key(path)).cloned())
    }

    fn find_file_commits_after(
        &self,
        cancel: &Cancel,
        path: &Path,
        after: &CommitId,
    ) -> Result<Vec<CommitRecord>, BackendError> {
        self.record(cancel, "find_file_commits_after")?;
        Ok(self
            .commits_after
            .borrow()
            .get(&(path_key(path), after.clone()))
            .cloned()
            .unwrap_or_default())
    }

    fn list_main_branch_commits(&self, cancel: &Cancel) -> Result<Vec<CommitRecord>, BackendError> {
        self.record(cancel, "list_main_branch_commits")?;
        Ok(self.main.borrow().clone())
    }

    fn list_ancestor_commits(
        &self,
        cancel: &Cancel,
        commit: &CommitId,
    ) -> Result<Vec<CommitRecord>, BackendError> {
        self.record(cancel, "list_ancestor_commits")?;
        Ok(self.ancestors.borrow().get(commit).cloned().unwrap_or_default())
    }

    fn list_merge_points(
        &self,
        cancel: &Cancel,
        commit: &CommitId,
    ) -> Result<Vec<CommitRecord>, BackendError> {
        self.record(cancel, "list_merge_points")?;
        Ok(self
            .merge_points
            .borrow()
            .get(commit)
            .cloned()
            .unwrap_or_default())
    }

    fn list_files_in_commit(
        &self,
        cancel: &Cancel,
        commit: &CommitId,
    ) -> Result<Vec<String>, BackendError> {
        self.record(cancel, "list_files_in_commit")?;
        Ok(self
            .files_in_commit
            .borrow()
            .get(commit)
            .cloned()
            .unwrap_or_default())
    }

    fn list_commit_parents(
        &self,
        cancel: &Cancel,
        commit: &CommitId,
    ) -> Result<Vec<CommitId>, BackendError> {
        self.record(cancel, "list_commit_parents")?;
        self.parents
            .borrow()
            .get(commit)
            .cloned()
            .ok_or_else(|| BackendError::CommandFailed {
                operation: "list_commit_parents",
                args: format!("rev-list --parents -n 1 {}", commit),
                stderr: "fatal: bad revision".to_string(),
            })
    }

    fn list_files_between_commits(
        &self,
        cancel: &Cancel,
        from: &CommitId,
        to: &CommitId,
    ) -> Result<Vec<String>, BackendError> {
        self.record(cancel, "list_files_between_commits")?;
        Ok(self
            .files_between
            .borrow()
            .get(&(from.clone(), to.clone()))
            .cloned()
            .unwrap_or_default())
    }

    fn fetch(&self, cancel: &Cancel) -> Result<(), BackendError> {
        self.record(cancel, "fetch")
    }

    /// Moves the fresh commits onto the main branch.
    fn pull(&self, cancel: &Cancel) -> Result<(), BackendError> {
        self.record(cancel, "pull")?;
        if self.fail_pull.get() {
            return Err(BackendError::CommandFailed {
                operation: "pull",
                args: "merge --ff-only".to_string(),
                stderr: "fatal: Not possible to fast-forward, aborting.".to_string(),
            });
        }
        let fresh = std::mem::take(&mut *self.fresh.borrow_mut());
        let mut main = self.main.borrow_mut();
        let old = std::mem::take(&mut *main);
        *main = fresh.into_iter().chain(old).collect();
        Ok(())
    }

    fn list_fresh_commits(&self, cancel: &Cancel) -> Result<Vec<CommitRecord>, BackendError> {
        self.record(cancel, "list_fresh_commits")?;
        Ok(self.fresh.borrow().clone())
    }

    fn resolve_main_head(&self, cancel: &Cancel) -> Result<Option<CommitId>, BackendError> {
        self.record(cancel, "resolve_main_head")?;
        Ok(self.main.borrow().first().map(|c| c.id.clone()))
    }
}
