//! Git backend using a hybrid CLI + libgit2 approach.
//!
//! **libgit2** opens the working copy and resolves the checked-out branch.
//!
//! **CLI (with hardening)** runs every history query, so the output is the
//! fixed `<id> <timestamp> <subject>` line format no matter which git
//! version produced it.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use git2::Repository;

use super::format::{COMMIT_FORMAT, parse_commit_lines};
use super::{BackendError, RepositoryBackend};
use crate::cancel::Cancel;
use crate::config::repo_relative;
use crate::types::{CommitId, CommitRecord};

/// Validate that a git ref (remote or branch name) does not contain dangerous patterns.
///
/// Rejects:
/// - Empty strings
/// - Strings containing `..` (path traversal)
/// - Strings starting with `-` (could be interpreted as flags)
/// - Strings containing null bytes or control characters
fn validate_git_ref(value: &str, name: &str) -> Result<(), BackendError> {
    if value.is_empty() {
        return Err(BackendError::InvalidInput(format!("{} cannot be empty", name)));
    }
    if value.contains("..") {
        return Err(BackendError::InvalidInput(format!(
            "{} cannot contain '..'",
            name
        )));
    }
    if value.starts_with('-') {
        return Err(BackendError::InvalidInput(format!(
            "{} cannot start with '-'",
            name
        )));
    }
    if value.bytes().any(|b| b == 0 || b < 0x20) {
        return Err(BackendError::InvalidInput(format!(
            "{} cannot contain null or control characters",
            name
        )));
    }
    Ok(())
}

fn path_arg<'a>(path: &'a Path, operation: &'static str) -> Result<&'a str, BackendError> {
    path.to_str().ok_or_else(|| {
        BackendError::InvalidInput(format!("{}: path is not valid UTF-8: {}", operation, path.display()))
    })
}

fn non_empty_lines(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Open an existing repository at the given path.
pub fn open_repository(path: &Path) -> Result<Repository, BackendError> {
    let repo = Repository::open(path).map_err(|e| {
        if e.code() == git2::ErrorCode::NotFound {
            BackendError::NotFound(path.display().to_string())
        } else {
            BackendError::Git(e)
        }
    })?;
    Ok(repo)
}

/// Resolve the name of the checked-out branch.
pub fn resolve_current_branch(repo: &Repository) -> Result<String, BackendError> {
    let head = repo.head()?;
    let ref_name = head
        .name()
        .ok_or_else(|| BackendError::InvalidInput("HEAD reference has no name".to_string()))?;

    let branch_name = ref_name.strip_prefix("refs/heads/").ok_or_else(|| {
        BackendError::InvalidInput(format!(
            "unexpected HEAD format: expected 'refs/heads/<branch>', got '{}'",
            ref_name
        ))
    })?;

    Ok(branch_name.to_string())
}

/// Production [`RepositoryBackend`] driving the `git` executable.
#[derive(Debug, Clone)]
pub struct GitBackend {
    git_path: String,
    workdir: PathBuf,
    remote: String,
    branch: String,
    /// Whether `branch` is checked out, so a pull must update the work tree.
    checked_out: bool,
}

impl GitBackend {
    /// Open the working copy at `workdir`.
    ///
    /// `branch` is the main branch; when `None` the checked-out branch is used.
    pub fn open(workdir: &Path, remote: &str, branch: Option<&str>) -> Result<Self, BackendError> {
        validate_git_ref(remote, "remote")?;

        let repo = open_repository(workdir)?;
        let workdir = repo
            .workdir()
            .ok_or_else(|| {
                BackendError::InvalidInput(format!(
                    "{} is a bare repository; a working copy is required",
                    workdir.display()
                ))
            })?
            .to_path_buf();

        let current = resolve_current_branch(&repo).ok();
        let branch = match (branch, &current) {
            (Some(branch), _) => branch.to_string(),
            (None, Some(current)) => current.clone(),
            (None, None) => resolve_current_branch(&repo)?,
        };
        validate_git_ref(&branch, "branch")?;
        let checked_out = current.as_deref() == Some(branch.as_str());

        log::debug!(
            "opened working copy {} (main branch {}, upstream {}/{})",
            workdir.display(),
            branch,
            remote,
            branch
        );

        Ok(Self {
            git_path: "git".into(),
            workdir,
            remote: remote.to_string(),
            branch,
            checked_out,
        })
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    fn upstream_ref(&self) -> String {
        format!("{}/{}", self.remote, self.branch)
    }

    /// Create a hardened Command with security settings.
    ///
    /// Applies:
    /// - `GIT_LFS_SKIP_SMUDGE=1` - skip LFS file downloads
    /// - `GIT_TERMINAL_PROMPT=0` - disable interactive prompts
    /// - `core.hooksPath=` - disable hooks execution
    /// - `core.quotePath=false` - print non-ASCII paths verbatim
    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.git_path);
        cmd.env("GIT_LFS_SKIP_SMUDGE", "1");
        cmd.env("GIT_TERMINAL_PROMPT", "0");
        cmd.args(["-c", "core.hooksPath=", "-c", "core.quotePath=false"]);
        cmd.arg("-C").arg(&self.workdir);
        cmd.stdin(Stdio::null());
        cmd
    }

    /// Run git and return stdout. Refuses to start once `cancel` is set.
    fn run(
        &self,
        cancel: &Cancel,
        operation: &'static str,
        args: &[&str],
    ) -> Result<String, BackendError> {
        if cancel.is_cancelled() {
            return Err(BackendError::Cancelled(operation));
        }

        log::debug!("{}: git {}", operation, args.join(" "));
        let output = self
            .command()
            .args(args)
            .output()
            .map_err(|e| BackendError::io(operation, e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BackendError::CommandFailed {
                operation,
                args: args.join(" "),
                stderr: stderr.trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Like [`run`](Self::run) for read-only queries: the result of a query
    /// that finished after cancellation is discarded.
    fn query(
        &self,
        cancel: &Cancel,
        operation: &'static str,
        args: &[&str],
    ) -> Result<String, BackendError> {
        let stdout = self.run(cancel, operation, args)?;
        if cancel.is_cancelled() {
            return Err(BackendError::Cancelled(operation));
        }
        Ok(stdout)
    }

    fn log(
        &self,
        cancel: &Cancel,
        operation: &'static str,
        args: &[&str],
    ) -> Result<Vec<CommitRecord>, BackendError> {
        let mut full = vec!["log", COMMIT_FORMAT];
        full.extend_from_slice(args);
        let stdout = self.query(cancel, operation, &full)?;
        parse_commit_lines(operation, &stdout)
    }

    /// Entries of the main branch's tree matching `path`, read from the
    /// branch itself rather than the work tree.
    fn tree_entries(
        &self,
        cancel: &Cancel,
        operation: &'static str,
        flags: &[&str],
        path: &str,
    ) -> Result<Vec<String>, BackendError> {
        let mut args = vec!["ls-tree", "-z", "--name-only", "--full-tree"];
        args.extend_from_slice(flags);
        args.extend_from_slice(&[self.branch.as_str(), "--", path]);
        let stdout = self.query(cancel, operation, &args)?;
        Ok(stdout
            .split('\0')
            .filter(|entry| !entry.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn collect_files(
        &self,
        root: &Path,
        dir: &Path,
        files: &mut Vec<String>,
    ) -> Result<(), BackendError> {
        let entries = std::fs::read_dir(dir).map_err(|e| BackendError::io("list_files", e))?;
        for entry in entries {
            let entry = entry.map_err(|e| BackendError::io("list_files", e))?;
            if entry.file_name() == ".git" {
                continue;
            }
            let path = entry.path();
            let file_type = entry
                .file_type()
                .map_err(|e| BackendError::io("list_files", e))?;
            if file_type.is_dir() {
                self.collect_files(root, &path, files)?;
            } else if let Ok(relative) = path.strip_prefix(root) {
                let relative = path_arg(relative, "list_files")?;
                files.push(relative.replace(std::path::MAIN_SEPARATOR, "/"));
            }
        }
        Ok(())
    }
}

impl RepositoryBackend for GitBackend {
    fn file_exists(&self, cancel: &Cancel, path: &Path) -> Result<bool, BackendError> {
        if !self.checked_out {
            let path = repo_relative(Path::new(path_arg(path, "file_exists")?));
            let entries = self.tree_entries(cancel, "file_exists", &[], &path)?;
            return Ok(entries.contains(&path));
        }
        if cancel.is_cancelled() {
            return Err(BackendError::Cancelled("file_exists"));
        }
        self.workdir
            .join(path)
            .try_exists()
            .map_err(|e| BackendError::io("file_exists", e))
    }

    fn list_files(&self, cancel: &Cancel, dir: &Path) -> Result<Vec<String>, BackendError> {
        let mut files = if self.checked_out {
            if cancel.is_cancelled() {
                return Err(BackendError::Cancelled("list_files"));
            }
            let root = self.workdir.join(dir);
            let mut files = Vec::new();
            match self.collect_files(&root, &root, &mut files) {
                Err(BackendError::Io { source, .. })
                    if source.kind() == std::io::ErrorKind::NotFound && !root.exists() =>
                {
                    log::debug!("list_files: {} does not exist", root.display());
                }
                result => result?,
            }
            files
        } else {
            let dir = repo_relative(Path::new(path_arg(dir, "list_files")?));
            let prefix = format!("{}/", dir);
            self.tree_entries(cancel, "list_files", &["-r"], &dir)?
                .into_iter()
                .filter_map(|path| path.strip_prefix(&prefix).map(str::to_string))
                .collect()
        };
        files.sort();
        Ok(files)
    }

    fn find_file_last_commit(
        &self,
        cancel: &Cancel,
        path: &Path,
    ) -> Result<Option<CommitRecord>, BackendError> {
        let path = path_arg(path, "find_file_last_commit")?;
        let mut commits = self.log(
            cancel,
            "find_file_last_commit",
            &["-1", self.branch.as_str(), "--", path],
        )?;
        Ok(commits.pop())
    }

    fn find_file_commits_after(
        &self,
        cancel: &Cancel,
        path: &Path,
        after: &CommitId,
    ) -> Result<Vec<CommitRecord>, BackendError> {
        let path = path_arg(path, "find_file_commits_after")?;
        let range = format!("{}..{}", after, self.branch);
        self.log(
            cancel,
            "find_file_commits_after",
            &["--reverse", range.as_str(), "--", path],
        )
    }

    fn list_main_branch_commits(&self, cancel: &Cancel) -> Result<Vec<CommitRecord>, BackendError> {
        self.log(
            cancel,
            "list_main_branch_commits",
            &["--first-parent", self.branch.as_str(), "--"],
        )
    }

    fn list_ancestor_commits(
        &self,
        cancel: &Cancel,
        commit: &CommitId,
    ) -> Result<Vec<CommitRecord>, BackendError> {
        self.log(
            cancel,
            "list_ancestor_commits",
            &["--first-parent", commit.as_str(), "--"],
        )
    }

    fn list_merge_points(
        &self,
        cancel: &Cancel,
        commit: &CommitId,
    ) -> Result<Vec<CommitRecord>, BackendError> {
        let range = format!("{}..{}", commit, self.branch);
        self.log(
            cancel,
            "list_merge_points",
            &["--ancestry-path", "--merges", "--reverse", range.as_str(), "--"],
        )
    }

    fn list_files_in_commit(
        &self,
        cancel: &Cancel,
        commit: &CommitId,
    ) -> Result<Vec<String>, BackendError> {
        let stdout = self.query(
            cancel,
            "list_files_in_commit",
            &[
                "diff-tree",
                "--no-commit-id",
                "--name-only",
                "-r",
                "--root",
                commit.as_str(),
            ],
        )?;
        Ok(non_empty_lines(&stdout))
    }

    fn list_commit_parents(
        &self,
        cancel: &Cancel,
        commit: &CommitId,
    ) -> Result<Vec<CommitId>, BackendError> {
        let stdout = self.query(
            cancel,
            "list_commit_parents",
            &["rev-list", "--parents", "-n", "1", commit.as_str(), "--"],
        )?;

        // First token is the commit itself.
        stdout
            .split_whitespace()
            .skip(1)
            .map(|token| {
                token.parse::<CommitId>().map_err(|_| BackendError::Parse {
                    operation: "list_commit_parents",
                    line: stdout.trim().to_string(),
                })
            })
            .collect()
    }

    fn list_files_between_commits(
        &self,
        cancel: &Cancel,
        from: &CommitId,
        to: &CommitId,
    ) -> Result<Vec<String>, BackendError> {
        let stdout = self.query(
            cancel,
            "list_files_between_commits",
            &["diff", "--name-only", from.as_str(), to.as_str(), "--"],
        )?;
        Ok(non_empty_lines(&stdout))
    }

    fn fetch(&self, cancel: &Cancel) -> Result<(), BackendError> {
        let refspec = format!(
            "+refs/heads/{0}:refs/remotes/{1}/{0}",
            self.branch, self.remote
        );
        self.run(cancel, "fetch", &["fetch", "--quiet", self.remote.as_str(), refspec.as_str()])?;
        Ok(())
    }

    fn pull(&self, cancel: &Cancel) -> Result<(), BackendError> {
        // Fast-forward to what fetch already downloaded; a second network
        // round-trip could advance past the commits the caller inspected.
        let upstream = self.upstream_ref();
        if self.checked_out {
            self.run(cancel, "pull", &["merge", "--ff-only", "--quiet", upstream.as_str()])?;
        } else {
            // Without a leading '+' the local update is refused unless it
            // fast-forwards.
            let refspec = format!("refs/remotes/{}:refs/heads/{}", upstream, self.branch);
            self.run(cancel, "pull", &["fetch", "--quiet", ".", refspec.as_str()])?;
        }
        Ok(())
    }

    fn list_fresh_commits(&self, cancel: &Cancel) -> Result<Vec<CommitRecord>, BackendError> {
        let range = format!("{}..{}", self.branch, self.upstream_ref());
        self.log(
            cancel,
            "list_fresh_commits",
            &["--first-parent", range.as_str(), "--"],
        )
    }

    fn resolve_main_head(&self, cancel: &Cancel) -> Result<Option<CommitId>, BackendError> {
        let stdout = match self.query(
            cancel,
            "resolve_main_head",
            &["rev-parse", "--verify", "--quiet", self.branch.as_str()],
        ) {
            Ok(stdout) => stdout,
            // `--verify --quiet` exits 1 without output for an unborn branch.
            Err(BackendError::CommandFailed { stderr, .. }) if stderr.is_empty() => return Ok(None),
            Err(e) => return Err(e),
        };
        let id = stdout.trim();
        id.parse::<CommitId>().map(Some).map_err(|_| BackendError::Parse {
            operation: "resolve_main_head",
            line: id.to_string(),
        })
    }
}
