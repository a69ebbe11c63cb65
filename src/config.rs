//! Runtime configuration and the content tree layout.

use std::path::{Component, Path, PathBuf};

use thiserror::Error;

use crate::backend::{BackendError, GitBackend};
use crate::graph::CommitGraph;
use crate::store::{CachePaths, FileStore};

pub const DEFAULT_REMOTE: &str = "origin";
pub const DEFAULT_CONTENT_DIR: &str = "content";
pub const DEFAULT_ORIGIN: &str = "en";

#[derive(Error, Debug, PartialEq, Eq)]
#[error("invalid language code {0:?}: expected letters, digits, '-' or '_'")]
pub struct InvalidLanguage(pub String);

/// Language codes name directories and report files, so they are limited to
/// tags like `ja`, `zh-CN` or `pt_BR`.
pub fn validate_language(language: &str) -> Result<(), InvalidLanguage> {
    let valid = !language.is_empty()
        && language
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        && !language.starts_with('-');
    if valid {
        Ok(())
    } else {
        Err(InvalidLanguage(language.to_string()))
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("invalid content directory {0:?}: expected a path relative to the repository root without '..'")]
pub struct InvalidContentDir(pub PathBuf);

/// Repository-relative form of `path`: `.` components dropped, `/`
/// separators. History queries and fresh-commit listings both report paths
/// this way, so cache keys must use it too.
pub fn repo_relative(path: &Path) -> String {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Accept a content directory only if it stays inside the working copy.
pub fn validate_content_dir(dir: &Path) -> Result<PathBuf, InvalidContentDir> {
    let escapes = dir
        .components()
        .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)));
    let normalized = repo_relative(dir);
    if escapes || normalized.is_empty() {
        return Err(InvalidContentDir(dir.to_path_buf()));
    }
    Ok(PathBuf::from(normalized))
}

/// Where each language's files live inside the repository:
/// `<content-dir>/<language>/<relative path>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentLayout {
    content_dir: PathBuf,
    origin: String,
}

impl ContentLayout {
    /// `content_dir` is stored without `.` components so every path built
    /// from it matches what git reports.
    pub fn new(content_dir: impl Into<PathBuf>, origin: impl Into<String>) -> Self {
        Self {
            content_dir: PathBuf::from(repo_relative(&content_dir.into())),
            origin: origin.into(),
        }
    }

    /// Language code translations are derived from.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn language_dir(&self, language: &str) -> PathBuf {
        self.content_dir.join(language)
    }

    pub fn file_path(&self, language: &str, relative: &str) -> PathBuf {
        self.language_dir(language).join(relative)
    }
}

impl Default for ContentLayout {
    fn default() -> Self {
        Self::new(DEFAULT_CONTENT_DIR, DEFAULT_ORIGIN)
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Working copy root.
    pub repo: PathBuf,
    pub remote: String,
    /// `None` means the checked-out branch.
    pub branch: Option<String>,
    pub layout: ContentLayout,
    pub cache: CachePaths,
}

impl Config {
    pub fn new(repo: impl Into<PathBuf>) -> Self {
        Self {
            repo: repo.into(),
            remote: DEFAULT_REMOTE.to_string(),
            branch: None,
            layout: ContentLayout::default(),
            cache: CachePaths::default(),
        }
    }

    pub fn repo(&self) -> &Path {
        &self.repo
    }

    /// Open the working copy and the on-disk cache.
    pub fn open_graph(&self) -> Result<CommitGraph<GitBackend, FileStore>, BackendError> {
        let backend = GitBackend::open(&self.repo, &self.remote, self.branch.as_deref())?;
        log::debug!(
            "tracking {} (branch {}, remote {}), cache at {}",
            backend.workdir().display(),
            backend.branch(),
            self.remote,
            self.cache.root().display()
        );
        Ok(CommitGraph::new(backend, FileStore::new(self.cache.clone())))
    }
}
