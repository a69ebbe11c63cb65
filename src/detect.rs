//! Staleness detection for translated files.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::backend::RepositoryBackend;
use crate::cancel::Cancel;
use crate::config::ContentLayout;
use crate::graph::{CommitGraph, GraphError, MainBranch};
use crate::store::Store;
use crate::types::{CommitId, CommitRecord};

/// How the origin-language file relates to a translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OriginStatus {
    Unchanged,
    NotExist,
    Modified,
}

/// One origin commit the translation has not caught up with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginUpdate {
    pub commit: CommitRecord,
    /// Main-branch commit that merged `commit`; `None` if it landed on the
    /// main branch directly or is not merged yet.
    pub merge_commit: Option<CommitRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileTranslationState {
    /// Relative to the language directory.
    pub path: String,
    pub last_commit: Option<CommitRecord>,
    pub fork_commit: Option<CommitRecord>,
    pub merge_commit: Option<CommitRecord>,
    pub origin_status: OriginStatus,
    /// Oldest first.
    pub origin_updates: Vec<OriginUpdate>,
}

impl FileTranslationState {
    pub fn is_stale(&self) -> bool {
        self.origin_status != OriginStatus::Unchanged
    }
}

pub struct StalenessDetector<'a, B, S> {
    graph: &'a CommitGraph<B, S>,
    layout: &'a ContentLayout,
}

impl<'a, B: RepositoryBackend, S: Store> StalenessDetector<'a, B, S> {
    pub fn new(graph: &'a CommitGraph<B, S>, layout: &'a ContentLayout) -> Self {
        Self { graph, layout }
    }

    /// Check every file in `language`'s content tree.
    pub fn check_language(
        &self,
        cancel: &Cancel,
        language: &str,
    ) -> Result<Vec<FileTranslationState>, GraphError> {
        let dir = self.layout.language_dir(language);
        let paths = self.graph.backend().list_files(cancel, &dir)?;
        log::info!("checking {} files in {}", paths.len(), dir.display());
        self.check_files(cancel, &paths, language)
    }

    /// Classify each translated file in `paths`, preserving their order.
    pub fn check_files(
        &self,
        cancel: &Cancel,
        paths: &[String],
        language: &str,
    ) -> Result<Vec<FileTranslationState>, GraphError> {
        let main = self.graph.main_branch(cancel)?;
        paths
            .iter()
            .map(|path| self.check_file(cancel, &main, path, language))
            .collect()
    }

    fn check_file(
        &self,
        cancel: &Cancel,
        main: &MainBranch,
        path: &str,
        language: &str,
    ) -> Result<FileTranslationState, GraphError> {
        let translation = self.layout.file_path(language, path);
        let origin = self.layout.file_path(self.layout.origin(), path);

        let last_commit = self.graph.find_file_last_commit(cancel, &translation)?;
        let (fork_commit, merge_commit) = match &last_commit {
            Some(last) => (
                self.graph.fork_commit_within(cancel, main, &last.id)?,
                self.graph.merge_commit_within(cancel, main, &last.id)?,
            ),
            None => (None, None),
        };

        let origin_exists = self.graph.backend().file_exists(cancel, &origin)?;
        let origin_updates = match (&last_commit, origin_exists) {
            (Some(last), true) => {
                let start = fork_commit.as_ref().map_or(&last.id, |fork| &fork.id);
                self.origin_updates(cancel, main, &origin, start)?
            }
            // An uncommitted translation has no synchronization point.
            _ => Vec::new(),
        };

        let origin_status = if !origin_exists {
            OriginStatus::NotExist
        } else if !origin_updates.is_empty() {
            OriginStatus::Modified
        } else {
            OriginStatus::Unchanged
        };
        log::debug!("{}: {:?}", translation.display(), origin_status);

        Ok(FileTranslationState {
            path: path.to_string(),
            last_commit,
            fork_commit,
            merge_commit,
            origin_status,
            origin_updates,
        })
    }

    fn origin_updates(
        &self,
        cancel: &Cancel,
        main: &MainBranch,
        origin: &Path,
        start: &CommitId,
    ) -> Result<Vec<OriginUpdate>, GraphError> {
        self.graph
            .find_file_commits_after(cancel, origin, start)?
            .into_iter()
            .map(|commit| {
                let merge_commit = self.graph.merge_commit_within(cancel, main, &commit.id)?;
                Ok::<_, GraphError>(OriginUpdate {
                    commit,
                    merge_commit,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::fake::{FakeBackend, commit};
    use crate::store::memory::MemoryStore;

    fn graph() -> CommitGraph<FakeBackend, MemoryStore> {
        CommitGraph::new(FakeBackend::new(), MemoryStore::new())
    }

    fn check(graph: &CommitGraph<FakeBackend, MemoryStore>, paths: &[&str]) -> Vec<FileTranslationState> {
        let layout = ContentLayout::default();
        let detector = StalenessDetector::new(graph, &layout);
        let paths: Vec<String> = paths.iter().map(|p| p.to_string()).collect();
        detector.check_files(&Cancel::new(), &paths, "ja").unwrap()
    }

    #[test]
    fn missing_origin_is_not_exist() {
        let graph = graph();
        graph.backend().set_main(&["c1"]);
        graph.backend().set_last_commit("content/ja/a.md", "c1");

        let states = check(&graph, &["a.md"]);
        assert_eq!(states[0].origin_status, OriginStatus::NotExist);
        assert!(states[0].origin_updates.is_empty());
        assert_eq!(states[0].fork_commit, None);
        assert_eq!(graph.backend().calls("find_file_commits_after"), 0);
    }

    #[test]
    fn origin_without_later_commits_is_unchanged() {
        let graph = graph();
        graph.backend().set_main(&["c1"]);
        graph.backend().set_last_commit("content/ja/a.md", "c1");
        graph.backend().add_file("content/en/a.md");

        let states = check(&graph, &["a.md"]);
        assert_eq!(states[0].origin_status, OriginStatus::Unchanged);
        assert!(!states[0].is_stale());
    }

    #[test]
    fn direct_main_commit_is_modified_without_merge() {
        let graph = graph();
        graph.backend().set_main(&["c2", "c1"]);
        graph.backend().set_last_commit("content/ja/a.md", "c1");
        graph.backend().add_file("content/en/a.md");
        graph.backend().set_commits_after("content/en/a.md", "c1", &["c2"]);

        let states = check(&graph, &["a.md"]);
        assert_eq!(states[0].origin_status, OriginStatus::Modified);
        assert_eq!(
            states[0].origin_updates,
            vec![OriginUpdate {
                commit: commit("c2"),
                merge_commit: None,
            }]
        );
    }

    #[test]
    fn branch_commit_carries_its_merge_commit() {
        let graph = graph();
        graph.backend().set_main(&["c4", "c1"]);
        graph.backend().set_last_commit("content/ja/a.md", "c1");
        graph.backend().add_file("content/en/a.md");
        graph.backend().set_commits_after("content/en/a.md", "c1", &["c2"]);
        graph.backend().set_merge_points("c2", &["c3", "c4"]);

        let states = check(&graph, &["a.md"]);
        assert_eq!(states[0].origin_status, OriginStatus::Modified);
        assert_eq!(states[0].origin_updates.len(), 1);
        assert_eq!(states[0].origin_updates[0].commit, commit("c2"));
        assert_eq!(states[0].origin_updates[0].merge_commit, Some(commit("c4")));
    }

    #[test]
    fn branch_translation_compares_from_fork_commit() {
        let graph = graph();
        graph.backend().set_main(&["m", "c2", "c0"]);
        graph.backend().set_last_commit("content/ja/a.md", "t1");
        graph.backend().set_ancestors("t1", &["t1", "c0"]);
        graph.backend().set_merge_points("t1", &["m"]);
        graph.backend().add_file("content/en/a.md");
        graph.backend().set_commits_after("content/en/a.md", "c0", &["c2"]);

        let states = check(&graph, &["a.md"]);
        let state = &states[0];
        assert_eq!(state.last_commit, Some(commit("t1")));
        assert_eq!(state.fork_commit, Some(commit("c0")));
        assert_eq!(state.merge_commit, Some(commit("m")));
        assert_eq!(state.origin_status, OriginStatus::Modified);
        assert_eq!(state.origin_updates[0].commit, commit("c2"));
    }

    #[test]
    fn uncommitted_translation_has_no_updates() {
        let graph = graph();
        graph.backend().set_main(&["c1"]);
        graph.backend().add_file("content/en/a.md");

        let states = check(&graph, &["a.md"]);
        assert_eq!(states[0].last_commit, None);
        assert_eq!(states[0].origin_status, OriginStatus::Unchanged);
        assert!(states[0].origin_updates.is_empty());
    }

    #[test]
    fn results_follow_input_order() {
        let graph = graph();
        graph.backend().set_main(&["c1"]);
        graph.backend().add_file("content/en/b.md");

        let states = check(&graph, &["c.md", "a.md", "b.md"]);
        let paths: Vec<_> = states.iter().map(|s| s.path.as_str()).collect();
        assert_eq!(paths, vec!["c.md", "a.md", "b.md"]);
        assert_eq!(graph.backend().calls("list_main_branch_commits"), 1);
    }

    #[test]
    fn check_language_lists_content_tree() {
        let graph = graph();
        graph.backend().set_main(&["c1"]);
        graph
            .backend()
            .dirs
            .borrow_mut()
            .insert("content/ja".to_string(), vec!["a.md".into(), "guide/b.md".into()]);

        let layout = ContentLayout::default();
        let states = StalenessDetector::new(&graph, &layout)
            .check_language(&Cancel::new(), "ja")
            .unwrap();
        assert_eq!(states.len(), 2);
        assert_eq!(states[1].path, "guide/b.md");
        assert!(states.iter().all(|s| s.origin_status == OriginStatus::NotExist));
    }

    #[test]
    fn status_serializes_screaming_case() {
        let json = serde_json::to_string(&OriginStatus::NotExist).unwrap();
        assert_eq!(json, "\"NOT_EXIST\"");
    }
}
