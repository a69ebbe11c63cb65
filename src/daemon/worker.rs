//! Background worker thread for refresh-then-detect runs.
//!
//! The worker owns the commit graph, so refreshes and detector runs never
//! overlap within the process. The refresh lock extends that to other
//! processes sharing the cache directory.

use std::path::PathBuf;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, bounded};
use serde::{Deserialize, Serialize};

use super::DaemonError;
use super::lock::{DEFAULT_LOCK_TIMEOUT, RefreshLock};
use crate::backend::RepositoryBackend;
use crate::cancel::Cancel;
use crate::config::{ContentLayout, validate_language};
use crate::detect::{FileTranslationState, StalenessDetector};
use crate::graph::CommitGraph;
use crate::store::{CachePaths, Store, write_atomic};
use crate::types::CommitId;

/// Runs already queued beyond the one in progress; further requests are
/// dropped by the scheduler.
const QUEUE_CAPACITY: usize = 1;

fn now_unix() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Requests the worker can handle.
pub enum WorkerRequest {
    /// Refresh, then write a report for each language.
    Run { languages: Vec<String> },
    Shutdown,
}

/// Detector output for one language, written to `<cache>/reports/<language>.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub language: String,
    /// Unix seconds.
    pub generated_at: u64,
    /// Main branch head the report was computed against.
    pub head: Option<CommitId>,
    pub stale: usize,
    pub files: Vec<FileTranslationState>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub fresh_commits: usize,
    pub changed_files: usize,
    pub reports: Vec<PathBuf>,
}

pub struct Worker<B, S> {
    graph: CommitGraph<B, S>,
    layout: ContentLayout,
    paths: CachePaths,
    cancel: Cancel,
    lock_timeout: Duration,
}

impl<B: RepositoryBackend, S: Store> Worker<B, S> {
    pub fn new(graph: CommitGraph<B, S>, layout: ContentLayout, paths: CachePaths, cancel: Cancel) -> Self {
        Self {
            graph,
            layout,
            paths,
            cancel,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// One refresh followed by a detector run per language, all under the
    /// refresh lock.
    pub fn run_once(&self, languages: &[String]) -> Result<RunSummary, DaemonError> {
        for language in languages {
            validate_language(language)?;
        }

        let lock_path = self.paths.lock_path("refresh");
        let _lock = RefreshLock::acquire_with_timeout(&lock_path, self.lock_timeout)
            .map_err(|source| DaemonError::Lock {
                path: lock_path.clone(),
                source,
            })?;

        let outcome = self.graph.pull_refresh(&self.cancel)?;
        let head = self.graph.main_branch(&self.cancel)?.head().map(|c| c.id.clone());
        let detector = StalenessDetector::new(&self.graph, &self.layout);

        let mut reports = Vec::with_capacity(languages.len());
        for language in languages {
            let files = detector.check_language(&self.cancel, language)?;
            let report = Report {
                language: language.clone(),
                generated_at: now_unix(),
                head: head.clone(),
                stale: files.iter().filter(|f| f.is_stale()).count(),
                files,
            };
            log::info!("{}: {} of {} files stale", language, report.stale, report.files.len());
            reports.push(self.write_report(&report)?);
        }

        Ok(RunSummary {
            fresh_commits: outcome.fresh_commits.len(),
            changed_files: outcome.changed_files.len(),
            reports,
        })
    }

    fn write_report(&self, report: &Report) -> Result<PathBuf, DaemonError> {
        let path = self
            .paths
            .reports_dir()
            .join(format!("{}.json", report.language));
        let bytes = serde_json::to_vec_pretty(report).map_err(|source| DaemonError::Serialize {
            language: report.language.clone(),
            source,
        })?;
        write_atomic(&path, &bytes).map_err(|source| DaemonError::Report {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }

    /// Run the worker loop (blocks until Shutdown).
    pub fn run(self, receiver: Receiver<WorkerRequest>) {
        log::info!("Worker thread started");

        loop {
            match receiver.recv() {
                Ok(WorkerRequest::Run { languages }) => match self.run_once(&languages) {
                    Ok(summary) => log::info!(
                        "run finished: {} fresh commits, {} files invalidated, {} reports",
                        summary.fresh_commits,
                        summary.changed_files,
                        summary.reports.len()
                    ),
                    Err(DaemonError::Graph(e)) if e.is_consistency_violation() => {
                        log::error!("run aborted, repository history is inconsistent: {}", e)
                    }
                    Err(e) => log::warn!("run failed, retrying next interval: {}", e),
                },
                Ok(WorkerRequest::Shutdown) => {
                    log::info!("Worker thread shutting down");
                    break;
                }
                Err(_) => {
                    log::info!("Worker channel closed, exiting");
                    break;
                }
            }
        }
    }
}

/// Handle for managing the worker thread.
pub struct WorkerHandle {
    sender: Sender<WorkerRequest>,
    thread: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    pub fn spawn<B, S>(worker: Worker<B, S>) -> Self
    where
        B: RepositoryBackend + Send + 'static,
        S: Store + Send + 'static,
    {
        let (sender, receiver) = bounded(QUEUE_CAPACITY);

        let thread = thread::Builder::new()
            .name("l10n-worker".to_string())
            .spawn(move || worker.run(receiver))
            .expect("failed to spawn worker thread");

        Self {
            sender,
            thread: Some(thread),
        }
    }

    pub fn sender(&self) -> Sender<WorkerRequest> {
        self.sender.clone()
    }

    /// Queue a run, waiting for room in the queue.
    pub fn run(&self, languages: Vec<String>) -> Result<(), DaemonError> {
        self.sender
            .send(WorkerRequest::Run { languages })
            .map_err(|_| DaemonError::WorkerGone)
    }

    /// Finish queued runs, then stop the worker. Safe to call twice.
    pub fn shutdown(&mut self) {
        let _ = self.sender.send(WorkerRequest::Shutdown);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
