//! Scheduled refresh-then-detect runs.

mod lock;
mod scheduler;
mod worker;

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use thiserror::Error;

use crate::backend::BackendError;
use crate::cancel::Cancel;
use crate::config::{Config, InvalidLanguage, validate_language};
use crate::graph::GraphError;

pub use lock::{DEFAULT_LOCK_TIMEOUT, RefreshLock};
pub use scheduler::{Scheduler, SchedulerHandle};
pub use worker::{Report, RunSummary, Worker, WorkerHandle, WorkerRequest};

/// How often `watch` checks for Ctrl-C.
const WAIT_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("failed to open repository: {0}")]
    Open(#[from] BackendError),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Language(#[from] InvalidLanguage),
    #[error("failed to acquire refresh lock {path}: {source}")]
    Lock {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to serialize report for {language}: {source}")]
    Serialize {
        language: String,
        source: serde_json::Error,
    },
    #[error("failed to write report {path}: {source}")]
    Report {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("worker is not running")]
    WorkerGone,
}

/// Refresh and check `languages` every `interval` until `cancel` is set.
pub fn watch(
    config: &Config,
    languages: Vec<String>,
    interval: Duration,
    cancel: &Cancel,
) -> Result<(), DaemonError> {
    for language in &languages {
        validate_language(language)?;
    }

    let graph = config.open_graph()?;
    let worker = Worker::new(
        graph,
        config.layout.clone(),
        config.cache.clone(),
        cancel.clone(),
    );
    log::info!(
        "watching {:?}, reports in {}",
        languages,
        config.cache.reports_dir().display()
    );

    let mut worker = WorkerHandle::spawn(worker);
    let mut scheduler = SchedulerHandle::spawn(worker.sender(), languages, interval, cancel.clone());

    while !cancel.is_cancelled() {
        thread::sleep(WAIT_INTERVAL);
    }

    log::info!("Shutting down");
    scheduler.shutdown();
    worker.shutdown();
    Ok(())
}
