//! Scheduler thread for periodic refresh-then-detect runs.

use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Sender, TrySendError};

use super::worker::WorkerRequest;
use crate::cancel::Cancel;

/// How often the sleeping scheduler checks for shutdown.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Sends a run request to the worker immediately and then once per interval.
pub struct Scheduler {
    worker_tx: Sender<WorkerRequest>,
    languages: Vec<String>,
    interval: Duration,
    shutdown: Cancel,
}

impl Scheduler {
    pub fn new(
        worker_tx: Sender<WorkerRequest>,
        languages: Vec<String>,
        interval: Duration,
        shutdown: Cancel,
    ) -> Self {
        Self {
            worker_tx,
            languages,
            interval,
            shutdown,
        }
    }

    pub fn run(self) {
        log::info!("Scheduler thread started, interval {:?}", self.interval);

        loop {
            if self.shutdown.is_cancelled() {
                log::info!("Scheduler shutting down");
                return;
            }

            if !self.schedule() {
                return;
            }

            let next = Instant::now() + self.interval;
            while Instant::now() < next {
                if self.shutdown.is_cancelled() {
                    log::info!("Scheduler shutting down");
                    return;
                }
                thread::sleep(POLL_INTERVAL.min(next.saturating_duration_since(Instant::now())));
            }
        }
    }

    /// Returns false once the worker is gone.
    fn schedule(&self) -> bool {
        let request = WorkerRequest::Run {
            languages: self.languages.clone(),
        };
        match self.worker_tx.try_send(request) {
            Ok(()) => {
                log::debug!("Scheduled run for {:?}", self.languages);
                true
            }
            Err(TrySendError::Full(_)) => {
                log::info!("Previous run still queued, skipping this interval");
                true
            }
            Err(TrySendError::Disconnected(_)) => {
                log::warn!("Worker channel closed, stopping scheduler");
                false
            }
        }
    }
}

/// Handle for managing the scheduler thread.
pub struct SchedulerHandle {
    thread: Option<JoinHandle<()>>,
    shutdown: Cancel,
}

impl SchedulerHandle {
    pub fn spawn(
        worker_tx: Sender<WorkerRequest>,
        languages: Vec<String>,
        interval: Duration,
        shutdown: Cancel,
    ) -> Self {
        let scheduler = Scheduler::new(worker_tx, languages, interval, shutdown.clone());

        let thread = thread::Builder::new()
            .name("l10n-scheduler".to_string())
            .spawn(move || scheduler.run())
            .expect("failed to spawn scheduler thread");

        Self {
            thread: Some(thread),
            shutdown,
        }
    }

    /// Signal shutdown and wait for the thread to exit.
    pub fn shutdown(&mut self) {
        self.shutdown.cancel();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
