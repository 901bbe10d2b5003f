//! Background job queue.
//!
//! `JobQueue` accepts move jobs, persists them, and drains them one at a time
//! on a worker thread through a `MoveEngine`. Observers follow along through
//! `JobEvent`s delivered over channels; every event carries an owned snapshot,
//! so no caller ever shares the job the worker is mutating.
//!
//! Lock order: `pending` before `current`, either of them before a job, a job
//! before `subscribers`. The processing gate is taken before all of them.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{Local, Utc};
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::cancel::CancelToken;
use crate::classify::classify_error;
use crate::error::{EngineError, Result};
use crate::model::{upsert_error, DocumentInfo, Job, MoveBatchResult};
use crate::mover::{resolve_folder_name, validate_folder_name, MoveEngine};
use crate::progress::{DetailedMoveProgress, JobEvent, JobProgress};
use crate::store::JobStore;

/// Queue tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueOptions {
    /// How long an idle worker sleeps before looking at the queue again
    pub poll_interval: Duration,
}

impl Default for QueueOptions {
    fn default() -> Self {
        QueueOptions {
            poll_interval: Duration::from_millis(500),
        }
    }
}

type SharedJob = Arc<Mutex<Job>>;

/// FIFO of move jobs with a single background worker.
pub struct JobQueue {
    engine: MoveEngine,
    store: Arc<JobStore>,
    options: QueueOptions,
    pending: Mutex<VecDeque<SharedJob>>,
    current: Mutex<Option<SharedJob>>,
    processing_gate: Mutex<()>,
    is_processing: AtomicBool,
    subscribers: Mutex<Vec<Sender<JobEvent>>>,
    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,
}

impl JobQueue {
    pub fn new(engine: MoveEngine, store: Arc<JobStore>, options: QueueOptions) -> Self {
        let (wake_tx, wake_rx) = crossbeam_channel::bounded(1);
        JobQueue {
            engine,
            store,
            options,
            pending: Mutex::new(VecDeque::new()),
            current: Mutex::new(None),
            processing_gate: Mutex::new(()),
            is_processing: AtomicBool::new(false),
            subscribers: Mutex::new(Vec::new()),
            wake_tx,
            wake_rx,
        }
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    /// Create a job for `documents`, persist it and queue it.
    ///
    /// A blank `folder_name` becomes `Batch_<timestamp>`. Returns a snapshot of
    /// the queued job; processing happens on the worker.
    ///
    /// # Errors
    /// `InvalidArgument` when `folder_name` is not a single path component.
    pub fn enqueue_job(
        &self,
        folder_name: &str,
        destination_base: &Path,
        documents: &[DocumentInfo],
    ) -> Result<Job> {
        let folder_name = resolve_folder_name(folder_name, Local::now());
        validate_folder_name(&folder_name)?;
        let job = Job::new(&folder_name, destination_base, documents);
        self.store.save_job(&job)?;

        info!(
            job_id = %job.id,
            folder = %job.folder_name,
            files = job.total_file_count(),
            bytes = job.total_bytes,
            "Job queued"
        );
        self.push(job.clone());
        Ok(job)
    }

    /// Re-queue `job` so that only its unsuccessful files are moved again.
    ///
    /// # Errors
    /// `InvalidArgument` when a job with the same id is already queued or
    /// running; store errors when the reset job cannot be persisted.
    pub fn retry_job(&self, job: &Job) -> Result<Job> {
        // Held until the push so a concurrent retry sees this one
        let mut pending = self.pending.lock();
        let running = self
            .current
            .lock()
            .as_ref()
            .is_some_and(|current| current.lock().id == job.id);
        if running || pending.iter().any(|queued| queued.lock().id == job.id) {
            return Err(EngineError::InvalidArgument {
                name: "job",
                reason: format!("Job {} is already queued or running", job.id),
            });
        }

        let mut job = job.clone();
        job.reset_for_retry();
        self.store.save_job(&job)?;

        info!(job_id = %job.id, files = job.pending_documents().len(), "Job queued for retry");
        pending.push_back(Arc::new(Mutex::new(job.clone())));
        drop(pending);
        self.wake();
        Ok(job)
    }

    /// Snapshot of the job being processed, if any.
    pub fn current_job(&self) -> Option<Job> {
        self.current.lock().as_ref().map(|job| job.lock().clone())
    }

    /// Snapshots of the waiting jobs in queue order.
    pub fn queued_jobs(&self) -> Vec<Job> {
        self.pending.lock().iter().map(|job| job.lock().clone()).collect()
    }

    pub fn is_processing(&self) -> bool {
        self.is_processing.load(Ordering::SeqCst)
    }

    /// Receive every event broadcast from now on.
    pub fn subscribe(&self) -> Receiver<JobEvent> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Spawn the worker thread. It runs until `cancel` fires.
    ///
    /// When a worker is already running the new thread exits immediately.
    pub fn start_processing(self: &Arc<Self>, cancel: CancelToken) -> JoinHandle<()> {
        let queue = Arc::clone(self);
        thread::spawn(move || queue.run(&cancel))
    }

    /// Worker loop: drain the queue, then wait for new work or the poll interval.
    pub fn run(&self, cancel: &CancelToken) {
        if self
            .is_processing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Job worker already running");
            return;
        }

        info!("Job worker started");
        while !cancel.is_cancelled() {
            if self.process_next(cancel) {
                continue;
            }
            // Woken early by enqueue; a timeout just means another look
            let _ = self.wake_rx.recv_timeout(self.options.poll_interval);
        }
        self.is_processing.store(false, Ordering::SeqCst);
        info!("Job worker stopped");
    }

    /// Process queued jobs on the calling thread until the queue is empty or
    /// `cancel` fires. Returns the number of jobs processed.
    pub fn process_pending(&self, cancel: &CancelToken) -> usize {
        let mut processed = 0;
        while !cancel.is_cancelled() && self.process_next(cancel) {
            processed += 1;
        }
        processed
    }

    fn push(&self, job: Job) {
        self.pending.lock().push_back(Arc::new(Mutex::new(job)));
        self.wake();
    }

    fn wake(&self) {
        let _ = self.wake_tx.try_send(());
    }

    fn process_next(&self, cancel: &CancelToken) -> bool {
        let _gate = self.processing_gate.lock();
        let job = {
            let mut pending = self.pending.lock();
            let Some(job) = pending.pop_front() else {
                return false;
            };
            *self.current.lock() = Some(Arc::clone(&job));
            job
        };

        let snapshot = self.process_job(&job, cancel);
        *self.current.lock() = None;
        // Observers may retry as soon as they see the completion
        self.broadcast(JobEvent::Completed(snapshot));
        true
    }

    /// Run one job to completion and persist it. Returns the final snapshot.
    fn process_job(&self, job: &SharedJob, cancel: &CancelToken) -> Job {
        let job_id = job.lock().id;
        info!(job_id = %job_id, "Processing job");

        let outcome = self.transfer(job, cancel);

        let snapshot = {
            let mut job = job.lock();
            if let Err(e) = outcome {
                error!(job_id = %job_id, error = %e, "Job failed");
                job.fail_with_general_error(&e.to_string(), Utc::now());
            }
            job.clone()
        };

        if let Err(e) = self.store.save_job(&snapshot) {
            warn!(job_id = %job_id, error = %e, "Failed to persist completed job");
        }

        info!(
            job_id = %job_id,
            succeeded = snapshot.successful_file_count(),
            failed = snapshot.failed_file_count(),
            errors = snapshot.errors.len(),
            "Job completed"
        );
        snapshot
    }

    fn transfer(&self, job: &SharedJob, cancel: &CancelToken) -> Result<()> {
        let (job_id, documents, destination_path, total_bytes, prior_bytes) = {
            let job = job.lock();
            (
                job.id,
                job.pending_documents(),
                job.destination_path.clone(),
                job.total_bytes,
                job.completed_bytes(),
            )
        };

        if documents.is_empty() {
            job.lock().mark_completed(Utc::now());
            return Ok(());
        }

        // Split the recorded destination so the mover writes exactly there
        let destination_base = destination_path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .ok_or_else(|| EngineError::InvalidPath {
                path: destination_path.clone(),
                reason: "destination has no parent folder".to_string(),
            })?;
        let folder_name = destination_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| EngineError::InvalidPath {
                path: destination_path.clone(),
                reason: "destination has no folder name".to_string(),
            })?;

        let sink = |detail: &DetailedMoveProgress| {
            let progress = {
                let mut job = job.lock();
                job.bytes_transferred = prior_bytes + detail.bytes_transferred;
                job.progress_percentage = percentage(job.bytes_transferred, total_bytes);
                JobProgress {
                    job_id,
                    progress_percentage: job.progress_percentage,
                    bytes_transferred: job.bytes_transferred,
                    detail: detail.clone(),
                }
            };
            self.broadcast(JobEvent::Progress(progress));
        };

        let result = self
            .engine
            .move_batch(&documents, destination_base, &folder_name, Some(&sink), cancel)?;

        if let Some(backup) = &result.backup_directory {
            warn!(
                job_id = %job_id,
                failed = result.failures.len(),
                backup = %backup.display(),
                "Originals of moved files kept in backup"
            );
        }
        reconcile(&mut job.lock(), &result, prior_bytes);
        Ok(())
    }

    fn broadcast(&self, event: JobEvent) {
        self.subscribers
            .lock()
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }
}

fn percentage(done: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (done as f64 * 100.0 / total as f64).min(100.0)
}

/// Write per-file outcomes of one pass back onto the job and complete it.
fn reconcile(job: &mut Job, result: &MoveBatchResult, prior_bytes: u64) {
    let now = Utc::now();
    for file in job.files.iter_mut().filter(|f| !f.is_successful) {
        match result.failure_for(&file.source_path) {
            Some(failure) => {
                file.error_message = Some(failure.reason.clone());
                let kind = classify_error(&failure.reason);
                upsert_error(&mut job.errors, file, kind, &failure.reason, now);
            }
            None => {
                file.is_successful = true;
                file.error_message = None;
            }
        }
    }

    if let Some(backup) = &result.backup_directory {
        job.backup_directory = Some(backup.clone());
    }
    job.bytes_transferred = prior_bytes + result.bytes_transferred;
    job.mark_completed(now);
}
