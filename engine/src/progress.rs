//! Progress reporting.
//!
//! The mover reports a `DetailedMoveProgress` snapshot per copied chunk through
//! a `ProgressSink`, which keeps the engine independent of any UI technology.
//! The queue turns those snapshots into `JobEvent`s for observers; events are
//! owned values and can be received on any thread.

use std::time::Duration;

use uuid::Uuid;

use crate::model::Job;

/// Snapshot of a running batch, emitted after every chunk written.
#[derive(Debug, Clone, PartialEq)]
pub struct DetailedMoveProgress {
    /// Bytes moved in this batch, including the current file's partial bytes
    pub bytes_transferred: u64,
    pub total_bytes: u64,
    /// Average throughput since the batch started, in MB/s
    pub speed_mbps: f64,
    /// None until a positive speed is known
    pub estimated_time_remaining: Option<Duration>,
    pub current_file_name: String,
    pub current_file_bytes: u64,
    pub current_file_total_bytes: u64,
    /// Files finished before the current one
    pub completed_files: usize,
    pub total_files: usize,
    /// Positive speed below the configured slow-transfer threshold
    pub is_slow_transfer: bool,
}

/// Receives progress snapshots from the mover.
///
/// Called synchronously on the thread running the batch, in byte order within
/// a file and in file order within the batch.
pub trait ProgressSink: Send + Sync {
    fn report(&self, progress: &DetailedMoveProgress);
}

impl<F> ProgressSink for F
where
    F: Fn(&DetailedMoveProgress) + Send + Sync,
{
    fn report(&self, progress: &DetailedMoveProgress) {
        self(progress)
    }
}

/// Job-level progress message derived from a mover snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct JobProgress {
    pub job_id: Uuid,
    pub progress_percentage: f64,
    pub bytes_transferred: u64,
    pub detail: DetailedMoveProgress,
}

/// Notification broadcast by the job queue.
#[derive(Debug, Clone)]
pub enum JobEvent {
    /// The running job moved more bytes
    Progress(JobProgress),
    /// A job reached `Completed`; carries the final snapshot
    Completed(Job),
}

impl JobEvent {
    pub fn job_id(&self) -> Uuid {
        match self {
            JobEvent::Progress(progress) => progress.job_id,
            JobEvent::Completed(job) => job.id,
        }
    }
}
