//! Durable job history.
//!
//! `JobStore` keeps every job in one JSON array on disk with an in-memory cache
//! in front of it. The cache is filled on first use; `reload` re-reads the file.
//! Each public call holds the store mutex for its whole duration, and the
//! private helpers only ever work on the already-locked state.
//!
//! Loading doubles as crash recovery: a job still marked `Running` belonged to
//! a process that never finished it, so it is closed out as completed with an
//! "Interrupted" error and the repaired collection is written back.

use std::path::{Path, PathBuf};

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::fs_ops;
use crate::model::Job;

#[derive(Debug, Default)]
struct StoreState {
    jobs: Vec<Job>,
    loaded: bool,
}

/// JSON-file-backed job collection.
#[derive(Debug)]
pub struct JobStore {
    /// None keeps jobs in memory only
    path: Option<PathBuf>,
    state: Mutex<StoreState>,
}

impl JobStore {
    /// Store backed by the JSON file at `path`. Nothing is read until first use.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JobStore {
            path: Some(path.into()),
            state: Mutex::new(StoreState::default()),
        }
    }

    /// Store that never touches the disk.
    pub fn in_memory() -> Self {
        JobStore {
            path: None,
            state: Mutex::new(StoreState::default()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// All jobs in stored order, loading them on first use.
    pub fn load_jobs(&self) -> Result<Vec<Job>> {
        let mut state = self.state.lock();
        self.ensure_loaded(&mut state)?;
        Ok(state.jobs.clone())
    }

    /// Drop the cache and read the file again.
    pub fn reload(&self) -> Result<Vec<Job>> {
        let mut state = self.state.lock();
        state.loaded = false;
        self.ensure_loaded(&mut state)?;
        Ok(state.jobs.clone())
    }

    /// Insert or replace `job` by id and rewrite the file.
    pub fn save_job(&self, job: &Job) -> Result<()> {
        let mut state = self.state.lock();
        self.ensure_loaded(&mut state)?;

        match state.jobs.iter_mut().find(|j| j.id == job.id) {
            Some(existing) => *existing = job.clone(),
            None => state.jobs.push(job.clone()),
        }
        self.persist(&state.jobs)
    }

    /// Completed jobs, most recent first, paged.
    pub fn completed_jobs(&self, skip: usize, take: usize) -> Result<Vec<Job>> {
        let mut state = self.state.lock();
        self.ensure_loaded(&mut state)?;

        let mut completed: Vec<&Job> = state.jobs.iter().filter(|j| j.is_completed()).collect();
        // sort_by is stable, so ties keep stored order
        completed.sort_by(|a, b| b.recency().cmp(&a.recency()));

        Ok(completed.into_iter().skip(skip).take(take).cloned().collect())
    }

    pub fn completed_job_count(&self) -> Result<usize> {
        let mut state = self.state.lock();
        self.ensure_loaded(&mut state)?;
        Ok(state.jobs.iter().filter(|j| j.is_completed()).count())
    }

    pub fn job(&self, id: Uuid) -> Result<Option<Job>> {
        let mut state = self.state.lock();
        self.ensure_loaded(&mut state)?;
        Ok(state.jobs.iter().find(|j| j.id == id).cloned())
    }

    fn ensure_loaded(&self, state: &mut StoreState) -> Result<()> {
        if state.loaded {
            return Ok(());
        }

        let jobs = match &self.path {
            Some(path) => fs_ops::read_json::<Vec<Job>>(path)?.unwrap_or_default(),
            None => Vec::new(),
        };
        state.jobs = jobs;
        state.loaded = true;
        debug!(count = state.jobs.len(), "Loaded jobs");

        let now = Utc::now();
        let recovered = state
            .jobs
            .iter_mut()
            .map(|job| job.mark_interrupted(now))
            .filter(|&changed| changed)
            .count();

        if recovered > 0 {
            info!(count = recovered, "Recovered interrupted jobs");
            if let Err(e) = self.persist(&state.jobs) {
                warn!(error = %e, "Failed to write back recovered jobs");
            }
        }
        Ok(())
    }

    fn persist(&self, jobs: &[Job]) -> Result<()> {
        match &self.path {
            Some(path) => fs_ops::write_json_atomic(path, jobs),
            None => Ok(()),
        }
    }
}
