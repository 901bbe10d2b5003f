//! Core data model for move jobs.
//!
//! This module defines the records the queue and the store share:
//! - Job: one batch-move request tracked end-to-end
//! - JobFile: a single document within a job
//! - JobError: a classified failure attached to a job
//! - DocumentInfo: a source document as produced by the enumerator
//! - MoveBatchResult / MoveFailure: the outcome of one mover invocation
//!
//! Jobs are serialized with camelCase field names; derived counts are computed
//! on demand and never persisted.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// File name used for the synthetic error of a job that failed as a whole.
pub const GENERAL_ERROR_FILE_NAME: &str = "General";

/// File name used for the synthetic error of a job found running at startup.
pub const INTERRUPTED_ERROR_FILE_NAME: &str = "Interrupted";

/// Message attached to interrupted jobs during crash recovery.
pub const INTERRUPTED_ERROR_MESSAGE: &str = "Job was interrupted when the application closed";

/// Represents a single move job.
///
/// A Job encompasses:
/// - The destination folder (name and full path)
/// - Every document submitted with it, with per-file outcome
/// - Status, progress, and classified errors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    /// Unique identifier for this job
    pub id: Uuid,

    /// Name of the destination folder
    pub folder_name: String,

    /// Full path to the destination folder
    pub destination_path: PathBuf,

    /// Documents in submission order
    #[serde(default)]
    pub files: Vec<JobFile>,

    /// Running or Completed
    pub status: JobStatus,

    /// Progress of the current (or last) pass, 0..=100
    #[serde(default)]
    pub progress_percentage: f64,

    /// Classified failures, at most one per file path
    #[serde(default)]
    pub errors: Vec<JobError>,

    /// When the job was created
    pub created_at: DateTime<Utc>,

    /// When the job was completed (None while running)
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,

    /// Sum of all file sizes
    #[serde(default)]
    pub total_bytes: u64,

    /// Bytes moved so far, including files finished in earlier passes
    #[serde(default)]
    pub bytes_transferred: u64,

    /// Backup of moved originals kept by a pass that had failures
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_directory: Option<PathBuf>,
}

/// A single document within a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobFile {
    pub file_name: String,
    pub source_path: PathBuf,
    pub size_bytes: u64,
    #[serde(default)]
    pub is_successful: bool,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// One classified failure tied to a file path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobError {
    /// Name of the file that failed, or a synthetic marker
    pub file_name: String,

    /// Full source path; empty for job-wide errors
    pub file_path: PathBuf,

    pub kind: JobErrorKind,

    pub message: String,

    /// How many times this path failed again after the first failure
    #[serde(default)]
    pub retry_count: u32,

    pub timestamp: DateTime<Utc>,
}

/// Coarse category of a transfer failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobErrorKind {
    /// Temporary error that may succeed on retry (e.g. file locked)
    Transient,
    /// Insufficient disk space
    DiskSpace,
    /// Permission denied
    Permissions,
    /// File not found, path too long or invalid
    FileSystem,
    /// Anything else
    Unknown,
}

impl fmt::Display for JobErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobErrorKind::Transient => write!(f, "Transient"),
            JobErrorKind::DiskSpace => write!(f, "DiskSpace"),
            JobErrorKind::Permissions => write!(f, "Permissions"),
            JobErrorKind::FileSystem => write!(f, "FileSystem"),
            JobErrorKind::Unknown => write!(f, "Unknown"),
        }
    }
}

/// The state of an entire job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    /// Queued or currently processing
    Running,
    /// Every file was attempted (some may have failed)
    Completed,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Running => write!(f, "Running"),
            JobStatus::Completed => write!(f, "Completed"),
        }
    }
}

/// A source document as described by the enumerator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentInfo {
    pub file_name: String,
    pub full_path: PathBuf,
    pub length: u64,
    pub last_write_time: DateTime<Utc>,
}

/// A file that could not be moved in a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveFailure {
    pub source_path: PathBuf,
    pub reason: String,
}

/// Outcome of one `MoveEngine::move_batch` call.
#[derive(Debug, Clone, PartialEq)]
pub struct MoveBatchResult {
    /// Folder the documents were moved into
    pub destination_folder: PathBuf,
    pub requested_count: usize,
    pub success_count: usize,
    pub failures: Vec<MoveFailure>,
    /// Bytes copied for the files that were moved
    pub bytes_transferred: u64,
    /// Kept backup of moved originals; Some iff `failures` is non-empty
    pub backup_directory: Option<PathBuf>,
}

impl MoveBatchResult {
    pub fn failure_for(&self, source_path: &Path) -> Option<&MoveFailure> {
        self.failures.iter().find(|f| f.source_path == source_path)
    }
}

impl Job {
    /// Build a new running job whose files mirror `documents` one to one.
    pub fn new(folder_name: &str, destination_base: &Path, documents: &[DocumentInfo]) -> Self {
        let files: Vec<JobFile> = documents.iter().map(JobFile::from_document).collect();
        let total_bytes = files.iter().map(|f| f.size_bytes).sum();

        Job {
            id: Uuid::new_v4(),
            folder_name: folder_name.to_string(),
            destination_path: destination_base.join(folder_name),
            files,
            status: JobStatus::Running,
            progress_percentage: 0.0,
            errors: Vec::new(),
            created_at: Utc::now(),
            completed_at: None,
            total_bytes,
            bytes_transferred: 0,
            backup_directory: None,
        }
    }

    pub fn successful_file_count(&self) -> usize {
        self.files.iter().filter(|f| f.is_successful).count()
    }

    /// Files that were attempted and carry an error message.
    pub fn failed_file_count(&self) -> usize {
        self.files
            .iter()
            .filter(|f| !f.is_successful && f.error_message.as_deref().is_some_and(|m| !m.is_empty()))
            .count()
    }

    pub fn total_file_count(&self) -> usize {
        self.files.len()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn is_completed(&self) -> bool {
        self.status == JobStatus::Completed
    }

    pub fn display_name(&self) -> String {
        format!("{} ({} files)", self.folder_name, self.total_file_count())
    }

    /// Key used to order finished jobs, newest first.
    pub fn recency(&self) -> DateTime<Utc> {
        self.completed_at.unwrap_or(self.created_at)
    }

    /// Files not yet moved, as documents for the next pass.
    pub fn pending_documents(&self) -> Vec<DocumentInfo> {
        self.files
            .iter()
            .filter(|f| !f.is_successful)
            .map(JobFile::to_document)
            .collect()
    }

    /// Bytes of files already moved in earlier passes.
    pub fn completed_bytes(&self) -> u64 {
        self.files
            .iter()
            .filter(|f| f.is_successful)
            .map(|f| f.size_bytes)
            .sum()
    }

    /// Terminal transition: completion time, 100%.
    pub fn mark_completed(&mut self, now: DateTime<Utc>) {
        self.status = JobStatus::Completed;
        self.completed_at = Some(now);
        self.progress_percentage = 100.0;
    }

    /// Force-complete a job that failed as a whole, attaching one general error.
    pub fn fail_with_general_error(&mut self, message: &str, now: DateTime<Utc>) {
        self.mark_completed(now);
        self.errors.push(JobError {
            file_name: GENERAL_ERROR_FILE_NAME.to_string(),
            file_path: PathBuf::new(),
            kind: JobErrorKind::Unknown,
            message: message.to_string(),
            retry_count: 0,
            timestamp: now,
        });
    }

    /// Recover a job left `Running` by a previous process.
    ///
    /// Returns false when the job was not running. The "Interrupted" marker is
    /// added at most once.
    pub fn mark_interrupted(&mut self, now: DateTime<Utc>) -> bool {
        if self.status != JobStatus::Running {
            return false;
        }

        self.status = JobStatus::Completed;
        self.completed_at.get_or_insert(now);
        self.progress_percentage = 100.0;

        let already_marked = self.errors.iter().any(|e| {
            e.kind == JobErrorKind::Unknown && e.file_name == INTERRUPTED_ERROR_FILE_NAME
        });
        if !already_marked {
            self.errors.push(JobError {
                file_name: INTERRUPTED_ERROR_FILE_NAME.to_string(),
                file_path: PathBuf::new(),
                kind: JobErrorKind::Unknown,
                message: INTERRUPTED_ERROR_MESSAGE.to_string(),
                retry_count: 0,
                timestamp: now,
            });
        }
        true
    }

    /// Reopen the job so that only its unsuccessful files are processed again.
    pub fn reset_for_retry(&mut self) {
        let mut retried: HashSet<PathBuf> = HashSet::new();
        for file in self.files.iter_mut().filter(|f| !f.is_successful) {
            file.error_message = None;
            retried.insert(file.source_path.clone());
        }

        self.errors.retain(|e| !retried.contains(&e.file_path));
        self.status = JobStatus::Running;
        self.completed_at = None;
        self.progress_percentage = 0.0;
        self.bytes_transferred = self.completed_bytes();
    }
}

/// Record a failure for `file`, refreshing the existing entry for the same path.
pub fn upsert_error(
    errors: &mut Vec<JobError>,
    file: &JobFile,
    kind: JobErrorKind,
    message: &str,
    now: DateTime<Utc>,
) {
    match errors.iter_mut().find(|e| e.file_path == file.source_path) {
        Some(existing) => {
            existing.retry_count += 1;
            existing.message = message.to_string();
            existing.timestamp = now;
        }
        None => errors.push(JobError {
            file_name: file.file_name.clone(),
            file_path: file.source_path.clone(),
            kind,
            message: message.to_string(),
            retry_count: 0,
            timestamp: now,
        }),
    }
}

impl JobFile {
    pub fn from_document(document: &DocumentInfo) -> Self {
        JobFile {
            file_name: document.file_name.clone(),
            source_path: document.full_path.clone(),
            size_bytes: document.length,
            is_successful: false,
            error_message: None,
        }
    }

    /// The last-write time is not tracked per job file; the mover never reads it.
    pub fn to_document(&self) -> DocumentInfo {
        DocumentInfo {
            file_name: self.file_name.clone(),
            full_path: self.source_path.clone(),
            length: self.size_bytes,
            last_write_time: Utc::now(),
        }
    }
}
