//! Batch mover.
//!
//! `MoveEngine::move_batch` moves one batch of documents into a destination
//! folder. Every file is streamed into a collision-free target, retried with
//! backoff on failure, and its original copied into a temporary backup
//! directory before anything is deleted. Sources are only removed once every
//! document has been attempted; the backup is dropped when the whole batch
//! succeeded and kept (and reported) otherwise.
//!
//! A failing file never aborts the batch. The engine keeps no state between
//! calls.

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cancel::CancelToken;
use crate::error::{EngineError, Result};
use crate::fs_ops::{self, FileCopier, IoSide, StreamCopier, DEFAULT_BUFFER_SIZE};
use crate::model::{DocumentInfo, MoveBatchResult, MoveFailure};
use crate::progress::{DetailedMoveProgress, ProgressSink};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Tuning for the mover.
#[derive(Debug, Clone, PartialEq)]
pub struct MoveOptions {
    /// Copy buffer size in bytes
    pub buffer_size: usize,
    /// Copy attempts per file, including the first
    pub max_attempts: u32,
    /// Wait after the n-th failed attempt; the last entry repeats if short
    pub retry_delays: Vec<Duration>,
    /// Speeds above zero but below this (MB/s) are flagged as slow
    pub slow_transfer_threshold_mbps: f64,
    /// Where batch backup directories are created
    pub backup_root: PathBuf,
}

impl Default for MoveOptions {
    fn default() -> Self {
        MoveOptions {
            buffer_size: DEFAULT_BUFFER_SIZE,
            max_attempts: 3,
            retry_delays: vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
            ],
            slow_transfer_threshold_mbps: 10.0,
            backup_root: std::env::temp_dir(),
        }
    }
}

/// Moves batches of documents; see the module docs.
pub struct MoveEngine {
    options: MoveOptions,
    copier: Box<dyn FileCopier>,
}

/// Per-call bookkeeping.
struct Batch<'a> {
    documents: &'a [DocumentInfo],
    total_bytes: u64,
    started: Instant,
    /// Index of the document being attempted; everything before is settled
    cursor: usize,
    success_count: usize,
    bytes_transferred: u64,
    peak_speed_mbps: f64,
    failures: Vec<MoveFailure>,
    /// Sources whose copy and backup both succeeded
    backed_up: Vec<PathBuf>,
}

impl MoveEngine {
    pub fn new(options: MoveOptions) -> Self {
        let copier = StreamCopier::new(options.buffer_size);
        MoveEngine::with_copier(options, copier)
    }

    /// Use a custom copy primitive (tests inject failures this way).
    pub fn with_copier(options: MoveOptions, copier: impl FileCopier + 'static) -> Self {
        MoveEngine {
            options,
            copier: Box::new(copier),
        }
    }

    pub fn options(&self) -> &MoveOptions {
        &self.options
    }

    /// Move `documents` into `destination_base/destination_folder_name`.
    ///
    /// # Errors
    /// Returns `InvalidArgument` for a blank destination base or a folder name
    /// that is not a single path component, directory
    /// errors when the destination or backup directory cannot be created, and
    /// any error that escapes the per-file loop (such as cancellation) while
    /// no original has been backed up yet. Per-file failures are reported in
    /// the result instead.
    pub fn move_batch(
        &self,
        documents: &[DocumentInfo],
        destination_base: &Path,
        destination_folder_name: &str,
        progress: Option<&dyn ProgressSink>,
        cancel: &CancelToken,
    ) -> Result<MoveBatchResult> {
        if destination_base.to_string_lossy().trim().is_empty() {
            return Err(EngineError::InvalidArgument {
                name: "destination_base",
                reason: "Destination base folder is required".to_string(),
            });
        }

        let folder_name = resolve_folder_name(destination_folder_name, Local::now());
        validate_folder_name(&folder_name)?;
        fs_ops::create_dir_all(destination_base)?;
        let destination = destination_base.join(&folder_name);
        fs_ops::create_dir_all(&destination)?;
        let backup_directory = self.create_backup_directory()?;

        let mut batch = Batch {
            documents,
            total_bytes: documents.iter().map(|d| d.length).sum(),
            started: Instant::now(),
            cursor: 0,
            success_count: 0,
            bytes_transferred: 0,
            peak_speed_mbps: 0.0,
            failures: Vec::new(),
            backed_up: Vec::new(),
        };

        info!(
            destination = %destination.display(),
            files = documents.len(),
            bytes = batch.total_bytes,
            "Starting batch move"
        );

        if let Err(err) = self.transfer_all(&mut batch, &destination, &backup_directory, progress, cancel) {
            if batch.backed_up.is_empty() {
                if let Err(e) = fs::remove_dir_all(&backup_directory) {
                    warn!(path = %backup_directory.display(), error = %e, "Failed to remove backup directory");
                }
                return Err(err);
            }

            // Originals already sit in the backup; settle the rest as failures
            warn!(error = %err, "Batch interrupted, keeping backup for recovery");
            let reason = err.to_string();
            for document in &documents[batch.cursor..] {
                batch.failures.push(MoveFailure {
                    source_path: document.full_path.clone(),
                    reason: reason.clone(),
                });
            }
        }

        // Phase two: originals go only after the whole batch was attempted
        for source in &batch.backed_up {
            if let Err(e) = fs::remove_file(source) {
                warn!(path = %source.display(), error = %e, "Failed to delete moved original, backup retained");
            }
        }

        let backup_directory = if batch.failures.is_empty() {
            if let Err(e) = fs::remove_dir_all(&backup_directory) {
                warn!(path = %backup_directory.display(), error = %e, "Failed to remove backup directory");
            }
            None
        } else {
            Some(backup_directory)
        };

        let result = MoveBatchResult {
            destination_folder: destination,
            requested_count: documents.len(),
            success_count: batch.success_count,
            failures: batch.failures,
            bytes_transferred: batch.bytes_transferred,
            backup_directory,
        };
        log_transfer_statistics(&result, batch.started.elapsed(), batch.peak_speed_mbps);

        Ok(result)
    }

    fn transfer_all(
        &self,
        batch: &mut Batch<'_>,
        destination: &Path,
        backup_directory: &Path,
        progress: Option<&dyn ProgressSink>,
        cancel: &CancelToken,
    ) -> Result<()> {
        let documents = batch.documents;
        for (index, document) in documents.iter().enumerate() {
            batch.cursor = index;
            cancel.check()?;

            let target = fs_ops::unique_path(&destination.join(&document.file_name));
            let copied = {
                let prior_bytes = batch.bytes_transferred;
                let total_bytes = batch.total_bytes;
                let started = batch.started;
                let peak = &mut batch.peak_speed_mbps;
                let slow_threshold = self.options.slow_transfer_threshold_mbps;

                let mut on_chunk = |file_bytes: u64| {
                    let snapshot = snapshot(
                        document,
                        prior_bytes + file_bytes,
                        total_bytes,
                        file_bytes,
                        index,
                        documents.len(),
                        started.elapsed(),
                        slow_threshold,
                    );
                    if snapshot.speed_mbps > *peak {
                        *peak = snapshot.speed_mbps;
                    }
                    if let Some(sink) = progress {
                        sink.report(&snapshot);
                    }
                };
                self.copy_with_retry(&document.full_path, &target, &mut on_chunk, cancel)
            };

            let outcome = copied.and_then(|bytes| {
                match backup_original(&document.full_path, backup_directory) {
                    Ok(_) => Ok(bytes),
                    Err(e) => {
                        // Without a backup the source must stay; undo the copy
                        fs_ops::remove_file_quietly(&target);
                        Err(e)
                    }
                }
            });

            match outcome {
                Ok(bytes) => {
                    batch.backed_up.push(document.full_path.clone());
                    batch.bytes_transferred += bytes;
                    batch.success_count += 1;
                    debug!(source = %document.full_path.display(), target = %target.display(), "Moved file");
                }
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    warn!(source = %document.full_path.display(), error = %e, "Failed to move file");
                    batch.failures.push(MoveFailure {
                        source_path: document.full_path.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        batch.cursor = documents.len();
        Ok(())
    }

    /// Copy with the attempt schedule; a partial target never survives a failed attempt.
    fn copy_with_retry(
        &self,
        source: &Path,
        target: &Path,
        on_chunk: &mut dyn FnMut(u64),
        cancel: &CancelToken,
    ) -> Result<u64> {
        let max_attempts = self.options.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.copier.copy(source, target, on_chunk, cancel) {
                Ok(bytes) => return Ok(bytes),
                Err(err) => {
                    fs_ops::remove_file_quietly(target);
                    if err.is_cancelled() || attempt >= max_attempts {
                        return Err(err);
                    }

                    let delay = self.retry_delay(attempt);
                    debug!(
                        source = %source.display(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Copy failed, retrying"
                    );
                    cancel.sleep(delay)?;
                    attempt += 1;
                }
            }
        }
    }

    fn retry_delay(&self, failed_attempt: u32) -> Duration {
        let delays = &self.options.retry_delays;
        delays
            .get(failed_attempt as usize - 1)
            .or_else(|| delays.last())
            .copied()
            .unwrap_or_default()
    }

    fn create_backup_directory(&self) -> Result<PathBuf> {
        let suffix = Uuid::new_v4().simple().to_string();
        let name = format!(
            "docsort_backup_{}_{}",
            Local::now().format("%Y%m%d_%H%M%S"),
            &suffix[..8]
        );
        let path = self.options.backup_root.join(name);
        fs_ops::create_dir_all(&path)?;
        Ok(path)
    }
}

/// Trimmed folder name, or `Batch_<yyyyMMdd_HHmmss>` when blank.
pub fn resolve_folder_name(requested: &str, now: DateTime<Local>) -> String {
    let trimmed = requested.trim();
    if trimmed.is_empty() {
        format!("Batch_{}", now.format("%Y%m%d_%H%M%S"))
    } else {
        trimmed.to_string()
    }
}

/// Reject folder names that would not land directly under the destination base.
pub fn validate_folder_name(name: &str) -> Result<()> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(EngineError::InvalidArgument {
            name: "destination_folder_name",
            reason: format!("'{}' must be a single folder name without separators", name),
        }),
    }
}

fn backup_original(source: &Path, backup_directory: &Path) -> Result<PathBuf> {
    let file_name = source.file_name().ok_or_else(|| EngineError::InvalidPath {
        path: source.to_path_buf(),
        reason: "source has no file name".to_string(),
    })?;
    let backup_path = fs_ops::unique_path(&backup_directory.join(file_name));
    fs::copy(source, &backup_path).map_err(|e| fs_ops::io_error_for(e, source, IoSide::Read))?;
    Ok(backup_path)
}

#[allow(clippy::too_many_arguments)]
fn snapshot(
    document: &DocumentInfo,
    bytes_transferred: u64,
    total_bytes: u64,
    file_bytes: u64,
    completed_files: usize,
    total_files: usize,
    elapsed: Duration,
    slow_threshold_mbps: f64,
) -> DetailedMoveProgress {
    let seconds = elapsed.as_secs_f64();
    let speed_mbps = if seconds > 0.0 {
        bytes_transferred as f64 / seconds / BYTES_PER_MB
    } else {
        0.0
    };

    let estimated_time_remaining = (speed_mbps > 0.0).then(|| {
        let remaining = total_bytes.saturating_sub(bytes_transferred) as f64;
        Duration::from_secs_f64(remaining / (speed_mbps * BYTES_PER_MB))
    });

    DetailedMoveProgress {
        bytes_transferred,
        total_bytes,
        speed_mbps,
        estimated_time_remaining,
        current_file_name: document.file_name.clone(),
        current_file_bytes: file_bytes,
        current_file_total_bytes: document.length,
        completed_files,
        total_files,
        is_slow_transfer: speed_mbps > 0.0 && speed_mbps < slow_threshold_mbps,
    }
}

fn log_transfer_statistics(result: &MoveBatchResult, duration: Duration, peak_speed_mbps: f64) {
    let success_rate = if result.requested_count > 0 {
        result.success_count as f64 * 100.0 / result.requested_count as f64
    } else {
        0.0
    };
    let seconds = duration.as_secs_f64();
    let average_speed_mbps = if seconds > 0.0 {
        result.bytes_transferred as f64 / seconds / BYTES_PER_MB
    } else {
        0.0
    };

    info!(
        destination = %result.destination_folder.display(),
        duration_ms = duration.as_millis() as u64,
        requested = result.requested_count,
        succeeded = result.success_count,
        failed = result.failures.len(),
        success_rate = %format!("{success_rate:.1}%"),
        bytes = result.bytes_transferred,
        average_mbps = %format!("{average_speed_mbps:.1}"),
        peak_mbps = %format!("{peak_speed_mbps:.1}"),
        backup = ?result.backup_directory,
        "Transfer statistics"
    );
    for failure in &result.failures {
        info!(source = %failure.source_path.display(), reason = %failure.reason, "Transfer failure");
    }
}
