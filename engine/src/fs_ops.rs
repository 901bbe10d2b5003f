//! Filesystem operations module.
//!
//! This module provides low-level operations for:
//! - Enumerating source documents lazily
//! - Streaming file copies with progress and metadata preservation
//! - Resolving collision-free target names
//! - Reading and atomically rewriting JSON documents

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::cancel::CancelToken;
use crate::error::{EngineError, Result};
use crate::model::DocumentInfo;

/// Default copy buffer: large enough that big scans stream in few syscalls.
pub const DEFAULT_BUFFER_SIZE: usize = 16 * 1024 * 1024;

/// Which side of a transfer an I/O error happened on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoSide {
    Read,
    Write,
}

/// Copy primitive used by the mover.
///
/// `on_chunk` receives the cumulative bytes written for this file after every
/// chunk. Implementations check `cancel` between chunks. Cleaning up a partial
/// destination on failure is the caller's job.
pub trait FileCopier: Send + Sync {
    fn copy(
        &self,
        source: &Path,
        destination: &Path,
        on_chunk: &mut dyn FnMut(u64),
        cancel: &CancelToken,
    ) -> Result<u64>;
}

/// Buffered streaming copy that preserves the source modification time.
#[derive(Debug, Clone)]
pub struct StreamCopier {
    buffer_size: usize,
}

impl StreamCopier {
    pub fn new(buffer_size: usize) -> Self {
        StreamCopier {
            buffer_size: buffer_size.max(1),
        }
    }
}

impl Default for StreamCopier {
    fn default() -> Self {
        StreamCopier::new(DEFAULT_BUFFER_SIZE)
    }
}

impl FileCopier for StreamCopier {
    fn copy(
        &self,
        source: &Path,
        destination: &Path,
        on_chunk: &mut dyn FnMut(u64),
        cancel: &CancelToken,
    ) -> Result<u64> {
        ensure_parent_dir_exists(destination)?;

        let mut src_file =
            fs::File::open(source).map_err(|e| io_error_for(e, source, IoSide::Read))?;
        let src_mtime = src_file
            .metadata()
            .map_err(|e| io_error_for(e, source, IoSide::Read))?
            .modified()
            .ok();

        let mut dst_file =
            fs::File::create(destination).map_err(|e| io_error_for(e, destination, IoSide::Write))?;

        let mut buffer = vec![0u8; self.buffer_size];
        let mut bytes_copied = 0u64;
        loop {
            cancel.check()?;
            let read = match src_file.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(io_error_for(e, source, IoSide::Read)),
            };
            dst_file
                .write_all(&buffer[..read])
                .map_err(|e| io_error_for(e, destination, IoSide::Write))?;
            bytes_copied += read as u64;
            on_chunk(bytes_copied);
        }

        dst_file
            .flush()
            .and_then(|_| dst_file.sync_all())
            .map_err(|e| io_error_for(e, destination, IoSide::Write))?;
        drop(dst_file);

        if let Some(mtime) = src_mtime {
            let _ = filetime::set_file_mtime(destination, filetime::FileTime::from_system_time(mtime));
        }

        Ok(bytes_copied)
    }
}

/// Map an `io::Error` on `path` to the most specific engine error.
pub fn io_error_for(err: io::Error, path: &Path, side: IoSide) -> EngineError {
    let path = path.to_path_buf();

    if let Some(code) = err.raw_os_error() {
        if is_sharing_violation(code) {
            return EngineError::FileLocked { path, source: err };
        }
        if is_disk_full(code) {
            return EngineError::DiskFull { path, source: err };
        }
    }

    match (err.kind(), side) {
        (io::ErrorKind::NotFound, IoSide::Read) => EngineError::SourceNotFound { path },
        (io::ErrorKind::PermissionDenied, _) => EngineError::PermissionDenied { path, source: err },
        (_, IoSide::Read) => EngineError::ReadError { path, source: err },
        (_, IoSide::Write) => EngineError::WriteError { path, source: err },
    }
}

#[cfg(windows)]
fn is_sharing_violation(code: i32) -> bool {
    // ERROR_SHARING_VIOLATION, ERROR_LOCK_VIOLATION
    matches!(code, 32 | 33)
}

#[cfg(not(windows))]
fn is_sharing_violation(code: i32) -> bool {
    // ETXTBSY
    code == 26
}

#[cfg(windows)]
fn is_disk_full(code: i32) -> bool {
    // ERROR_HANDLE_DISK_FULL, ERROR_DISK_FULL
    matches!(code, 39 | 112)
}

#[cfg(not(windows))]
fn is_disk_full(code: i32) -> bool {
    // ENOSPC
    code == 28
}

/// Return `path` if free, otherwise the first free `name_N.ext` sibling.
pub fn unique_path(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }

    let directory = path.parent().unwrap_or_else(|| Path::new(""));
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let mut counter = 1u32;
    loop {
        let candidate = directory.join(format!("{stem}_{counter}{extension}"));
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}

/// Create `path` and its parents.
pub fn create_dir_all(path: &Path) -> Result<()> {
    fs::create_dir_all(path).map_err(|e| EngineError::DirectoryCreationFailed {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Ensure the parent directory of a path exists, creating it if necessary.
pub fn ensure_parent_dir_exists(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            if parent.is_dir() {
                Ok(())
            } else if parent.exists() {
                Err(EngineError::DirectoryCreationFailed {
                    path: parent.to_path_buf(),
                    source: io::Error::new(
                        io::ErrorKind::InvalidInput,
                        "Parent path exists but is not a directory",
                    ),
                })
            } else {
                create_dir_all(parent)
            }
        }
        _ => Ok(()),
    }
}

/// Remove a file, ignoring a missing one and logging anything else.
pub fn remove_file_quietly(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove file"),
    }
}

/// Describe one file on disk as a document.
pub fn document_info(path: &Path) -> Result<DocumentInfo> {
    let metadata = fs::metadata(path).map_err(|e| io_error_for(e, path, IoSide::Read))?;
    if !metadata.is_file() {
        return Err(EngineError::InvalidPath {
            path: path.to_path_buf(),
            reason: "not a regular file".to_string(),
        });
    }

    let last_write_time = metadata
        .modified()
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now());

    Ok(DocumentInfo {
        file_name: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        full_path: path.to_path_buf(),
        length: metadata.len(),
        last_write_time,
    })
}

/// Lazily enumerate documents under `root`.
///
/// Only files whose extension matches `extension` (case-insensitive) are
/// yielded; `None` yields every file. A blank or missing root yields nothing.
/// Unreadable entries are skipped. The sequence stops once `cancel` fires.
pub fn enumerate_documents(
    root: &Path,
    recursive: bool,
    extension: Option<&str>,
    cancel: &CancelToken,
) -> impl Iterator<Item = DocumentInfo> {
    let extension = extension
        .map(|e| e.trim_start_matches('.').to_lowercase())
        .filter(|e| !e.is_empty());
    let cancel = cancel.clone();
    let blank = root.as_os_str().is_empty();

    let walker = WalkDir::new(root)
        .min_depth(1)
        .max_depth(if recursive { usize::MAX } else { 1 })
        .sort_by_file_name();

    walker
        .into_iter()
        .take_while(move |_| !blank && !cancel.is_cancelled())
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!(error = %e, "Skipping unreadable entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter(move |entry| match &extension {
            Some(wanted) => entry
                .path()
                .extension()
                .is_some_and(|ext| ext.to_string_lossy().to_lowercase() == *wanted),
            None => true,
        })
        .filter_map(|entry| match document_info(entry.path()) {
            Ok(document) => Some(document),
            Err(e) => {
                debug!(path = %entry.path().display(), error = %e, "Skipping document");
                None
            }
        })
}

/// Read a JSON document; a missing or empty file reads as `None`.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(EngineError::Store {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };

    if text.trim().is_empty() {
        return Ok(None);
    }

    serde_json::from_str(&text)
        .map(Some)
        .map_err(|e| EngineError::Serialization {
            path: path.to_path_buf(),
            source: e,
        })
}

/// Write a JSON document via a temp file and rename, so readers never see a torn file.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    ensure_parent_dir_exists(path)?;

    let json = serde_json::to_string_pretty(value).map_err(|e| EngineError::Serialization {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let store_err = |e: io::Error| EngineError::Store {
        path: path.to_path_buf(),
        source: e,
    };
    fs::write(&tmp, json).map_err(store_err)?;
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        store_err(e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_copy_reports_chunks() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("source.pdf");
        let dst = temp_dir.path().join("out").join("dest.pdf");
        fs::write(&src, vec![7u8; 10]).expect("Failed to write source");

        let copier = StreamCopier::new(4);
        let mut seen = Vec::new();
        let bytes = copier
            .copy(&src, &dst, &mut |n| seen.push(n), &CancelToken::new())
            .expect("Failed to copy");

        assert_eq!(bytes, 10);
        assert_eq!(seen, vec![4, 8, 10]);
        assert_eq!(fs::read(&dst).expect("Failed to read dest"), vec![7u8; 10]);
    }

    #[test]
    fn test_stream_copy_preserves_mtime() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("source.pdf");
        let dst = temp_dir.path().join("dest.pdf");
        fs::write(&src, b"content").expect("Failed to write source");
        let old = filetime::FileTime::from_unix_time(1_000_000_000, 0);
        filetime::set_file_mtime(&src, old).expect("Failed to set mtime");

        StreamCopier::default()
            .copy(&src, &dst, &mut |_| {}, &CancelToken::new())
            .expect("Failed to copy");

        let meta = fs::metadata(&dst).expect("Failed to stat dest");
        assert_eq!(filetime::FileTime::from_last_modification_time(&meta), old);
    }

    #[test]
    fn test_stream_copy_stops_when_cancelled() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("source.pdf");
        let dst = temp_dir.path().join("dest.pdf");
        fs::write(&src, vec![1u8; 64]).expect("Failed to write source");

        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        let result = StreamCopier::new(8).copy(&src, &dst, &mut |_| trigger.cancel(), &cancel);

        assert!(result.expect_err("Copy should be cancelled").is_cancelled());
    }

    #[test]
    fn test_missing_source_is_not_found() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let result = StreamCopier::default().copy(
            &temp_dir.path().join("missing.pdf"),
            &temp_dir.path().join("dest.pdf"),
            &mut |_| {},
            &CancelToken::new(),
        );

        let err = result.expect_err("Copy of a missing file should fail");
        assert!(matches!(err, EngineError::SourceNotFound { .. }));
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_io_error_for_maps_kinds() {
        let path = Path::new("/x/a.pdf");
        let denied = io_error_for(io::Error::from(io::ErrorKind::PermissionDenied), path, IoSide::Write);
        assert!(matches!(denied, EngineError::PermissionDenied { .. }));

        let other = io_error_for(io::Error::from(io::ErrorKind::UnexpectedEof), path, IoSide::Read);
        assert!(matches!(other, EngineError::ReadError { .. }));

        #[cfg(not(windows))]
        {
            let full = io_error_for(io::Error::from_raw_os_error(28), path, IoSide::Write);
            assert!(matches!(full, EngineError::DiskFull { .. }));
        }
    }

    #[test]
    fn test_unique_path_appends_counter() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let target = temp_dir.path().join("scan.pdf");
        assert_eq!(unique_path(&target), target);

        fs::write(&target, b"a").expect("Failed to write");
        assert_eq!(unique_path(&target), temp_dir.path().join("scan_1.pdf"));

        fs::write(temp_dir.path().join("scan_1.pdf"), b"b").expect("Failed to write");
        assert_eq!(unique_path(&target), temp_dir.path().join("scan_2.pdf"));
    }

    #[test]
    fn test_unique_path_without_extension() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let target = temp_dir.path().join("README");
        fs::write(&target, b"a").expect("Failed to write");

        assert_eq!(unique_path(&target), temp_dir.path().join("README_1"));
    }

    #[test]
    fn test_ensure_parent_dir_exists() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("subdir").join("file.txt");

        ensure_parent_dir_exists(&path).expect("Failed to create parent");

        assert!(temp_dir.path().join("subdir").is_dir());
    }

    #[test]
    fn test_enumerate_filters_extension_and_depth() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let root = temp_dir.path();
        fs::create_dir(root.join("nested")).expect("Failed to create nested dir");
        fs::write(root.join("a.pdf"), b"12").expect("Failed to write");
        fs::write(root.join("B.PDF"), b"345").expect("Failed to write");
        fs::write(root.join("notes.txt"), b"x").expect("Failed to write");
        fs::write(root.join("nested").join("c.pdf"), b"6789").expect("Failed to write");

        let cancel = CancelToken::new();
        let flat: Vec<_> = enumerate_documents(root, false, Some("pdf"), &cancel).collect();
        let deep: Vec<_> = enumerate_documents(root, true, Some(".pdf"), &cancel).collect();
        let all: Vec<_> = enumerate_documents(root, true, None, &cancel).collect();

        assert_eq!(flat.len(), 2);
        assert_eq!(deep.len(), 3);
        assert_eq!(all.len(), 4);
        let sizes: u64 = deep.iter().map(|d| d.length).sum();
        assert_eq!(sizes, 9);
    }

    #[test]
    fn test_enumerate_missing_or_blank_root_is_empty() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let cancel = CancelToken::new();

        assert_eq!(enumerate_documents(&temp_dir.path().join("nope"), true, None, &cancel).count(), 0);
        assert_eq!(enumerate_documents(Path::new(""), true, None, &cancel).count(), 0);
    }

    #[test]
    fn test_enumerate_stops_after_cancel() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        for i in 0..5 {
            fs::write(temp_dir.path().join(format!("{i}.pdf")), b"x").expect("Failed to write");
        }

        let cancel = CancelToken::new();
        let mut seen = 0;
        for _ in enumerate_documents(temp_dir.path(), false, Some("pdf"), &cancel) {
            seen += 1;
            cancel.cancel();
        }

        assert_eq!(seen, 1);
    }

    #[test]
    fn test_json_round_trip_is_atomic() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("data").join("values.json");

        assert_eq!(read_json::<Vec<u32>>(&path).expect("Read should succeed"), None);

        write_json_atomic(&path, &vec![1u32, 2, 3]).expect("Failed to write json");
        let back: Option<Vec<u32>> = read_json(&path).expect("Failed to read json");

        assert_eq!(back, Some(vec![1, 2, 3]));
        assert!(!temp_dir.path().join("data").join("values.json.tmp").exists());
    }

    #[test]
    fn test_read_json_reports_corruption() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("broken.json");
        fs::write(&path, b"{ not json").expect("Failed to write");

        let err = read_json::<Vec<u32>>(&path).expect_err("Corrupt json should fail");
        assert!(matches!(err, EngineError::Serialization { .. }));
    }
}
