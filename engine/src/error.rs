//! Error types for the move engine.
//!
//! The primary error type is `EngineError`, which represents failures that
//! prevent a batch or a store operation from completing. Per-file transfer
//! failures are recorded on the batch result and the job, not raised as
//! `EngineError` past the mover.
//!
//! Display strings double as the input of the failure classifier, so they are
//! phrased after the condition they describe ("locked", "not found", ...).

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias used throughout the engine.
pub type Result<T, E = EngineError> = std::result::Result<T, E>;

/// Errors raised by the engine, the job store, and the file helpers.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A caller-supplied argument was rejected before any work started
    #[error("{reason} (argument `{name}`)")]
    InvalidArgument { name: &'static str, reason: String },

    /// Path is malformed or unusable
    #[error("Invalid path: {} ({reason})", path.display())]
    InvalidPath { path: PathBuf, reason: String },

    /// Source file vanished before or during the transfer
    #[error("Source file not found: {}", path.display())]
    SourceNotFound { path: PathBuf },

    /// Another process holds the file open without sharing
    #[error("File is locked, it is being used by another process: {}", path.display())]
    FileLocked { path: PathBuf, source: io::Error },

    /// Target volume ran out of space
    #[error("Not enough disk space to write: {}", path.display())]
    DiskFull { path: PathBuf, source: io::Error },

    /// The OS refused access to the file
    #[error("Permission denied: {}", path.display())]
    PermissionDenied { path: PathBuf, source: io::Error },

    /// Failed to read from source file
    #[error("Failed to read file {}: {source}", path.display())]
    ReadError { path: PathBuf, source: io::Error },

    /// Failed to write to destination file
    #[error("Failed to write file {}: {source}", path.display())]
    WriteError { path: PathBuf, source: io::Error },

    /// Failed to create a directory
    #[error("Failed to create directory {}: {source}", path.display())]
    DirectoryCreationFailed { path: PathBuf, source: io::Error },

    /// The operation observed a cancellation request
    #[error("Transfer cancelled")]
    Cancelled,

    /// Reading or writing a persisted JSON document failed
    #[error("Storage error at {}: {source}", path.display())]
    Store { path: PathBuf, source: io::Error },

    /// A persisted JSON document could not be parsed or produced
    #[error("Malformed data in {}: {source}", path.display())]
    Serialization {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// Catch-all for unexpected errors
    #[error("Engine error: {message}")]
    Unknown { message: String },
}

impl EngineError {
    /// Extract the OS error code from this error, if available.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::FileLocked { source, .. }
            | Self::DiskFull { source, .. }
            | Self::PermissionDenied { source, .. }
            | Self::ReadError { source, .. }
            | Self::WriteError { source, .. }
            | Self::DirectoryCreationFailed { source, .. }
            | Self::Store { source, .. } => source.raw_os_error(),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<io::Error> for EngineError {
    fn from(err: io::Error) -> Self {
        EngineError::Unknown {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_path() {
        let err = EngineError::SourceNotFound {
            path: PathBuf::from("/in/a.pdf"),
        };
        assert_eq!(err.to_string(), "Source file not found: /in/a.pdf");
    }

    #[test]
    fn test_raw_os_error_from_io_source() {
        let err = EngineError::WriteError {
            path: PathBuf::from("/out/a.pdf"),
            source: io::Error::from_raw_os_error(5),
        };
        assert_eq!(err.raw_os_error(), Some(5));
        assert_eq!(EngineError::Cancelled.raw_os_error(), None);
    }

    #[test]
    fn test_invalid_argument_message() {
        let err = EngineError::InvalidArgument {
            name: "destination_base",
            reason: "Destination base folder is required".to_string(),
        };
        assert!(err.to_string().starts_with("Destination base folder is required"));
    }
}
