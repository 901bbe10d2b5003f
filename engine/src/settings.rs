//! Persisted user settings and the data directory layout.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::fs_ops;
use crate::mover::MoveOptions;
use crate::queue::QueueOptions;

/// Environment variable that overrides the data directory.
pub const DATA_DIR_ENV: &str = "DOCSORT_DATA_DIR";

pub const JOBS_FILE_NAME: &str = "jobs.json";
pub const CATALOG_FILE_NAME: &str = "catalog.json";
pub const SETTINGS_FILE_NAME: &str = "settings.json";

/// User preferences. Unknown or missing fields fall back to their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub last_source_folder: Option<PathBuf>,
    pub last_destination_folder: Option<PathBuf>,
    pub last_destination_folder_name: Option<String>,
    pub include_subdirectories: bool,
    /// Extension of the documents to pick up, without the dot
    pub document_extension: String,
    pub buffer_size_mb: usize,
    pub max_attempts: u32,
    pub retry_delays_ms: Vec<u64>,
    pub slow_transfer_threshold_mbps: f64,
    pub queue_poll_interval_ms: u64,
    /// When off, jobs live in memory only
    pub enable_job_persistence: bool,
    /// Daily log files are written here when set
    pub log_directory: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            last_source_folder: None,
            last_destination_folder: None,
            last_destination_folder_name: None,
            include_subdirectories: true,
            document_extension: "pdf".to_string(),
            buffer_size_mb: 16,
            max_attempts: 3,
            retry_delays_ms: vec![1000, 2000, 4000],
            slow_transfer_threshold_mbps: 10.0,
            queue_poll_interval_ms: 500,
            enable_job_persistence: true,
            log_directory: None,
        }
    }
}

impl Settings {
    /// Read settings from `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        Ok(fs_ops::read_json::<Settings>(path)?.unwrap_or_default())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        fs_ops::write_json_atomic(path, self)
    }

    pub fn move_options(&self) -> MoveOptions {
        MoveOptions {
            buffer_size: self.buffer_size_mb.max(1) * 1024 * 1024,
            max_attempts: self.max_attempts.max(1),
            retry_delays: self
                .retry_delays_ms
                .iter()
                .map(|ms| Duration::from_millis(*ms))
                .collect(),
            slow_transfer_threshold_mbps: self.slow_transfer_threshold_mbps,
            ..MoveOptions::default()
        }
    }

    pub fn queue_options(&self) -> QueueOptions {
        QueueOptions {
            poll_interval: Duration::from_millis(self.queue_poll_interval_ms.max(1)),
        }
    }
}

/// Default data directory: `$DOCSORT_DATA_DIR`, else `<platform data dir>/docsort`.
pub fn data_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(DATA_DIR_ENV).filter(|d| !d.is_empty()) {
        return PathBuf::from(dir);
    }
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("docsort")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_missing_file_gives_defaults() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let settings = Settings::load(&temp_dir.path().join(SETTINGS_FILE_NAME)).expect("Failed to load");

        assert_eq!(settings, Settings::default());
        assert!(settings.include_subdirectories);
        assert_eq!(settings.document_extension, "pdf");
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join(SETTINGS_FILE_NAME);
        fs::write(&path, r#"{ "maxAttempts": 5, "lastSourceFolder": "/scans" }"#).expect("Failed to write");

        let settings = Settings::load(&path).expect("Failed to load");

        assert_eq!(settings.max_attempts, 5);
        assert_eq!(settings.last_source_folder, Some(PathBuf::from("/scans")));
        assert_eq!(settings.buffer_size_mb, 16);
        assert_eq!(settings.retry_delays_ms, vec![1000, 2000, 4000]);
    }

    #[test]
    fn test_save_then_load() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("nested").join(SETTINGS_FILE_NAME);
        let settings = Settings {
            last_destination_folder_name: Some("Taxes".to_string()),
            enable_job_persistence: false,
            ..Settings::default()
        };

        settings.save(&path).expect("Failed to save");

        assert_eq!(Settings::load(&path).expect("Failed to load"), settings);
        let text = fs::read_to_string(&path).expect("Failed to read");
        assert!(text.contains("lastDestinationFolderName"));
    }

    #[test]
    fn test_derived_options() {
        let settings = Settings {
            buffer_size_mb: 0,
            retry_delays_ms: vec![0, 10],
            queue_poll_interval_ms: 250,
            ..Settings::default()
        };

        let move_options = settings.move_options();
        assert_eq!(move_options.buffer_size, 1024 * 1024);
        assert_eq!(move_options.max_attempts, 3);
        assert_eq!(move_options.retry_delays, vec![Duration::ZERO, Duration::from_millis(10)]);
        assert_eq!(settings.queue_options().poll_interval, Duration::from_millis(250));
    }
}
