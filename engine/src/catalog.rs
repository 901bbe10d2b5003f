//! Snapshot of the last document scan.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::fs_ops;
use crate::model::DocumentInfo;

/// One indexed document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub path: PathBuf,
    pub length: u64,
    pub last_write_time: DateTime<Utc>,
    pub indexed_at: DateTime<Utc>,
}

impl CatalogEntry {
    pub fn from_document(document: &DocumentInfo, indexed_at: DateTime<Utc>) -> Self {
        CatalogEntry {
            path: document.full_path.clone(),
            length: document.length,
            last_write_time: document.last_write_time,
            indexed_at,
        }
    }
}

/// JSON file holding the most recent scan; each save replaces the previous one.
#[derive(Debug, Clone)]
pub struct CatalogStore {
    path: PathBuf,
}

impl CatalogStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        CatalogStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save_snapshot(&self, entries: &[CatalogEntry]) -> Result<()> {
        debug!(path = %self.path.display(), count = entries.len(), "Saving catalog snapshot");
        fs_ops::write_json_atomic(&self.path, entries)
    }

    /// Entries of the last snapshot; empty when none was saved yet.
    pub fn load_snapshot(&self) -> Result<Vec<CatalogEntry>> {
        Ok(fs_ops::read_json::<Vec<CatalogEntry>>(&self.path)?.unwrap_or_default())
    }
}
