use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// A configured library root registered in the catalog.
#[derive(Debug, Clone, Serialize)]
pub struct Library {
    pub id: i64,
    pub name: String,
    pub root_path: String,
    /// Set once the folder tree has been synthesized and its aggregates verified.
    pub folders_ready: bool,
    pub created_at: String,
}

/// Lifecycle of a catalog file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Pending,
    Indexed,
    Orphaned,
    Quarantined,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Pending => "pending",
            FileStatus::Indexed => "indexed",
            FileStatus::Orphaned => "orphaned",
            FileStatus::Quarantined => "quarantined",
        }
    }

    /// pending→indexed, pending|indexed→orphaned, any→quarantined.
    /// Staying in the same state is always allowed.
    pub fn can_transition_to(self, next: FileStatus) -> bool {
        use FileStatus::*;
        if self == next {
            return true;
        }
        matches!(
            (self, next),
            (Pending, Indexed) | (Pending, Orphaned) | (Indexed, Orphaned) | (_, Quarantined)
        )
    }

    pub fn transition(self, next: FileStatus) -> Result<FileStatus, Error> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(Error::InvalidTransition {
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(FileStatus::Pending),
            "indexed" => Ok(FileStatus::Indexed),
            "orphaned" => Ok(FileStatus::Orphaned),
            "quarantined" => Ok(FileStatus::Quarantined),
            other => Err(Error::InvalidData(format!("unknown file status '{}'", other))),
        }
    }
}

/// Series lifecycle. Archived series keep their identity and come back on relink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeriesStatus {
    Active,
    Archived,
}

impl SeriesStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeriesStatus::Active => "active",
            SeriesStatus::Archived => "archived",
        }
    }

    pub fn archive(self) -> SeriesStatus {
        SeriesStatus::Archived
    }

    pub fn restore(self) -> SeriesStatus {
        SeriesStatus::Active
    }
}

impl fmt::Display for SeriesStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SeriesStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SeriesStatus::Active),
            "archived" => Ok(SeriesStatus::Archived),
            other => Err(Error::InvalidData(format!("unknown series status '{}'", other))),
        }
    }
}

/// One archive file tracked by the catalog.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogFile {
    pub id: i64,
    pub library_id: i64,
    pub absolute_path: String,
    /// `/`-separated path below the library root; unique per library.
    pub relative_path: String,
    pub file_name: String,
    pub extension: String,
    pub file_size: i64,
    pub last_modified: i64,
    pub fingerprint: Option<String>,
    pub status: FileStatus,
    pub folder_id: Option<i64>,
    pub series_id: Option<i64>,
    /// Cached embedded metadata as JSON.
    pub metadata_json: Option<String>,
}

/// Insert payload for a newly discovered file.
#[derive(Debug, Clone)]
pub struct NewCatalogFile {
    pub library_id: i64,
    pub absolute_path: String,
    pub relative_path: String,
    pub file_name: String,
    pub extension: String,
    pub file_size: i64,
    pub last_modified: i64,
    pub fingerprint: Option<String>,
    pub folder_id: Option<i64>,
}

/// Per-library prior state consumed by the planner.
#[derive(Debug, Clone)]
pub struct SnapshotEntry {
    pub id: i64,
    pub relative_path: String,
    pub fingerprint: Option<String>,
    pub status: FileStatus,
    pub series_id: Option<i64>,
}

/// A materialized path segment of a library's directory tree.
#[derive(Debug, Clone, Serialize)]
pub struct Folder {
    pub id: i64,
    pub library_id: i64,
    pub path: String,
    pub name: String,
    pub depth: i64,
    pub parent_id: Option<i64>,
    /// Files whose immediate folder is this one.
    pub file_count: i64,
    /// `file_count` plus every descendant's `file_count`.
    pub total_files: i64,
    pub child_count: i64,
    pub last_modified: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Series {
    pub id: i64,
    pub name: String,
    pub normalized_name: String,
    pub aliases: Vec<String>,
    pub start_year: Option<i32>,
    pub end_year: Option<i32>,
    pub publisher: Option<String>,
    pub external_ids: Vec<String>,
    pub status: SeriesStatus,
    pub cover_file_id: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct NewSeries {
    pub name: String,
    pub aliases: Vec<String>,
    pub start_year: Option<i32>,
    pub end_year: Option<i32>,
    pub publisher: Option<String>,
    pub external_ids: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SeriesProgress {
    pub series_id: i64,
    pub total_files: i64,
    pub read_files: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionItem {
    pub id: i64,
    pub collection_id: i64,
    pub file_id: Option<i64>,
    pub file_path: String,
    pub available: bool,
}

/// Status-count summary for one library.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LibraryStats {
    pub library_id: i64,
    pub name: String,
    pub total_files: i64,
    pub total_bytes: i64,
    pub pending: i64,
    pub indexed: i64,
    pub orphaned: i64,
    pub quarantined: i64,
    pub series: i64,
    pub folders: i64,
}
