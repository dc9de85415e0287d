use ahash::{AHashMap, AHashSet};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::config::ScanSettings;
use crate::error::Error;
use crate::hasher::compute_fingerprint;
use crate::scanner::{DiscoveryResult, ScanError, SeriesDefinition};
use crate::storage::models::{FileStatus, Library, SnapshotEntry};
use crate::storage::Database;

/// A file on disk with no catalog counterpart.
#[derive(Debug, Clone, Serialize)]
pub struct NewFile {
    pub absolute_path: PathBuf,
    pub relative_path: String,
    pub file_name: String,
    pub extension: String,
    pub file_size: u64,
    pub last_modified: i64,
    pub fingerprint: Option<String>,
}

/// A cataloged file found again under a different path.
#[derive(Debug, Clone, Serialize)]
pub struct MovedFile {
    pub file_id: i64,
    pub old_relative_path: String,
    pub new_absolute_path: PathBuf,
    pub new_relative_path: String,
    pub new_file_name: String,
    pub fingerprint: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrphanedFile {
    pub file_id: i64,
    pub relative_path: String,
    pub series_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnchangedFile {
    pub file_id: i64,
    pub relative_path: String,
}

/// What a scan found, computed without touching the catalog.
#[derive(Debug, Clone, Serialize)]
pub struct ScanResult {
    pub library_id: i64,
    pub library_root: PathBuf,
    pub new_files: Vec<NewFile>,
    pub moved: Vec<MovedFile>,
    pub orphaned: Vec<OrphanedFile>,
    pub unchanged: Vec<UnchangedFile>,
    pub errors: Vec<ScanError>,
    /// Folder sidecar definitions seen during discovery, keyed by relative folder path.
    pub sidecars: HashMap<String, SeriesDefinition>,
    pub duration: Duration,
}

impl ScanResult {
    /// Ids of catalog rows this scan saw on disk, at their old or a new path.
    pub fn seen_file_ids(&self) -> HashSet<i64> {
        self.unchanged
            .iter()
            .map(|f| f.file_id)
            .chain(self.moved.iter().map(|m| m.file_id))
            .collect()
    }

    pub fn total_changes(&self) -> usize {
        self.new_files.len() + self.moved.len() + self.orphaned.len()
    }

    pub fn has_changes(&self) -> bool {
        self.total_changes() > 0
    }
}

/// The catalog side of a scan, loaded once before discovery results are classified.
pub struct ScanContext {
    pub library: Library,
    settings: ScanSettings,
    snapshot: Vec<SnapshotEntry>,
    by_path: AHashMap<String, usize>,
    /// Snapshot indices per fingerprint, lowest id first.
    by_fingerprint: AHashMap<String, Vec<usize>>,
}

impl ScanContext {
    pub fn load(db: &Database, library_id: i64, settings: &ScanSettings) -> Result<Self, Error> {
        let library = db
            .get_library(library_id)?
            .ok_or_else(|| Error::not_found("library", library_id))?;
        let snapshot = db.load_library_snapshot(library_id)?;
        Ok(Self::from_snapshot(library, settings.clone(), snapshot))
    }

    pub fn from_snapshot(
        library: Library,
        settings: ScanSettings,
        mut snapshot: Vec<SnapshotEntry>,
    ) -> Self {
        snapshot.sort_by_key(|entry| entry.id);

        let mut by_path = AHashMap::with_capacity(snapshot.len());
        let mut by_fingerprint: AHashMap<String, Vec<usize>> = AHashMap::new();
        for (idx, entry) in snapshot.iter().enumerate() {
            by_path.insert(entry.relative_path.clone(), idx);
            if let Some(fingerprint) = &entry.fingerprint {
                by_fingerprint.entry(fingerprint.clone()).or_default().push(idx);
            }
        }

        Self {
            library,
            settings,
            snapshot,
            by_path,
            by_fingerprint,
        }
    }
}

/// Classify discovered files against the catalog snapshot.
///
/// Path matches are unchanged. Everything else is fingerprinted in parallel, then claimed
/// in relative-path order: a file takes the lowest-id snapshot entry with its fingerprint
/// that is neither path-matched nor already claimed, and is new otherwise. Entries left
/// unclaimed are orphaned unless already in that state.
pub fn plan_scan(ctx: &ScanContext, discovery: DiscoveryResult, started: Instant) -> ScanResult {
    let DiscoveryResult {
        files,
        sidecars,
        mut errors,
    } = discovery;

    let mut matched: AHashSet<usize> = AHashSet::new();
    let mut unchanged = Vec::new();
    let mut unmatched = Vec::new();

    for file in files {
        match ctx.by_path.get(&file.relative_path) {
            Some(&idx) => {
                matched.insert(idx);
                unchanged.push(UnchangedFile {
                    file_id: ctx.snapshot[idx].id,
                    relative_path: file.relative_path,
                });
            }
            None => unmatched.push(file),
        }
    }

    let prefix_len = ctx.settings.fingerprint_prefix_bytes;
    let fingerprinted: Vec<_> = unmatched
        .into_par_iter()
        .map(|file| {
            let fingerprint =
                compute_fingerprint(&file.path, file.file_size, file.last_modified, prefix_len);
            (file, fingerprint)
        })
        .collect();

    let mut claimed: AHashSet<usize> = AHashSet::new();
    let mut new_files = Vec::new();
    let mut moved = Vec::new();

    for (file, fingerprint) in fingerprinted {
        let fingerprint = match fingerprint {
            Ok(fingerprint) => fingerprint,
            Err(e) => {
                errors.push(ScanError {
                    path: file.path.to_string_lossy().into_owned(),
                    message: format!("Error computing fingerprint: {}", e),
                });
                continue;
            }
        };

        let claim = ctx.by_fingerprint.get(&fingerprint).and_then(|indices| {
            indices
                .iter()
                .copied()
                .find(|idx| !matched.contains(idx) && !claimed.contains(idx))
        });

        match claim {
            Some(idx) => {
                claimed.insert(idx);
                let entry = &ctx.snapshot[idx];
                debug!("Move detected: '{}' -> '{}'", entry.relative_path, file.relative_path);
                moved.push(MovedFile {
                    file_id: entry.id,
                    old_relative_path: entry.relative_path.clone(),
                    new_absolute_path: file.path,
                    new_relative_path: file.relative_path,
                    new_file_name: file.file_name,
                    fingerprint,
                });
            }
            None => new_files.push(NewFile {
                absolute_path: file.path,
                relative_path: file.relative_path,
                file_name: file.file_name,
                extension: file.extension,
                file_size: file.file_size,
                last_modified: file.last_modified,
                fingerprint: Some(fingerprint),
            }),
        }
    }

    let orphaned: Vec<OrphanedFile> = ctx
        .snapshot
        .iter()
        .enumerate()
        .filter(|(idx, entry)| {
            !matched.contains(idx) && !claimed.contains(idx) && entry.status != FileStatus::Orphaned
        })
        .map(|(_, entry)| OrphanedFile {
            file_id: entry.id,
            relative_path: entry.relative_path.clone(),
            series_id: entry.series_id,
        })
        .collect();

    let result = ScanResult {
        library_id: ctx.library.id,
        library_root: PathBuf::from(&ctx.library.root_path),
        new_files,
        moved,
        orphaned,
        unchanged,
        errors,
        sidecars,
        duration: started.elapsed(),
    };

    info!(
        "Planned scan of '{}': {} new, {} moved, {} orphaned, {} unchanged, {} errors",
        ctx.library.name,
        result.new_files.len(),
        result.moved.len(),
        result.orphaned.len(),
        result.unchanged.len(),
        result.errors.len()
    );
    result
}
