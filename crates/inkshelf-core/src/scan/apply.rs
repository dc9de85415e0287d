use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::plan::{MovedFile, NewFile, ScanResult};
use super::removal::remove_catalog_file;
use crate::config::ScanSettings;
use crate::error::Error;
use crate::folders::path::folder_of_file;
use crate::folders::{ensure_folder_path, increment_folder_file_counts};
use crate::hasher::compute_fingerprint;
use crate::scanner::walk::modified_secs;
use crate::scanner::ScanError;
use crate::series::settle_series;
use crate::storage::models::{CatalogFile, FileStatus, NewCatalogFile};
use crate::storage::Database;

#[derive(Debug, Default, Clone)]
pub struct ApplyOutcome {
    pub added: usize,
    pub moved: usize,
    pub removed: usize,
    /// Rows left in `orphaned` by an earlier interrupted apply and removed now.
    pub healed: usize,
    /// Orphaned rows seen on disk again, removed and cataloged under a fresh id.
    pub readded: usize,
    pub series_archived: usize,
    /// Ids of rows inserted by this apply, in plan order.
    pub new_file_ids: Vec<i64>,
    /// Plan entries that could not be applied; the rest of the plan still went through.
    pub errors: Vec<ScanError>,
    pub duration: Duration,
}

impl ApplyOutcome {
    pub fn total_removed(&self) -> usize {
        self.removed + self.healed
    }
}

/// Write a scan plan to the catalog: inserts, then moves, then removals, then self-heal
/// of stale orphaned rows, then settlement of every series that lost files.
///
/// A stale orphaned row whose file this scan saw on disk is removed like any other and
/// the file is inserted again as `pending`, so it is linked afresh by the pipeline.
pub fn apply_scan_results(
    db: &Database,
    result: &ScanResult,
    settings: &ScanSettings,
) -> Result<ApplyOutcome, Error> {
    let started = Instant::now();
    let library = db
        .get_library(result.library_id)?
        .ok_or_else(|| Error::not_found("library", result.library_id))?;

    let mut outcome = ApplyOutcome::default();
    let mut touched_series: Vec<i64> = Vec::new();

    for file in &result.new_files {
        if let Some(file_id) = insert_new_file(db, library.id, file, settings, &mut outcome)? {
            outcome.new_file_ids.push(file_id);
            outcome.added += 1;
        }
    }

    for file in &result.moved {
        if apply_move(db, library.id, file, &mut outcome)? {
            outcome.moved += 1;
        }
    }

    // Every orphan is marked before any is removed.
    for orphan in &result.orphaned {
        match db.get_catalog_file(orphan.file_id)? {
            Some(file) if file.status.can_transition_to(FileStatus::Orphaned) => {
                db.set_file_status(file.id, FileStatus::Orphaned)?;
            }
            Some(_) => {}
            None => debug!("Orphan {} already gone", orphan.file_id),
        }
    }
    for orphan in &result.orphaned {
        let Some(file) = db.get_catalog_file(orphan.file_id)? else {
            continue;
        };
        let removed = remove_catalog_file(db, &file)?;
        touched_series.extend(removed.series_id);
        outcome.removed += 1;
    }

    // Rows still orphaned here were left by an apply that stopped before deleting them.
    let seen = result.seen_file_ids();
    let mut resighted = Vec::new();
    for file in db.files_with_status(library.id, FileStatus::Orphaned)? {
        let removed = remove_catalog_file(db, &file)?;
        touched_series.extend(removed.series_id);
        if seen.contains(&file.id) {
            resighted.push(file);
        } else {
            outcome.healed += 1;
        }
    }
    if outcome.healed > 0 {
        info!("Removed {} orphaned rows left by an earlier apply", outcome.healed);
    }

    for stale in &resighted {
        let file = match rediscover(stale) {
            Ok(file) => file,
            Err(e) => {
                outcome.errors.push(ScanError {
                    path: stale.absolute_path.clone(),
                    message: format!("Error getting metadata: {}", e),
                });
                continue;
            }
        };
        if let Some(file_id) = insert_new_file(db, library.id, &file, settings, &mut outcome)? {
            warn!(
                "Orphaned file '{}' is on disk again, cataloged as {}",
                stale.relative_path, file_id
            );
            outcome.new_file_ids.push(file_id);
            outcome.readded += 1;
        }
    }

    outcome.series_archived = settle_series(db, touched_series)?.archived;
    outcome.duration = started.elapsed();

    info!(
        "Applied scan of '{}': {} added, {} moved, {} removed, {} series archived",
        library.name,
        outcome.added,
        outcome.moved,
        outcome.total_removed(),
        outcome.series_archived
    );
    Ok(outcome)
}

fn insert_new_file(
    db: &Database,
    library_id: i64,
    file: &NewFile,
    settings: &ScanSettings,
    outcome: &mut ApplyOutcome,
) -> Result<Option<i64>, Error> {
    let absolute_path = file.absolute_path.to_string_lossy().into_owned();

    if db.get_catalog_file_by_path(library_id, &file.relative_path)?.is_some() {
        outcome.errors.push(ScanError {
            path: absolute_path,
            message: "Already cataloged; plan is stale".into(),
        });
        return Ok(None);
    }

    let fingerprint = match &file.fingerprint {
        Some(fingerprint) => Some(fingerprint.clone()),
        None => match compute_fingerprint(
            &file.absolute_path,
            file.file_size,
            file.last_modified,
            settings.fingerprint_prefix_bytes,
        ) {
            Ok(fingerprint) => Some(fingerprint),
            Err(e) => {
                outcome.errors.push(ScanError {
                    path: absolute_path.clone(),
                    message: format!("Error computing fingerprint: {}", e),
                });
                None
            }
        },
    };

    let tx = db.connection().unchecked_transaction()?;
    let folder = folder_of_file(&file.relative_path)
        .map(|path| ensure_folder_path(db, library_id, path))
        .transpose()?;

    let file_id = db.insert_catalog_file(&NewCatalogFile {
        library_id,
        absolute_path,
        relative_path: file.relative_path.clone(),
        file_name: file.file_name.clone(),
        extension: file.extension.clone(),
        file_size: file.file_size as i64,
        last_modified: file.last_modified,
        fingerprint,
        folder_id: folder.as_ref().map(|f| f.id),
    })?;
    if let Some(folder) = &folder {
        increment_folder_file_counts(db, folder.id, 1)?;
    }
    tx.commit()?;

    debug!("Cataloged '{}' as {}", file.relative_path, file_id);
    Ok(Some(file_id))
}

/// Re-read a file's on-disk state so it can be inserted as new.
fn rediscover(file: &CatalogFile) -> std::io::Result<NewFile> {
    let absolute_path = PathBuf::from(&file.absolute_path);
    let metadata = fs::metadata(&absolute_path)?;
    Ok(NewFile {
        absolute_path,
        relative_path: file.relative_path.clone(),
        file_name: file.file_name.clone(),
        extension: file.extension.clone(),
        file_size: metadata.len(),
        last_modified: modified_secs(&metadata),
        fingerprint: None,
    })
}

fn apply_move(
    db: &Database,
    library_id: i64,
    moved: &MovedFile,
    outcome: &mut ApplyOutcome,
) -> Result<bool, Error> {
    let Some(existing) = db.get_catalog_file(moved.file_id)? else {
        outcome.errors.push(ScanError {
            path: moved.new_absolute_path.to_string_lossy().into_owned(),
            message: format!("File {} disappeared before its move was applied", moved.file_id),
        });
        return Ok(false);
    };

    let tx = db.connection().unchecked_transaction()?;
    let new_folder = folder_of_file(&moved.new_relative_path)
        .map(|path| ensure_folder_path(db, library_id, path))
        .transpose()?;
    let new_folder_id = new_folder.as_ref().map(|f| f.id);

    db.update_file_location(
        existing.id,
        &moved.new_absolute_path.to_string_lossy(),
        &moved.new_relative_path,
        &moved.new_file_name,
        new_folder_id,
    )?;

    if existing.folder_id != new_folder_id {
        if let Some(old_folder_id) = existing.folder_id {
            if db.get_folder(old_folder_id)?.is_some() {
                increment_folder_file_counts(db, old_folder_id, -1)?;
            }
        }
        if let Some(new_folder_id) = new_folder_id {
            increment_folder_file_counts(db, new_folder_id, 1)?;
        }
    }
    tx.commit()?;

    debug!(
        "Moved file {} from '{}' to '{}'",
        existing.id, moved.old_relative_path, moved.new_relative_path
    );
    Ok(true)
}
