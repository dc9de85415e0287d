use tracing::{debug, info};

use super::path::{
    ancestor_paths, depth_of, folder_name, join_path, normalize_folder_path, parent_path, path_chain,
};
use crate::error::Error;
use crate::scan::removal::remove_catalog_file;
use crate::series::lifecycle::settle_series;
use crate::storage::models::Folder;
use crate::storage::Database;

/// Return the folder at `path`, creating it and any missing ancestors parent-first.
///
/// Each newly inserted folder bumps its parent's child count exactly once. When another
/// writer inserts the same path first, the existing row is re-read and returned.
pub fn ensure_folder_path(db: &Database, library_id: i64, path: &str) -> Result<Folder, Error> {
    let path = normalize_folder_path(path)?;
    if let Some(folder) = db.get_folder_by_path(library_id, &path)? {
        return Ok(folder);
    }
    if db.get_library(library_id)?.is_none() {
        return Err(Error::not_found("library", library_id));
    }

    let mut parent: Option<Folder> = None;
    for segment_path in path_chain(&path) {
        let folder = match db.get_folder_by_path(library_id, &segment_path)? {
            Some(existing) => existing,
            None => {
                let inserted = db.insert_folder_if_absent(
                    library_id,
                    &segment_path,
                    folder_name(&segment_path),
                    depth_of(&segment_path),
                    parent.as_ref().map(|p| p.id),
                )?;
                if inserted > 0 {
                    if let Some(parent) = &parent {
                        db.add_folder_child_count(parent.id, 1)?;
                    }
                    debug!("Created folder '{}' in library {}", segment_path, library_id);
                } else {
                    debug!("Folder '{}' was created concurrently, re-reading", segment_path);
                }
                db.get_folder_by_path(library_id, &segment_path)?
                    .ok_or_else(|| Error::not_found("folder", &segment_path))?
            }
        };
        parent = Some(folder);
    }

    parent.ok_or_else(|| Error::InvalidData(format!("folder path '{}' is empty", path)))
}

/// Add `delta` to a folder's own and aggregate counts and to every strict ancestor's
/// aggregate. Call once per file added to (+1) or removed from (-1) its immediate folder.
pub fn increment_folder_file_counts(
    db: &Database,
    folder_id: i64,
    delta: i64,
) -> Result<(), Error> {
    let folder = db
        .get_folder(folder_id)?
        .ok_or_else(|| Error::not_found("folder", folder_id))?;

    db.add_folder_file_count(folder.id, delta)?;
    db.add_folder_totals_by_path(folder.library_id, &ancestor_paths(&folder.path), delta)?;
    Ok(())
}

/// Recount one folder from the tables, trusting its children's aggregates.
pub fn recalculate_folder_counts(db: &Database, folder_id: i64) -> Result<Folder, Error> {
    db.recalculate_folder_row(folder_id)?;
    db.get_folder(folder_id)?
        .ok_or_else(|| Error::not_found("folder", folder_id))
}

/// Recount every folder of a library, deepest level first so each parent sums final
/// child aggregates.
pub fn recalculate_library_counts(db: &Database, library_id: i64) -> Result<usize, Error> {
    let tx = db.connection().unchecked_transaction()?;
    let updated = recalculate_library_levels(db, library_id)?;
    tx.commit()?;
    info!("Recalculated {} folders for library {}", updated, library_id);
    Ok(updated)
}

pub(crate) fn recalculate_library_levels(db: &Database, library_id: i64) -> Result<usize, Error> {
    let max_depth = db.max_folder_depth(library_id)?;
    let mut updated = 0;
    for depth in (0..=max_depth).rev() {
        updated += db.recalculate_folder_depth(library_id, depth)?;
    }
    Ok(updated)
}

/// Rename a folder in place and rewrite every descendant's path prefix in one transaction.
///
/// Files below the folder get the new prefix on their relative and absolute paths, so a
/// scan after the same rename on disk finds them unchanged.
pub fn rename_folder(db: &Database, folder_id: i64, new_name: &str) -> Result<Folder, Error> {
    let new_name = new_name.trim();
    if new_name.is_empty()
        || new_name == "."
        || new_name == ".."
        || new_name.contains(['/', '\\'])
    {
        return Err(Error::Precondition(format!(
            "'{}' is not a valid folder name",
            new_name
        )));
    }

    let folder = db
        .get_folder(folder_id)?
        .ok_or_else(|| Error::not_found("folder", folder_id))?;
    let new_path = join_path(parent_path(&folder.path), new_name);
    if new_path == folder.path {
        return Ok(folder);
    }
    if db.get_folder_by_path(folder.library_id, &new_path)?.is_some() {
        return Err(Error::Precondition(format!(
            "a folder already exists at '{}'",
            new_path
        )));
    }

    let tx = db.connection().unchecked_transaction()?;
    db.rename_folder_row(folder.id, new_name, &new_path)?;
    let rewritten = db.rewrite_descendant_paths(folder.library_id, &folder.path, &new_path)?;
    let files = db.rewrite_file_path_prefix(folder.library_id, &folder.path, &new_path)?;
    tx.commit()?;

    info!(
        "Renamed folder '{}' to '{}' ({} descendants, {} files rewritten)",
        folder.path, new_path, rewritten, files
    );
    db.get_folder(folder.id)?
        .ok_or_else(|| Error::not_found("folder", folder.id))
}

/// Remove folders with no files below them and no children, deepest first, until none remain.
pub fn prune_empty_folders(db: &Database, library_id: i64) -> Result<usize, Error> {
    let tx = db.connection().unchecked_transaction()?;
    let mut removed = 0;
    loop {
        let empty = db.empty_leaf_folders(library_id)?;
        if empty.is_empty() {
            break;
        }
        for folder in empty {
            db.delete_folder_row(folder.id)?;
            if let Some(parent_id) = folder.parent_id {
                db.add_folder_child_count(parent_id, -1)?;
            }
            removed += 1;
        }
    }
    tx.commit()?;

    if removed > 0 {
        info!("Pruned {} empty folders from library {}", removed, library_id);
    }
    Ok(removed)
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeleteFolderOutcome {
    pub folders_removed: usize,
    pub files_removed: usize,
    pub series_archived: usize,
}

/// Delete a folder and its subtree. Without `force` only empty folders are accepted.
pub fn delete_folder(
    db: &Database,
    folder_id: i64,
    force: bool,
) -> Result<DeleteFolderOutcome, Error> {
    let folder = db
        .get_folder(folder_id)?
        .ok_or_else(|| Error::not_found("folder", folder_id))?;

    if !force && (folder.total_files > 0 || folder.child_count > 0) {
        return Err(Error::Precondition(format!(
            "folder '{}' is not empty ({} files, {} subfolders)",
            folder.path, folder.total_files, folder.child_count
        )));
    }

    let mut outcome = DeleteFolderOutcome::default();
    let mut touched_series = Vec::new();

    for file in db.files_in_folder(&folder, true)? {
        let removed = remove_catalog_file(db, &file)?;
        touched_series.extend(removed.series_id);
        outcome.files_removed += 1;
    }

    let tx = db.connection().unchecked_transaction()?;
    let mut subtree = db.descendant_folders(folder.library_id, &folder.path, i64::MAX)?;
    subtree.sort_by(|a, b| b.depth.cmp(&a.depth));
    for descendant in &subtree {
        outcome.folders_removed += db.delete_folder_row(descendant.id)?;
    }
    outcome.folders_removed += db.delete_folder_row(folder.id)?;
    if let Some(parent_id) = folder.parent_id {
        db.add_folder_child_count(parent_id, -1)?;
    }
    tx.commit()?;

    outcome.series_archived = settle_series(db, touched_series)?.archived;

    info!(
        "Deleted folder '{}': {} folders, {} files",
        folder.path, outcome.folders_removed, outcome.files_removed
    );
    Ok(outcome)
}
