use std::collections::BTreeMap;
use tracing::info;

use super::hierarchy::{ensure_folder_path, recalculate_library_levels};
use super::path::folder_of_file;
use crate::error::Error;
use crate::storage::Database;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BackfillSummary {
    pub folders_created: usize,
    pub files_linked: usize,
    pub folders_recalculated: usize,
    /// True when the library's tree was already marked ready.
    pub skipped: bool,
}

/// Synthesize the folder tree for files cataloged before folders existed, then recount
/// and mark the library ready. Runs at most once per library.
pub fn backfill_library_folders(db: &Database, library_id: i64) -> Result<BackfillSummary, Error> {
    let library = db
        .get_library(library_id)?
        .ok_or_else(|| Error::not_found("library", library_id))?;
    if library.folders_ready {
        return Ok(BackfillSummary {
            skipped: true,
            ..BackfillSummary::default()
        });
    }

    let mut by_folder: BTreeMap<String, Vec<i64>> = BTreeMap::new();
    for (file_id, relative_path) in db.files_without_folder(library_id)? {
        if let Some(folder) = folder_of_file(&relative_path) {
            by_folder.entry(folder.to_string()).or_default().push(file_id);
        }
    }

    let folders_before = db.library_folders(library_id)?.len();
    let mut summary = BackfillSummary::default();

    let tx = db.connection().unchecked_transaction()?;
    for (path, file_ids) in &by_folder {
        let folder = ensure_folder_path(db, library_id, path)?;
        for file_id in file_ids {
            db.set_file_folder(*file_id, Some(folder.id))?;
            summary.files_linked += 1;
        }
    }
    summary.folders_recalculated = recalculate_library_levels(db, library_id)?;
    db.set_library_folders_ready(library_id, true)?;
    tx.commit()?;

    summary.folders_created = db.library_folders(library_id)?.len() - folders_before;
    info!(
        "Backfilled library '{}': {} folders created, {} files linked",
        library.name, summary.folders_created, summary.files_linked
    );
    Ok(summary)
}
