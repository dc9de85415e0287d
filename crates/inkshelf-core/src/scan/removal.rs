use tracing::debug;

use crate::error::Error;
use crate::folders::increment_folder_file_counts;
use crate::storage::models::CatalogFile;
use crate::storage::Database;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemovedFile {
    pub file_id: i64,
    pub folder_id: Option<i64>,
    /// The series that lost this file; the caller settles it once all removals are done.
    pub series_id: Option<i64>,
}

/// Delete one catalog file and everything hanging off it.
///
/// Collection entries are kept but flagged unavailable, reading progress goes with the
/// row, and the folder counts above the file drop by one. All of it commits together.
pub fn remove_catalog_file(db: &Database, file: &CatalogFile) -> Result<RemovedFile, Error> {
    let tx = db.connection().unchecked_transaction()?;

    let flagged = db.mark_collection_items_unavailable(file.id)?;
    db.delete_catalog_file(file.id)?;

    if let Some(folder_id) = file.folder_id {
        if db.get_folder(folder_id)?.is_some() {
            increment_folder_file_counts(db, folder_id, -1)?;
        }
    }

    tx.commit()?;

    debug!(
        "Removed '{}' (id {}, {} collection entries flagged)",
        file.relative_path, file.id, flagged
    );
    Ok(RemovedFile {
        file_id: file.id,
        folder_id: file.folder_id,
        series_id: file.series_id,
    })
}
