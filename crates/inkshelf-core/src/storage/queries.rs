use super::models::*;
use super::sqlite::Database;
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Result, Row};
use tracing::debug;

const FILE_COLUMNS: &str = "id, library_id, absolute_path, relative_path, file_name, extension, \
     file_size, last_modified, fingerprint, status, folder_id, series_id, metadata_json";

pub(crate) fn file_from_row(row: &Row<'_>) -> Result<CatalogFile> {
    let status: String = row.get(9)?;
    let status = status
        .parse::<FileStatus>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(9, Type::Text, Box::new(e)))?;

    Ok(CatalogFile {
        id: row.get(0)?,
        library_id: row.get(1)?,
        absolute_path: row.get(2)?,
        relative_path: row.get(3)?,
        file_name: row.get(4)?,
        extension: row.get(5)?,
        file_size: row.get(6)?,
        last_modified: row.get(7)?,
        fingerprint: row.get(8)?,
        status,
        folder_id: row.get(10)?,
        series_id: row.get(11)?,
        metadata_json: row.get(12)?,
    })
}

fn library_from_row(row: &Row<'_>) -> Result<Library> {
    Ok(Library {
        id: row.get(0)?,
        name: row.get(1)?,
        root_path: row.get(2)?,
        folders_ready: row.get(3)?,
        created_at: row.get(4)?,
    })
}

impl Database {
    // ── Libraries ────────────────────────────────────────────────

    /// Register a library by name, updating its root if it already exists.
    pub fn upsert_library(&self, name: &str, root_path: &str) -> Result<Library> {
        let now = chrono::Utc::now().to_rfc3339();
        self.connection().execute(
            "INSERT INTO library (name, root_path, created_at) VALUES (?1, ?2, ?3) \
             ON CONFLICT(name) DO UPDATE SET root_path = excluded.root_path",
            params![name, root_path, now],
        )?;
        self.connection().query_row(
            "SELECT id, name, root_path, folders_ready, created_at FROM library WHERE name = ?1",
            params![name],
            library_from_row,
        )
    }

    pub fn get_library(&self, library_id: i64) -> Result<Option<Library>> {
        self.connection()
            .query_row(
                "SELECT id, name, root_path, folders_ready, created_at FROM library WHERE id = ?1",
                params![library_id],
                library_from_row,
            )
            .optional()
    }

    pub fn list_libraries(&self) -> Result<Vec<Library>> {
        let mut stmt = self.connection().prepare(
            "SELECT id, name, root_path, folders_ready, created_at FROM library ORDER BY id",
        )?;
        let libraries = stmt
            .query_map([], library_from_row)?
            .collect::<Result<Vec<_>>>()?;
        Ok(libraries)
    }

    pub fn set_library_folders_ready(&self, library_id: i64, ready: bool) -> Result<()> {
        self.connection().execute(
            "UPDATE library SET folders_ready = ?1 WHERE id = ?2",
            params![ready, library_id],
        )?;
        Ok(())
    }

    // ── Catalog Files ────────────────────────────────────────────

    pub fn insert_catalog_file(&self, file: &NewCatalogFile) -> Result<i64> {
        let now = chrono::Utc::now().to_rfc3339();
        self.connection().execute(
            "INSERT INTO catalog_file \
             (library_id, absolute_path, relative_path, file_name, extension, file_size, \
              last_modified, fingerprint, status, folder_id, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'pending', ?9, ?10, ?10)",
            params![
                file.library_id,
                file.absolute_path,
                file.relative_path,
                file.file_name,
                file.extension,
                file.file_size,
                file.last_modified,
                file.fingerprint,
                file.folder_id,
                now,
            ],
        )?;
        Ok(self.connection().last_insert_rowid())
    }

    pub fn get_catalog_file(&self, file_id: i64) -> Result<Option<CatalogFile>> {
        self.connection()
            .query_row(
                &format!("SELECT {} FROM catalog_file WHERE id = ?1", FILE_COLUMNS),
                params![file_id],
                file_from_row,
            )
            .optional()
    }

    pub fn get_catalog_file_by_path(
        &self,
        library_id: i64,
        relative_path: &str,
    ) -> Result<Option<CatalogFile>> {
        self.connection()
            .query_row(
                &format!(
                    "SELECT {} FROM catalog_file WHERE library_id = ?1 AND relative_path = ?2",
                    FILE_COLUMNS
                ),
                params![library_id, relative_path],
                file_from_row,
            )
            .optional()
    }

    /// Path, fingerprint and status of every file in a library, loaded once per scan.
    pub fn load_library_snapshot(&self, library_id: i64) -> Result<Vec<SnapshotEntry>> {
        let mut stmt = self.connection().prepare(
            "SELECT id, relative_path, fingerprint, status, series_id \
             FROM catalog_file WHERE library_id = ?1 ORDER BY id",
        )?;
        let entries = stmt
            .query_map(params![library_id], |row| {
                let status: String = row.get(3)?;
                let status = status.parse::<FileStatus>().map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e))
                })?;
                Ok(SnapshotEntry {
                    id: row.get(0)?,
                    relative_path: row.get(1)?,
                    fingerprint: row.get(2)?,
                    status,
                    series_id: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>>>()?;
        debug!("Loaded {} snapshot entries for library {}", entries.len(), library_id);
        Ok(entries)
    }

    pub fn update_file_location(
        &self,
        file_id: i64,
        absolute_path: &str,
        relative_path: &str,
        file_name: &str,
        folder_id: Option<i64>,
    ) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        self.connection().execute(
            "UPDATE catalog_file SET absolute_path = ?1, relative_path = ?2, file_name = ?3, \
             folder_id = ?4, updated_at = ?5 WHERE id = ?6",
            params![absolute_path, relative_path, file_name, folder_id, now, file_id],
        )?;
        Ok(())
    }

    /// Rewrite the relative and absolute paths of every file under `old_prefix`.
    /// Absolute paths keep whatever precedes their relative part.
    pub fn rewrite_file_path_prefix(
        &self,
        library_id: i64,
        old_prefix: &str,
        new_prefix: &str,
    ) -> Result<usize> {
        let now = chrono::Utc::now().to_rfc3339();
        self.connection().execute(
            "UPDATE catalog_file SET \
                 absolute_path = substr(absolute_path, 1, length(absolute_path) - length(relative_path)) \
                     || ?1 || substr(relative_path, length(?2) + 1), \
                 relative_path = ?1 || substr(relative_path, length(?2) + 1), \
                 updated_at = ?3 \
             WHERE library_id = ?4 AND substr(relative_path, 1, length(?2) + 1) = ?2 || '/'",
            params![new_prefix, old_prefix, now, library_id],
        )
    }

    pub fn set_file_folder(&self, file_id: i64, folder_id: Option<i64>) -> Result<()> {
        self.connection().execute(
            "UPDATE catalog_file SET folder_id = ?1 WHERE id = ?2",
            params![folder_id, file_id],
        )?;
        Ok(())
    }

    /// Move a file to `next`, rejecting edges outside the status transition table.
    pub fn set_file_status(&self, file_id: i64, next: FileStatus) -> crate::Result<()> {
        let current: Option<String> = self
            .connection()
            .query_row(
                "SELECT status FROM catalog_file WHERE id = ?1",
                params![file_id],
                |row| row.get(0),
            )
            .optional()?;
        let current = current
            .ok_or_else(|| crate::Error::not_found("file", file_id))?
            .parse::<FileStatus>()?;

        let next = current.transition(next)?;
        if next != current {
            let now = chrono::Utc::now().to_rfc3339();
            self.connection().execute(
                "UPDATE catalog_file SET status = ?1, updated_at = ?2 WHERE id = ?3",
                params![next.as_str(), now, file_id],
            )?;
        }
        Ok(())
    }

    pub fn set_file_metadata(&self, file_id: i64, metadata_json: Option<&str>) -> Result<()> {
        self.connection().execute(
            "UPDATE catalog_file SET metadata_json = ?1 WHERE id = ?2",
            params![metadata_json, file_id],
        )?;
        Ok(())
    }

    pub fn set_file_series(&self, file_id: i64, series_id: Option<i64>) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        self.connection().execute(
            "UPDATE catalog_file SET series_id = ?1, updated_at = ?2 WHERE id = ?3",
            params![series_id, now, file_id],
        )?;
        Ok(())
    }

    pub fn delete_catalog_file(&self, file_id: i64) -> Result<usize> {
        self.connection()
            .execute("DELETE FROM catalog_file WHERE id = ?1", params![file_id])
    }

    pub fn files_with_status(&self, library_id: i64, status: FileStatus) -> Result<Vec<CatalogFile>> {
        let mut stmt = self.connection().prepare(&format!(
            "SELECT {} FROM catalog_file WHERE library_id = ?1 AND status = ?2 ORDER BY id",
            FILE_COLUMNS
        ))?;
        let files = stmt
            .query_map(params![library_id, status.as_str()], file_from_row)?
            .collect::<Result<Vec<_>>>()?;
        Ok(files)
    }

    pub fn files_in_series(&self, series_id: i64) -> Result<Vec<CatalogFile>> {
        let mut stmt = self.connection().prepare(&format!(
            "SELECT {} FROM catalog_file WHERE series_id = ?1 ORDER BY relative_path",
            FILE_COLUMNS
        ))?;
        let files = stmt
            .query_map(params![series_id], file_from_row)?
            .collect::<Result<Vec<_>>>()?;
        Ok(files)
    }

    pub fn count_files_in_series(&self, series_id: i64) -> Result<i64> {
        self.connection().query_row(
            "SELECT COUNT(*) FROM catalog_file WHERE series_id = ?1",
            params![series_id],
            |row| row.get(0),
        )
    }

    /// Files directly in a folder, or in the folder's whole subtree when `recursive`.
    pub fn files_in_folder(&self, folder: &Folder, recursive: bool) -> Result<Vec<CatalogFile>> {
        if !recursive {
            let mut stmt = self.connection().prepare(&format!(
                "SELECT {} FROM catalog_file WHERE folder_id = ?1 ORDER BY relative_path",
                FILE_COLUMNS
            ))?;
            let files = stmt
                .query_map(params![folder.id], file_from_row)?
                .collect::<Result<Vec<_>>>()?;
            return Ok(files);
        }

        let mut stmt = self.connection().prepare(&format!(
            "SELECT {} FROM catalog_file WHERE folder_id IN ( \
                 SELECT id FROM folder WHERE library_id = ?1 \
                 AND (path = ?2 OR substr(path, 1, length(?2) + 1) = ?2 || '/')) \
             ORDER BY relative_path",
            FILE_COLUMNS
        ))?;
        let files = stmt
            .query_map(params![folder.library_id, folder.path], file_from_row)?
            .collect::<Result<Vec<_>>>()?;
        Ok(files)
    }

    /// (id, relative_path) of files that have not been attached to a folder yet.
    pub fn files_without_folder(&self, library_id: i64) -> Result<Vec<(i64, String)>> {
        let mut stmt = self.connection().prepare(
            "SELECT id, relative_path FROM catalog_file \
             WHERE library_id = ?1 AND folder_id IS NULL ORDER BY relative_path",
        )?;
        let rows = stmt
            .query_map(params![library_id], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>>>()?;
        Ok(rows)
    }

    // ── Stats ────────────────────────────────────────────────────

    pub fn library_stats(&self, library: &Library) -> Result<LibraryStats> {
        let mut stats = LibraryStats {
            library_id: library.id,
            name: library.name.clone(),
            ..LibraryStats::default()
        };

        let mut stmt = self.connection().prepare(
            "SELECT status, COUNT(*), COALESCE(SUM(file_size), 0) \
             FROM catalog_file WHERE library_id = ?1 GROUP BY status",
        )?;
        let rows = stmt
            .query_map(params![library.id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?, row.get::<_, i64>(2)?))
            })?
            .collect::<Result<Vec<_>>>()?;

        for (status, count, bytes) in rows {
            stats.total_files += count;
            stats.total_bytes += bytes;
            match status.parse::<FileStatus>() {
                Ok(FileStatus::Pending) => stats.pending = count,
                Ok(FileStatus::Indexed) => stats.indexed = count,
                Ok(FileStatus::Orphaned) => stats.orphaned = count,
                Ok(FileStatus::Quarantined) => stats.quarantined = count,
                Err(e) => tracing::warn!("Ignoring unknown status in stats: {}", e),
            }
        }

        stats.series = self.connection().query_row(
            "SELECT COUNT(DISTINCT series_id) FROM catalog_file \
             WHERE library_id = ?1 AND series_id IS NOT NULL",
            params![library.id],
            |row| row.get(0),
        )?;
        stats.folders = self.connection().query_row(
            "SELECT COUNT(*) FROM folder WHERE library_id = ?1",
            params![library.id],
            |row| row.get(0),
        )?;

        Ok(stats)
    }

    // ── Reading Progress ─────────────────────────────────────────

    pub fn record_reading_progress(
        &self,
        file_id: i64,
        current_page: i64,
        total_pages: Option<i64>,
        completed: bool,
    ) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        self.connection().execute(
            "INSERT INTO reading_progress (file_id, current_page, total_pages, completed, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5) \
             ON CONFLICT(file_id) DO UPDATE SET current_page = excluded.current_page, \
                 total_pages = excluded.total_pages, completed = excluded.completed, \
                 updated_at = excluded.updated_at",
            params![file_id, current_page, total_pages, completed, now],
        )?;
        Ok(())
    }

    /// Recount a series' files and completed reads into `series_progress`.
    pub fn recompute_series_progress(&self, series_id: i64) -> Result<SeriesProgress> {
        let (total_files, read_files): (i64, i64) = self.connection().query_row(
            "SELECT COUNT(cf.id), COALESCE(SUM(CASE WHEN rp.completed = 1 THEN 1 ELSE 0 END), 0) \
             FROM catalog_file cf \
             LEFT JOIN reading_progress rp ON rp.file_id = cf.id \
             WHERE cf.series_id = ?1",
            params![series_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let now = chrono::Utc::now().to_rfc3339();
        self.connection().execute(
            "INSERT INTO series_progress (series_id, total_files, read_files, updated_at) \
             VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT(series_id) DO UPDATE SET total_files = excluded.total_files, \
                 read_files = excluded.read_files, updated_at = excluded.updated_at",
            params![series_id, total_files, read_files, now],
        )?;

        Ok(SeriesProgress {
            series_id,
            total_files,
            read_files,
        })
    }

    pub fn get_series_progress(&self, series_id: i64) -> Result<Option<SeriesProgress>> {
        self.connection()
            .query_row(
                "SELECT series_id, total_files, read_files FROM series_progress WHERE series_id = ?1",
                params![series_id],
                |row| {
                    Ok(SeriesProgress {
                        series_id: row.get(0)?,
                        total_files: row.get(1)?,
                        read_files: row.get(2)?,
                    })
                },
            )
            .optional()
    }

    // ── Collections ──────────────────────────────────────────────

    pub fn create_collection(&self, name: &str) -> Result<i64> {
        let now = chrono::Utc::now().to_rfc3339();
        self.connection().execute(
            "INSERT INTO collection (name, created_at) VALUES (?1, ?2)",
            params![name, now],
        )?;
        Ok(self.connection().last_insert_rowid())
    }

    pub fn add_collection_item(&self, collection_id: i64, file_id: i64) -> Result<i64> {
        self.connection().execute(
            "INSERT INTO collection_item (collection_id, file_id, file_path, available) \
             SELECT ?1, id, relative_path, 1 FROM catalog_file WHERE id = ?2",
            params![collection_id, file_id],
        )?;
        Ok(self.connection().last_insert_rowid())
    }

    pub fn collection_items(&self, collection_id: i64) -> Result<Vec<CollectionItem>> {
        let mut stmt = self.connection().prepare(
            "SELECT id, collection_id, file_id, file_path, available \
             FROM collection_item WHERE collection_id = ?1 ORDER BY id",
        )?;
        let items = stmt
            .query_map(params![collection_id], |row| {
                Ok(CollectionItem {
                    id: row.get(0)?,
                    collection_id: row.get(1)?,
                    file_id: row.get(2)?,
                    file_path: row.get(3)?,
                    available: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>>>()?;
        Ok(items)
    }

    pub fn mark_collection_items_unavailable(&self, file_id: i64) -> Result<usize> {
        self.connection().execute(
            "UPDATE collection_item SET available = 0 WHERE file_id = ?1",
            params![file_id],
        )
    }
}
