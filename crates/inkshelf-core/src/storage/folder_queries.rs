use super::models::Folder;
use super::sqlite::Database;
use rusqlite::{params, params_from_iter, OptionalExtension, Result, Row};

const FOLDER_COLUMNS: &str = "id, library_id, path, name, depth, parent_id, file_count, \
     total_files, child_count, last_modified";

fn folder_from_row(row: &Row<'_>) -> Result<Folder> {
    Ok(Folder {
        id: row.get(0)?,
        library_id: row.get(1)?,
        path: row.get(2)?,
        name: row.get(3)?,
        depth: row.get(4)?,
        parent_id: row.get(5)?,
        file_count: row.get(6)?,
        total_files: row.get(7)?,
        child_count: row.get(8)?,
        last_modified: row.get(9)?,
    })
}

fn placeholders(count: usize, offset: usize) -> String {
    (0..count)
        .map(|i| format!("?{}", i + offset))
        .collect::<Vec<_>>()
        .join(", ")
}

impl Database {
    // ── Folders ──────────────────────────────────────────────────

    pub fn get_folder(&self, folder_id: i64) -> Result<Option<Folder>> {
        self.connection()
            .query_row(
                &format!("SELECT {} FROM folder WHERE id = ?1", FOLDER_COLUMNS),
                params![folder_id],
                folder_from_row,
            )
            .optional()
    }

    pub fn get_folder_by_path(&self, library_id: i64, path: &str) -> Result<Option<Folder>> {
        self.connection()
            .query_row(
                &format!(
                    "SELECT {} FROM folder WHERE library_id = ?1 AND path = ?2",
                    FOLDER_COLUMNS
                ),
                params![library_id, path],
                folder_from_row,
            )
            .optional()
    }

    /// Insert a folder unless one already exists at the same path.
    /// Returns the number of rows inserted (0 when another writer got there first).
    pub fn insert_folder_if_absent(
        &self,
        library_id: i64,
        path: &str,
        name: &str,
        depth: i64,
        parent_id: Option<i64>,
    ) -> Result<usize> {
        let now = chrono::Utc::now().to_rfc3339();
        self.connection().execute(
            "INSERT INTO folder (library_id, path, name, depth, parent_id, last_modified) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
             ON CONFLICT(library_id, path) DO NOTHING",
            params![library_id, path, name, depth, parent_id, now],
        )
    }

    pub fn add_folder_child_count(&self, folder_id: i64, delta: i64) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        self.connection().execute(
            "UPDATE folder SET child_count = child_count + ?1, last_modified = ?2 WHERE id = ?3",
            params![delta, now, folder_id],
        )?;
        Ok(())
    }

    /// Apply `delta` to a folder's own count and its aggregate total.
    pub fn add_folder_file_count(&self, folder_id: i64, delta: i64) -> Result<usize> {
        let now = chrono::Utc::now().to_rfc3339();
        self.connection().execute(
            "UPDATE folder SET file_count = file_count + ?1, total_files = total_files + ?1, \
             last_modified = ?2 WHERE id = ?3",
            params![delta, now, folder_id],
        )
    }

    /// Apply `delta` to the aggregate totals of the folders at `paths`, leaving own counts alone.
    pub fn add_folder_totals_by_path(
        &self,
        library_id: i64,
        paths: &[String],
        delta: i64,
    ) -> Result<usize> {
        if paths.is_empty() {
            return Ok(0);
        }
        let now = chrono::Utc::now().to_rfc3339();
        let sql = format!(
            "UPDATE folder SET total_files = total_files + ?1, last_modified = ?2 \
             WHERE library_id = ?3 AND path IN ({})",
            placeholders(paths.len(), 4)
        );

        let mut values: Vec<rusqlite::types::Value> = vec![delta.into(), now.into(), library_id.into()];
        values.extend(paths.iter().map(|p| rusqlite::types::Value::from(p.clone())));
        self.connection().execute(&sql, params_from_iter(values))
    }

    pub fn folders_by_paths(&self, library_id: i64, paths: &[String]) -> Result<Vec<Folder>> {
        if paths.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {} FROM folder WHERE library_id = ?1 AND path IN ({}) ORDER BY depth",
            FOLDER_COLUMNS,
            placeholders(paths.len(), 2)
        );
        let mut values: Vec<rusqlite::types::Value> = vec![library_id.into()];
        values.extend(paths.iter().map(|p| rusqlite::types::Value::from(p.clone())));

        let mut stmt = self.connection().prepare(&sql)?;
        let folders = stmt
            .query_map(params_from_iter(values), folder_from_row)?
            .collect::<Result<Vec<_>>>()?;
        Ok(folders)
    }

    pub fn root_folders(&self, library_id: i64) -> Result<Vec<Folder>> {
        let mut stmt = self.connection().prepare(&format!(
            "SELECT {} FROM folder WHERE library_id = ?1 AND parent_id IS NULL ORDER BY name",
            FOLDER_COLUMNS
        ))?;
        let folders = stmt
            .query_map(params![library_id], folder_from_row)?
            .collect::<Result<Vec<_>>>()?;
        Ok(folders)
    }

    pub fn child_folders(&self, folder_id: i64) -> Result<Vec<Folder>> {
        let mut stmt = self.connection().prepare(&format!(
            "SELECT {} FROM folder WHERE parent_id = ?1 ORDER BY name",
            FOLDER_COLUMNS
        ))?;
        let folders = stmt
            .query_map(params![folder_id], folder_from_row)?
            .collect::<Result<Vec<_>>>()?;
        Ok(folders)
    }

    /// Strict descendants of the folder at `path` no deeper than `max_depth`, shallowest first.
    pub fn descendant_folders(
        &self,
        library_id: i64,
        path: &str,
        max_depth: i64,
    ) -> Result<Vec<Folder>> {
        let mut stmt = self.connection().prepare(&format!(
            "SELECT {} FROM folder WHERE library_id = ?1 \
             AND substr(path, 1, length(?2) + 1) = ?2 || '/' AND depth <= ?3 \
             ORDER BY depth, path",
            FOLDER_COLUMNS
        ))?;
        let folders = stmt
            .query_map(params![library_id, path, max_depth], folder_from_row)?
            .collect::<Result<Vec<_>>>()?;
        Ok(folders)
    }

    pub fn library_folders(&self, library_id: i64) -> Result<Vec<Folder>> {
        let mut stmt = self.connection().prepare(&format!(
            "SELECT {} FROM folder WHERE library_id = ?1 ORDER BY depth DESC, path",
            FOLDER_COLUMNS
        ))?;
        let folders = stmt
            .query_map(params![library_id], folder_from_row)?
            .collect::<Result<Vec<_>>>()?;
        Ok(folders)
    }

    pub fn max_folder_depth(&self, library_id: i64) -> Result<i64> {
        self.connection().query_row(
            "SELECT COALESCE(MAX(depth), -1) FROM folder WHERE library_id = ?1",
            params![library_id],
            |row| row.get(0),
        )
    }

    /// Folders with no files anywhere below them and no children, deepest first.
    pub fn empty_leaf_folders(&self, library_id: i64) -> Result<Vec<Folder>> {
        let mut stmt = self.connection().prepare(&format!(
            "SELECT {} FROM folder WHERE library_id = ?1 AND total_files = 0 AND child_count = 0 \
             ORDER BY depth DESC, path",
            FOLDER_COLUMNS
        ))?;
        let folders = stmt
            .query_map(params![library_id], folder_from_row)?
            .collect::<Result<Vec<_>>>()?;
        Ok(folders)
    }

    pub fn rename_folder_row(&self, folder_id: i64, name: &str, path: &str) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        self.connection().execute(
            "UPDATE folder SET name = ?1, path = ?2, last_modified = ?3 WHERE id = ?4",
            params![name, path, now, folder_id],
        )?;
        Ok(())
    }

    /// Swap the `old_prefix` of every strict descendant's path for `new_prefix`.
    pub fn rewrite_descendant_paths(
        &self,
        library_id: i64,
        old_prefix: &str,
        new_prefix: &str,
    ) -> Result<usize> {
        let now = chrono::Utc::now().to_rfc3339();
        self.connection().execute(
            "UPDATE folder SET path = ?1 || substr(path, length(?2) + 1), last_modified = ?3 \
             WHERE library_id = ?4 AND substr(path, 1, length(?2) + 1) = ?2 || '/'",
            params![new_prefix, old_prefix, now, library_id],
        )
    }

    pub fn delete_folder_row(&self, folder_id: i64) -> Result<usize> {
        self.connection()
            .execute("DELETE FROM folder WHERE id = ?1", params![folder_id])
    }

    // ── Folder Recalculation ─────────────────────────────────────

    /// Recount one folder from the file and folder tables. Children must already be final.
    pub fn recalculate_folder_row(&self, folder_id: i64) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        self.connection().execute(
            "UPDATE folder SET \
                 file_count = (SELECT COUNT(*) FROM catalog_file WHERE folder_id = folder.id), \
                 child_count = (SELECT COUNT(*) FROM folder f2 WHERE f2.parent_id = folder.id), \
                 total_files = (SELECT COUNT(*) FROM catalog_file WHERE folder_id = folder.id) \
                     + COALESCE((SELECT SUM(f2.total_files) FROM folder f2 WHERE f2.parent_id = folder.id), 0), \
                 last_modified = ?1 \
             WHERE id = ?2",
            params![now, folder_id],
        )?;
        Ok(())
    }

    /// Recount every folder of a library at one depth level.
    pub fn recalculate_folder_depth(&self, library_id: i64, depth: i64) -> Result<usize> {
        let now = chrono::Utc::now().to_rfc3339();
        self.connection().execute(
            "UPDATE folder SET \
                 file_count = (SELECT COUNT(*) FROM catalog_file WHERE folder_id = folder.id), \
                 child_count = (SELECT COUNT(*) FROM folder f2 WHERE f2.parent_id = folder.id), \
                 total_files = (SELECT COUNT(*) FROM catalog_file WHERE folder_id = folder.id) \
                     + COALESCE((SELECT SUM(f2.total_files) FROM folder f2 WHERE f2.parent_id = folder.id), 0), \
                 last_modified = ?1 \
             WHERE library_id = ?2 AND depth = ?3",
            params![now, library_id, depth],
        )
    }
}
