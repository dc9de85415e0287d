use super::models::{NewSeries, Series, SeriesStatus};
use super::sqlite::Database;
use crate::series::naming::normalize_series_name;
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Result, Row};

const SERIES_COLUMNS: &str = "id, name, normalized_name, aliases, start_year, end_year, \
     publisher, external_ids, status, cover_file_id";

fn json_list(row: &Row<'_>, idx: usize) -> Result<Vec<String>> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn series_from_row(row: &Row<'_>) -> Result<Series> {
    let status: String = row.get(8)?;
    let status = status
        .parse::<SeriesStatus>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(8, Type::Text, Box::new(e)))?;

    Ok(Series {
        id: row.get(0)?,
        name: row.get(1)?,
        normalized_name: row.get(2)?,
        aliases: json_list(row, 3)?,
        start_year: row.get(4)?,
        end_year: row.get(5)?,
        publisher: row.get(6)?,
        external_ids: json_list(row, 7)?,
        status,
        cover_file_id: row.get(9)?,
    })
}

impl Database {
    // ── Series ───────────────────────────────────────────────────

    pub fn insert_series(&self, series: &NewSeries) -> Result<i64> {
        let now = chrono::Utc::now().to_rfc3339();
        let aliases = serde_json::to_string(&series.aliases).unwrap_or_else(|_| "[]".into());
        let external_ids =
            serde_json::to_string(&series.external_ids).unwrap_or_else(|_| "[]".into());
        self.connection().execute(
            "INSERT INTO series \
             (name, normalized_name, aliases, start_year, end_year, publisher, external_ids, \
              status, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'active', ?8, ?8)",
            params![
                series.name,
                normalize_series_name(&series.name),
                aliases,
                series.start_year,
                series.end_year,
                series.publisher,
                external_ids,
                now,
            ],
        )?;
        Ok(self.connection().last_insert_rowid())
    }

    pub fn get_series(&self, series_id: i64) -> Result<Option<Series>> {
        self.connection()
            .query_row(
                &format!("SELECT {} FROM series WHERE id = ?1", SERIES_COLUMNS),
                params![series_id],
                series_from_row,
            )
            .optional()
    }

    /// Every series, archived ones included; archived series are still valid link targets.
    pub fn all_series(&self) -> Result<Vec<Series>> {
        let mut stmt = self
            .connection()
            .prepare(&format!("SELECT {} FROM series ORDER BY id", SERIES_COLUMNS))?;
        let series = stmt
            .query_map([], series_from_row)?
            .collect::<Result<Vec<_>>>()?;
        Ok(series)
    }

    pub fn series_by_normalized_name(&self, normalized_name: &str) -> Result<Vec<Series>> {
        let mut stmt = self.connection().prepare(&format!(
            "SELECT {} FROM series WHERE normalized_name = ?1 ORDER BY id",
            SERIES_COLUMNS
        ))?;
        let series = stmt
            .query_map(params![normalized_name], series_from_row)?
            .collect::<Result<Vec<_>>>()?;
        Ok(series)
    }

    pub fn set_series_status(&self, series_id: i64, status: SeriesStatus) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        let archived_at = match status {
            SeriesStatus::Archived => Some(now.clone()),
            SeriesStatus::Active => None,
        };
        self.connection().execute(
            "UPDATE series SET status = ?1, archived_at = ?2, updated_at = ?3 WHERE id = ?4",
            params![status.as_str(), archived_at, now, series_id],
        )?;
        Ok(())
    }

    pub fn set_series_cover(&self, series_id: i64, cover_file_id: Option<i64>) -> Result<()> {
        self.connection().execute(
            "UPDATE series SET cover_file_id = ?1 WHERE id = ?2",
            params![cover_file_id, series_id],
        )?;
        Ok(())
    }

    pub fn set_series_aliases(&self, series_id: i64, aliases: &[String]) -> Result<()> {
        let aliases = serde_json::to_string(aliases).unwrap_or_else(|_| "[]".into());
        self.connection().execute(
            "UPDATE series SET aliases = ?1 WHERE id = ?2",
            params![aliases, series_id],
        )?;
        Ok(())
    }
}
