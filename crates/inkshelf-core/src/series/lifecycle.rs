use std::collections::BTreeSet;
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::storage::models::SeriesStatus;
use crate::storage::Database;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SeriesSettlement {
    pub archived: usize,
    pub refreshed: usize,
}

/// Point the series cover at its first file by relative path, or clear it when empty.
pub fn recompute_series_cover(db: &Database, series_id: i64) -> Result<Option<i64>, Error> {
    let cover = db.files_in_series(series_id)?.first().map(|f| f.id);
    db.set_series_cover(series_id, cover)?;
    Ok(cover)
}

pub fn archive_series(db: &Database, series_id: i64) -> Result<bool, Error> {
    let series = db
        .get_series(series_id)?
        .ok_or_else(|| Error::not_found("series", series_id))?;
    if series.status == SeriesStatus::Archived {
        return Ok(false);
    }
    db.set_series_status(series_id, series.status.archive())?;
    db.set_series_cover(series_id, None)?;
    info!("Archived series '{}' ({}): no files remain", series.name, series_id);
    Ok(true)
}

pub fn restore_series(db: &Database, series_id: i64) -> Result<bool, Error> {
    let series = db
        .get_series(series_id)?
        .ok_or_else(|| Error::not_found("series", series_id))?;
    if series.status == SeriesStatus::Active {
        return Ok(false);
    }
    db.set_series_status(series_id, series.status.restore())?;
    info!("Restored archived series '{}' ({})", series.name, series_id);
    Ok(true)
}

/// After files leave a set of series: archive the ones left empty and refresh cover and
/// progress for the rest. Refresh failures are logged, not returned.
pub fn settle_series<I>(db: &Database, series_ids: I) -> Result<SeriesSettlement, Error>
where
    I: IntoIterator<Item = i64>,
{
    let mut settlement = SeriesSettlement::default();
    let unique: BTreeSet<i64> = series_ids.into_iter().collect();

    for series_id in unique {
        if db.get_series(series_id)?.is_none() {
            debug!("Series {} no longer exists, skipping settlement", series_id);
            continue;
        }
        if db.count_files_in_series(series_id)? == 0 {
            if archive_series(db, series_id)? {
                settlement.archived += 1;
            }
            continue;
        }

        if let Err(e) = recompute_series_cover(db, series_id) {
            warn!("Failed to recompute cover for series {}: {}", series_id, e);
        }
        if let Err(e) = db.recompute_series_progress(series_id) {
            warn!("Failed to recompute progress for series {}: {}", series_id, e);
        }
        settlement.refreshed += 1;
    }

    Ok(settlement)
}
