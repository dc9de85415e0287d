use serde::Serialize;
use tracing::{debug, info, warn};

use super::lifecycle::{recompute_series_cover, restore_series};
use super::matcher::{find_series_matches, MatchType, SeriesCandidate};
use super::naming::{
    clean_series_title, normalize_series_name, parse_folder_name, parse_year, CandidateName,
};
use super::registry::FolderSeriesRegistry;
use crate::config::LinkSettings;
use crate::error::Error;
use crate::folders::path::{folder_name, folder_of_file};
use crate::metadata::ComicInfo;
use crate::storage::models::{CatalogFile, NewSeries};
use crate::storage::Database;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutoLinkOptions {
    /// Fuzzy matches below this confidence are returned as suggestions instead of linked.
    pub min_confidence: f64,
    /// Create a series from the candidate name when nothing matches.
    pub create_missing: bool,
    /// Re-run matching for files that already belong to a series.
    pub relink: bool,
}

impl Default for AutoLinkOptions {
    fn default() -> Self {
        LinkSettings::default().into()
    }
}

impl From<LinkSettings> for AutoLinkOptions {
    fn from(settings: LinkSettings) -> Self {
        Self {
            min_confidence: settings.auto_link_min_confidence,
            create_missing: settings.create_missing_series,
            relink: false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AutoLinkOutcome {
    Linked {
        series_id: i64,
        match_type: MatchType,
        confidence: f64,
    },
    Created {
        series_id: i64,
    },
    AlreadyLinked {
        series_id: i64,
    },
    /// Ambiguous or low-confidence: nothing was written.
    NeedsConfirmation {
        candidate: CandidateName,
        suggestions: Vec<SeriesCandidate>,
    },
    /// No series matched and creation is disabled.
    NoMatch {
        candidate: CandidateName,
    },
    /// Neither metadata nor folder name yields a usable series name.
    NoSeriesName,
}

impl AutoLinkOutcome {
    /// True when the file ended up linked to a series.
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            AutoLinkOutcome::Linked { .. }
                | AutoLinkOutcome::Created { .. }
                | AutoLinkOutcome::AlreadyLinked { .. }
        )
    }

    pub fn series_id(&self) -> Option<i64> {
        match self {
            AutoLinkOutcome::Linked { series_id, .. }
            | AutoLinkOutcome::Created { series_id }
            | AutoLinkOutcome::AlreadyLinked { series_id } => Some(*series_id),
            _ => None,
        }
    }

    pub fn match_type(&self) -> MatchType {
        match self {
            AutoLinkOutcome::Linked { match_type, .. } => *match_type,
            _ => MatchType::None,
        }
    }
}

/// Derive the series a file belongs to: embedded metadata first, then the enclosing
/// folder's name. Files in the library root with no metadata have no candidate.
pub fn candidate_name(file: &CatalogFile) -> Option<CandidateName> {
    if let Some(candidate) = file.metadata_json.as_deref().and_then(candidate_from_metadata) {
        return Some(candidate);
    }
    folder_of_file(&file.relative_path).and_then(|folder| parse_folder_name(folder_name(folder)))
}

fn candidate_from_metadata(raw: &str) -> Option<CandidateName> {
    let info: ComicInfo = match serde_json::from_str(raw) {
        Ok(info) => info,
        Err(e) => {
            warn!("Ignoring unreadable stored metadata: {}", e);
            return None;
        }
    };

    let name = clean_series_title(info.series.as_deref()?);
    if normalize_series_name(&name).is_empty() {
        return None;
    }
    Some(CandidateName {
        name,
        year: info
            .year
            .filter(|y| (1900..=2100).contains(y))
            .or_else(|| info.volume.as_deref().and_then(parse_year)),
        publisher: info.publisher,
    })
}

/// Find or create the series for a file and link it.
///
/// Order: folder sidecar (via `registry`), then exact, partial and fuzzy matching on the
/// candidate name. Ambiguous results and fuzzy matches under `min_confidence` are returned
/// as suggestions without writing anything.
pub fn auto_link_file_to_series(
    db: &Database,
    file_id: i64,
    options: &AutoLinkOptions,
    registry: Option<&mut FolderSeriesRegistry>,
) -> Result<AutoLinkOutcome, Error> {
    let file = db
        .get_catalog_file(file_id)?
        .ok_or_else(|| Error::not_found("file", file_id))?;

    if let Some(series_id) = file.series_id {
        if !options.relink {
            return Ok(AutoLinkOutcome::AlreadyLinked { series_id });
        }
    }

    if let (Some(registry), Some(folder)) = (registry, folder_of_file(&file.relative_path)) {
        if let Some(series_id) = registry.resolve(db, folder)? {
            link_file_to_series(db, file.id, series_id)?;
            return Ok(AutoLinkOutcome::Linked {
                series_id,
                match_type: MatchType::Sidecar,
                confidence: 1.0,
            });
        }
    }

    let Some(candidate) = candidate_name(&file) else {
        debug!("No series name for '{}'", file.relative_path);
        return Ok(AutoLinkOutcome::NoSeriesName);
    };

    let outcome = find_series_matches(db, &candidate)?;
    if outcome.needs_confirmation {
        debug!(
            "Ambiguous series match for '{}' ({} candidates)",
            file.relative_path,
            outcome.candidates.len()
        );
        return Ok(AutoLinkOutcome::NeedsConfirmation {
            candidate,
            suggestions: outcome.candidates,
        });
    }

    if let Some(best) = outcome.best() {
        let accept = match best.match_type {
            MatchType::Exact | MatchType::Partial | MatchType::Sidecar => true,
            MatchType::Fuzzy => best.confidence >= options.min_confidence,
            MatchType::None => false,
        };
        if accept {
            let linked = AutoLinkOutcome::Linked {
                series_id: best.series_id,
                match_type: best.match_type,
                confidence: best.confidence,
            };
            link_file_to_series(db, file.id, best.series_id)?;
            return Ok(linked);
        }
        return Ok(AutoLinkOutcome::NeedsConfirmation {
            candidate,
            suggestions: outcome.candidates,
        });
    }

    if !options.create_missing {
        return Ok(AutoLinkOutcome::NoMatch { candidate });
    }

    let series_id = db.insert_series(&NewSeries {
        name: candidate.name.clone(),
        start_year: candidate.year,
        publisher: candidate.publisher.clone(),
        ..NewSeries::default()
    })?;
    info!("Created series '{}' ({}) for '{}'", candidate.name, series_id, file.relative_path);
    link_file_to_series(db, file.id, series_id)?;
    Ok(AutoLinkOutcome::Created { series_id })
}

/// Attach a file to a series, restoring the series if archived and refreshing progress
/// for both the new and the previous series.
pub fn link_file_to_series(db: &Database, file_id: i64, series_id: i64) -> Result<(), Error> {
    let file = db
        .get_catalog_file(file_id)?
        .ok_or_else(|| Error::not_found("file", file_id))?;
    let series = db
        .get_series(series_id)?
        .ok_or_else(|| Error::not_found("series", series_id))?;

    restore_series(db, series.id)?;
    db.set_file_series(file.id, Some(series.id))?;
    db.recompute_series_progress(series.id)?;
    if series.cover_file_id.is_none() {
        recompute_series_cover(db, series.id)?;
    }

    if let Some(previous) = file.series_id.filter(|prev| *prev != series.id) {
        db.recompute_series_progress(previous)?;
        recompute_series_cover(db, previous)?;
    }

    debug!("Linked file {} to series '{}' ({})", file.id, series.name, series.id);
    Ok(())
}

/// Detach a file from its series. Returns false when it had none.
pub fn unlink_file(db: &Database, file_id: i64) -> Result<bool, Error> {
    let file = db
        .get_catalog_file(file_id)?
        .ok_or_else(|| Error::not_found("file", file_id))?;
    let Some(previous) = file.series_id else {
        return Ok(false);
    };

    db.set_file_series(file.id, None)?;
    db.recompute_series_progress(previous)?;
    recompute_series_cover(db, previous)?;
    Ok(true)
}
