use std::collections::HashMap;
use tracing::{debug, info};

use super::matcher::{rank_series, MatchType};
use super::naming::{normalize_series_name, CandidateName};
use crate::error::Error;
use crate::scanner::SeriesDefinition;
use crate::storage::models::{NewSeries, Series};
use crate::storage::Database;

/// Folder-declared series identities for one scan, resolved to series ids on first use.
///
/// A definition applies to files directly inside its folder. Resolution is find-or-create
/// on the exact identity key, so a sidecar never links to a merely similar series.
#[derive(Debug, Default)]
pub struct FolderSeriesRegistry {
    definitions: HashMap<String, SeriesDefinition>,
    resolved: HashMap<String, i64>,
}

impl FolderSeriesRegistry {
    pub fn new(definitions: HashMap<String, SeriesDefinition>) -> Self {
        Self {
            definitions,
            resolved: HashMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// The series declared for `folder_path`, creating it on first use if needed.
    pub fn resolve(&mut self, db: &Database, folder_path: &str) -> Result<Option<i64>, Error> {
        if let Some(series_id) = self.resolved.get(folder_path) {
            return Ok(Some(*series_id));
        }
        let Some(definition) = self.definitions.get(folder_path) else {
            return Ok(None);
        };

        let query = CandidateName {
            name: definition.name.clone(),
            year: definition.year,
            publisher: definition.publisher.clone(),
        };
        let same_name = db.series_by_normalized_name(&normalize_series_name(&definition.name))?;
        let outcome = rank_series(&query, &same_name);

        let series_id = match outcome.best() {
            Some(best) if best.match_type == MatchType::Exact => {
                debug!("Sidecar for '{}' resolved to series {}", folder_path, best.series_id);
                if let Some(series) = same_name.iter().find(|s| s.id == best.series_id) {
                    merge_aliases(db, series, &definition.aliases)?;
                }
                best.series_id
            }
            _ => {
                let series_id = db.insert_series(&NewSeries {
                    name: definition.name.clone(),
                    aliases: definition.aliases.clone(),
                    start_year: definition.year,
                    end_year: None,
                    publisher: definition.publisher.clone(),
                    external_ids: definition.external_id.iter().cloned().collect(),
                })?;
                info!(
                    "Created series '{}' ({}) from sidecar in '{}'",
                    definition.name, series_id, folder_path
                );
                series_id
            }
        };

        self.resolved.insert(folder_path.to_string(), series_id);
        Ok(Some(series_id))
    }
}

/// Add sidecar aliases the series does not carry yet.
fn merge_aliases(db: &Database, series: &Series, aliases: &[String]) -> Result<(), Error> {
    let mut merged = series.aliases.clone();
    for alias in aliases {
        let alias = alias.trim();
        if !alias.is_empty() && !merged.iter().any(|a| a.eq_ignore_ascii_case(alias)) {
            merged.push(alias.to_string());
        }
    }
    if merged.len() > series.aliases.len() {
        db.set_series_aliases(series.id, &merged)?;
        debug!("Series {} now has {} aliases", series.id, merged.len());
    }
    Ok(())
}
