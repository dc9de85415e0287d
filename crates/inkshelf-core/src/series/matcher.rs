use serde::Serialize;
use std::cmp::Ordering;

use super::naming::{normalize_publisher, normalize_series_name, CandidateName};
use super::similarity::similarity;
use crate::error::Error;
use crate::storage::models::Series;
use crate::storage::Database;

pub const EXACT_CONFIDENCE: f64 = 1.0;
pub const PARTIAL_CONFIDENCE: f64 = 0.9;
/// Fuzzy confidence is the name similarity scaled by this weight, so it never reaches
/// the exact or partial tiers.
pub const FUZZY_WEIGHT: f64 = 0.75;
pub const FUZZY_MIN_SIMILARITY: f64 = 0.7;
/// A runner-up within this fraction of the top score makes the result ambiguous.
pub const AMBIGUITY_RATIO: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    /// Resolved through a folder sidecar definition.
    Sidecar,
    /// Name, start year and publisher all agree.
    Exact,
    /// Name and start year agree.
    Partial,
    /// Names are similar but not equal.
    Fuzzy,
    None,
}

impl MatchType {
    fn rank(self) -> u8 {
        match self {
            MatchType::Sidecar => 0,
            MatchType::Exact => 1,
            MatchType::Partial => 2,
            MatchType::Fuzzy => 3,
            MatchType::None => 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesCandidate {
    pub series_id: i64,
    pub name: String,
    pub start_year: Option<i32>,
    pub publisher: Option<String>,
    pub match_type: MatchType,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchOutcome {
    /// Match type of the top candidate, or `None` when nothing qualified.
    pub match_type: MatchType,
    /// Qualifying candidates, best first.
    pub candidates: Vec<SeriesCandidate>,
    pub needs_confirmation: bool,
}

impl MatchOutcome {
    pub fn none() -> Self {
        Self {
            match_type: MatchType::None,
            candidates: Vec::new(),
            needs_confirmation: false,
        }
    }

    pub fn best(&self) -> Option<&SeriesCandidate> {
        self.candidates.first()
    }
}

/// Score every series against `query` and rank the qualifying ones.
///
/// Tiers: exact identity key (1.0), name and year (0.9), then name similarity over the
/// canonical name and aliases scaled by [`FUZZY_WEIGHT`]. Archived series are candidates.
pub fn rank_series(query: &CandidateName, series: &[Series]) -> MatchOutcome {
    let query_name = normalize_series_name(&query.name);
    if query_name.is_empty() {
        return MatchOutcome::none();
    }
    let query_publisher = normalize_publisher(query.publisher.as_deref());

    let mut candidates: Vec<SeriesCandidate> = series
        .iter()
        .filter_map(|s| score_series(&query_name, query.year, &query_publisher, s))
        .collect();

    candidates.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.match_type.rank().cmp(&b.match_type.rank()))
            .then_with(|| a.series_id.cmp(&b.series_id))
    });

    let Some(top) = candidates.first() else {
        return MatchOutcome::none();
    };
    let needs_confirmation = candidates
        .get(1)
        .is_some_and(|runner_up| runner_up.confidence >= top.confidence * AMBIGUITY_RATIO);

    MatchOutcome {
        match_type: top.match_type,
        candidates,
        needs_confirmation,
    }
}

fn score_series(
    query_name: &str,
    query_year: Option<i32>,
    query_publisher: &Option<String>,
    series: &Series,
) -> Option<SeriesCandidate> {
    let name_equal = series.normalized_name == query_name;
    let year_equal = series.start_year == query_year;

    let (match_type, confidence) = if name_equal
        && year_equal
        && normalize_publisher(series.publisher.as_deref()) == *query_publisher
    {
        (MatchType::Exact, EXACT_CONFIDENCE)
    } else if name_equal && query_year.is_some() && year_equal {
        (MatchType::Partial, PARTIAL_CONFIDENCE)
    } else {
        let best = std::iter::once(series.normalized_name.clone())
            .chain(series.aliases.iter().map(|a| normalize_series_name(a)))
            .filter(|name| !name.is_empty())
            .map(|name| similarity(query_name, &name))
            .fold(0.0_f64, f64::max);
        if best < FUZZY_MIN_SIMILARITY {
            return None;
        }
        (MatchType::Fuzzy, best * FUZZY_WEIGHT)
    };

    Some(SeriesCandidate {
        series_id: series.id,
        name: series.name.clone(),
        start_year: series.start_year,
        publisher: series.publisher.clone(),
        match_type,
        confidence,
    })
}

pub fn find_series_matches(db: &Database, query: &CandidateName) -> Result<MatchOutcome, Error> {
    let series = db.all_series()?;
    Ok(rank_series(query, &series))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::models::SeriesStatus;

    fn series(id: i64, name: &str, year: Option<i32>, publisher: Option<&str>) -> Series {
        Series {
            id,
            name: name.to_string(),
            normalized_name: normalize_series_name(name),
            aliases: Vec::new(),
            start_year: year,
            end_year: None,
            publisher: publisher.map(str::to_string),
            external_ids: Vec::new(),
            status: SeriesStatus::Active,
            cover_file_id: None,
        }
    }

    fn query(name: &str, year: Option<i32>, publisher: Option<&str>) -> CandidateName {
        CandidateName {
            name: name.to_string(),
            year,
            publisher: publisher.map(str::to_string),
        }
    }

    #[test]
    fn test_exact_match() {
        let all = vec![series(1, "Batman", Some(2011), Some("DC Comics"))];
        let outcome = rank_series(&query("batman", Some(2011), Some("dc comics")), &all);
        assert_eq!(outcome.match_type, MatchType::Exact);
        assert_eq!(outcome.best().unwrap().confidence, EXACT_CONFIDENCE);
        assert!(!outcome.needs_confirmation);
    }

    #[test]
    fn test_exact_match_without_year_or_publisher() {
        let all = vec![series(1, "Saga", None, None)];
        let outcome = rank_series(&query("Saga", None, None), &all);
        assert_eq!(outcome.match_type, MatchType::Exact);
    }

    #[test]
    fn test_partial_match_needs_query_year() {
        let all = vec![series(1, "Batman", Some(2011), Some("DC Comics"))];

        let outcome = rank_series(&query("Batman", Some(2011), None), &all);
        assert_eq!(outcome.match_type, MatchType::Partial);
        assert_eq!(outcome.best().unwrap().confidence, PARTIAL_CONFIDENCE);

        let outcome = rank_series(&query("Batman", None, None), &all);
        assert_eq!(outcome.match_type, MatchType::Fuzzy);
    }

    #[test]
    fn test_exact_outranks_fuzzy() {
        let all = vec![
            series(1, "Batmen", Some(2011), None),
            series(2, "Batman", Some(2011), None),
        ];
        let outcome = rank_series(&query("Batman", Some(2011), None), &all);
        let best = outcome.best().unwrap();
        assert_eq!(best.series_id, 2);
        assert_eq!(best.match_type, MatchType::Exact);
        assert!(outcome.candidates[1].confidence < best.confidence * AMBIGUITY_RATIO);
        assert!(!outcome.needs_confirmation);
    }

    #[test]
    fn test_fuzzy_matches_aliases() {
        let mut saga = series(1, "Saga", Some(2012), None);
        saga.aliases = vec!["Saga Image Comics".to_string()];
        let outcome = rank_series(&query("Saga (Image Comics)", None, None), &[saga]);
        assert_eq!(outcome.match_type, MatchType::Fuzzy);
        assert!((outcome.best().unwrap().confidence - FUZZY_WEIGHT).abs() < 1e-9);
    }

    #[test]
    fn test_ambiguous_candidates_need_confirmation() {
        let all = vec![
            series(1, "Batman", Some(1940), None),
            series(2, "Batman", Some(2011), None),
        ];
        let outcome = rank_series(&query("Batman", None, None), &all);
        assert_eq!(outcome.match_type, MatchType::Fuzzy);
        assert_eq!(outcome.candidates.len(), 2);
        assert!(outcome.needs_confirmation);
    }

    #[test]
    fn test_no_match() {
        let all = vec![series(1, "Saga", None, None)];
        let outcome = rank_series(&query("Hellboy", None, None), &all);
        assert_eq!(outcome.match_type, MatchType::None);
        assert!(outcome.best().is_none());
        assert_eq!(rank_series(&query("!!!", None, None), &all).match_type, MatchType::None);
    }
}
