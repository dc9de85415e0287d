use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

lazy_static! {
    static ref NON_ALPHANUMERIC: Regex = Regex::new(r"[^\p{L}\p{N}]+").unwrap();
    static ref SEPARATORS: Regex = Regex::new(r"[._]+").unwrap();
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
    static ref TRAILING_YEAR: Regex = Regex::new(r"^(?P<name>.*?)\s*[\(\[](?P<year>\d{4})[\)\]]\s*$").unwrap();
    static ref TRAILING_VOLUME: Regex = Regex::new(r"(?i)\s+v(?:ol(?:ume)?)?\.?\s*\d+$").unwrap();
}

/// The series a file most likely belongs to, as read from metadata or its folder name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateName {
    pub name: String,
    pub year: Option<i32>,
    pub publisher: Option<String>,
}

/// Lowercased, punctuation-free form used for identity comparison.
/// "The Amazing Spider-Man" and "amazing_spider.man" normalize alike.
pub fn normalize_series_name(name: &str) -> String {
    let lowered = name.to_lowercase();
    let spaced = NON_ALPHANUMERIC.replace_all(&lowered, " ");
    let trimmed = spaced.trim();
    trimmed
        .strip_prefix("the ")
        .unwrap_or(trimmed)
        .trim()
        .to_string()
}

pub fn normalize_publisher(publisher: Option<&str>) -> Option<String> {
    publisher
        .map(normalize_series_name)
        .filter(|p| !p.is_empty())
}

/// Turn `Batman_The.Long_Halloween` into `Batman The Long Halloween`.
pub fn clean_series_title(raw: &str) -> String {
    let spaced = SEPARATORS.replace_all(raw, " ");
    WHITESPACE.replace_all(spaced.trim(), " ").into_owned()
}

/// Split a folder name like `Saga (2012)` into its title and year.
pub fn parse_folder_name(folder_name: &str) -> Option<CandidateName> {
    let (title, year) = match TRAILING_YEAR.captures(folder_name) {
        Some(caps) => (
            caps.name("name").map_or("", |m| m.as_str()),
            caps.name("year").and_then(|m| parse_year(m.as_str())),
        ),
        None => (folder_name, None),
    };

    let title = clean_series_title(title);
    let title = TRAILING_VOLUME.replace(&title, "").trim().to_string();
    if normalize_series_name(&title).is_empty() {
        return None;
    }
    Some(CandidateName {
        name: title,
        year,
        publisher: None,
    })
}

/// A four-digit year in a plausible publishing range.
pub fn parse_year(raw: &str) -> Option<i32> {
    raw.trim()
        .parse::<i32>()
        .ok()
        .filter(|y| (1900..=2100).contains(y))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_series_name() {
        assert_eq!(normalize_series_name("The Amazing Spider-Man"), "amazing spider man");
        assert_eq!(normalize_series_name("amazing_spider.man"), "amazing spider man");
        assert_eq!(normalize_series_name("  BATMAN  "), "batman");
        assert_eq!(normalize_series_name("X-Men: Red"), "x men red");
        assert_eq!(normalize_series_name("---"), "");
    }

    #[test]
    fn test_clean_series_title() {
        assert_eq!(clean_series_title("Batman_The.Long_Halloween"), "Batman The Long Halloween");
        assert_eq!(clean_series_title("  Saga   "), "Saga");
    }

    #[test]
    fn test_parse_folder_name_with_year() {
        let candidate = parse_folder_name("Saga (2012)").unwrap();
        assert_eq!(candidate.name, "Saga");
        assert_eq!(candidate.year, Some(2012));

        let candidate = parse_folder_name("Batman [2011]").unwrap();
        assert_eq!(candidate.name, "Batman");
        assert_eq!(candidate.year, Some(2011));
    }

    #[test]
    fn test_parse_folder_name_strips_volume() {
        let candidate = parse_folder_name("Nightwing v2").unwrap();
        assert_eq!(candidate.name, "Nightwing");
        assert_eq!(candidate.year, None);
    }

    #[test]
    fn test_parse_folder_name_rejects_empty() {
        assert!(parse_folder_name("(2012)").is_none());
        assert!(parse_folder_name("___").is_none());
    }

    #[test]
    fn test_parse_year_range() {
        assert_eq!(parse_year("1991"), Some(1991));
        assert_eq!(parse_year("12"), None);
        assert_eq!(parse_year("abcd"), None);
    }
}
