use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::Path;

use crate::error::Error;

/// A folder's declared series identity, read from its sidecar file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesDefinition {
    pub name: String,
    pub year: Option<i32>,
    pub publisher: Option<String>,
    pub external_id: Option<String>,
    pub aliases: Vec<String>,
}

#[derive(Deserialize)]
struct RawDefinition {
    name: Option<String>,
    #[serde(alias = "year_began")]
    year: Option<Value>,
    publisher: Option<String>,
    #[serde(alias = "comicid")]
    comic_id: Option<Value>,
    #[serde(default)]
    aliases: Vec<String>,
}

// Mylar writes `{"metadata": {...}}`; hand-written files often skip the wrapper.
#[derive(Deserialize)]
#[serde(untagged)]
enum SidecarFile {
    Wrapped { metadata: RawDefinition },
    Bare(RawDefinition),
}

pub fn read_sidecar(path: &Path) -> Result<SeriesDefinition, Error> {
    let raw = fs::read_to_string(path)?;
    parse_sidecar(&raw)
}

pub fn parse_sidecar(raw: &str) -> Result<SeriesDefinition, Error> {
    let parsed: SidecarFile = serde_json::from_str(raw)?;
    let raw = match parsed {
        SidecarFile::Wrapped { metadata } => metadata,
        SidecarFile::Bare(raw) => raw,
    };

    let name = raw
        .name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| Error::InvalidData("sidecar has no series name".into()))?;

    Ok(SeriesDefinition {
        name,
        year: raw.year.as_ref().and_then(value_as_year),
        publisher: raw
            .publisher
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty()),
        external_id: raw.comic_id.as_ref().and_then(value_as_id),
        aliases: raw.aliases,
    })
}

fn value_as_year(value: &Value) -> Option<i32> {
    match value {
        Value::Number(n) => n.as_i64().and_then(|y| i32::try_from(y).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .filter(|y| (1800..=2200).contains(y))
}

fn value_as_id(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mylar_sidecar() {
        let raw = r#"{
            "version": "1.0.2",
            "metadata": {
                "type": "comicSeries",
                "publisher": "DC Comics",
                "name": "Batman",
                "comicid": 42413,
                "year_began": 2011,
                "status": "Ended"
            }
        }"#;
        let def = parse_sidecar(raw).unwrap();
        assert_eq!(def.name, "Batman");
        assert_eq!(def.year, Some(2011));
        assert_eq!(def.publisher.as_deref(), Some("DC Comics"));
        assert_eq!(def.external_id.as_deref(), Some("42413"));
    }

    #[test]
    fn test_out_of_range_year_is_dropped() {
        // 2^32 + 2000 would read as 2000 if narrowed without a check.
        let raw = r#"{"name": "Saga", "year": 4294969296}"#;
        assert_eq!(parse_sidecar(raw).unwrap().year, None);

        let raw = r#"{"name": "Saga", "year": 1492}"#;
        assert_eq!(parse_sidecar(raw).unwrap().year, None);
    }

    #[test]
    fn test_parse_bare_sidecar_with_string_year() {
        let raw = r#"{"name": "Saga", "year": "2012", "aliases": ["Saga (Image)"]}"#;
        let def = parse_sidecar(raw).unwrap();
        assert_eq!(def.name, "Saga");
        assert_eq!(def.year, Some(2012));
        assert_eq!(def.aliases, vec!["Saga (Image)".to_string()]);
        assert!(def.publisher.is_none());
    }

    #[test]
    fn test_parse_sidecar_without_name() {
        assert!(parse_sidecar(r#"{"metadata": {"year_began": 2011}}"#).is_err());
        assert!(parse_sidecar("not json").is_err());
    }
}
