use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::debug;

use super::MetadataExtractor;
use crate::error::Error;

/// Largest ComicInfo.xml we are willing to read.
const MAX_COMIC_INFO_BYTES: u64 = 1024 * 1024;

lazy_static! {
    static ref SIMPLE_ELEMENT: Regex = Regex::new(r"(?s)<(\w+)>([^<]*)</(\w+)>").unwrap();
}

/// The subset of ComicInfo.xml fields used for cataloging and series matching.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComicInfo {
    pub series: Option<String>,
    pub title: Option<String>,
    pub number: Option<String>,
    pub volume: Option<String>,
    pub year: Option<i32>,
    pub publisher: Option<String>,
    pub writer: Option<String>,
    pub summary: Option<String>,
    pub page_count: Option<i32>,
}

impl ComicInfo {
    pub fn is_empty(&self) -> bool {
        *self == ComicInfo::default()
    }
}

/// Reads `ComicInfo.xml` out of zip-based archives. Other formats yield no metadata.
#[derive(Debug, Default, Clone, Copy)]
pub struct ComicInfoExtractor;

impl MetadataExtractor for ComicInfoExtractor {
    fn extract(&self, path: &Path, extension: &str) -> Result<Option<ComicInfo>, Error> {
        if !matches!(extension.to_ascii_lowercase().as_str(), "cbz" | "zip") {
            return Ok(None);
        }

        let file = File::open(path)?;
        let mut archive = zip::ZipArchive::new(file)?;

        let entry_name = archive
            .file_names()
            .find(|name| {
                let base = name.rsplit('/').next().unwrap_or(name);
                base.eq_ignore_ascii_case("comicinfo.xml")
            })
            .map(str::to_string);
        let Some(entry_name) = entry_name else {
            debug!("No ComicInfo.xml in {}", path.display());
            return Ok(None);
        };

        let entry = archive.by_name(&entry_name)?;
        let mut xml = String::new();
        entry.take(MAX_COMIC_INFO_BYTES).read_to_string(&mut xml)?;

        let info = parse_comic_info(&xml);
        Ok(if info.is_empty() { None } else { Some(info) })
    }
}

/// Pull the known leaf elements out of a ComicInfo document. Unknown tags are ignored.
///
/// Only flat `<Tag>text</Tag>` elements are read. An element carrying attributes or a
/// CDATA section is skipped, so its field stays `None`.
pub fn parse_comic_info(xml: &str) -> ComicInfo {
    let mut values: HashMap<String, String> = HashMap::new();
    for caps in SIMPLE_ELEMENT.captures_iter(xml) {
        if caps[1] != caps[3] {
            continue;
        }
        let value = unescape(caps[2].trim());
        if !value.is_empty() {
            values.entry(caps[1].to_string()).or_insert(value);
        }
    }

    ComicInfo {
        series: values.remove("Series"),
        title: values.remove("Title"),
        number: values.remove("Number"),
        volume: values.remove("Volume"),
        year: values.get("Year").and_then(|y| y.parse().ok()),
        publisher: values.remove("Publisher"),
        writer: values.remove("Writer"),
        summary: values.remove("Summary"),
        page_count: values.get("PageCount").and_then(|p| p.parse().ok()),
    }
}

fn unescape(raw: &str) -> String {
    raw.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
