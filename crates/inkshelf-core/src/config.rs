use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::Deserialize;
use std::path::Path;

use crate::error::Error;

pub const DEFAULT_DATABASE_PATH: &str = "inkshelf.db";
pub const DEFAULT_SIDECAR_FILE_NAME: &str = "series.json";
pub const DEFAULT_FINGERPRINT_PREFIX_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database_path: String,
    pub libraries: Vec<LibraryConfig>,
    pub scan: ScanSettings,
    pub linking: LinkSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LibraryConfig {
    pub name: String,
    pub root_path: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    /// Read per-folder sidecar series definitions during discovery.
    pub load_sidecars: bool,
    pub sidecar_file_name: String,
    /// Glob patterns matched against full paths; matching entries are skipped.
    pub ignore_patterns: Vec<String>,
    /// Number of leading bytes fed into the move-detection fingerprint.
    pub fingerprint_prefix_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LinkSettings {
    /// Fuzzy matches below this confidence are returned for confirmation instead of linked.
    pub auto_link_min_confidence: f64,
    pub create_missing_series: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: DEFAULT_DATABASE_PATH.to_string(),
            libraries: Vec::new(),
            scan: ScanSettings::default(),
            linking: LinkSettings::default(),
        }
    }
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            load_sidecars: true,
            sidecar_file_name: DEFAULT_SIDECAR_FILE_NAME.to_string(),
            ignore_patterns: Vec::new(),
            fingerprint_prefix_bytes: DEFAULT_FINGERPRINT_PREFIX_BYTES,
        }
    }
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            auto_link_min_confidence: 0.6,
            create_missing_series: true,
        }
    }
}

/// Load `Inkshelf.toml` (optional) overlaid with `INKSHELF__*` environment variables.
pub fn load_configuration() -> Result<AppConfig, ConfigError> {
    let builder = Config::builder()
        .add_source(ConfigFile::with_name("Inkshelf").required(false))
        .add_source(Environment::with_prefix("INKSHELF").separator("__"))
        .build()?;
    builder.try_deserialize::<AppConfig>()
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), Error> {
        let mut seen: Vec<&str> = Vec::new();
        for library in &self.libraries {
            let name = library.name.trim();
            if name.is_empty() {
                return Err(Error::InvalidData("library name cannot be empty".into()));
            }
            if seen.contains(&name) {
                return Err(Error::InvalidData(format!(
                    "library '{}' is configured more than once",
                    name
                )));
            }
            seen.push(name);
        }

        if self.scan.fingerprint_prefix_bytes == 0 {
            return Err(Error::InvalidData(
                "scan.fingerprint_prefix_bytes must be greater than zero".into(),
            ));
        }

        if !(0.0..=1.0).contains(&self.linking.auto_link_min_confidence) {
            return Err(Error::InvalidData(
                "linking.auto_link_min_confidence must be between 0 and 1".into(),
            ));
        }

        Ok(())
    }

    /// Pairs of library names where one root contains the other.
    pub fn overlapping_roots(&self) -> Vec<(String, String)> {
        let mut overlaps = Vec::new();

        for (i, a) in self.libraries.iter().enumerate() {
            for b in self.libraries.iter().skip(i + 1) {
                let a_path = Path::new(&a.root_path);
                let b_path = Path::new(&b.root_path);
                if a_path.starts_with(b_path) || b_path.starts_with(a_path) {
                    overlaps.push((a.name.clone(), b.name.clone()));
                }
            }
        }

        overlaps
    }
}
