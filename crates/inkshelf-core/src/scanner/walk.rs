use dashmap::DashMap;
use glob::Pattern;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::UNIX_EPOCH;
use tracing::{debug, error, warn};

use super::sidecar::{read_sidecar, SeriesDefinition};
use crate::config::ScanSettings;
use crate::progress::ProgressReporter;

/// Archive formats the library tracks. Compared case-insensitively.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "cbz", "cbr", "cb7", "cbt", "zip", "rar", "7z", "pdf", "epub",
];

/// A supported archive found on disk. Fingerprints are not computed here.
#[derive(Debug, Clone)]
pub struct DiscoveredFile {
    pub path: PathBuf,
    pub relative_path: String,
    pub file_name: String,
    pub extension: String,
    pub file_size: u64,
    pub last_modified: i64,
}

/// A path that could not be read or parsed. Never aborts the scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanError {
    pub path: String,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct DiscoveryResult {
    /// Sorted by relative path.
    pub files: Vec<DiscoveredFile>,
    /// Relative folder path ("" for the root) to its sidecar definition.
    pub sidecars: HashMap<String, SeriesDefinition>,
    pub errors: Vec<ScanError>,
}

struct Walk<'a> {
    root: &'a Path,
    settings: &'a ScanSettings,
    ignore_patterns: Vec<Pattern>,
    files: Mutex<Vec<DiscoveredFile>>,
    sidecars: DashMap<String, SeriesDefinition>,
    errors: Mutex<Vec<ScanError>>,
    found: AtomicUsize,
    reporter: &'a dyn ProgressReporter,
}

pub fn is_supported_extension(extension: &str) -> bool {
    SUPPORTED_EXTENSIONS
        .iter()
        .any(|ext| ext.eq_ignore_ascii_case(extension))
}

/// Modification time in whole seconds since the epoch, 0 when the platform has none.
pub fn modified_secs(metadata: &fs::Metadata) -> i64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// `/`-joined path of `path` below `root`, or None when `path` is outside it.
pub fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(parts.join("/"))
}

/// Parallel directory traversal collecting supported archives below `root`.
///
/// Hidden entries (leading `.`) and paths matching an ignore glob are skipped.
/// Per-path failures are collected into `errors`; only an unreadable root fails.
pub fn discover_files(
    root: &Path,
    settings: &ScanSettings,
    reporter: &dyn ProgressReporter,
) -> io::Result<DiscoveryResult> {
    if !root.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("Library root {} is not a directory", root.display()),
        ));
    }

    let ignore_patterns: Vec<Pattern> = settings
        .ignore_patterns
        .iter()
        .filter_map(|glob| match Pattern::new(glob) {
            Ok(p) => Some(p),
            Err(e) => {
                error!("Invalid glob pattern '{}': {}", glob, e);
                None
            }
        })
        .collect();

    let walk = Walk {
        root,
        settings,
        ignore_patterns,
        files: Mutex::new(Vec::new()),
        sidecars: DashMap::new(),
        errors: Mutex::new(Vec::new()),
        found: AtomicUsize::new(0),
        reporter,
    };

    walk.visit_dir(root);

    let mut files = walk.files.into_inner().unwrap_or_else(|e| e.into_inner());
    files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    let mut errors = walk.errors.into_inner().unwrap_or_else(|e| e.into_inner());
    errors.sort_by(|a, b| a.path.cmp(&b.path));
    let sidecars: HashMap<String, SeriesDefinition> = walk.sidecars.into_iter().collect();

    debug!(
        "Discovery of {} found {} files, {} sidecars, {} errors",
        root.display(),
        files.len(),
        sidecars.len(),
        errors.len()
    );

    Ok(DiscoveryResult {
        files,
        sidecars,
        errors,
    })
}

impl Walk<'_> {
    fn record_error(&self, path: &Path, message: String) {
        warn!("{}: {}", path.display(), message);
        let mut errors = self.errors.lock().unwrap_or_else(|e| e.into_inner());
        errors.push(ScanError {
            path: path.to_string_lossy().into_owned(),
            message,
        });
    }

    fn is_ignored(&self, path: &Path) -> bool {
        self.ignore_patterns
            .iter()
            .any(|pattern| pattern.matches_path(path))
    }

    fn visit_dir(&self, dir: &Path) {
        if self.is_ignored(dir) {
            return;
        }

        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) => {
                self.record_error(dir, format!("Error reading directory: {}", err));
                return;
            }
        };

        entries.par_bridge().for_each(|entry_result| {
            let entry = match entry_result {
                Ok(entry) => entry,
                Err(err) => {
                    self.record_error(dir, format!("Error reading entry: {}", err));
                    return;
                }
            };

            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                return;
            }

            let path = entry.path();
            let file_type = match entry.file_type() {
                Ok(file_type) => file_type,
                Err(err) => {
                    self.record_error(&path, format!("Error reading file type: {}", err));
                    return;
                }
            };

            if file_type.is_symlink() {
                return;
            }
            if file_type.is_dir() {
                self.visit_dir(&path);
            } else if file_type.is_file() {
                self.visit_file(dir, &path, &name);
            }
        });
    }

    fn visit_file(&self, dir: &Path, path: &Path, name: &str) {
        if self.settings.load_sidecars && name == self.settings.sidecar_file_name {
            self.load_sidecar(dir, path);
            return;
        }

        let extension = match path.extension() {
            Some(ext) => ext.to_string_lossy().to_ascii_lowercase(),
            None => return,
        };
        if !is_supported_extension(&extension) || self.is_ignored(path) {
            return;
        }

        let metadata = match fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(err) => {
                self.record_error(path, format!("Error getting metadata: {}", err));
                return;
            }
        };

        let Some(relative_path) = relative_path(self.root, path) else {
            return;
        };

        let last_modified = modified_secs(&metadata);

        let found = self.found.fetch_add(1, Ordering::Relaxed) + 1;
        self.reporter.on_discovery_progress(found, &relative_path);

        let mut files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        files.push(DiscoveredFile {
            path: path.to_path_buf(),
            relative_path,
            file_name: name.to_string(),
            extension,
            file_size: metadata.len(),
            last_modified,
        });
    }

    fn load_sidecar(&self, dir: &Path, path: &Path) {
        let Some(folder) = relative_path(self.root, dir) else {
            return;
        };
        match read_sidecar(path) {
            Ok(definition) => {
                debug!("Loaded sidecar for '{}': {}", folder, definition.name);
                self.sidecars.insert(folder, definition);
            }
            Err(err) => self.record_error(path, format!("Invalid sidecar: {}", err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_extensions() {
        assert!(is_supported_extension("cbz"));
        assert!(is_supported_extension("CBR"));
        assert!(is_supported_extension("pdf"));
        assert!(!is_supported_extension("jpg"));
        assert!(!is_supported_extension("json"));
    }

    #[test]
    fn test_relative_path_uses_forward_slashes() {
        let root = Path::new("/library");
        let path = Path::new("/library/Batman (2011)/Batman 001.cbz");
        assert_eq!(
            relative_path(root, path).as_deref(),
            Some("Batman (2011)/Batman 001.cbz")
        );
        assert_eq!(relative_path(root, root).as_deref(), Some(""));
        assert!(relative_path(root, Path::new("/elsewhere/a.cbz")).is_none());
    }
}
