pub mod comic_info;

use std::path::Path;

use crate::error::Error;

pub use comic_info::{parse_comic_info, ComicInfo, ComicInfoExtractor};

/// Reads embedded metadata from an archive.
///
/// `Ok(None)` means the archive is readable but carries no metadata; an `Err` means the
/// archive itself could not be opened and the file should be quarantined.
pub trait MetadataExtractor: Send + Sync {
    fn extract(&self, path: &Path, extension: &str) -> Result<Option<ComicInfo>, Error>;
}
