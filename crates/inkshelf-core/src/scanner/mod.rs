pub mod sidecar;
pub mod walk;

pub use sidecar::SeriesDefinition;
pub use walk::{discover_files, DiscoveredFile, DiscoveryResult, ScanError};
