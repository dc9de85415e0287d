pub mod config;
pub mod engine;
pub mod error;
pub mod folders;
pub mod hasher;
pub mod metadata;
pub mod progress;
pub mod scan;
pub mod scanner;
pub mod series;
pub mod storage;

pub use config::AppConfig;
pub use engine::{AppliedScan, ScanEngine};
pub use error::{Error, Result};
pub use progress::{ProgressReporter, SilentReporter};
pub use scan::{ApplyOutcome, PipelineSummary, ScanResult};
pub use series::{AutoLinkOptions, AutoLinkOutcome, MatchType};
pub use storage::Database;
