pub mod lifecycle;
pub mod linker;
pub mod matcher;
pub mod naming;
pub mod registry;
pub mod similarity;

pub use lifecycle::{settle_series, SeriesSettlement};
pub use linker::{
    auto_link_file_to_series, candidate_name, link_file_to_series, unlink_file, AutoLinkOptions,
    AutoLinkOutcome,
};
pub use matcher::{find_series_matches, rank_series, MatchOutcome, MatchType, SeriesCandidate};
pub use naming::{normalize_series_name, CandidateName};
pub use registry::FolderSeriesRegistry;
