//! Incremental library scans in two phases: a read-only plan, then an apply that writes
//! it to the catalog and hands new files to the post-scan pipeline.

pub mod apply;
pub mod pipeline;
pub mod plan;
pub mod removal;

pub use apply::{apply_scan_results, ApplyOutcome};
pub use pipeline::{
    run_post_scan_pipeline, spawn_post_scan_pipeline, PipelineHandle, PipelineSummary, PostScanJob,
};
pub use plan::{
    plan_scan, MovedFile, NewFile, OrphanedFile, ScanContext, ScanResult, UnchangedFile,
};
pub use removal::{remove_catalog_file, RemovedFile};
