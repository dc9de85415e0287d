//! Materialized folder tree per library: one row per directory holding cataloged files,
//! with own and aggregate file counts kept in step with every add, move and removal.

pub mod backfill;
pub mod browse;
pub mod hierarchy;
pub mod path;

pub use backfill::{backfill_library_folders, BackfillSummary};
pub use browse::{
    ancestor_chain, child_folders, files_in_folder, folder_at_path, folder_subtree, root_folders,
    FolderNode,
};
pub use hierarchy::{
    delete_folder, ensure_folder_path, increment_folder_file_counts, prune_empty_folders,
    recalculate_folder_counts, recalculate_library_counts, rename_folder, DeleteFolderOutcome,
};
