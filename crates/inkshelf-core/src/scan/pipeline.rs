use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

use crate::error::Error;
use crate::metadata::MetadataExtractor;
use crate::progress::ProgressReporter;
use crate::scanner::SeriesDefinition;
use crate::series::{
    auto_link_file_to_series, AutoLinkOptions, AutoLinkOutcome, FolderSeriesRegistry,
};
use crate::storage::models::FileStatus;
use crate::storage::Database;

/// Work handed to the post-scan pipeline after an apply.
#[derive(Debug, Clone)]
pub struct PostScanJob {
    pub library_id: i64,
    pub file_ids: Vec<i64>,
    pub sidecars: HashMap<String, SeriesDefinition>,
    pub options: AutoLinkOptions,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PipelineSummary {
    pub processed: usize,
    pub indexed: usize,
    pub quarantined: usize,
    pub linked: usize,
    pub created: usize,
    pub needs_confirmation: usize,
    pub unnamed: usize,
    pub failed: usize,
}

/// Handle to the detached metadata and linking thread.
pub struct PipelineHandle {
    handle: JoinHandle<PipelineSummary>,
}

impl PipelineHandle {
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the pipeline. Returns None if the thread panicked.
    pub fn join(self) -> Option<PipelineSummary> {
        match self.handle.join() {
            Ok(summary) => Some(summary),
            Err(_) => {
                error!("Post-scan pipeline thread panicked");
                None
            }
        }
    }
}

/// Run metadata extraction and series linking for newly added files on a background thread.
pub fn spawn_post_scan_pipeline(
    db: Arc<Mutex<Database>>,
    job: PostScanJob,
    extractor: Arc<dyn MetadataExtractor>,
    reporter: Arc<dyn ProgressReporter>,
) -> Result<PipelineHandle, Error> {
    let handle = thread::Builder::new()
        .name(format!("inkshelf-link-{}", job.library_id))
        .spawn(move || run_post_scan_pipeline(&db, job, extractor.as_ref(), reporter.as_ref()))?;
    Ok(PipelineHandle { handle })
}

/// Process each file in order: extract metadata, mark it indexed (or quarantined when the
/// archive is unreadable), then auto-link it. A failure on one file never stops the rest.
pub fn run_post_scan_pipeline(
    db: &Mutex<Database>,
    job: PostScanJob,
    extractor: &dyn MetadataExtractor,
    reporter: &dyn ProgressReporter,
) -> PipelineSummary {
    let total = job.file_ids.len();
    let mut registry = FolderSeriesRegistry::new(job.sidecars);
    let mut summary = PipelineSummary::default();
    if !registry.is_empty() {
        debug!("{} folder sidecars available for linking", registry.len());
    }

    for (i, file_id) in job.file_ids.iter().enumerate() {
        match process_file(db, *file_id, extractor, &job.options, &mut registry, &mut summary) {
            Ok(()) => {}
            Err(e) => {
                error!("Post-scan processing failed for file {}: {}", file_id, e);
                summary.failed += 1;
            }
        }
        summary.processed += 1;
        reporter.on_link_progress(i + 1, total);
    }

    reporter.on_link_complete(summary.linked + summary.created, summary.failed);
    info!(
        "Post-scan pipeline for library {}: {} indexed, {} quarantined, {} linked, {} created, {} need confirmation, {} failed",
        job.library_id,
        summary.indexed,
        summary.quarantined,
        summary.linked,
        summary.created,
        summary.needs_confirmation,
        summary.failed
    );
    summary
}

fn lock(db: &Mutex<Database>) -> Result<MutexGuard<'_, Database>, Error> {
    db.lock()
        .map_err(|_| Error::Other("database lock poisoned".into()))
}

fn process_file(
    db: &Mutex<Database>,
    file_id: i64,
    extractor: &dyn MetadataExtractor,
    options: &AutoLinkOptions,
    registry: &mut FolderSeriesRegistry,
    summary: &mut PipelineSummary,
) -> Result<(), Error> {
    let file = lock(db)?
        .get_catalog_file(file_id)?
        .ok_or_else(|| Error::not_found("file", file_id))?;

    // Archive reads happen without holding the database.
    let extracted = extractor.extract(Path::new(&file.absolute_path), &file.extension);

    let db = lock(db)?;
    match extracted {
        Ok(metadata) => {
            let json = metadata.as_ref().map(serde_json::to_string).transpose()?;
            db.set_file_metadata(file.id, json.as_deref())?;
            db.set_file_status(file.id, FileStatus::Indexed)?;
            summary.indexed += 1;
        }
        Err(e) => {
            warn!("Quarantining unreadable archive '{}': {}", file.relative_path, e);
            db.set_file_status(file.id, FileStatus::Quarantined)?;
            summary.quarantined += 1;
            return Ok(());
        }
    }

    match auto_link_file_to_series(&db, file.id, options, Some(registry))? {
        AutoLinkOutcome::Linked { .. } | AutoLinkOutcome::AlreadyLinked { .. } => {
            summary.linked += 1
        }
        AutoLinkOutcome::Created { .. } => summary.created += 1,
        AutoLinkOutcome::NeedsConfirmation { .. } | AutoLinkOutcome::NoMatch { .. } => {
            summary.needs_confirmation += 1
        }
        AutoLinkOutcome::NoSeriesName => {
            debug!("No series candidate for '{}'", file.relative_path);
            summary.unnamed += 1;
        }
    }
    Ok(())
}
