use crate::config::AppConfig;
use crate::error::Error;
use crate::folders::{self, BackfillSummary};
use crate::metadata::{ComicInfoExtractor, MetadataExtractor};
use crate::progress::{ProgressReporter, SilentReporter};
use crate::scan::{
    self, plan_scan, spawn_post_scan_pipeline, ApplyOutcome, PipelineHandle, PostScanJob,
    ScanContext, ScanResult,
};
use crate::scanner;
use crate::series::{self, AutoLinkOptions, AutoLinkOutcome};
use crate::storage::models::{Library, LibraryStats};
use crate::storage::Database;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Entry point tying discovery, planning, applying and linking to one catalog database.
pub struct ScanEngine {
    config: AppConfig,
    db: Arc<Mutex<Database>>,
    extractor: Arc<dyn MetadataExtractor>,
    reporter: Arc<dyn ProgressReporter>,
}

/// The synchronous part of an apply plus the handle of its background linking pass.
pub struct AppliedScan {
    pub outcome: ApplyOutcome,
    pub linking: PipelineHandle,
}

impl ScanEngine {
    pub fn open(config: AppConfig) -> Result<Self, Error> {
        config.validate()?;
        for (a, b) in config.overlapping_roots() {
            warn!("Libraries '{}' and '{}' have overlapping roots", a, b);
        }
        let db = Database::open(&config.database_path)?;
        Ok(Self::with_database(config, db))
    }

    pub fn with_database(config: AppConfig, db: Database) -> Self {
        Self {
            config,
            db: Arc::new(Mutex::new(db)),
            extractor: Arc::new(ComicInfoExtractor),
            reporter: Arc::new(SilentReporter),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn MetadataExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn database(&self) -> Arc<Mutex<Database>> {
        Arc::clone(&self.db)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Database>, Error> {
        self.db
            .lock()
            .map_err(|_| Error::Other("database lock poisoned".into()))
    }

    /// Run `f` against the catalog while holding the database lock.
    pub fn with_db<T>(&self, f: impl FnOnce(&Database) -> Result<T, Error>) -> Result<T, Error> {
        f(&*self.lock()?)
    }

    /// Register every configured library, resolving roots to canonical paths when possible.
    pub fn sync_libraries(&self) -> Result<Vec<Library>, Error> {
        let db = self.lock()?;
        let mut libraries = Vec::with_capacity(self.config.libraries.len());
        for library in &self.config.libraries {
            let root = match fs::canonicalize(&library.root_path) {
                Ok(root) => root.to_string_lossy().into_owned(),
                Err(e) => {
                    warn!("Cannot resolve root of library '{}': {}", library.name, e);
                    library.root_path.clone()
                }
            };
            let registered = db.upsert_library(library.name.trim(), &root)?;
            debug!("Library '{}' registered as {}", registered.name, registered.id);
            libraries.push(registered);
        }
        Ok(libraries)
    }

    pub fn libraries(&self) -> Result<Vec<Library>, Error> {
        Ok(self.lock()?.list_libraries()?)
    }

    pub fn library_by_name(&self, name: &str) -> Result<Library, Error> {
        self.lock()?
            .list_libraries()?
            .into_iter()
            .find(|l| l.name == name)
            .ok_or_else(|| Error::not_found("library", name))
    }

    /// Make sure the library's folder tree exists before it is scanned.
    pub fn prepare_library(&self, library_id: i64) -> Result<BackfillSummary, Error> {
        folders::backfill_library_folders(&*self.lock()?, library_id)
    }

    /// Discover files and compute the scan plan. Nothing is written except a one-time
    /// folder backfill.
    pub fn scan_library(&self, library_id: i64) -> Result<ScanResult, Error> {
        let started = Instant::now();

        let ctx = {
            let db = self.lock()?;
            folders::backfill_library_folders(&db, library_id)?;
            ScanContext::load(&db, library_id, &self.config.scan)?
        };

        let root = ctx.library.root_path.clone();
        info!("Scanning library '{}' at {}", ctx.library.name, root);
        self.reporter.on_discovery_start(&root);
        let discovery =
            scanner::discover_files(Path::new(&root), &self.config.scan, self.reporter.as_ref())?;
        self.reporter
            .on_discovery_complete(discovery.files.len(), started.elapsed().as_secs_f64());

        let result = plan_scan(&ctx, discovery, started);
        self.reporter.on_plan_complete(
            result.new_files.len(),
            result.moved.len(),
            result.orphaned.len(),
            result.unchanged.len(),
        );
        Ok(result)
    }

    /// Write a plan and start background metadata extraction and linking for new files.
    pub fn apply_scan_results(&self, result: &ScanResult) -> Result<AppliedScan, Error> {
        self.reporter.on_apply_start(result.total_changes());
        let outcome = scan::apply_scan_results(&*self.lock()?, result, &self.config.scan)?;
        self.reporter.on_apply_complete(
            outcome.added,
            outcome.moved,
            outcome.total_removed(),
            outcome.duration.as_secs_f64(),
        );

        let job = PostScanJob {
            library_id: result.library_id,
            file_ids: outcome.new_file_ids.clone(),
            sidecars: result.sidecars.clone(),
            options: self.config.linking.clone().into(),
        };
        let linking = spawn_post_scan_pipeline(
            self.database(),
            job,
            Arc::clone(&self.extractor),
            Arc::clone(&self.reporter),
        )?;

        Ok(AppliedScan { outcome, linking })
    }

    pub fn library_stats(&self, library_id: i64) -> Result<LibraryStats, Error> {
        let db = self.lock()?;
        let library = db
            .get_library(library_id)?
            .ok_or_else(|| Error::not_found("library", library_id))?;
        Ok(db.library_stats(&library)?)
    }

    pub fn all_library_stats(&self) -> Result<Vec<LibraryStats>, Error> {
        let db = self.lock()?;
        let mut stats = Vec::new();
        for library in db.list_libraries()? {
            stats.push(db.library_stats(&library)?);
        }
        Ok(stats)
    }

    /// Link one file outside a scan. Sidecars are not consulted here.
    pub fn auto_link_file(
        &self,
        file_id: i64,
        options: Option<AutoLinkOptions>,
    ) -> Result<AutoLinkOutcome, Error> {
        let options = options.unwrap_or_else(|| self.config.linking.clone().into());
        series::auto_link_file_to_series(&*self.lock()?, file_id, &options, None)
    }
}
