/// Trait for reporting scan progress.
///
/// CLI implements with indicatif; tests use [`SilentReporter`].
/// All methods have default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    fn on_discovery_start(&self, _root: &str) {}
    fn on_discovery_progress(&self, _files_found: usize, _current_path: &str) {}
    fn on_discovery_complete(&self, _total_files: usize, _duration_secs: f64) {}
    fn on_plan_complete(&self, _new: usize, _moved: usize, _orphaned: usize, _unchanged: usize) {}
    fn on_apply_start(&self, _total_changes: usize) {}
    fn on_apply_complete(&self, _added: usize, _moved: usize, _removed: usize, _duration_secs: f64) {}
    fn on_link_progress(&self, _processed: usize, _total: usize) {}
    fn on_link_complete(&self, _linked: usize, _failed: usize) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}
