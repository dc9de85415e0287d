use indicatif::{ProgressBar, ProgressStyle};
use inkshelf_core::ProgressReporter;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

const TICK_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// CLI progress reporter using indicatif progress bars.
///
/// - Discovery: spinner (file count unknown upfront)
/// - Apply: spinner
/// - Linking: progress bar over the newly added files
pub struct CliReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl CliReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn guard(&self) -> MutexGuard<'_, Option<ProgressBar>> {
        self.bar.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_bar(&self, pb: ProgressBar) {
        let mut guard = self.guard();
        if let Some(old) = guard.take() {
            old.finish_and_clear();
        }
        *guard = Some(pb);
    }

    fn finish_bar(&self) {
        if let Some(pb) = self.guard().take() {
            pb.finish_and_clear();
        }
    }

    fn spinner(&self, message: String) {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            pb.set_style(style.tick_chars(TICK_CHARS));
        }
        pb.set_message(message);
        pb.enable_steady_tick(Duration::from_millis(80));
        self.set_bar(pb);
    }
}

impl ProgressReporter for CliReporter {
    fn on_discovery_start(&self, root: &str) {
        self.spinner(format!("Scanning {}...", root));
    }

    fn on_discovery_progress(&self, files_found: usize, _current_path: &str) {
        if let Some(pb) = self.guard().as_ref() {
            pb.set_message(format!("Scanning... {} files found", files_found));
        }
    }

    fn on_discovery_complete(&self, total_files: usize, duration_secs: f64) {
        self.finish_bar();
        eprintln!(
            "  \x1b[32m✓\x1b[0m Discovery complete: {} files in {:.2}s",
            total_files, duration_secs
        );
    }

    fn on_plan_complete(&self, new: usize, moved: usize, orphaned: usize, unchanged: usize) {
        eprintln!(
            "  \x1b[32m✓\x1b[0m Plan ready: {} new, {} moved, {} missing, {} unchanged",
            new, moved, orphaned, unchanged
        );
    }

    fn on_apply_start(&self, total_changes: usize) {
        self.spinner(format!("Applying {} changes...", total_changes));
    }

    fn on_apply_complete(&self, added: usize, moved: usize, removed: usize, duration_secs: f64) {
        self.finish_bar();
        eprintln!(
            "  \x1b[32m✓\x1b[0m Catalog updated: {} added, {} moved, {} removed in {:.2}s",
            added, moved, removed, duration_secs
        );
    }

    fn on_link_progress(&self, processed: usize, total: usize) {
        let mut guard = self.guard();
        if guard.is_none() {
            let pb = ProgressBar::new(total as u64);
            if let Ok(style) = ProgressStyle::with_template(
                "  {spinner:.cyan} Linking [{bar:30.cyan/dim}] {pos}/{len} files ({eta} remaining)",
            ) {
                pb.set_style(style.progress_chars("━╸─").tick_chars(TICK_CHARS));
            }
            pb.enable_steady_tick(Duration::from_millis(80));
            *guard = Some(pb);
        }
        if let Some(pb) = guard.as_ref() {
            if pb.length() != Some(total as u64) {
                pb.set_length(total as u64);
            }
            pb.set_position(processed as u64);
        }
    }

    fn on_link_complete(&self, linked: usize, failed: usize) {
        self.finish_bar();
        eprintln!(
            "  \x1b[32m✓\x1b[0m Linking complete: {} linked, {} failed",
            linked, failed
        );
    }
}
