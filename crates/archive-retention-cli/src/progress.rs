use archive_retention_core::{ProgressReporter, RunReport};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::info;

/// CLI progress reporter.
///
/// - Optional indicatif spinner, redrawn on every event
/// - Periodic `info!` lines so unattended runs still leave a trail in the log
pub struct CliReporter {
    bar: Option<ProgressBar>,
    interval: Option<Duration>,
    last_logged: Mutex<Instant>,
}

impl CliReporter {
    pub fn new(show_progress: bool, interval_secs: u64) -> Self {
        let bar = show_progress.then(|| {
            let pb = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} [{elapsed}] {msg}") {
                pb.set_style(style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"));
            }
            pb
        });
        Self {
            bar,
            interval: (interval_secs > 0).then(|| Duration::from_secs(interval_secs)),
            last_logged: Mutex::new(Instant::now()),
        }
    }

    fn set_message(&self, message: impl FnOnce() -> String) {
        if let Some(pb) = &self.bar {
            pb.set_message(message());
        }
    }

    /// True at most once per interval.
    fn interval_elapsed(&self) -> bool {
        let Some(interval) = self.interval else {
            return false;
        };
        let Ok(mut last) = self.last_logged.lock() else {
            return false;
        };
        if last.elapsed() >= interval {
            *last = Instant::now();
            true
        } else {
            false
        }
    }

    fn finish(&self) {
        if let Some(pb) = &self.bar {
            pb.finish_and_clear();
        }
    }
}

impl ProgressReporter for CliReporter {
    fn on_run_start(&self, root: &str, mode: &str) {
        if let Some(pb) = &self.bar {
            pb.set_message(format!("Scanning {} ({})", root, mode));
            pb.enable_steady_tick(Duration::from_millis(80));
        }
    }

    fn on_scan_progress(&self, files_scanned: u64, files_expired: u64) {
        self.set_message(|| format!("Scanned {} files, {} expired", files_scanned, files_expired));
        if self.interval_elapsed() {
            info!("Progress: {} files scanned, {} expired", files_scanned, files_expired);
        }
    }

    fn on_delete_progress(&self, files_processed: u64, bytes: u64) {
        self.set_message(|| format!("Processed {} expired files ({} bytes)", files_processed, bytes));
        if self.interval_elapsed() {
            info!("Progress: {} expired files processed, {} bytes", files_processed, bytes);
        }
    }

    fn on_cleanup_start(&self) {
        self.set_message(|| "Removing empty directories...".to_string());
    }

    fn on_cleanup_complete(&self, directories_removed: u64) {
        self.finish();
        eprintln!(
            "  \x1b[32m✓\x1b[0m Cleanup complete: {} empty directories",
            directories_removed
        );
    }

    fn on_run_complete(&self, report: &RunReport) {
        self.finish();
        eprintln!(
            "  \x1b[32m✓\x1b[0m Run complete in {:.2}s",
            report.elapsed.as_secs_f64()
        );
    }
}
