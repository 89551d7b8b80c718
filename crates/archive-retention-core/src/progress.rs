use crate::report::RunReport;

/// Trait for reporting run progress.
///
/// The CLI implements it with tracing/indicatif. All methods have default no-op
/// implementations and none of them can influence the outcome of a run.
pub trait ProgressReporter: Send + Sync {
    fn on_run_start(&self, _root: &str, _mode: &str) {}
    fn on_scan_progress(&self, _files_scanned: u64, _files_expired: u64) {}
    fn on_delete_progress(&self, _files_processed: u64, _bytes: u64) {}
    fn on_cleanup_start(&self) {}
    fn on_cleanup_complete(&self, _directories_removed: u64) {}
    fn on_run_complete(&self, _report: &RunReport) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}
