use std::fs;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Instant, SystemTime};
use tracing::{info, warn};

use crate::cleanup;
use crate::config::{RunOptions, Target};
use crate::error::Error;
use crate::executor::DeletionExecutor;
use crate::lock::LockManager;
use crate::orchestrator::{self, ConcurrencyDecision, Orchestrator};
use crate::platform::{self, ProcessTable, SystemProcesses};
use crate::progress::ProgressReporter;
use crate::report::{Advisory, RunReport};
use crate::retention::RetentionCutoff;
use crate::scanner::{self, ScanFilter};

/// One retention run against one archive root.
///
/// The lock is taken before anything else and released when `run` returns,
/// whichever way it returns.
pub struct RetentionEngine<P: ProcessTable = SystemProcesses> {
    options: RunOptions,
    processes: P,
    cancel: Arc<AtomicBool>,
}

impl RetentionEngine<SystemProcesses> {
    pub fn new(options: RunOptions) -> Self {
        Self::with_process_table(options, SystemProcesses)
    }
}

impl<P: ProcessTable> RetentionEngine<P> {
    pub fn with_process_table(options: RunOptions, processes: P) -> Self {
        Self {
            options,
            processes,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Setting the token stops the run after in-flight deletions finish.
    pub fn cancel_token(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn is_network_target(&self) -> bool {
        match &self.options.target {
            Target::Share { .. } => true,
            Target::Path(path) => platform::is_network_path(path),
        }
    }

    pub fn plan_concurrency(&self) -> Result<ConcurrencyDecision, Error> {
        let default_threads = NonZeroUsize::new(self.options.default_thread_count)
            .ok_or_else(|| Error::InvalidOptions("default thread count must be at least 1".into()))?;
        Ok(orchestrator::select_concurrency(
            self.is_network_target(),
            self.options.concurrency,
            default_threads,
        ))
    }

    pub fn run(&self, progress: &dyn ProgressReporter) -> Result<RunReport, Error> {
        self.options.validate()?;
        let started = Instant::now();
        let cutoff = RetentionCutoff::from_run_start(SystemTime::now(), self.options.retention_days)?;

        let sibling_name = if self.options.terminate_siblings {
            self.options
                .process_name
                .clone()
                .or_else(platform::current_process_name)
        } else {
            None
        };
        let lock = LockManager::with_process_table(&self.options.lock_path, &self.processes)
            .terminate_siblings(sibling_name);
        let _guard = lock.acquire(self.options.lock_mode)?;

        let root = self.options.target.path().as_path();
        check_root(root)?;

        let decision = self.plan_concurrency()?;
        let mode = self.options.mode;
        let mut report = RunReport::new(mode, cutoff, decision.mode);
        if let Some(advisory) = decision.advisory {
            report.advise(advisory);
        }
        self.check_retention_window(&mut report);

        info!("Archive root: {}", root.display());
        info!("Mode: {}, retention: {} days, cutoff: {}", mode, self.options.retention_days, cutoff);
        info!("Parallel processing: {}", decision.mode);
        progress.on_run_start(&root.to_string_lossy(), &mode.to_string());

        let filter = ScanFilter::new(&self.options.include_patterns, &self.options.ignore_patterns);
        let items = scanner::scan(root, cutoff, filter.clone());
        let executor = DeletionExecutor::new(cutoff, mode);
        let orchestrator = Orchestrator::new(executor, decision.mode, &self.cancel);

        let (tx, rx) = mpsc::channel();
        thread::scope(|scope| {
            let report = &mut report;
            let collector = scope.spawn(move || report.collect(rx, progress));
            let outcome = orchestrator.run(items, tx);
            if let Err(panic) = collector.join() {
                std::panic::resume_unwind(panic);
            }
            outcome
        })?;

        report.cancelled = self.cancel.load(Ordering::Relaxed);
        if report.cancelled {
            warn!("Run cancelled, skipping empty directory cleanup");
        } else {
            progress.on_cleanup_start();
            let removed = cleanup::cleanup(root, mode, &filter, &mut report);
            progress.on_cleanup_complete(removed);
        }

        report.elapsed = started.elapsed();
        info!(
            "Run finished in {:.2}s: {} scanned, {} expired, {} deleted, {} directories removed, {} errors",
            report.elapsed.as_secs_f64(),
            report.files_scanned,
            report.files_expired,
            report.files_deleted,
            report.directories_removed,
            report.error_count(),
        );
        progress.on_run_complete(&report);
        Ok(report)
    }

    fn check_retention_window(&self, report: &mut RunReport) {
        let days = self.options.retention_days;
        if days < self.options.min_retention_days {
            report.advise(Advisory::RetentionBelowMinimum {
                days,
                minimum: self.options.min_retention_days,
            });
        } else if days > self.options.max_retention_days {
            report.advise(Advisory::RetentionAboveMaximum {
                days,
                maximum: self.options.max_retention_days,
            });
        }
    }
}

fn check_root(root: &Path) -> Result<(), Error> {
    let metadata = fs::metadata(root).map_err(|source| Error::RootUnreachable {
        path: root.to_path_buf(),
        source,
    })?;
    if !metadata.is_dir() {
        return Err(Error::RootNotDirectory(root.to_path_buf()));
    }
    // An unlistable root is as good as unreachable.
    fs::read_dir(root).map_err(|source| Error::RootUnreachable {
        path: root.to_path_buf(),
        source,
    })?;
    Ok(())
}
