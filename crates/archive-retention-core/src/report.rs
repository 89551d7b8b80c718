use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::Error;
use crate::executor::{DeleteOutcome, SkipReason};
use crate::orchestrator::ConcurrencyMode;
use crate::progress::ProgressReporter;
use crate::retention::{ExecutionMode, RetentionCutoff};

/// Where in the run a per-item failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Scan,
    Delete,
    Cleanup,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Scan => write!(f, "scan"),
            Phase::Delete => write!(f, "delete"),
            Phase::Cleanup => write!(f, "cleanup"),
        }
    }
}

/// A recoverable failure on one path. Recorded, never propagated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemError {
    pub path: PathBuf,
    pub phase: Phase,
    pub cause: String,
}

impl ItemError {
    pub fn new(path: impl Into<PathBuf>, phase: Phase, cause: impl fmt::Display) -> Self {
        Self {
            path: path.into(),
            phase,
            cause: cause.to_string(),
        }
    }
}

/// Non-fatal conditions worth telling the operator about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advisory {
    SequentialOnNetwork,
    RetentionBelowMinimum { days: u32, minimum: u32 },
    RetentionAboveMaximum { days: u32, maximum: u32 },
}

impl fmt::Display for Advisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Advisory::SequentialOnNetwork => write!(
                f,
                "sequential processing was requested for a network path; deletion will be markedly slower"
            ),
            Advisory::RetentionBelowMinimum { days, minimum } => write!(
                f,
                "retention of {} days is below the recommended minimum of {} days",
                days, minimum
            ),
            Advisory::RetentionAboveMaximum { days, maximum } => write!(
                f,
                "retention of {} days exceeds {} days; very little will expire",
                days, maximum
            ),
        }
    }
}

/// Messages sent from the scan and delete stages to the single report owner.
#[derive(Debug)]
pub enum RunEvent {
    Scanned { expired: bool },
    Outcome { path: PathBuf, outcome: DeleteOutcome },
    Failed(ItemError),
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub mode: ExecutionMode,
    pub cutoff: RetentionCutoff,
    pub concurrency: ConcurrencyMode,
    pub files_scanned: u64,
    pub files_expired: u64,
    /// In dry-run this counts files that would have been deleted.
    pub files_deleted: u64,
    pub bytes_deleted: u64,
    pub files_skipped: u64,
    pub directories_removed: u64,
    pub errors: Vec<ItemError>,
    pub advisories: Vec<Advisory>,
    pub cancelled: bool,
    pub elapsed: Duration,
    /// Files a dry-run would have deleted. Cleanup treats them as gone.
    pub(crate) deleted_paths: Vec<PathBuf>,
}

impl RunReport {
    pub fn new(mode: ExecutionMode, cutoff: RetentionCutoff, concurrency: ConcurrencyMode) -> Self {
        Self {
            mode,
            cutoff,
            concurrency,
            files_scanned: 0,
            files_expired: 0,
            files_deleted: 0,
            bytes_deleted: 0,
            files_skipped: 0,
            directories_removed: 0,
            errors: Vec::new(),
            advisories: Vec::new(),
            cancelled: false,
            elapsed: Duration::ZERO,
            deleted_paths: Vec::new(),
        }
    }

    pub fn advise(&mut self, advisory: Advisory) {
        warn!("{}", advisory);
        self.advisories.push(advisory);
    }

    pub fn record_error(&mut self, error: ItemError) {
        warn!(
            "{} failed for {}: {}",
            error.phase,
            error.path.display(),
            error.cause
        );
        self.errors.push(error);
    }

    pub fn apply(&mut self, event: RunEvent) {
        match event {
            RunEvent::Scanned { expired } => {
                self.files_scanned += 1;
                if expired {
                    self.files_expired += 1;
                }
            }
            RunEvent::Outcome { path, outcome } => match outcome {
                DeleteOutcome::Deleted(bytes) => {
                    self.files_deleted += 1;
                    self.bytes_deleted += bytes;
                }
                DeleteOutcome::WouldDelete(bytes) => {
                    self.files_deleted += 1;
                    self.bytes_deleted += bytes;
                    self.deleted_paths.push(path);
                }
                DeleteOutcome::Skipped(reason) => {
                    debug!("Skipped {}: {}", path.display(), reason);
                    self.files_skipped += 1;
                }
            },
            RunEvent::Failed(error) => self.record_error(error),
        }
    }

    /// Drain `rx` until every sender is gone. This is the join point for workers.
    pub(crate) fn collect(&mut self, rx: Receiver<RunEvent>, progress: &dyn ProgressReporter) {
        for event in rx {
            let is_scan = matches!(event, RunEvent::Scanned { .. });
            self.apply(event);
            if is_scan {
                progress.on_scan_progress(self.files_scanned, self.files_expired);
            } else {
                progress.on_delete_progress(
                    self.files_deleted + self.files_skipped + self.delete_errors(),
                    self.bytes_deleted,
                );
            }
        }
    }

    pub fn delete_errors(&self) -> u64 {
        self.errors
            .iter()
            .filter(|e| e.phase == Phase::Delete)
            .count() as u64
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    pub fn exceeds_threshold(&self, threshold: Option<usize>) -> bool {
        threshold.is_some_and(|limit| self.errors.len() > limit)
    }

    /// One row per item error: `phase,path,cause`.
    pub fn write_csv(&self, path: &Path) -> Result<(), Error> {
        #[derive(Serialize)]
        struct Row<'a> {
            phase: Phase,
            path: String,
            cause: &'a str,
        }

        let mut writer = csv::Writer::from_path(path)?;
        for error in &self.errors {
            writer.serialize(Row {
                phase: error.phase,
                path: error.path.to_string_lossy().into_owned(),
                cause: &error.cause,
            })?;
        }
        writer.flush()?;
        Ok(())
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = if self.mode.is_dry_run() {
            "would delete"
        } else {
            "deleted"
        };
        writeln!(f, "Mode: {} ({})", self.mode, self.concurrency)?;
        writeln!(f, "Cutoff: {}", self.cutoff)?;
        writeln!(
            f,
            "Files: {} scanned, {} expired, {} {}, {} skipped",
            self.files_scanned, self.files_expired, self.files_deleted, verb, self.files_skipped
        )?;
        writeln!(f, "Bytes {}: {}", verb, self.bytes_deleted)?;
        writeln!(f, "Directories removed: {}", self.directories_removed)?;
        write!(
            f,
            "Errors: {}, advisories: {}{}",
            self.errors.len(),
            self.advisories.len(),
            if self.cancelled { " (cancelled)" } else { "" }
        )
    }
}
