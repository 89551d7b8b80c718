use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, trace};

use crate::report::{ItemError, Phase};
use crate::retention::{ExecutionMode, RetentionCutoff};
use crate::scanner::FileCandidate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted(u64),
    /// Dry-run counterpart of `Deleted`.
    WouldDelete(u64),
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Gone between scan and delete, usually removed by someone else.
    Missing,
    /// Rewritten after the scan so it is no longer older than the cutoff.
    ModifiedSinceScan,
    NotAFile,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Missing => write!(f, "file no longer exists"),
            SkipReason::ModifiedSinceScan => write!(f, "file was modified after the scan"),
            SkipReason::NotAFile => write!(f, "path is no longer a regular file"),
        }
    }
}

#[derive(Error, Debug)]
#[error("failed to delete {}: {source}", path.display())]
pub struct DeleteError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

impl From<DeleteError> for ItemError {
    fn from(err: DeleteError) -> Self {
        ItemError::new(err.path, Phase::Delete, err.source)
    }
}

/// Deletes (or pretends to delete) expired candidates, one at a time.
///
/// Stateless apart from the run's cutoff and mode, so one instance is shared by
/// every worker.
#[derive(Debug, Clone, Copy)]
pub struct DeletionExecutor {
    cutoff: RetentionCutoff,
    mode: ExecutionMode,
}

impl DeletionExecutor {
    pub fn new(cutoff: RetentionCutoff, mode: ExecutionMode) -> Self {
        Self { cutoff, mode }
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn delete(&self, candidate: &FileCandidate) -> Result<DeleteOutcome, DeleteError> {
        let path = &candidate.path;
        let metadata = match fs::symlink_metadata(path) {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Ok(DeleteOutcome::Skipped(SkipReason::Missing));
            }
            Err(source) => {
                return Err(DeleteError {
                    path: path.clone(),
                    source,
                })
            }
        };

        if !metadata.is_file() {
            return Ok(DeleteOutcome::Skipped(SkipReason::NotAFile));
        }

        let current_mtime = metadata.modified().map_err(|source| DeleteError {
            path: path.clone(),
            source,
        })?;
        if !self.cutoff.is_expired(current_mtime) {
            debug!("{} was rewritten after the scan, keeping it", path.display());
            return Ok(DeleteOutcome::Skipped(SkipReason::ModifiedSinceScan));
        }

        if self.mode.is_dry_run() {
            trace!("Would delete {}", path.display());
            return Ok(DeleteOutcome::WouldDelete(candidate.size_bytes));
        }

        match remove_file(path, &metadata) {
            Ok(()) => {
                trace!("Deleted {}", path.display());
                Ok(DeleteOutcome::Deleted(candidate.size_bytes))
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                Ok(DeleteOutcome::Skipped(SkipReason::Missing))
            }
            Err(source) => Err(DeleteError {
                path: path.clone(),
                source,
            }),
        }
    }
}

/// Read-only files get their flag cleared and one more attempt.
fn remove_file(path: &Path, metadata: &fs::Metadata) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(err)
            if err.kind() == io::ErrorKind::PermissionDenied
                && metadata.permissions().readonly() =>
        {
            let mut permissions = metadata.permissions();
            #[allow(clippy::permissions_set_readonly_false)]
            permissions.set_readonly(false);
            fs::set_permissions(path, permissions)?;
            fs::remove_file(path)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};

    fn set_age(path: &std::path::Path, days: u64) -> SystemTime {
        let mtime = SystemTime::now() - Duration::from_secs(days * 86_400);
        fs::File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(mtime)
            .unwrap();
        mtime
    }

    fn candidate(path: &std::path::Path, mtime: SystemTime) -> FileCandidate {
        FileCandidate {
            path: path.to_path_buf(),
            last_modified: mtime,
            size_bytes: fs::metadata(path).unwrap().len(),
        }
    }

    fn cutoff_days_ago(days: u32) -> RetentionCutoff {
        RetentionCutoff::from_run_start(SystemTime::now(), days).unwrap()
    }

    #[test]
    fn test_execute_deletes_expired_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("old.lca");
        fs::write(&file, b"0123456789").unwrap();
        let mtime = set_age(&file, 400);

        let executor = DeletionExecutor::new(cutoff_days_ago(365), ExecutionMode::Execute);
        let outcome = executor.delete(&candidate(&file, mtime)).unwrap();

        assert_eq!(outcome, DeleteOutcome::Deleted(10));
        assert!(!file.exists());
    }

    #[test]
    fn test_dry_run_leaves_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("old.lca");
        fs::write(&file, b"abc").unwrap();
        let mtime = set_age(&file, 400);

        let executor = DeletionExecutor::new(cutoff_days_ago(365), ExecutionMode::DryRun);
        let outcome = executor.delete(&candidate(&file, mtime)).unwrap();

        assert_eq!(outcome, DeleteOutcome::WouldDelete(3));
        assert!(file.exists());
    }

    #[test]
    fn test_missing_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("gone.lca");
        let stale = FileCandidate {
            path: file,
            last_modified: SystemTime::UNIX_EPOCH,
            size_bytes: 5,
        };

        let executor = DeletionExecutor::new(cutoff_days_ago(1), ExecutionMode::Execute);
        assert_eq!(
            executor.delete(&stale).unwrap(),
            DeleteOutcome::Skipped(SkipReason::Missing)
        );
    }

    #[test]
    fn test_rewritten_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("rewritten.lca");
        fs::write(&file, b"abc").unwrap();
        let old_mtime = SystemTime::now() - Duration::from_secs(400 * 86_400);
        let snapshot = candidate(&file, old_mtime);

        let executor = DeletionExecutor::new(cutoff_days_ago(365), ExecutionMode::Execute);
        assert_eq!(
            executor.delete(&snapshot).unwrap(),
            DeleteOutcome::Skipped(SkipReason::ModifiedSinceScan)
        );
        assert!(file.exists());
    }
}
