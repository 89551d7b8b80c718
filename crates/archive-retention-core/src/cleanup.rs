use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::report::{ItemError, Phase, RunReport};
use crate::retention::ExecutionMode;
use crate::scanner::ScanFilter;

/// Remove directories under `root` that have no entries left, deepest first.
///
/// Must only be called once every deletion of the run has been joined. The
/// root itself is never removed, nor is anything inside an ignored directory.
/// In dry-run, files the run would have deleted and directories it would have
/// removed are treated as gone, so the reported decisions match an execute run.
pub fn cleanup(root: &Path, mode: ExecutionMode, filter: &ScanFilter, report: &mut RunReport) -> u64 {
    let pending: HashSet<PathBuf> = std::mem::take(&mut report.deleted_paths)
        .into_iter()
        .collect();
    let mut removed_dirs: HashSet<PathBuf> = HashSet::new();

    info!("Starting empty directory cleanup under {}", root.display());
    let walker = WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .contents_first(true);

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                let path = err.path().unwrap_or(root).to_path_buf();
                report.record_error(ItemError::new(path, Phase::Cleanup, err));
                continue;
            }
        };
        if !entry.file_type().is_dir() {
            continue;
        }

        let dir = entry.path();
        if within_ignored(root, dir, filter) {
            continue;
        }

        match has_remaining_entries(dir, &pending, &removed_dirs) {
            Ok(false) => {}
            Ok(true) => continue,
            Err(err) => {
                report.record_error(ItemError::new(dir, Phase::Cleanup, err));
                continue;
            }
        }

        if mode.is_dry_run() {
            debug!("Would remove empty directory: {}", dir.display());
        } else if let Err(err) = fs::remove_dir(dir) {
            report.record_error(ItemError::new(dir, Phase::Cleanup, err));
            continue;
        } else {
            debug!("Removed empty directory: {}", dir.display());
        }
        removed_dirs.insert(dir.to_path_buf());
    }

    let removed = removed_dirs.len() as u64;
    report.directories_removed += removed;
    info!("Empty directory cleanup finished: {} directories", removed);
    removed
}

fn has_remaining_entries(
    dir: &Path,
    pending: &HashSet<PathBuf>,
    removed_dirs: &HashSet<PathBuf>,
) -> io::Result<bool> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !pending.contains(&path) && !removed_dirs.contains(&path) {
            return Ok(true);
        }
    }
    Ok(false)
}

fn within_ignored(root: &Path, dir: &Path, filter: &ScanFilter) -> bool {
    dir.ancestors()
        .take_while(|ancestor| *ancestor != root)
        .any(|ancestor| filter.is_ignored(ancestor))
}
