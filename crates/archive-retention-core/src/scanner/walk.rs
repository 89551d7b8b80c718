use glob::Pattern;
use std::path::{Path, PathBuf};
use tracing::{error, trace};
use walkdir::WalkDir;

use super::FileCandidate;
use crate::report::{ItemError, Phase};
use crate::retention::RetentionCutoff;

/// Include/ignore globs, matched against the full path.
#[derive(Debug, Clone, Default)]
pub struct ScanFilter {
    include: Vec<Pattern>,
    ignore: Vec<Pattern>,
}

impl ScanFilter {
    pub fn new(include_globs: &[String], ignore_globs: &[String]) -> Self {
        Self {
            include: compile(include_globs),
            ignore: compile(ignore_globs),
        }
    }

    pub fn is_ignored(&self, path: &Path) -> bool {
        self.ignore.iter().any(|pattern| pattern.matches_path(path))
    }

    /// A file is a candidate when it is not ignored and, if include patterns are
    /// configured, matches at least one of them.
    pub fn accepts_file(&self, path: &Path) -> bool {
        if self.is_ignored(path) {
            return false;
        }
        self.include.is_empty() || self.include.iter().any(|pattern| pattern.matches_path(path))
    }
}

fn compile(globs: &[String]) -> Vec<Pattern> {
    globs
        .iter()
        .filter_map(|glob| match Pattern::new(glob) {
            Ok(p) => Some(p),
            Err(e) => {
                error!("Invalid glob pattern '{}': {}", glob, e);
                None
            }
        })
        .collect()
}

#[derive(Debug)]
pub enum ScanItem {
    Candidate {
        candidate: FileCandidate,
        expired: bool,
    },
    Error(ItemError),
}

/// Lazy, sequential walk of an archive root.
///
/// Unreadable directories and entries become `ScanItem::Error` and the walk
/// carries on with their siblings. Symlinks are never followed nor yielded.
pub struct Scan {
    root: PathBuf,
    inner: walkdir::IntoIter,
    filter: ScanFilter,
    cutoff: RetentionCutoff,
}

pub fn scan(root: &Path, cutoff: RetentionCutoff, filter: ScanFilter) -> Scan {
    Scan {
        root: root.to_path_buf(),
        inner: WalkDir::new(root).follow_links(false).into_iter(),
        filter,
        cutoff,
    }
}

impl Iterator for Scan {
    type Item = ScanItem;

    fn next(&mut self) -> Option<ScanItem> {
        loop {
            let entry = match self.inner.next()? {
                Ok(entry) => entry,
                Err(err) => {
                    let path = err
                        .path()
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|| self.root.clone());
                    return Some(ScanItem::Error(ItemError::new(path, Phase::Scan, err)));
                }
            };

            if entry.depth() == 0 {
                continue;
            }

            let file_type = entry.file_type();
            if file_type.is_dir() {
                if self.filter.is_ignored(entry.path()) {
                    trace!("Ignoring directory {}", entry.path().display());
                    self.inner.skip_current_dir();
                }
                continue;
            }

            if !file_type.is_file() || !self.filter.accepts_file(entry.path()) {
                continue;
            }

            let snapshot = entry
                .metadata()
                .map_err(std::io::Error::from)
                .and_then(|m| m.modified().map(|modified| (modified, m.len())));
            return Some(match snapshot {
                Ok((last_modified, size_bytes)) => ScanItem::Candidate {
                    expired: self.cutoff.is_expired(last_modified),
                    candidate: FileCandidate {
                        path: entry.into_path(),
                        last_modified,
                        size_bytes,
                    },
                },
                Err(err) => ScanItem::Error(ItemError::new(entry.path(), Phase::Scan, err)),
            });
        }
    }
}
