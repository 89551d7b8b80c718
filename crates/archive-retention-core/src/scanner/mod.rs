mod walk;

pub use walk::{scan, Scan, ScanFilter, ScanItem};

use std::path::PathBuf;
use std::time::SystemTime;

/// Snapshot of one file as observed during enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCandidate {
    pub path: PathBuf,
    pub last_modified: SystemTime,
    pub size_bytes: u64,
}
