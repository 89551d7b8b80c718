use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Lock file {} is held by {}{}", path.display(), describe_owner(*owner), race_suffix(*race_detected))]
    LockHeld {
        path: PathBuf,
        owner: Option<u32>,
        race_detected: bool,
    },

    #[error("Lock file {} could not be managed: {source}", path.display())]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Archive root {} is unreachable: {source}", path.display())]
    RootUnreachable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Archive root {} is not a directory", .0.display())]
    RootNotDirectory(PathBuf),

    #[error("Invalid retention: {0}")]
    InvalidRetention(String),

    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    #[error("Unknown share reference '{0}'")]
    UnknownShare(String),

    #[error("Worker pool error: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Report export error: {0}")]
    Report(#[from] csv::Error),
}

impl Error {
    pub fn is_lock_held(&self) -> bool {
        matches!(self, Error::LockHeld { .. })
    }
}

fn describe_owner(owner: Option<u32>) -> String {
    match owner {
        Some(pid) => format!("process {}", pid),
        None => "an unknown owner".to_string(),
    }
}

fn race_suffix(race_detected: bool) -> &'static str {
    if race_detected {
        " (re-acquired by another process during clear)"
    } else {
        ""
    }
}
