use chrono::{DateTime, Local};
use std::fmt;
use std::time::{Duration, SystemTime};

use crate::error::Error;

const SECS_PER_DAY: u64 = 86_400;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    DryRun,
    Execute,
}

impl ExecutionMode {
    pub fn is_dry_run(self) -> bool {
        self == ExecutionMode::DryRun
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::DryRun => write!(f, "dry-run"),
            ExecutionMode::Execute => write!(f, "execute"),
        }
    }
}

/// The single timestamp a run classifies against. Built once, then copied around.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionCutoff(SystemTime);

impl RetentionCutoff {
    pub fn from_run_start(run_start: SystemTime, retention_days: u32) -> Result<Self, Error> {
        let window = Duration::from_secs(u64::from(retention_days) * SECS_PER_DAY);
        run_start
            .checked_sub(window)
            .map(RetentionCutoff)
            .ok_or_else(|| {
                Error::InvalidRetention(format!(
                    "{} days reaches before the platform epoch",
                    retention_days
                ))
            })
    }

    pub fn at(timestamp: SystemTime) -> Self {
        RetentionCutoff(timestamp)
    }

    pub fn timestamp(&self) -> SystemTime {
        self.0
    }

    /// Strictly older than the cutoff. Equal timestamps are retained.
    pub fn is_expired(&self, last_modified: SystemTime) -> bool {
        last_modified < self.0
    }
}

impl fmt::Display for RetentionCutoff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let local: DateTime<Local> = self.0.into();
        write!(f, "{}", local.format("%Y-%m-%d %H:%M:%S"))
    }
}
