pub mod cleanup;
pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod lock;
pub mod orchestrator;
pub mod platform;
pub mod progress;
pub mod report;
pub mod retention;
pub mod scanner;

pub use config::{AppConfig, RunOptions, Target};
pub use engine::RetentionEngine;
pub use error::Error;
pub use executor::{DeleteOutcome, DeletionExecutor, SkipReason};
pub use lock::{LockGuard, LockManager, LockMode, LockRecord, LockState};
pub use orchestrator::{ConcurrencyMode, ConcurrencyOverride};
pub use progress::{ProgressReporter, SilentReporter};
pub use report::{Advisory, ItemError, Phase, RunReport};
pub use retention::{ExecutionMode, RetentionCutoff};
