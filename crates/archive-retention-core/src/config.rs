use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::Error;
use crate::lock::LockMode;
use crate::orchestrator::ConcurrencyOverride;
use crate::retention::ExecutionMode;

pub const DEFAULT_LOCK_FILE_NAME: &str = "ArchiveRetention.lock";
pub const DEFAULT_THREAD_COUNT: usize = 8;
pub const DEFAULT_MIN_RETENTION_DAYS: u32 = 90;
pub const DEFAULT_MAX_RETENTION_DAYS: u32 = 3650;
pub const DEFAULT_PROGRESS_INTERVAL_SECS: u64 = 30;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub lock_path: Option<String>,
    #[serde(default = "default_thread_count")]
    pub default_thread_count: usize,
    #[serde(default = "default_min_retention_days")]
    pub min_retention_days: u32,
    #[serde(default = "default_max_retention_days")]
    pub max_retention_days: u32,
    #[serde(default)]
    pub include_patterns: Vec<String>,
    #[serde(default)]
    pub ignore_patterns: Vec<String>,
    #[serde(default)]
    pub terminate_siblings: bool,
    #[serde(default)]
    pub process_name: Option<String>,
    #[serde(default)]
    pub failure_threshold: Option<usize>,
    #[serde(default = "default_progress_interval_secs")]
    pub progress_interval_secs: u64,
    /// Named archive shares, `name -> path`.
    #[serde(default)]
    pub shares: HashMap<String, String>,
}

fn default_thread_count() -> usize {
    DEFAULT_THREAD_COUNT
}

fn default_min_retention_days() -> u32 {
    DEFAULT_MIN_RETENTION_DAYS
}

fn default_max_retention_days() -> u32 {
    DEFAULT_MAX_RETENTION_DAYS
}

fn default_progress_interval_secs() -> u64 {
    DEFAULT_PROGRESS_INTERVAL_SECS
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            lock_path: None,
            default_thread_count: DEFAULT_THREAD_COUNT,
            min_retention_days: DEFAULT_MIN_RETENTION_DAYS,
            max_retention_days: DEFAULT_MAX_RETENTION_DAYS,
            include_patterns: Vec::new(),
            ignore_patterns: Vec::new(),
            terminate_siblings: false,
            process_name: None,
            failure_threshold: None,
            progress_interval_secs: DEFAULT_PROGRESS_INTERVAL_SECS,
            shares: HashMap::new(),
        }
    }
}

impl AppConfig {
    pub fn lock_path(&self) -> PathBuf {
        match &self.lock_path {
            Some(path) => PathBuf::from(path),
            None => std::env::temp_dir().join(DEFAULT_LOCK_FILE_NAME),
        }
    }

    pub fn resolve_share(&self, name: &str) -> Result<PathBuf, Error> {
        self.shares
            .get(name)
            .map(PathBuf::from)
            .ok_or_else(|| Error::UnknownShare(name.to_string()))
    }
}

/// Load `Config.toml` (optional) overlaid with `RETENTION__*` environment variables.
pub fn load_configuration() -> Result<AppConfig, ConfigError> {
    let builder = Config::builder()
        .add_source(ConfigFile::with_name("Config").required(false))
        .add_source(Environment::with_prefix("RETENTION").separator("__"))
        .build()?;
    builder.try_deserialize::<AppConfig>()
}

/// Where the archive root came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Path(PathBuf),
    Share { name: String, path: PathBuf },
}

impl Target {
    pub fn path(&self) -> &PathBuf {
        match self {
            Target::Path(path) => path,
            Target::Share { path, .. } => path,
        }
    }
}

/// Everything a single run needs, assembled from `AppConfig` plus the caller's flags.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub target: Target,
    pub retention_days: u32,
    pub mode: ExecutionMode,
    pub lock_mode: LockMode,
    pub concurrency: Option<ConcurrencyOverride>,
    pub lock_path: PathBuf,
    pub default_thread_count: usize,
    pub min_retention_days: u32,
    pub max_retention_days: u32,
    pub include_patterns: Vec<String>,
    pub ignore_patterns: Vec<String>,
    pub terminate_siblings: bool,
    pub process_name: Option<String>,
}

impl RunOptions {
    pub fn new(config: &AppConfig, target: Target, retention_days: u32) -> Self {
        Self {
            target,
            retention_days,
            mode: ExecutionMode::DryRun,
            lock_mode: LockMode::Normal,
            concurrency: None,
            lock_path: config.lock_path(),
            default_thread_count: config.default_thread_count,
            min_retention_days: config.min_retention_days,
            max_retention_days: config.max_retention_days,
            include_patterns: config.include_patterns.clone(),
            ignore_patterns: config.ignore_patterns.clone(),
            terminate_siblings: config.terminate_siblings,
            process_name: config.process_name.clone(),
        }
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_lock_mode(mut self, lock_mode: LockMode) -> Self {
        self.lock_mode = lock_mode;
        self
    }

    pub fn with_concurrency(mut self, concurrency: Option<ConcurrencyOverride>) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_lock_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.lock_path = path.into();
        self
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.retention_days == 0 {
            return Err(Error::InvalidRetention(
                "retention days must be at least 1".to_string(),
            ));
        }
        if self.default_thread_count == 0 {
            return Err(Error::InvalidOptions(
                "default thread count must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_config_file() {
        let config: AppConfig = Config::builder()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(config.default_thread_count, DEFAULT_THREAD_COUNT);
        assert_eq!(config.min_retention_days, 90);
        assert!(config.shares.is_empty());
        assert!(config.lock_path().ends_with(DEFAULT_LOCK_FILE_NAME));
    }

    #[test]
    fn test_share_resolution() {
        let mut config = AppConfig::default();
        config
            .shares
            .insert("NAS_CREDS".to_string(), r"\\nas01\archive".to_string());

        assert_eq!(
            config.resolve_share("NAS_CREDS").unwrap(),
            PathBuf::from(r"\\nas01\archive")
        );
        assert!(matches!(
            config.resolve_share("missing"),
            Err(Error::UnknownShare(name)) if name == "missing"
        ));
    }

    #[test]
    fn test_zero_retention_rejected() {
        let options = RunOptions::new(&AppConfig::default(), Target::Path("/data".into()), 0);
        assert!(matches!(options.validate(), Err(Error::InvalidRetention(_))));
    }
}
