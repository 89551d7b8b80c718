use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::time::{Duration, SystemTime};
use tempfile::{tempdir, TempDir};

use archive_retention_core::{
    Advisory, AppConfig, ConcurrencyMode, ConcurrencyOverride, Error, ExecutionMode, LockMode,
    Phase, RetentionEngine, RunOptions, RunReport, SilentReporter, Target,
};

const DAY: u64 = 86_400;

fn write_aged(path: &Path, days: u64, contents: &[u8]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
    fs::File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(SystemTime::now() - Duration::from_secs(days * DAY))
        .unwrap();
}

/// Archive root plus a private lock file, so tests never contend on the real one.
struct Fixture {
    archive: TempDir,
    lock_dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        Self {
            archive: tempdir().unwrap(),
            lock_dir: tempdir().unwrap(),
        }
    }

    fn root(&self) -> &Path {
        self.archive.path()
    }

    fn lock_path(&self) -> PathBuf {
        self.lock_dir.path().join("ArchiveRetention.lock")
    }

    fn options(&self, retention_days: u32, mode: ExecutionMode) -> RunOptions {
        RunOptions::new(
            &AppConfig::default(),
            Target::Path(self.root().to_path_buf()),
            retention_days,
        )
        .with_mode(mode)
        .with_lock_path(self.lock_path())
    }

    fn run(&self, options: RunOptions) -> Result<RunReport, Error> {
        RetentionEngine::new(options).run(&SilentReporter)
    }
}

/// Layout:
///   root/
///     A/old.lca     (400 days)
///     A/new.lca     (10 days)
///     B/old1.lca    (500 days)
///     B/old2.lca    (600 days)
///     C/D/ancient.lca (2000 days)
fn create_archive(root: &Path) {
    write_aged(&root.join("A/old.lca"), 400, b"old archive");
    write_aged(&root.join("A/new.lca"), 10, b"new archive");
    write_aged(&root.join("B/old1.lca"), 500, b"0123456789");
    write_aged(&root.join("B/old2.lca"), 600, b"0123456789");
    write_aged(&root.join("C/D/ancient.lca"), 2000, b"x");
}

#[test]
fn test_execute_deletes_expired_and_keeps_retained() {
    let fixture = Fixture::new();
    let root = fixture.root();
    create_archive(root);

    let report = fixture.run(fixture.options(365, ExecutionMode::Execute)).unwrap();

    assert!(!root.join("A/old.lca").exists());
    assert!(root.join("A/new.lca").exists());
    assert!(root.join("A").is_dir(), "A still holds a retained file");

    assert!(!root.join("B").exists(), "B only held expired files");
    assert!(!root.join("C").exists(), "C/D empties bottom-up");
    assert!(root.exists());

    assert_eq!(report.files_scanned, 5);
    assert_eq!(report.files_expired, 4);
    assert_eq!(report.files_deleted, 4);
    assert_eq!(report.bytes_deleted, 11 + 10 + 10 + 1);
    assert_eq!(report.directories_removed, 3);
    assert!(report.errors.is_empty());
    assert!(!report.cancelled);
    assert_eq!(report.concurrency, ConcurrencyMode::Sequential);
    assert!(!fixture.lock_path().exists(), "lock released after the run");
}

#[test]
fn test_dry_run_reports_like_execute_but_changes_nothing() {
    let fixture = Fixture::new();
    let root = fixture.root();
    create_archive(root);

    let first = fixture.run(fixture.options(365, ExecutionMode::DryRun)).unwrap();
    let second = fixture.run(fixture.options(365, ExecutionMode::DryRun)).unwrap();

    for path in ["A/old.lca", "A/new.lca", "B/old1.lca", "B/old2.lca", "C/D/ancient.lca"] {
        assert!(root.join(path).exists(), "{} must survive a dry-run", path);
    }

    for report in [&first, &second] {
        assert_eq!(report.mode, ExecutionMode::DryRun);
        assert_eq!(report.files_scanned, 5);
        assert_eq!(report.files_expired, 4);
        assert_eq!(report.files_deleted, 4);
        assert_eq!(report.bytes_deleted, 32);
        assert_eq!(report.directories_removed, 3);
    }

    let execute = fixture.run(fixture.options(365, ExecutionMode::Execute)).unwrap();
    assert_eq!(execute.files_deleted, first.files_deleted);
    assert_eq!(execute.bytes_deleted, first.bytes_deleted);
    assert_eq!(execute.directories_removed, first.directories_removed);
}

#[test]
fn test_second_execute_run_has_nothing_left() {
    let fixture = Fixture::new();
    create_archive(fixture.root());

    fixture.run(fixture.options(365, ExecutionMode::Execute)).unwrap();
    let again = fixture.run(fixture.options(365, ExecutionMode::Execute)).unwrap();

    assert_eq!(again.files_scanned, 1);
    assert_eq!(again.files_expired, 0);
    assert_eq!(again.files_deleted, 0);
    assert_eq!(again.directories_removed, 0);
}

#[test]
fn test_parallel_execute_matches_sequential_outcome() {
    let fixture = Fixture::new();
    let root = fixture.root();
    for day in 0..40u64 {
        for n in 0..5 {
            let age = if n % 2 == 0 { 400 + day } else { 30 };
            write_aged(&root.join(format!("day{:02}/f{}.lca", day, n)), age, b"payload");
        }
    }
    for day in 0..10u64 {
        write_aged(&root.join(format!("expired{:02}/only.lca", day)), 800, b"payload");
    }

    let options = fixture
        .options(365, ExecutionMode::Execute)
        .with_concurrency(Some(ConcurrencyOverride::Parallel(NonZeroUsize::new(4))));
    let report = fixture.run(options).unwrap();

    assert_eq!(
        report.concurrency,
        ConcurrencyMode::Parallel(NonZeroUsize::new(4).unwrap())
    );
    assert_eq!(report.files_scanned, 210);
    assert_eq!(report.files_expired, 130);
    assert_eq!(report.files_deleted, 130);
    assert_eq!(report.directories_removed, 10);
    for day in 0..40u64 {
        let dir = root.join(format!("day{:02}", day));
        assert!(dir.join("f1.lca").exists());
        assert!(!dir.join("f0.lca").exists());
    }
}

#[test]
fn test_share_target_defaults_to_parallel() {
    let fixture = Fixture::new();
    create_archive(fixture.root());
    let share = Target::Share {
        name: "NAS_CREDS".to_string(),
        path: fixture.root().to_path_buf(),
    };
    let options = RunOptions::new(&AppConfig::default(), share, 365)
        .with_lock_path(fixture.lock_path());

    let report = fixture.run(options).unwrap();

    assert_eq!(
        report.concurrency,
        ConcurrencyMode::Parallel(NonZeroUsize::new(8).unwrap())
    );
    assert!(report.advisories.is_empty());
}

#[test]
fn test_sequential_override_on_share_warns() {
    let fixture = Fixture::new();
    create_archive(fixture.root());
    let share = Target::Share {
        name: "NAS_CREDS".to_string(),
        path: fixture.root().to_path_buf(),
    };
    let options = RunOptions::new(&AppConfig::default(), share, 365)
        .with_lock_path(fixture.lock_path())
        .with_concurrency(Some(ConcurrencyOverride::Sequential));

    let report = fixture.run(options).unwrap();

    assert_eq!(report.concurrency, ConcurrencyMode::Sequential);
    assert_eq!(report.advisories, vec![Advisory::SequentialOnNetwork]);
}

#[test]
fn test_short_retention_is_advisory_only() {
    let fixture = Fixture::new();
    create_archive(fixture.root());

    let report = fixture.run(fixture.options(30, ExecutionMode::DryRun)).unwrap();

    assert!(report
        .advisories
        .contains(&Advisory::RetentionBelowMinimum { days: 30, minimum: 90 }));
    assert_eq!(report.files_expired, 4);
}

#[test]
fn test_held_lock_aborts_without_side_effects() {
    let fixture = Fixture::new();
    create_archive(fixture.root());
    fs::write(fixture.lock_path(), format!("{}\n", std::process::id())).unwrap();

    let err = fixture
        .run(fixture.options(365, ExecutionMode::Execute))
        .unwrap_err();

    assert!(err.is_lock_held());
    assert!(fixture.root().join("A/old.lca").exists());
    assert!(fixture.lock_path().exists(), "someone else's lock is left alone");
}

#[test]
fn test_force_clear_lock_run_proceeds() {
    let fixture = Fixture::new();
    create_archive(fixture.root());
    fs::write(fixture.lock_path(), format!("{}\n", std::process::id())).unwrap();

    let options = fixture
        .options(365, ExecutionMode::DryRun)
        .with_lock_mode(LockMode::ForceClearLock);
    let report = fixture.run(options).unwrap();

    assert_eq!(report.files_expired, 4);
    assert!(!fixture.lock_path().exists());
}

#[test]
fn test_unreachable_root_is_fatal() {
    let fixture = Fixture::new();
    let missing = fixture.root().join("does-not-exist");
    let options = RunOptions::new(&AppConfig::default(), Target::Path(missing), 365)
        .with_mode(ExecutionMode::Execute)
        .with_lock_path(fixture.lock_path());

    let err = fixture.run(options).unwrap_err();

    assert!(matches!(err, Error::RootUnreachable { .. }));
    assert!(!fixture.lock_path().exists(), "lock released on the failure path");
}

#[test]
fn test_cancelled_run_stops_and_releases_lock() {
    let fixture = Fixture::new();
    create_archive(fixture.root());

    let engine = RetentionEngine::new(fixture.options(365, ExecutionMode::Execute));
    engine.cancel_token().store(true, Ordering::Relaxed);
    let report = engine.run(&SilentReporter).unwrap();

    assert!(report.cancelled);
    assert_eq!(report.files_deleted, 0);
    assert_eq!(report.directories_removed, 0);
    assert!(fixture.root().join("A/old.lca").exists());
    assert!(!fixture.lock_path().exists());
}

#[test]
fn test_include_patterns_limit_candidates() {
    let fixture = Fixture::new();
    let root = fixture.root();
    write_aged(&root.join("E/old.lca"), 400, b"x");
    write_aged(&root.join("E/old.txt"), 400, b"x");

    let mut config = AppConfig::default();
    config.include_patterns = vec!["*.lca".to_string()];
    let options = RunOptions::new(&config, Target::Path(root.to_path_buf()), 365)
        .with_mode(ExecutionMode::Execute)
        .with_lock_path(fixture.lock_path());

    let report = fixture.run(options).unwrap();

    assert_eq!(report.files_deleted, 1);
    assert!(root.join("E/old.txt").exists());
    assert!(root.join("E").is_dir(), "directory still holds a non-candidate file");
}

#[cfg(unix)]
#[test]
fn test_undeletable_file_is_recorded_and_run_continues() {
    use std::os::unix::fs::PermissionsExt;

    let fixture = Fixture::new();
    let root = fixture.root();
    write_aged(&root.join("locked/old.lca"), 400, b"x");
    write_aged(&root.join("open/old.lca"), 400, b"x");
    let locked = root.join("locked");
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o555)).unwrap();

    let report = fixture.run(fixture.options(365, ExecutionMode::Execute)).unwrap();
    // Cleanup may have removed the directory if permissions did not apply.
    if locked.exists() {
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
    }

    assert!(!root.join("open").exists());
    if root.join("locked/old.lca").exists() {
        assert_eq!(report.files_deleted, 1);
        assert_eq!(report.directories_removed, 1);
        assert!(report
            .errors
            .iter()
            .any(|e| e.phase == Phase::Delete && e.path.ends_with("locked/old.lca")));
    } else {
        // Running as root ignores directory permissions.
        assert_eq!(report.files_deleted, 2);
        assert_eq!(report.directories_removed, 2);
        assert!(!locked.exists());
        assert!(report.errors.is_empty());
    }
}
