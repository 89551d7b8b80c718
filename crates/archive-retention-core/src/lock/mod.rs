//! Single-instance locking through a well-known lock file.
//!
//! Acquisition is one exclusive create. When the file already exists the
//! recorded owner decides what happens next:
//!
//! * owner not running: the lock is stale, it is removed and the create is
//!   retried exactly once;
//! * `LockMode::ForceClearLock`: the lock is removed as orphaned and the create
//!   is retried once; losing that retry is reported as a held lock, never as
//!   success;
//! * `LockMode::Force`: the recorded owner (and optionally same-named
//!   processes) are terminated and the file removed before the first create;
//! * otherwise the lock is held and the run must not start.
//!
//! Removing someone else's lock renames it aside first and compares contents,
//! restoring it when it changed. With three or more contenders on one stale
//! lock a narrow window remains: a lock created by a winner can be renamed
//! aside by a slower contender, and a third process can create its own lock
//! before the restore. Both then hold a guard. The restore failure is logged
//! at `warn` and the slower contender reports `LockHeld`.

mod record;

pub use record::LockRecord;

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::platform::{ProcessTable, SystemProcesses};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockMode {
    #[default]
    Normal,
    ForceClearLock,
    Force,
}

/// What the lock file currently says, without touching it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockState {
    Free,
    Live(LockRecord),
    Stale(LockRecord),
    /// Present but unreadable or empty, e.g. an owner that has not written its pid yet.
    Unknown,
}

impl LockState {
    pub fn owner(&self) -> Option<u32> {
        match self {
            LockState::Live(record) | LockState::Stale(record) => Some(record.owner_pid),
            LockState::Free | LockState::Unknown => None,
        }
    }
}

pub struct LockManager<P: ProcessTable = SystemProcesses> {
    path: PathBuf,
    processes: P,
    sibling_name: Option<String>,
}

impl LockManager<SystemProcesses> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_process_table(path, SystemProcesses)
    }
}

impl<P: ProcessTable> LockManager<P> {
    pub fn with_process_table(path: impl Into<PathBuf>, processes: P) -> Self {
        Self {
            path: path.into(),
            processes,
            sibling_name: None,
        }
    }

    /// Under `LockMode::Force`, also terminate running processes with this name.
    pub fn terminate_siblings(mut self, name: Option<String>) -> Self {
        self.sibling_name = name;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn acquire(&self, mode: LockMode) -> Result<LockGuard, Error> {
        if mode == LockMode::Force {
            self.force_clear()?;
        }

        if let Some(guard) = self.try_create()? {
            info!("Acquired lock {}", self.path.display());
            return Ok(guard);
        }

        let Some(observed) = self.read_lock_file()? else {
            debug!("Lock {} vanished before it could be read", self.path.display());
            return self.retry_once(None);
        };

        match self.classify(&observed) {
            LockState::Free => self.retry_once(None),
            LockState::Stale(record) => {
                info!(
                    "Removing stale lock {} left by process {}",
                    self.path.display(),
                    record.owner_pid
                );
                self.remove_if_unchanged(&observed, Some(record.owner_pid))?;
                self.retry_once(Some(record.owner_pid))
            }
            state @ (LockState::Live(_) | LockState::Unknown) => match mode {
                LockMode::ForceClearLock => {
                    if let Some(pid) = state.owner() {
                        warn!(
                            "Clearing lock {} recorded for running process {} on operator request",
                            self.path.display(),
                            pid
                        );
                    }
                    self.remove_if_unchanged(&observed, state.owner())?;
                    info!("Orphaned lock file removed: {}", self.path.display());
                    self.retry_once(state.owner())
                }
                LockMode::Force => Err(Error::LockHeld {
                    path: self.path.clone(),
                    owner: state.owner(),
                    race_detected: true,
                }),
                LockMode::Normal => Err(Error::LockHeld {
                    path: self.path.clone(),
                    owner: state.owner(),
                    race_detected: false,
                }),
            },
        }
    }

    pub fn inspect(&self) -> Result<LockState, Error> {
        Ok(match self.read_lock_file()? {
            Some(text) => self.classify(&text),
            None => LockState::Free,
        })
    }

    /// Delete the lock file if it records this process as owner.
    ///
    /// For exit paths where no `LockGuard` destructor will run. Returns whether
    /// a file was removed.
    pub fn remove_own_lock(&self) -> Result<bool, Error> {
        let owned = self
            .read_lock_file()?
            .and_then(|text| LockRecord::parse(&text))
            .is_some_and(|record| record.owner_pid == std::process::id());
        if owned {
            self.remove_lock_file()?;
            info!("Removed lock {} on hard exit", self.path.display());
        }
        Ok(owned)
    }

    fn classify(&self, text: &str) -> LockState {
        match LockRecord::parse(text) {
            Some(record) if self.processes.is_alive(record.owner_pid) => LockState::Live(record),
            Some(record) => LockState::Stale(record),
            None => LockState::Unknown,
        }
    }

    fn read_lock_file(&self) -> Result<Option<String>, Error> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(self.lock_error(source)),
        }
    }

    /// Remove the lock only if it still holds `expected`.
    ///
    /// The file is first renamed aside, which is atomic, and only then compared.
    /// A lock that changed in the meantime belongs to a new owner: it is linked
    /// back into place and the caller gets `LockHeld`.
    fn remove_if_unchanged(&self, expected: &str, owner: Option<u32>) -> Result<(), Error> {
        let aside = self.aside_path();
        match fs::rename(&self.path, &aside) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(source) => return Err(self.lock_error(source)),
        }

        let taken = fs::read(&aside).map_err(|e| self.lock_error(e))?;
        if String::from_utf8_lossy(&taken) == expected {
            fs::remove_file(&aside).map_err(|e| self.lock_error(e))?;
            return Ok(());
        }

        let restored = fs::hard_link(&aside, &self.path);
        let _ = fs::remove_file(&aside);
        match restored {
            Ok(()) => debug!("Restored lock {} taken over by another process", self.path.display()),
            Err(e) => warn!(
                "Could not restore lock {} taken over by another process, it may now have two holders: {}",
                self.path.display(),
                e
            ),
        }
        Err(Error::LockHeld {
            path: self.path.clone(),
            owner,
            race_detected: true,
        })
    }

    fn aside_path(&self) -> PathBuf {
        static SEQUENCE: AtomicU64 = AtomicU64::new(0);
        let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(format!(".{}-{}.clearing", std::process::id(), seq));
        self.path.with_file_name(name)
    }

    /// After we removed the file ourselves, anyone else holding it now won a race.
    fn retry_once(&self, previous_owner: Option<u32>) -> Result<LockGuard, Error> {
        match self.try_create()? {
            Some(guard) => {
                info!("Acquired lock {}", self.path.display());
                Ok(guard)
            }
            None => {
                let owner = self.inspect().ok().and_then(|s| s.owner()).or(previous_owner);
                warn!(
                    "Lock {} was re-created by another process while it was being cleared",
                    self.path.display()
                );
                Err(Error::LockHeld {
                    path: self.path.clone(),
                    owner,
                    race_detected: true,
                })
            }
        }
    }

    /// `Ok(None)` when the file already exists.
    fn try_create(&self) -> Result<Option<LockGuard>, Error> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.lock_error(e))?;
        }

        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
        {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => return Ok(None),
            Err(source) => return Err(self.lock_error(source)),
        };

        let record = LockRecord::for_current_process();
        let contents = record.render();
        let written = file
            .write_all(contents.as_bytes())
            .and_then(|()| file.sync_all());
        if let Err(source) = written {
            drop(file);
            let _ = fs::remove_file(&self.path);
            return Err(self.lock_error(source));
        }

        Ok(Some(LockGuard {
            path: self.path.clone(),
            contents,
            record,
            released: false,
        }))
    }

    fn force_clear(&self) -> Result<(), Error> {
        let own_pid = std::process::id();

        if let Some(owner) = self.inspect()?.owner() {
            if owner != own_pid && self.processes.is_alive(owner) {
                self.terminate(owner);
            }
        }

        if let Some(name) = &self.sibling_name {
            for pid in self.processes.find_by_name(name) {
                if pid != own_pid {
                    self.terminate(pid);
                }
            }
        }

        self.remove_lock_file()?;
        info!("Lock {} force-cleared", self.path.display());
        Ok(())
    }

    fn terminate(&self, pid: u32) {
        match self.processes.terminate(pid) {
            Ok(()) => warn!("Terminated conflicting process {}", pid),
            Err(e) => warn!("Could not terminate process {}: {}", pid, e),
        }
    }

    fn remove_lock_file(&self) -> Result<(), Error> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(self.lock_error(source)),
        }
    }

    fn lock_error(&self, source: io::Error) -> Error {
        Error::Lock {
            path: self.path.clone(),
            source,
        }
    }
}

/// Held lock. Dropping it releases the lock on every exit path.
#[must_use = "the lock is released as soon as the guard is dropped"]
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
    contents: String,
    record: LockRecord,
    released: bool,
}

impl LockGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&self) -> &LockRecord {
        &self.record
    }

    pub fn release(mut self) -> Result<(), Error> {
        self.release_inner().map_err(|source| Error::Lock {
            path: self.path.clone(),
            source,
        })
    }

    /// Only deletes the file if it still holds exactly what this guard wrote.
    fn release_inner(&mut self) -> io::Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        match fs::read_to_string(&self.path) {
            Ok(current) if current == self.contents => {}
            Ok(_) => {
                warn!(
                    "Lock {} now belongs to another process, leaving it in place",
                    self.path.display()
                );
                return Ok(());
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err),
        }

        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!("Released lock {}", self.path.display());
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = self.release_inner() {
            warn!("Failed to release lock {}: {}", self.path.display(), e);
        }
    }
}
