#[cfg(unix)]
mod unix;
#[cfg(target_os = "windows")]
pub mod windows;

use std::io;
use std::path::Path;

/// Access to the host's process table, as the lock manager needs it.
pub trait ProcessTable: Send + Sync {
    fn is_alive(&self, pid: u32) -> bool;
    fn terminate(&self, pid: u32) -> io::Result<()>;
    /// Pids of running processes whose executable name matches `name`.
    fn find_by_name(&self, name: &str) -> Vec<u32>;
}

impl<T: ProcessTable + ?Sized> ProcessTable for &T {
    fn is_alive(&self, pid: u32) -> bool {
        (**self).is_alive(pid)
    }

    fn terminate(&self, pid: u32) -> io::Result<()> {
        (**self).terminate(pid)
    }

    fn find_by_name(&self, name: &str) -> Vec<u32> {
        (**self).find_by_name(name)
    }
}

/// The real process table of this host.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProcesses;

#[cfg(unix)]
impl ProcessTable for SystemProcesses {
    fn is_alive(&self, pid: u32) -> bool {
        unix::is_pid_alive(pid)
    }

    fn terminate(&self, pid: u32) -> io::Result<()> {
        unix::terminate(pid)
    }

    fn find_by_name(&self, name: &str) -> Vec<u32> {
        unix::find_by_name(name)
    }
}

#[cfg(target_os = "windows")]
impl ProcessTable for SystemProcesses {
    fn is_alive(&self, pid: u32) -> bool {
        windows::is_pid_alive(pid)
    }

    fn terminate(&self, pid: u32) -> io::Result<()> {
        windows::terminate(pid)
    }

    fn find_by_name(&self, name: &str) -> Vec<u32> {
        windows::find_by_name(name)
    }
}

/// File stem of the running executable, used as the default sibling name.
pub fn current_process_name() -> Option<String> {
    std::env::current_exe()
        .ok()?
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
}

/// Whether `path` lives on network storage (UNC share, mapped drive, network mount).
pub fn is_network_path(path: &Path) -> bool {
    if is_unc(path) {
        return true;
    }
    platform_is_network_path(path)
}

fn is_unc(path: &Path) -> bool {
    let text = path.to_string_lossy();
    if text.starts_with(r"\\?\UNC\") {
        return true;
    }
    if text.starts_with(r"\\?\") || text.starts_with(r"\\.\") {
        return false;
    }
    text.starts_with(r"\\") || text.starts_with("//")
}

#[cfg(target_os = "windows")]
fn platform_is_network_path(path: &Path) -> bool {
    windows::is_remote_drive(path)
}

#[cfg(target_os = "linux")]
fn platform_is_network_path(path: &Path) -> bool {
    unix::is_network_mount(path)
}

#[cfg(not(any(target_os = "windows", target_os = "linux")))]
fn platform_is_network_path(_path: &Path) -> bool {
    false
}
