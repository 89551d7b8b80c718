use std::io;
#[cfg(target_os = "linux")]
use std::path::{Path, PathBuf};

pub fn is_pid_alive(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if pid <= 0 {
        return false;
    }
    // SAFETY: signal 0 performs the existence and permission checks only.
    let result = unsafe { libc::kill(pid, 0) };
    if result == 0 {
        return true;
    }
    // EPERM: the process exists but belongs to someone else.
    io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

pub fn terminate(pid: u32) -> io::Result<()> {
    let pid = libc::pid_t::try_from(pid)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
    // SAFETY: plain kill(2); the pid was range-checked above.
    if unsafe { libc::kill(pid, libc::SIGKILL) } == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

/// The kernel truncates `comm` to this many bytes.
#[cfg(target_os = "linux")]
const COMM_LEN: usize = 15;

/// Matches on the executable name from `exe`, then `argv[0]`, then the
/// truncated `comm`, since `exe` is unreadable for other users' processes.
#[cfg(target_os = "linux")]
pub fn find_by_name(name: &str) -> Vec<u32> {
    let Ok(entries) = std::fs::read_dir("/proc") else {
        return Vec::new();
    };
    entries
        .flatten()
        .filter_map(|entry| {
            let pid: u32 = entry.file_name().to_str()?.parse().ok()?;
            process_has_name(&entry.path(), name).then_some(pid)
        })
        .collect()
}

#[cfg(target_os = "linux")]
fn process_has_name(proc_dir: &Path, name: &str) -> bool {
    if let Ok(exe) = std::fs::read_link(proc_dir.join("exe")) {
        if file_name_is(&exe, name) {
            return true;
        }
    }
    if let Ok(cmdline) = std::fs::read(proc_dir.join("cmdline")) {
        let argv0 = cmdline.split(|b| *b == 0).next().unwrap_or_default();
        if file_name_is(Path::new(&*String::from_utf8_lossy(argv0)), name) {
            return true;
        }
    }
    std::fs::read_to_string(proc_dir.join("comm"))
        .map(|comm| comm_matches(comm.trim_end(), name))
        .unwrap_or(false)
}

#[cfg(target_os = "linux")]
fn file_name_is(path: &Path, name: &str) -> bool {
    path.file_name().is_some_and(|file_name| file_name == name)
}

#[cfg(target_os = "linux")]
fn comm_matches(comm: &str, name: &str) -> bool {
    let name = name.as_bytes();
    comm.as_bytes() == &name[..name.len().min(COMM_LEN)]
}

#[cfg(not(target_os = "linux"))]
pub fn find_by_name(name: &str) -> Vec<u32> {
    tracing::debug!("Sibling lookup for '{}' is not supported on this platform", name);
    Vec::new()
}

#[cfg(target_os = "linux")]
const NETWORK_FILESYSTEMS: &[&str] = &[
    "nfs",
    "nfs4",
    "cifs",
    "smb3",
    "smbfs",
    "sshfs",
    "fuse.sshfs",
    "9p",
    "afs",
    "ceph",
    "glusterfs",
];

#[cfg(target_os = "linux")]
pub fn is_network_mount(path: &Path) -> bool {
    let Ok(mounts) = std::fs::read_to_string("/proc/self/mounts") else {
        return false;
    };
    let path = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    mount_fstype(&mounts, &path)
        .map(|fstype| NETWORK_FILESYSTEMS.contains(&fstype.as_str()))
        .unwrap_or(false)
}

/// Filesystem type of the longest mount point containing `path`.
#[cfg(target_os = "linux")]
fn mount_fstype(mounts: &str, path: &Path) -> Option<String> {
    mounts
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let _device = fields.next()?;
            let mount_point = PathBuf::from(unescape_mount(fields.next()?));
            let fstype = fields.next()?;
            path.starts_with(&mount_point)
                .then(|| (mount_point.components().count(), fstype.to_string()))
        })
        .max_by_key(|(depth, _)| *depth)
        .map(|(_, fstype)| fstype)
}

/// `/proc/self/mounts` writes spaces and friends as `\040`-style octal escapes.
#[cfg(target_os = "linux")]
fn unescape_mount(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 4 <= bytes.len() {
            let code = std::str::from_utf8(&bytes[i + 1..i + 4])
                .ok()
                .and_then(|digits| u8::from_str_radix(digits, 8).ok());
            if let Some(code) = code {
                out.push(code);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
