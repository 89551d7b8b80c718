extern crate winapi;

use std::ffi::OsString;
use std::io;
use std::mem;
use std::os::windows::ffi::{OsStrExt, OsStringExt};
use std::path::{Component, Path};

use winapi::shared::minwindef::{DWORD, FALSE};
use winapi::shared::winerror::ERROR_ACCESS_DENIED;
use winapi::um::fileapi::GetDriveTypeW;
use winapi::um::handleapi::{CloseHandle, INVALID_HANDLE_VALUE};
use winapi::um::minwinbase::STILL_ACTIVE;
use winapi::um::processthreadsapi::{GetExitCodeProcess, OpenProcess, TerminateProcess};
use winapi::um::tlhelp32::{
    CreateToolhelp32Snapshot, Process32FirstW, Process32NextW, PROCESSENTRY32W,
    TH32CS_SNAPPROCESS,
};
use winapi::um::winbase::DRIVE_REMOTE;
use winapi::um::winnt::{PROCESS_QUERY_LIMITED_INFORMATION, PROCESS_TERMINATE};

pub fn get_drive_letter(path: &Path) -> Option<OsString> {
    for component in path.components() {
        if let Component::Prefix(prefix_comp) = component {
            match prefix_comp.kind() {
                std::path::Prefix::Disk(letter) | std::path::Prefix::VerbatimDisk(letter) => {
                    let drive_letter = (letter as char).to_string();
                    return Some(OsString::from(drive_letter));
                }
                _ => (),
            }
        }
    }
    None
}

/// True for mapped network drives such as `Z:\` pointing at a share.
pub fn is_remote_drive(path: &Path) -> bool {
    let Some(letter) = get_drive_letter(path) else {
        return false;
    };
    let mut root = letter;
    root.push(":\\");
    let root_wide: Vec<u16> = root.encode_wide().chain(std::iter::once(0)).collect();

    unsafe { GetDriveTypeW(root_wide.as_ptr()) == DRIVE_REMOTE }
}

pub fn is_pid_alive(pid: u32) -> bool {
    if pid == 0 {
        return false;
    }
    unsafe {
        let handle = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, FALSE, pid);
        if handle.is_null() {
            // Access denied means the process exists but is not ours to inspect.
            return io::Error::last_os_error().raw_os_error() == Some(ERROR_ACCESS_DENIED as i32);
        }
        let mut status: DWORD = 0;
        let ok = GetExitCodeProcess(handle, &mut status);
        CloseHandle(handle);
        ok != 0 && status == STILL_ACTIVE
    }
}

pub fn terminate(pid: u32) -> io::Result<()> {
    unsafe {
        let handle = OpenProcess(PROCESS_TERMINATE, FALSE, pid);
        if handle.is_null() {
            return Err(io::Error::last_os_error());
        }
        let ok = TerminateProcess(handle, 1);
        let result = if ok == 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        };
        CloseHandle(handle);
        result
    }
}

/// Match on the executable name with or without its `.exe` suffix.
pub fn find_by_name(name: &str) -> Vec<u32> {
    let wanted = name.trim_end_matches(".exe").to_ascii_lowercase();
    let mut pids = Vec::new();

    unsafe {
        let snapshot = CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0);
        if snapshot == INVALID_HANDLE_VALUE {
            return pids;
        }

        let mut entry: PROCESSENTRY32W = mem::zeroed();
        entry.dwSize = mem::size_of::<PROCESSENTRY32W>() as DWORD;

        let mut more = Process32FirstW(snapshot, &mut entry) != 0;
        while more {
            let len = entry
                .szExeFile
                .iter()
                .position(|&c| c == 0)
                .unwrap_or(entry.szExeFile.len());
            let exe = OsString::from_wide(&entry.szExeFile[..len])
                .to_string_lossy()
                .to_ascii_lowercase();
            if exe.trim_end_matches(".exe") == wanted {
                pids.push(entry.th32ProcessID);
            }
            more = Process32NextW(snapshot, &mut entry) != 0;
        }

        CloseHandle(snapshot);
    }

    pids
}
