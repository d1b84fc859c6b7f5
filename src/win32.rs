//! Windows spawn, pipe, wait, and signal primitives.
//!
//! Pipes here are plain anonymous `CreatePipe` handles, read on a blocking
//! OS thread exactly like the POSIX side (see `reader.rs`/`handle.rs`) —
//! not the overlapped, event-driven I/O machinery a from-scratch Windows
//! backend would use. A dedicated blocking thread per captured stream needs
//! no event loop and no `WaitForMultipleObjects` bookkeeping, at the cost of
//! one parked thread per stream; that trade fits this crate's scale.

use std::collections::HashSet;
use std::ffi::{OsStr, OsString};
use std::fs::File;
use std::io::{Error, Result};
use std::iter;
use std::mem;
use std::os::windows::ffi::{OsStrExt, OsStringExt};
use std::os::windows::io::{AsRawHandle, FromRawHandle, RawHandle};
use std::path::Path;
use std::ptr;
use std::time::Duration;

use winapi::shared::minwindef::{BOOL, DWORD, FALSE, TRUE};
use winapi::um::handleapi::{CloseHandle, INVALID_HANDLE_VALUE};
use winapi::um::minwinbase::SECURITY_ATTRIBUTES;
use winapi::um::namedpipeapi::CreatePipe;
use winapi::um::processthreadsapi::{
    CreateProcessW, GetExitCodeProcess, TerminateProcess as Win32TerminateProcess, PROCESS_INFORMATION,
    STARTUPINFOW,
};
use winapi::um::synchapi::{GenerateConsoleCtrlEvent, WaitForSingleObject};
use winapi::um::winbase::{CREATE_UNICODE_ENVIRONMENT, CREATE_NEW_PROCESS_GROUP, INFINITE, STARTF_USESTDHANDLES};
use winapi::um::wincon::CTRL_BREAK_EVENT;

/// An owned Windows kernel handle, closed on drop.
#[derive(Debug)]
pub struct Handle(RawHandle);

unsafe impl Send for Handle {}
unsafe impl Sync for Handle {}

impl Drop for Handle {
    fn drop(&mut self) {
        unsafe {
            CloseHandle(self.as_raw_handle());
        }
    }
}

impl AsRawHandle for Handle {
    fn as_raw_handle(&self) -> RawHandle {
        self.0
    }
}

impl FromRawHandle for Handle {
    unsafe fn from_raw_handle(handle: RawHandle) -> Handle {
        Handle(handle)
    }
}

fn check(status: BOOL) -> Result<()> {
    if status != 0 {
        Ok(())
    } else {
        Err(Error::last_os_error())
    }
}

fn check_handle(raw_handle: RawHandle) -> Result<RawHandle> {
    if raw_handle != INVALID_HANDLE_VALUE {
        Ok(raw_handle)
    } else {
        Err(Error::last_os_error())
    }
}

fn to_nullterm(s: &OsStr) -> Vec<u16> {
    s.encode_wide().chain(iter::once(0u16)).collect()
}

/// An anonymous, blocking pipe. Both ends are created inheritable; the
/// caller marks the end it keeps in the parent as non-inheritable via
/// [`set_handle_inheritable`] before spawning.
pub fn create_pipe() -> Result<(File, File)> {
    let mut sa = SECURITY_ATTRIBUTES {
        nLength: mem::size_of::<SECURITY_ATTRIBUTES>() as DWORD,
        lpSecurityDescriptor: ptr::null_mut(),
        bInheritHandle: TRUE,
    };
    let mut read_handle: RawHandle = ptr::null_mut();
    let mut write_handle: RawHandle = ptr::null_mut();
    check(unsafe { CreatePipe(&mut read_handle, &mut write_handle, &mut sa, 0) })?;
    Ok(unsafe {
        (
            File::from_raw_handle(read_handle),
            File::from_raw_handle(write_handle),
        )
    })
}

/// Toggle `HANDLE_FLAG_INHERIT` on `file`.
pub fn set_handle_inheritable(file: &File, inheritable: bool) -> Result<()> {
    const HANDLE_FLAG_INHERIT: u32 = 1;
    check(unsafe {
        winapi::um::handleapi::SetHandleInformation(
            file.as_raw_handle(),
            HANDLE_FLAG_INHERIT,
            if inheritable { 1 } else { 0 },
        )
    })
}

fn format_env_block(env: &[(OsString, OsString)]) -> Vec<u16> {
    fn to_uppercase(s: &OsStr) -> OsString {
        OsString::from_wide(
            &s.encode_wide()
                .map(|c| if c < 128 { (c as u8).to_ascii_uppercase() as u16 } else { c })
                .collect::<Vec<_>>(),
        )
    }
    // Later entries win; Windows environment block lookups are
    // case-insensitive so duplicate keys (by case-folded comparison) would
    // otherwise both appear.
    let mut pruned: Vec<_> = {
        let mut seen = HashSet::<OsString>::new();
        env.iter().rev().filter(|&(k, _)| seen.insert(to_uppercase(k))).collect()
    };
    pruned.reverse();
    let mut block = vec![];
    for (k, v) in pruned {
        block.extend(k.encode_wide());
        block.push('=' as u16);
        block.extend(v.encode_wide());
        block.push(0);
    }
    block.push(0);
    block
}

// Translated from ArgvQuote at
// https://learn.microsoft.com/en-us/archive/blogs/twistylittlepassagesallalike/everyone-quotes-command-line-arguments-the-wrong-way
fn append_quoted(arg: &OsStr, cmdline: &mut Vec<u16>) {
    if !arg.is_empty()
        && !arg
            .encode_wide()
            .any(|c| c == ' ' as u16 || c == '\t' as u16 || c == '\n' as u16 || c == '\x0b' as u16 || c == '"' as u16)
    {
        cmdline.extend(arg.encode_wide());
        return;
    }
    cmdline.push('"' as u16);

    let arg: Vec<_> = arg.encode_wide().collect();
    let mut i = 0;
    while i < arg.len() {
        let mut num_backslashes = 0;
        while i < arg.len() && arg[i] == '\\' as u16 {
            i += 1;
            num_backslashes += 1;
        }

        if i == arg.len() {
            for _ in 0..num_backslashes * 2 {
                cmdline.push('\\' as u16);
            }
            break;
        } else if arg[i] == b'"' as u16 {
            for _ in 0..num_backslashes * 2 + 1 {
                cmdline.push('\\' as u16);
            }
            cmdline.push(arg[i]);
        } else {
            for _ in 0..num_backslashes {
                cmdline.push('\\' as u16);
            }
            cmdline.push(arg[i]);
        }
        i += 1;
    }
    cmdline.push('"' as u16);
}

fn assemble_cmdline(argv: &[OsString]) -> std::io::Result<OsString> {
    let mut cmdline = vec![];
    for (i, arg) in argv.iter().enumerate() {
        if i > 0 {
            cmdline.push(' ' as u16);
        }
        if arg.encode_wide().any(|c| c == 0) {
            return Err(std::io::Error::new(std::io::ErrorKind::InvalidInput, "argument contains a NUL"));
        }
        append_quoted(arg, &mut cmdline);
    }
    Ok(OsString::from_wide(&cmdline))
}

/// Launch a child. `stdin`/`stdout`/`stderr` are inheritable handles already
/// wired by the caller (the platform-independent `spawn` module).
#[allow(clippy::too_many_arguments)]
pub(crate) fn create_process(
    exec_path: &Path,
    argv: &[OsString],
    env: &[(OsString, OsString)],
    cwd: Option<&Path>,
    start_new_process_group: bool,
    stdin: RawHandle,
    stdout: Option<RawHandle>,
    stderr: Option<RawHandle>,
) -> Result<(Handle, u32)> {
    let cmdline = assemble_cmdline(argv)?;
    let mut cmdline_w = to_nullterm(&cmdline);
    let appname_w = to_nullterm(exec_path.as_os_str());
    let env_block = format_env_block(env);
    let cwd_w = cwd.map(|c| to_nullterm(c.as_os_str()));

    let mut sinfo: STARTUPINFOW = unsafe { mem::zeroed() };
    sinfo.cb = mem::size_of::<STARTUPINFOW>() as DWORD;
    sinfo.dwFlags = STARTF_USESTDHANDLES;
    sinfo.hStdInput = stdin;
    sinfo.hStdOutput = stdout.unwrap_or(ptr::null_mut());
    sinfo.hStdError = stderr.unwrap_or(ptr::null_mut());
    let mut pinfo: PROCESS_INFORMATION = unsafe { mem::zeroed() };

    let mut creation_flags = CREATE_UNICODE_ENVIRONMENT;
    if start_new_process_group {
        creation_flags |= CREATE_NEW_PROCESS_GROUP;
    }

    check(unsafe {
        CreateProcessW(
            appname_w.as_ptr(),
            cmdline_w.as_mut_ptr(),
            ptr::null_mut(),
            ptr::null_mut(),
            TRUE,
            creation_flags,
            env_block.as_ptr() as _,
            cwd_w.as_ref().map(|v| v.as_ptr()).unwrap_or(ptr::null()),
            &mut sinfo,
            &mut pinfo,
        )
    })?;
    unsafe {
        CloseHandle(pinfo.hThread);
        Ok((Handle::from_raw_handle(pinfo.hProcess), pinfo.dwProcessId))
    }
}

/// Block until the process exits, then decode its exit code.
pub(crate) fn wait_for_exit(handle: &Handle) -> Result<crate::result::ExitStatus> {
    let result = unsafe { WaitForSingleObject(handle.as_raw_handle(), INFINITE) };
    const WAIT_OBJECT_0: u32 = 0;
    const WAIT_FAILED: u32 = 0xFFFFFFFF;
    if result == WAIT_FAILED {
        return Err(Error::last_os_error());
    }
    debug_assert_eq!(result, WAIT_OBJECT_0);
    let mut code: DWORD = 0;
    check(unsafe { GetExitCodeProcess(handle.as_raw_handle(), &mut code) })?;
    Ok(crate::result::ExitStatus::from_raw_windows(code))
}

/// Non-blocking: `Ok(None)` if the process has not yet exited.
pub(crate) fn try_wait_for_exit(handle: &Handle, timeout: Duration) -> Result<Option<crate::result::ExitStatus>> {
    let millis = timeout.as_millis().min(u128::from(u32::MAX - 1)) as u32;
    let result = unsafe { WaitForSingleObject(handle.as_raw_handle(), millis) };
    const WAIT_OBJECT_0: u32 = 0;
    const WAIT_TIMEOUT: u32 = 0x102;
    const WAIT_FAILED: u32 = 0xFFFFFFFF;
    match result {
        WAIT_OBJECT_0 => {
            let mut code: DWORD = 0;
            check(unsafe { GetExitCodeProcess(handle.as_raw_handle(), &mut code) })?;
            Ok(Some(crate::result::ExitStatus::from_raw_windows(code)))
        }
        WAIT_TIMEOUT => Ok(None),
        WAIT_FAILED => Err(Error::last_os_error()),
        other => panic!("WaitForSingleObject returned unexpected value {other}"),
    }
}

pub(crate) fn terminate_process(handle: &Handle) -> Result<()> {
    check(unsafe { Win32TerminateProcess(handle.as_raw_handle(), 1) })
}

/// Best-effort equivalent of `SIGINT`: deliver `CTRL_BREAK_EVENT` to the
/// process group. Only meaningful when the child was spawned with its own
/// process group (`CREATE_NEW_PROCESS_GROUP`); otherwise the host console
/// itself would receive the event too.
pub(crate) fn generate_ctrl_event(pid: u32) {
    unsafe {
        GenerateConsoleCtrlEvent(CTRL_BREAK_EVENT, pid);
    }
}
