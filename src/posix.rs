//! POSIX spawn, reap, and signal-delivery primitives.
//!
//! The child is launched with `posix_spawn`, not `fork`+`exec`: spawn
//! attributes carry the signal-mask/disposition reset and process-group
//! policy, and a file-actions list carries the fd wiring, so there is no
//! window where arbitrary Rust code (allocator, mutexes, etc.) runs in a
//! freshly-forked child before `exec`. This follows the mandatory discipline
//! for launching a child: reset the signal mask and dispositions first, wire
//! fds via file actions, optionally chdir, then spawn.

use std::ffi::{CString, OsStr, OsString};
use std::io;
use std::mem::MaybeUninit;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::io::RawFd;
use std::path::Path;

use crate::error::Error;

fn to_cstring(s: &OsStr) -> io::Result<CString> {
    CString::new(s.as_bytes()).map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "argument contains a NUL byte"))
}

fn check(rc: libc::c_int) -> io::Result<()> {
    if rc != 0 {
        Err(io::Error::from_raw_os_error(rc))
    } else {
        Ok(())
    }
}

struct FileActions(libc::posix_spawn_file_actions_t);

impl FileActions {
    fn new() -> io::Result<Self> {
        let mut actions = MaybeUninit::uninit();
        check(unsafe { libc::posix_spawn_file_actions_init(actions.as_mut_ptr()) })?;
        Ok(FileActions(unsafe { actions.assume_init() }))
    }

    fn adddup2(&mut self, fd: RawFd, target: RawFd) -> io::Result<()> {
        check(unsafe { libc::posix_spawn_file_actions_adddup2(&mut self.0, fd, target) })
    }

    fn addclose(&mut self, fd: RawFd) -> io::Result<()> {
        check(unsafe { libc::posix_spawn_file_actions_addclose(&mut self.0, fd) })
    }

    fn add_chdir(&mut self, dir: &CString) -> io::Result<()> {
        add_chdir_np(&mut self.0, dir)
    }
}

impl Drop for FileActions {
    fn drop(&mut self) {
        unsafe {
            libc::posix_spawn_file_actions_destroy(&mut self.0);
        }
    }
}

// `posix_spawn_file_actions_addchdir_np` is a glibc/macOS-libc extension; it
// is not part of POSIX proper and the `libc` crate only exposes it on the
// platforms that actually have it.
#[cfg(any(target_os = "linux", target_os = "macos", target_os = "freebsd"))]
fn add_chdir_np(actions: &mut libc::posix_spawn_file_actions_t, dir: &CString) -> io::Result<()> {
    check(unsafe { libc::posix_spawn_file_actions_addchdir_np(actions, dir.as_ptr()) })
}

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "freebsd")))]
fn add_chdir_np(_actions: &mut libc::posix_spawn_file_actions_t, _dir: &CString) -> io::Result<()> {
    Err(io::Error::new(io::ErrorKind::Unsupported, "no spawn-time chdir action on this platform"))
}

struct SpawnAttr(libc::posix_spawnattr_t);

impl SpawnAttr {
    fn new() -> io::Result<Self> {
        let mut attr = MaybeUninit::uninit();
        check(unsafe { libc::posix_spawnattr_init(attr.as_mut_ptr()) })?;
        Ok(SpawnAttr(unsafe { attr.assume_init() }))
    }
}

impl Drop for SpawnAttr {
    fn drop(&mut self) {
        unsafe {
            libc::posix_spawnattr_destroy(&mut self.0);
        }
    }
}

/// Child-side fd wiring for the three standard streams, already resolved by
/// the caller (the platform-independent `spawn` module): `None` means "do
/// not redirect, inherit the parent's fd as-is".
pub(crate) struct ChildStreams {
    pub stdin: Option<RawFd>,
    pub stdout: Option<RawFd>,
    pub stderr: Option<RawFd>,
    /// If true, dup FD 1 onto FD 2 after stdout is wired, instead of wiring
    /// `stderr` independently (`stderr` is ignored when this is set).
    pub merge_stderr: bool,
}

/// Spawn a child process following the mandatory POSIX discipline.
///
/// `exec_path` is the already-resolved absolute executable path; `argv[0]`
/// should already reflect it if a working directory was supplied (spawn-time
/// chdir changes the CWD before some platforms resolve a relative argv[0]).
#[allow(clippy::too_many_arguments)]
pub(crate) fn spawn(
    exec_path: &Path,
    argv: &[OsString],
    env: &[(OsString, OsString)],
    cwd: Option<&Path>,
    start_new_process_group: bool,
    streams: ChildStreams,
) -> Result<libc::pid_t, Error> {
    // Any setup failure below (not the `posix_spawn` call itself) is a
    // failure to even attempt the spawn; it is reported the same way as a
    // nonzero return from `posix_spawn` itself.
    let setup_err = |e: io::Error| Error::SpawnFailed {
        argv: argv.to_vec(),
        source: e,
    };

    let mut attr = SpawnAttr::new().map_err(setup_err)?;

    // Step 1: empty signal mask, default disposition for every modifiable
    // signal (excluding SIGKILL/SIGSTOP, which cannot be changed anyway).
    let mut empty_mask: libc::sigset_t = unsafe { MaybeUninit::zeroed().assume_init() };
    unsafe { libc::sigemptyset(&mut empty_mask) };
    let mut full_mask: libc::sigset_t = unsafe { MaybeUninit::zeroed().assume_init() };
    unsafe {
        libc::sigfillset(&mut full_mask);
        libc::sigdelset(&mut full_mask, libc::SIGKILL);
        libc::sigdelset(&mut full_mask, libc::SIGSTOP);
    }
    check(unsafe { libc::posix_spawnattr_setsigmask(&mut attr.0, &empty_mask) }).map_err(setup_err)?;
    check(unsafe { libc::posix_spawnattr_setsigdefault(&mut attr.0, &full_mask) }).map_err(setup_err)?;

    // Step 2: flags, plus SETPGROUP with pgid 0 if a new process group was
    // requested.
    let mut flags = libc::POSIX_SPAWN_SETSIGMASK | libc::POSIX_SPAWN_SETSIGDEF;
    if start_new_process_group {
        flags |= libc::POSIX_SPAWN_SETPGROUP;
        check(unsafe { libc::posix_spawnattr_setpgroup(&mut attr.0, 0) }).map_err(setup_err)?;
    }
    check(unsafe { libc::posix_spawnattr_setflags(&mut attr.0, flags as _) }).map_err(setup_err)?;

    // Step 3: file actions.
    let mut actions = FileActions::new().map_err(setup_err)?;

    // Step 4: spawn-time chdir, or fail if unsupported.
    if let Some(dir) = cwd {
        let dir_c = to_cstring(dir.as_os_str()).map_err(setup_err)?;
        actions
            .add_chdir(&dir_c)
            .map_err(|_| Error::WorkingDirectoryUnsupported)?;
    }

    // Step 5: stdin.
    if let Some(fd) = streams.stdin {
        if fd != libc::STDIN_FILENO {
            actions.adddup2(fd, libc::STDIN_FILENO).map_err(setup_err)?;
            actions.addclose(fd).map_err(setup_err)?;
        }
    }

    // Step 6: stdout, then stderr (merge or independent).
    if let Some(fd) = streams.stdout {
        if fd != libc::STDOUT_FILENO {
            actions.adddup2(fd, libc::STDOUT_FILENO).map_err(setup_err)?;
            actions.addclose(fd).map_err(setup_err)?;
        }
    }
    if streams.merge_stderr {
        actions
            .adddup2(libc::STDOUT_FILENO, libc::STDERR_FILENO)
            .map_err(setup_err)?;
    } else if let Some(fd) = streams.stderr {
        if fd != libc::STDERR_FILENO {
            actions.adddup2(fd, libc::STDERR_FILENO).map_err(setup_err)?;
            actions.addclose(fd).map_err(setup_err)?;
        }
    }

    // Step 8: encode argv/env, call the spawn primitive.
    let exec_path_c = to_cstring(exec_path.as_os_str()).map_err(setup_err)?;
    let argv_c: Vec<CString> = argv
        .iter()
        .map(|a| to_cstring(a))
        .collect::<io::Result<_>>()
        .map_err(setup_err)?;
    let mut argv_ptrs: Vec<*mut libc::c_char> =
        argv_c.iter().map(|s| s.as_ptr() as *mut libc::c_char).collect();
    argv_ptrs.push(std::ptr::null_mut());

    let env_c: Vec<CString> = env
        .iter()
        .map(|(k, v)| {
            let mut combined = k.as_bytes().to_vec();
            combined.push(b'=');
            combined.extend_from_slice(v.as_bytes());
            CString::new(combined)
                .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "env entry contains a NUL byte"))
        })
        .collect::<io::Result<_>>()
        .map_err(setup_err)?;
    let mut env_ptrs: Vec<*mut libc::c_char> = env_c.iter().map(|s| s.as_ptr() as *mut libc::c_char).collect();
    env_ptrs.push(std::ptr::null_mut());

    let mut pid: libc::pid_t = 0;
    let rc = unsafe {
        libc::posix_spawn(
            &mut pid,
            exec_path_c.as_ptr(),
            &actions.0,
            &attr.0,
            argv_ptrs.as_ptr(),
            env_ptrs.as_ptr(),
        )
    };

    // Step 9/10: nonzero means failure; the parent's kept pipe ends are
    // closed by their owning `Drop` impls once this function returns,
    // regardless of outcome.
    if rc != 0 {
        return Err(Error::SpawnFailed {
            argv: argv.to_vec(),
            source: io::Error::from_raw_os_error(rc),
        });
    }
    Ok(pid)
}

/// `waitpid(pid, &status, 0)`, retrying on `EINTR`, decoding the raw status
/// word into an `ExitStatus` on success.
pub(crate) fn waitpid_blocking(pid: libc::pid_t) -> Result<crate::result::ExitStatus, Error> {
    loop {
        let mut status: libc::c_int = 0;
        let rc = unsafe { libc::waitpid(pid, &mut status, 0) };
        if rc == -1 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(Error::WaitpidSyscall(err));
        }
        return Ok(crate::result::ExitStatus::from_raw_posix(status));
    }
}

/// Non-blocking reap: `waitpid(pid, &status, WNOHANG)`. Returns `None` if
/// the child has not yet exited.
pub(crate) fn try_waitpid(pid: libc::pid_t) -> Result<Option<crate::result::ExitStatus>, Error> {
    loop {
        let mut status: libc::c_int = 0;
        let rc = unsafe { libc::waitpid(pid, &mut status, libc::WNOHANG) };
        if rc == 0 {
            return Ok(None);
        }
        if rc == -1 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(Error::WaitpidSyscall(err));
        }
        return Ok(Some(crate::result::ExitStatus::from_raw_posix(status)));
    }
}

/// Deliver `sig` to `pid`, or to the process group `-pid` if `to_group` is
/// set. Delivery failure is silently ignored by the caller (`ProcessHandle`
/// never surfaces it), matching the source's "never throws" contract.
pub(crate) fn send_signal(pid: libc::pid_t, sig: i32, to_group: bool) {
    let target = if to_group { -pid } else { pid };
    unsafe {
        libc::kill(target, sig);
    }
}
