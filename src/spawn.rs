//! Platform-independent spawn orchestration: turns an `OutputRedirection`
//! mode and a resolved executable into allocated pipes, a launched child,
//! and the parent-side fds a `ProcessHandle` hands off to its readers.

use std::ffi::OsString;
use std::fs::File;
use std::path::Path;

use crate::error::Error;
use crate::handle::{ChildRef, OutputRedirection};
use crate::pipe::{self, PipePair};

/// What the parent keeps after a successful spawn.
pub(crate) struct SpawnOutcome {
    pub child: ChildRef,
    /// Always present: the child's stdin is always piped so `launch()` can
    /// return a writable stream.
    pub stdin: File,
    /// `Some` iff a stdout reader should be started.
    pub stdout_capture: Option<File>,
    /// `Some` iff a dedicated stderr reader should be started (never set
    /// when `mergeStderr` is in effect).
    pub stderr_capture: Option<File>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum CaptureMode {
    None,
    Separate,
    Merged,
}

fn capture_mode(redirection: &OutputRedirection) -> CaptureMode {
    match redirection {
        OutputRedirection::None => CaptureMode::None,
        OutputRedirection::Collect { merge_stderr } | OutputRedirection::Stream { merge_stderr, .. } => {
            if *merge_stderr {
                CaptureMode::Merged
            } else {
                CaptureMode::Separate
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn spawn(
    exec_path: &Path,
    argv: &[OsString],
    env: &[(OsString, OsString)],
    cwd: Option<&Path>,
    start_new_process_group: bool,
    redirection: &OutputRedirection,
) -> Result<SpawnOutcome, Error> {
    let mode = capture_mode(redirection);

    // stdin is always piped.
    let stdin_pipe = PipePair::open()?;
    pipe::set_inheritable(&stdin_pipe.write, false).map_err(Error::PipeSyscall)?;

    let stdout_pipe = match mode {
        CaptureMode::None => None,
        CaptureMode::Separate | CaptureMode::Merged => {
            let p = PipePair::open()?;
            pipe::set_inheritable(&p.read, false).map_err(Error::PipeSyscall)?;
            Some(p)
        }
    };
    let stderr_pipe = match mode {
        CaptureMode::Separate => {
            let p = PipePair::open()?;
            pipe::set_inheritable(&p.read, false).map_err(Error::PipeSyscall)?;
            Some(p)
        }
        CaptureMode::None | CaptureMode::Merged => None,
    };

    let (child, stdin_child, stdout_child, stderr_child) = os::spawn(
        exec_path,
        argv,
        env,
        cwd,
        start_new_process_group,
        &stdin_pipe,
        stdout_pipe.as_ref(),
        stderr_pipe.as_ref(),
        mode == CaptureMode::Merged,
    )?;

    // Close the child-side copies now held in the parent; the new process
    // keeps its own copies independent of these.
    drop(stdin_child);
    drop(stdout_child);
    drop(stderr_child);

    Ok(SpawnOutcome {
        child,
        stdin: stdin_pipe.write,
        stdout_capture: stdout_pipe.map(|p| p.read),
        stderr_capture: stderr_pipe.map(|p| p.read),
    })
}

#[cfg(unix)]
mod os {
    use super::*;
    use crate::pipe::PipePair;
    use crate::posix::{self, ChildStreams};
    use std::fs::File;
    use std::os::unix::io::AsRawFd;

    #[allow(clippy::too_many_arguments)]
    pub(super) fn spawn(
        exec_path: &Path,
        argv: &[OsString],
        env: &[(OsString, OsString)],
        cwd: Option<&Path>,
        start_new_process_group: bool,
        stdin_pipe: &PipePair,
        stdout_pipe: Option<&PipePair>,
        stderr_pipe: Option<&PipePair>,
        merge_stderr: bool,
    ) -> Result<(ChildRef, File, Option<File>, Option<File>), Error> {
        let streams = ChildStreams {
            stdin: Some(stdin_pipe.read.as_raw_fd()),
            stdout: stdout_pipe.map(|p| p.write.as_raw_fd()),
            stderr: stderr_pipe.map(|p| p.write.as_raw_fd()),
            merge_stderr,
        };
        let pid = posix::spawn(exec_path, argv, env, cwd, start_new_process_group, streams)?;

        // Return owned copies of the child-side Files so the caller can
        // drop them (closing the parent's duplicate fds) after the spawn
        // call returns. `try_clone` duplicates the fd; dropping the clone
        // closes only that duplicate, not the original pipe object the
        // caller still owns via `stdin_pipe`/etc.
        let stdin_child = stdin_pipe.read.try_clone().map_err(Error::PipeSyscall)?;
        let stdout_child = match stdout_pipe {
            Some(p) => Some(p.write.try_clone().map_err(Error::PipeSyscall)?),
            None => None,
        };
        let stderr_child = match stderr_pipe {
            Some(p) => Some(p.write.try_clone().map_err(Error::PipeSyscall)?),
            None => None,
        };

        Ok((ChildRef { pid }, stdin_child, stdout_child, stderr_child))
    }
}

#[cfg(windows)]
mod os {
    use super::*;
    use crate::pipe::PipePair;
    use crate::win32;
    use std::fs::File;
    use std::os::windows::io::AsRawHandle;

    #[allow(clippy::too_many_arguments)]
    pub(super) fn spawn(
        exec_path: &Path,
        argv: &[OsString],
        env: &[(OsString, OsString)],
        cwd: Option<&Path>,
        start_new_process_group: bool,
        stdin_pipe: &PipePair,
        stdout_pipe: Option<&PipePair>,
        stderr_pipe: Option<&PipePair>,
        merge_stderr: bool,
    ) -> Result<(ChildRef, File, Option<File>, Option<File>), Error> {
        let stdout_handle = stdout_pipe.map(|p| p.write.as_raw_handle());
        let stderr_handle = if merge_stderr {
            stdout_handle
        } else {
            stderr_pipe.map(|p| p.write.as_raw_handle())
        };
        let (handle, pid) = win32::create_process(
            exec_path,
            argv,
            env,
            cwd,
            start_new_process_group,
            stdin_pipe.read.as_raw_handle(),
            stdout_handle,
            stderr_handle,
        )
        .map_err(|e| Error::SpawnFailed {
            argv: argv.to_vec(),
            source: e,
        })?;

        let stdin_child = stdin_pipe.read.try_clone().map_err(Error::PipeSyscall)?;
        let stdout_child = match stdout_pipe {
            Some(p) => Some(p.write.try_clone().map_err(Error::PipeSyscall)?),
            None => None,
        };
        let stderr_child = match (merge_stderr, stderr_pipe) {
            (true, _) => None,
            (false, Some(p)) => Some(p.write.try_clone().map_err(Error::PipeSyscall)?),
            (false, None) => None,
        };

        Ok((ChildRef { pid, handle }, stdin_child, stdout_child, stderr_child))
    }
}
