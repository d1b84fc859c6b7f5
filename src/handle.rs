//! The public façade: construct, `launch`, `wait`, `signal`.

use std::ffi::OsString;
use std::fs::File;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;
use std::thread;

use log::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::path_resolver;
use crate::reader::{self, ChunkCallback};
use crate::result::ResultModel;
use crate::state::{LifecycleCell, StreamKind};

#[cfg(unix)]
pub(crate) struct ChildRef {
    pub pid: libc::pid_t,
}

#[cfg(windows)]
pub(crate) struct ChildRef {
    pub pid: u32,
    pub handle: crate::win32::Handle,
}

/// How the child's stdout/stderr are handled.
pub enum OutputRedirection {
    /// Inherit the parent's fd 1/2; nothing is captured.
    None,
    /// Capture both streams as bytes.
    Collect {
        /// If true, stderr is dup'd onto stdout at the fd level; the
        /// captured stderr is then the empty sequence.
        merge_stderr: bool,
    },
    /// Capture both streams as bytes, additionally invoking a callback with
    /// each chunk as it arrives.
    Stream {
        /// Called on the stdout reader thread with each chunk read.
        on_stdout: Option<ChunkCallback>,
        /// Called on the stderr reader thread with each chunk read. Never
        /// invoked when `merge_stderr` is set (no dedicated stderr reader
        /// runs in that case).
        on_stderr: Option<ChunkCallback>,
        /// See `Collect::merge_stderr`.
        merge_stderr: bool,
    },
}

/// A not-yet-launched (or launched, or completed) child process.
///
/// Cheaply cloneable: clones share the same underlying launch, so `wait()`
/// and `signal()` are meaningful from any clone.
#[derive(Clone)]
pub struct ProcessHandle(Arc<Inner>);

struct Inner {
    argv: Vec<OsString>,
    environment: Vec<(OsString, OsString)>,
    redirection: OutputRedirection,
    verbose: bool,
    start_new_process_group: bool,
    working_directory: Option<PathBuf>,

    launched: AtomicBool,
    pid: AtomicI32,
    detached: AtomicBool,
    #[cfg(windows)]
    child_handle: std::sync::Mutex<Option<crate::win32::Handle>>,
    cell: LifecycleCell,
}

impl Drop for Inner {
    fn drop(&mut self) {
        // Unless detached, a launched-but-never-waited-on child is reaped
        // here so it doesn't become a zombie the OS keeps around forever.
        // Best-effort: errors are swallowed, matching `signal`'s contract.
        if self.detached.load(Ordering::Relaxed) {
            return;
        }
        if !self.launched.load(Ordering::Relaxed) || self.cell.is_terminal() {
            return;
        }
        let pid = self.pid.load(Ordering::SeqCst);
        #[cfg(unix)]
        {
            let _ = posix::waitpid_blocking(pid);
        }
        #[cfg(windows)]
        {
            if let Some(handle) = self.child_handle.lock().unwrap().as_ref() {
                let _ = crate::win32::wait_for_exit(handle);
            }
        }
    }
}

impl ProcessHandle {
    /// Construct a handle. Nothing happens until `launch()` is called.
    pub fn new(
        argv: Vec<OsString>,
        environment: Vec<(OsString, OsString)>,
        redirection: OutputRedirection,
        verbose: bool,
        start_new_process_group: bool,
        working_directory: Option<PathBuf>,
    ) -> ProcessHandle {
        assert!(!argv.is_empty(), "argv must not be empty");
        assert!(!argv[0].is_empty(), "argv[0] must not be empty");
        ProcessHandle(Arc::new(Inner {
            argv,
            environment,
            redirection,
            verbose,
            start_new_process_group,
            working_directory,
            launched: AtomicBool::new(false),
            pid: AtomicI32::new(0),
            detached: AtomicBool::new(false),
            #[cfg(windows)]
            child_handle: std::sync::Mutex::new(None),
            cell: LifecycleCell::new(),
        }))
    }

    /// Native process id. `0` before a successful `launch()`.
    pub fn pid(&self) -> i32 {
        self.0.pid.load(Ordering::SeqCst)
    }

    /// Whether `launch()` has been called (successfully or not: the latch
    /// flips before resolution/spawn is attempted).
    pub fn launched(&self) -> bool {
        self.0.launched.load(Ordering::SeqCst)
    }

    /// Launch the child. Returns a writable stream connected to its stdin;
    /// dropping (or explicitly closing) the stream closes stdin, which is
    /// usually how a child observes EOF on its input.
    ///
    /// # Panics
    /// Calling this a second time on the same handle is a contract error and
    /// panics, per the single-launch invariant.
    pub fn launch(&self) -> Result<File> {
        if self.0.launched.swap(true, Ordering::SeqCst) {
            panic!("ProcessHandle::launch() called twice");
        }

        let inner = &*self.0;
        let line = shell_escape_argv(&inner.argv);
        if inner.verbose {
            println!("{line}");
        }
        trace!("launch: {line}");

        let program = &inner.argv[0];
        let exec_path = match path_resolver::resolve(program, inner.working_directory.as_deref()) {
            Some(p) => p,
            None => {
                warn!("launch: could not resolve executable {program:?}");
                return Err(Error::MissingExecutableProgram(program.clone()));
            }
        };

        let outcome = crate::spawn::spawn(
            &exec_path,
            &inner.argv,
            &inner.environment,
            inner.working_directory.as_deref(),
            inner.start_new_process_group,
            &inner.redirection,
        )?;

        inner.pid.store(child_pid_i32(&outcome.child), Ordering::SeqCst);
        #[cfg(windows)]
        {
            *inner.child_handle.lock().unwrap() = Some(outcome.child.handle);
        }
        debug!("launch: pid {} spawned", self.pid());

        self.start_capture(outcome.stdout_capture, outcome.stderr_capture);

        Ok(outcome.stdin)
    }

    fn start_capture(&self, stdout_capture: Option<File>, stderr_capture: Option<File>) {
        let inner = &self.0;
        if stdout_capture.is_none() && stderr_capture.is_none() {
            inner.cell.start_vacuous();
            return;
        }

        let expected = stdout_capture.is_some() as u8 + stderr_capture.is_some() as u8;
        let rendezvous = inner.cell.start_capturing(expected);

        let on_stdout = stdout_callback(&inner.redirection);
        let on_stderr = stderr_callback(&inner.redirection);

        let mut threads = Vec::new();
        if let Some(file) = stdout_capture {
            let rendezvous = Arc::clone(&rendezvous);
            let handle = self.clone();
            threads.push(thread::spawn(move || {
                let result = reader::drain(file, on_stdout);
                rendezvous.arrive(StreamKind::Stdout, result, &handle.0.cell);
            }));
        }
        if let Some(file) = stderr_capture {
            let rendezvous = Arc::clone(&rendezvous);
            let handle = self.clone();
            threads.push(thread::spawn(move || {
                let result = reader::drain(file, on_stderr);
                rendezvous.arrive(StreamKind::Stderr, result, &handle.0.cell);
            }));
        }
        inner.cell.attach_reader_threads(threads);
    }

    /// Block until the child has terminated and return its result. Callable
    /// any number of times, concurrently or not; every caller observes the
    /// same result.
    pub fn wait(&self) -> Result<Arc<ResultModel>> {
        assert!(self.launched(), "wait() called before launch()");
        self.wait_with_status(None)
    }

    /// As `wait()`, but if `known_status` is `Some`, it is used directly
    /// instead of reaping the child again. Reaping a pid a second time after
    /// a non-blocking `waitpid`/`GetExitCodeProcess` probe has already
    /// reported its exit fails (`ECHILD` on POSIX), so any caller that
    /// already obtained the status that way must hand it in here rather than
    /// let `wait()` try to reap it afresh.
    fn wait_with_status(&self, known_status: Option<crate::result::ExitStatus>) -> Result<Arc<ResultModel>> {
        let inner = Arc::clone(&self.0);
        let pid = self.pid();
        inner.cell.wait(move |stdout, stderr| {
            let exit_status = match known_status {
                Some(status) => status,
                None => reap(pid, &inner)?,
            };
            debug!("wait: pid {pid} exited: {exit_status}");
            Ok(ResultModel {
                argv: inner.argv.clone(),
                environment: inner.environment.clone(),
                exit_status,
                stdout,
                stderr,
            })
        })
    }

    /// Non-blocking: `Some(result)` if the child has already produced a
    /// terminal result, `None` if it is still capturing or running.
    pub fn try_wait(&self) -> Result<Option<Arc<ResultModel>>> {
        if !self.launched() {
            return Ok(None);
        }
        #[cfg(unix)]
        {
            match posix::try_waitpid(self.pid())? {
                None => return Ok(None),
                Some(status) => return self.wait_with_status(Some(status)).map(Some),
            }
        }
        #[cfg(windows)]
        {
            let status = {
                let guard = self.0.child_handle.lock().unwrap();
                let handle = guard.as_ref().expect("launched handle must carry a process handle");
                crate::win32::try_wait_for_exit(handle, std::time::Duration::from_secs(0))
                    .map_err(Error::WaitpidSyscall)?
            };
            match status {
                None => Ok(None),
                Some(status) => self.wait_with_status(Some(status)).map(Some),
            }
        }
    }

    /// Block until the child terminates or `timeout` elapses.
    pub fn wait_timeout(&self, timeout: std::time::Duration) -> Result<Option<Arc<ResultModel>>> {
        assert!(self.launched(), "wait_timeout() called before launch()");
        let deadline = std::time::Instant::now() + timeout;
        loop {
            if let Some(result) = self.try_wait()? {
                return Ok(Some(result));
            }
            if std::time::Instant::now() >= deadline {
                return Ok(None);
            }
            thread::sleep(std::time::Duration::from_millis(5));
        }
    }

    /// Deliver a signal to the child. POSIX: sent to the process group if
    /// `startNewProcessGroup` was set, else to the pid directly. Never
    /// fails visibly; delivery errors are logged and swallowed.
    #[cfg(unix)]
    pub fn signal(&self, sig: i32) {
        assert!(self.launched(), "signal() called before launch()");
        trace!(
            "signal: delivering {sig} to {}",
            if self.0.start_new_process_group {
                "process group"
            } else {
                "pid"
            }
        );
        posix::send_signal(self.pid(), sig, self.0.start_new_process_group);
    }

    /// Windows: map `SIGINT`-like intent to the host interrupt primitive and
    /// anything else to a forced terminate.
    #[cfg(windows)]
    pub fn signal(&self, sig: i32) {
        assert!(self.launched(), "signal() called before launch()");
        let guard = self.0.child_handle.lock().unwrap();
        let Some(handle) = guard.as_ref() else { return };
        if sig == libc::SIGINT {
            crate::win32::generate_ctrl_event(self.pid() as u32);
        } else {
            let _ = crate::win32::terminate_process(handle);
        }
    }

    /// Opt out of the implicit reap-on-drop courtesy: once detached, letting
    /// every clone of this handle go out of scope without calling `wait()`
    /// will not reap the child. Use this when the child is intentionally
    /// left running past the handle's own lifetime (daemonized, handed off
    /// to another supervisor, etc).
    pub fn detach(&self) {
        self.0.detached.store(true, Ordering::Relaxed);
    }
}

#[cfg(unix)]
use crate::posix;

#[cfg(unix)]
fn reap(pid: i32, _inner: &Inner) -> Result<crate::result::ExitStatus> {
    posix::waitpid_blocking(pid)
}

#[cfg(windows)]
fn reap(_pid: i32, inner: &Inner) -> Result<crate::result::ExitStatus> {
    let guard = inner.child_handle.lock().unwrap();
    let h = guard
        .as_ref()
        .expect("launched handle must carry a process handle");
    crate::win32::wait_for_exit(h).map_err(Error::WaitpidSyscall)
}

#[cfg(unix)]
fn child_pid_i32(child: &ChildRef) -> i32 {
    child.pid
}

#[cfg(windows)]
fn child_pid_i32(child: &ChildRef) -> i32 {
    child.pid as i32
}

fn stdout_callback(redirection: &OutputRedirection) -> Option<ChunkCallback> {
    match redirection {
        OutputRedirection::Stream { on_stdout, .. } => on_stdout.clone(),
        _ => None,
    }
}

fn stderr_callback(redirection: &OutputRedirection) -> Option<ChunkCallback> {
    match redirection {
        OutputRedirection::Stream { on_stderr, .. } => on_stderr.clone(),
        _ => None,
    }
}

fn shell_escape_argv(argv: &[OsString]) -> String {
    argv.iter()
        .map(|a| shell_escape_one(&a.to_string_lossy()))
        .collect::<Vec<_>>()
        .join(" ")
}

fn shell_escape_one(arg: &str) -> String {
    if !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=,".contains(c))
    {
        arg.to_owned()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}
