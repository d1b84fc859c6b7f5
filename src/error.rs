//! Structured error taxonomy for the launch/wait/resolve paths.
//!
//! Every variant below corresponds to exactly one row of the error table in
//! the crate's design notes; they are intentionally kept distinct rather than
//! collapsed into a generic `io::Error`, since callers frequently need to
//! distinguish e.g. a missing executable from a spawn-time failure.

use std::ffi::OsString;
use std::io;

use crate::result::ResultModel;

/// Errors raised while resolving, launching, capturing, or waiting on a
/// child process.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// `PathResolver` could not locate `argv[0]` on disk.
    #[error("could not find executable program {0:?}")]
    MissingExecutableProgram(OsString),

    /// A working directory was requested but the host has no spawn-time
    /// chdir action available.
    #[error("this platform cannot spawn a child with a working directory")]
    WorkingDirectoryUnsupported,

    /// The spawn primitive itself returned a nonzero/failure status.
    #[error("failed to spawn {argv:?}: {source}")]
    SpawnFailed {
        /// The argv that failed to spawn.
        argv: Vec<OsString>,
        /// Underlying OS error (constructed from the child's reported errno).
        #[source]
        source: io::Error,
    },

    /// Pipe creation failed.
    #[error("failed to create pipe: {0}")]
    PipeSyscall(#[source] io::Error),

    /// Closing a descriptor that was known to be open failed.
    #[error("failed to close file descriptor: {0}")]
    CloseSyscall(#[source] io::Error),

    /// A non-`EINTR` read failure while draining a captured stream.
    #[error("failed to read child output: {0}")]
    ReadSyscall(#[source] io::Error),

    /// Reaping the child failed for a reason other than `EINTR`.
    #[error("failed to wait for child: {0}")]
    WaitpidSyscall(#[source] io::Error),

    /// Captured bytes were not valid UTF-8.
    #[error("captured output is not valid UTF-8")]
    IllegalUtf8(#[source] std::str::Utf8Error),

    /// The child exited with a nonzero status or was signalled.
    #[error("command exited with a non-zero status: {}", .result.description())]
    NonZeroExit {
        /// The full result, including captured output, for diagnostics.
        result: Box<ResultModel>,
    },
}

/// Convenience alias used throughout the crate's public API.
pub type Result<T> = std::result::Result<T, Error>;
