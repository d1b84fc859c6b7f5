//! Cross-platform launching of child processes, with concurrent capture of
//! their stdout/stderr and correct pipe, fd, thread, and signal-mask
//! discipline.
//!
//! The entry point is [`ProcessHandle`]: construct one with [`ProcessHandle::new`],
//! call [`ProcessHandle::launch`] to actually spawn the child, then
//! [`ProcessHandle::wait`] for its [`ResultModel`]. [`popen`] and
//! [`check_nonzero_exit`] wrap that sequence for the common case of a
//! one-shot command whose output is wanted as a string.
//!
//! # Examples
//!
//! ```no_run
//! use childproc::popen;
//!
//! let result = popen(vec!["echo".into(), "hi".into()], vec![])?;
//! assert!(result.exit_status.success());
//! assert_eq!(result.stdout_str()?, "hi\n");
//! # Ok::<(), childproc::Error>(())
//! ```
//!
//! Streaming output as it arrives, rather than waiting for the whole
//! capture:
//!
//! ```no_run
//! use std::sync::Arc;
//! use childproc::{ProcessHandle, OutputRedirection};
//!
//! let handle = ProcessHandle::new(
//!     vec!["echo".into(), "hi".into()],
//!     vec![],
//!     OutputRedirection::Stream {
//!         on_stdout: Some(Arc::new(|chunk: &[u8]| print!("{}", String::from_utf8_lossy(chunk)))),
//!         on_stderr: None,
//!         merge_stderr: false,
//!     },
//!     false,
//!     false,
//!     None,
//! );
//! handle.launch()?;
//! handle.wait()?;
//! # Ok::<(), childproc::Error>(())
//! ```

#![warn(missing_docs)]

extern crate libc;

#[cfg(windows)]
extern crate winapi;

mod convenience;
mod error;
mod handle;
mod path_resolver;
mod pipe;
mod reader;
mod result;
mod spawn;
mod state;

#[cfg(unix)]
mod posix;

#[cfg(windows)]
mod win32;

pub use crate::convenience::{check_nonzero_exit, popen, popen_with_cwd};
pub use crate::error::{Error, Result};
pub use crate::handle::{OutputRedirection, ProcessHandle};
pub use crate::reader::ChunkCallback;
pub use crate::result::{ExitStatus, ResultModel};
