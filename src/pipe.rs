//! A unidirectional byte pipe used to connect a captured stream between
//! parent and child.

use std::fs::File;
use std::io;

use crate::error::Error;

/// The two ends of a freshly created pipe.
pub struct PipePair {
    /// The end from which bytes can be read.
    pub read: File,
    /// The end to which bytes can be written.
    pub write: File,
}

impl PipePair {
    /// Create a new pipe. Both ends are inheritable by a freshly-forked
    /// child by default; callers that keep one end in the parent should mark
    /// it non-inheritable with [`set_inheritable`] before spawning.
    pub fn open() -> Result<PipePair, Error> {
        let (read, write) = os::pipe().map_err(Error::PipeSyscall)?;
        Ok(PipePair { read, write })
    }
}

/// Mark `file` inheritable (or not) by a child process created after this
/// call. The parent's kept end of a pipe is always made non-inheritable so a
/// grandchild spawned later doesn't accidentally keep it open.
pub fn set_inheritable(file: &File, inheritable: bool) -> io::Result<()> {
    os::set_inheritable(file, inheritable)
}

#[cfg(unix)]
mod os {
    use std::fs::File;
    use std::io;
    use std::os::unix::io::{AsRawFd, FromRawFd};

    pub fn pipe() -> io::Result<(File, File)> {
        let mut fds = [0 as libc::c_int; 2];
        let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: pipe(2) just handed us two freshly-opened, uniquely-owned
        // descriptors.
        Ok(unsafe { (File::from_raw_fd(fds[0]), File::from_raw_fd(fds[1])) })
    }

    pub fn set_inheritable(file: &File, inheritable: bool) -> io::Result<()> {
        let fd = file.as_raw_fd();
        let old = unsafe { libc::fcntl(fd, libc::F_GETFD) };
        if old < 0 {
            return Err(io::Error::last_os_error());
        }
        let new = if inheritable {
            old & !libc::FD_CLOEXEC
        } else {
            old | libc::FD_CLOEXEC
        };
        if unsafe { libc::fcntl(fd, libc::F_SETFD, new) } < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

#[cfg(windows)]
mod os {
    use std::fs::File;
    use std::io;

    use crate::win32;

    pub fn pipe() -> io::Result<(File, File)> {
        win32::create_pipe()
    }

    pub fn set_inheritable(file: &File, inheritable: bool) -> io::Result<()> {
        win32::set_handle_inheritable(file, inheritable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};

    #[test]
    fn roundtrips_bytes() {
        let mut pair = PipePair::open().unwrap();
        pair.write.write_all(b"hello").unwrap();
        drop(pair.write);
        let mut buf = Vec::new();
        pair.read.read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"hello");
    }
}
