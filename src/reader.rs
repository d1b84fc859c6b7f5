//! Background draining of a single captured stream.
//!
//! Each captured stream gets its own `Reader`, run on its own OS thread on
//! POSIX (see `state.rs` for how the thread is spawned and joined). A
//! `Reader` knows nothing about its sibling stream or about the process
//! lifecycle; it only drains its file descriptor and reports a result.

use std::fs::File;
use std::io::{self, Read};
use std::sync::Arc;

use log::{trace, warn};

/// Optional per-chunk callback invoked as bytes arrive from a captured
/// stream. Must not block on anything the caller of `wait` might be holding.
pub type ChunkCallback = Arc<dyn Fn(&[u8]) + Send + Sync>;

const CHUNK_SIZE: usize = 4096;

/// Drain `file` until EOF or a non-retryable read error, accumulating bytes
/// (or, if `on_chunk` is provided, forwarding each chunk instead of
/// accumulating it) and returning the result.
///
/// On EOF, the descriptor is closed (by dropping `file`) before returning.
/// On a non-EOF error, `file` is *not* closed: a read error means the
/// process on the other end may still be writing, and closing our end would
/// deliver `SIGPIPE` to it. This intentionally risks leaking the descriptor
/// if the child never exits; see the crate's design notes.
pub fn drain(mut file: File, on_chunk: Option<ChunkCallback>) -> io::Result<Vec<u8>> {
    let mut buf = [0u8; CHUNK_SIZE];
    let mut collected = Vec::new();
    loop {
        match file.read(&mut buf) {
            Ok(0) => {
                // EOF: drop `file` to close the descriptor.
                drop(file);
                return Ok(collected);
            }
            Ok(n) => {
                trace!("reader: drained {n} bytes");
                if let Some(cb) = &on_chunk {
                    cb(&buf[..n]);
                } else {
                    collected.extend_from_slice(&buf[..n]);
                }
            }
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {
                // EINTR: retry the read.
                continue;
            }
            Err(e) => {
                warn!("reader: read failed, leaving fd open: {e}");
                // Leak the descriptor deliberately: dropping `file` here
                // would close it and risk delivering SIGPIPE to a child
                // still writing to the other end.
                std::mem::forget(file);
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;

    #[test]
    fn accumulates_without_callback() {
        let mut pair = crate::pipe::PipePair::open().unwrap();
        pair.write.write_all(b"abc").unwrap();
        drop(pair.write);
        let got = drain(pair.read, None).unwrap();
        assert_eq!(got, b"abc");
    }

    #[test]
    fn forwards_chunks_to_callback_instead_of_accumulating() {
        let mut pair = crate::pipe::PipePair::open().unwrap();
        pair.write.write_all(b"xyz").unwrap();
        drop(pair.write);

        let seen: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let cb: ChunkCallback = Arc::new(move |chunk| {
            seen_clone.lock().unwrap().extend_from_slice(chunk);
        });

        let got = drain(pair.read, Some(cb)).unwrap();
        assert!(got.is_empty());
        assert_eq!(*seen.lock().unwrap(), b"xyz");
    }
}
