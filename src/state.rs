//! The capture-progress state machine and the dual-reader rendezvous.
//!
//! `LifecycleState` tracks one launch from `Idle` through `Capturing` and
//! `ResultPending` to `Complete`. A single mutex serializes every
//! transition, so publication of the terminal `ResultModel` happens-before
//! any later reader observes it. The reader-completion → `ResultPending`
//! transition is additionally gated by a `Rendezvous`, under its own mutex,
//! so that whichever of the (at most two) reader threads finishes last is
//! the one that performs the publication.
//!
//! Blocking on `Capturing`/reaping is implemented with a `Condvar` rather
//! than by a `wait()` caller joining the reader `JoinHandle`s directly: a
//! `JoinHandle` can only be consumed once, but `wait()` may be called
//! concurrently from several threads, so the condvar — one of the
//! equivalent alternatives the design notes call out for the rendezvous —
//! is reused here to let every waiter block without anyone double-joining a
//! handle.

use std::io;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use crate::result::ResultModel;

enum LifecycleState {
    Idle,
    Capturing {
        // Kept so the threads are not detached; never joined directly (see
        // module docs) — dropped wholesale on the terminal transition.
        _threads: Vec<JoinHandle<()>>,
    },
    ResultPending {
        stdout: io::Result<Vec<u8>>,
        stderr: io::Result<Vec<u8>>,
    },
    /// Transient: a `wait()` caller has taken the `ResultPending` payload and
    /// is reaping the child. Other callers block here rather than racing to
    /// reap twice.
    Reaping,
    Complete(Arc<ResultModel>),
}

fn still_blocking(s: &LifecycleState) -> bool {
    matches!(s, LifecycleState::Capturing { .. } | LifecycleState::Reaping)
}

/// `io::Error` is not `Clone`; rebuild one from its kind and message so the
/// captured bytes can be handed to `reap_and_build` while the originals are
/// kept around for restoration on failure.
fn clone_io_result(r: &io::Result<Vec<u8>>) -> io::Result<Vec<u8>> {
    match r {
        Ok(v) => Ok(v.clone()),
        Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
    }
}

struct RendezvousInner {
    arrived: u8,
    stdout: Option<io::Result<Vec<u8>>>,
    stderr: Option<io::Result<Vec<u8>>>,
}

/// Gate that lets the last of (up to two) reader threads to finish collect
/// both results and publish them.
pub(crate) struct Rendezvous {
    expected: u8,
    inner: Mutex<RendezvousInner>,
}

impl Rendezvous {
    fn new(expected: u8) -> Self {
        Rendezvous {
            expected,
            inner: Mutex::new(RendezvousInner {
                arrived: 0,
                stdout: None,
                stderr: None,
            }),
        }
    }

    /// Record stdout's result. Returns `Some` with both results exactly
    /// when this arrival is the last one expected.
    fn arrive_stdout(
        &self,
        result: io::Result<Vec<u8>>,
    ) -> Option<(io::Result<Vec<u8>>, io::Result<Vec<u8>>)> {
        let mut inner = self.inner.lock().unwrap();
        inner.stdout = Some(result);
        inner.arrived += 1;
        self.maybe_publish(&mut inner)
    }

    /// Record stderr's result. See `arrive_stdout`.
    fn arrive_stderr(
        &self,
        result: io::Result<Vec<u8>>,
    ) -> Option<(io::Result<Vec<u8>>, io::Result<Vec<u8>>)> {
        let mut inner = self.inner.lock().unwrap();
        inner.stderr = Some(result);
        inner.arrived += 1;
        self.maybe_publish(&mut inner)
    }

    fn maybe_publish(
        &self,
        inner: &mut RendezvousInner,
    ) -> Option<(io::Result<Vec<u8>>, io::Result<Vec<u8>>)> {
        if inner.arrived < self.expected {
            return None;
        }
        // A sole arrival with no partner (e.g. only stdout was captured, or
        // mergeStderr collapsed stderr's reader entirely) is the ordinary
        // single-stream case, not an error: the missing side publishes as
        // an empty success.
        let stdout = inner.stdout.take().unwrap_or(Ok(Vec::new()));
        let stderr = inner.stderr.take().unwrap_or(Ok(Vec::new()));
        Some((stdout, stderr))
    }
}

/// The synchronized capture-progress cell owned by a `ProcessHandle`.
pub(crate) struct LifecycleCell {
    state: Mutex<LifecycleState>,
    condvar: Condvar,
}

impl LifecycleCell {
    pub fn new() -> Self {
        LifecycleCell {
            state: Mutex::new(LifecycleState::Idle),
            condvar: Condvar::new(),
        }
    }

    /// Begin capturing: publish `Capturing` *before* the caller starts any
    /// reader thread (publication-ordering requirement in the design notes).
    /// `expected_readers` is how many of (stdout, stderr) will actually have
    /// a reader started for them (0, 1, or 2).
    pub fn start_capturing(&self, expected_readers: u8) -> Arc<Rendezvous> {
        let rendezvous = Arc::new(Rendezvous::new(expected_readers));
        let mut guard = self.state.lock().unwrap();
        debug_assert!(matches!(&*guard, LifecycleState::Idle));
        *guard = LifecycleState::Capturing { _threads: Vec::new() };
        rendezvous
    }

    /// Attach the reader `JoinHandle`s to the already-published `Capturing`
    /// state. Split from `start_capturing` so the lock is not held while the
    /// threads are spawned.
    pub fn attach_reader_threads(&self, threads: Vec<JoinHandle<()>>) {
        let mut guard = self.state.lock().unwrap();
        if let LifecycleState::Capturing { _threads } = &mut *guard {
            *_threads = threads;
        }
    }

    /// Redirection was `None`: skip `Capturing` entirely and publish empty
    /// results directly.
    pub fn start_vacuous(&self) {
        let mut guard = self.state.lock().unwrap();
        debug_assert!(matches!(&*guard, LifecycleState::Idle));
        *guard = LifecycleState::ResultPending {
            stdout: Ok(Vec::new()),
            stderr: Ok(Vec::new()),
        };
        self.condvar.notify_all();
    }

    /// Called by a reader thread via its `Rendezvous` handle when it is the
    /// last arrival; publishes `ResultPending` and wakes any blocked waiter.
    pub fn publish_result_pending(&self, stdout: io::Result<Vec<u8>>, stderr: io::Result<Vec<u8>>) {
        let mut guard = self.state.lock().unwrap();
        *guard = LifecycleState::ResultPending { stdout, stderr };
        self.condvar.notify_all();
    }

    /// Whether a terminal `ResultModel` has already been published. Used by
    /// `ProcessHandle`'s drop glue to decide whether a reap is still needed.
    pub fn is_terminal(&self) -> bool {
        matches!(&*self.state.lock().unwrap(), LifecycleState::Complete(_))
    }

    /// Block until a terminal `ResultModel` exists, computing it via
    /// `reap_and_build` the first time a caller observes `ResultPending`.
    /// `reap_and_build` performs the blocking reap and constructs the
    /// `ResultModel`; it runs without the lock held.
    pub fn wait<E>(
        &self,
        reap_and_build: impl FnOnce(io::Result<Vec<u8>>, io::Result<Vec<u8>>) -> Result<ResultModel, E>,
    ) -> Result<Arc<ResultModel>, E> {
        loop {
            let mut guard = self.state.lock().unwrap();
            loop {
                match &*guard {
                    LifecycleState::Idle => {
                        panic!("wait() called before launch()");
                    }
                    LifecycleState::Complete(r) => return Ok(Arc::clone(r)),
                    s if still_blocking(s) => {
                        guard = self.condvar.wait_while(guard, |s| still_blocking(s)).unwrap();
                        continue;
                    }
                    LifecycleState::ResultPending { .. } => break,
                    _ => unreachable!(),
                }
            }
            let (stdout, stderr) = match std::mem::replace(&mut *guard, LifecycleState::Reaping) {
                LifecycleState::ResultPending { stdout, stderr } => (stdout, stderr),
                _ => unreachable!(),
            };
            drop(guard);

            // `reap_and_build` consumes the captured bytes, so clone them
            // first: if the reap fails, the originals go back into
            // `ResultPending` so a later `wait()` can retry instead of
            // finding the cell stuck in `Reaping` forever.
            let stdout_for_build = clone_io_result(&stdout);
            let stderr_for_build = clone_io_result(&stderr);

            let model = match reap_and_build(stdout_for_build, stderr_for_build) {
                Ok(model) => Arc::new(model),
                Err(e) => {
                    let mut guard = self.state.lock().unwrap();
                    *guard = LifecycleState::ResultPending { stdout, stderr };
                    self.condvar.notify_all();
                    return Err(e);
                }
            };
            let mut guard = self.state.lock().unwrap();
            *guard = LifecycleState::Complete(Arc::clone(&model));
            self.condvar.notify_all();
            return Ok(model);
        }
    }
}

/// Which captured stream a reader drained; used to route its result into
/// the `Rendezvous`.
#[derive(Clone, Copy)]
pub(crate) enum StreamKind {
    Stdout,
    Stderr,
}

impl Rendezvous {
    /// Record one stream's result and, if it completes the rendezvous,
    /// publish into `cell`.
    pub(crate) fn arrive(&self, kind: StreamKind, result: io::Result<Vec<u8>>, cell: &LifecycleCell) {
        let published = match kind {
            StreamKind::Stdout => self.arrive_stdout(result),
            StreamKind::Stderr => self.arrive_stderr(result),
        };
        if let Some((stdout, stderr)) = published {
            cell.publish_result_pending(stdout, stderr);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_stream_rendezvous_publishes_with_empty_partner() {
        let cell = LifecycleCell::new();
        let rendezvous = cell.start_capturing(1);
        rendezvous.arrive(StreamKind::Stdout, Ok(b"hi".to_vec()), &cell);

        let model = cell
            .wait(|stdout, stderr| {
                assert_eq!(stdout.unwrap(), b"hi");
                assert_eq!(stderr.unwrap(), Vec::<u8>::new());
                Ok::<_, ()>(ResultModel {
                    argv: vec![],
                    environment: vec![],
                    exit_status: crate::result::ExitStatus::Exited(0),
                    stdout: Ok(b"hi".to_vec()),
                    stderr: Ok(Vec::new()),
                })
            })
            .unwrap();
        assert!(model.exit_status.success());
    }

    #[test]
    fn dual_stream_rendezvous_waits_for_both() {
        let cell = LifecycleCell::new();
        let rendezvous = cell.start_capturing(2);
        rendezvous.arrive(StreamKind::Stdout, Ok(b"out".to_vec()), &cell);
        // Not yet published: second arrival pending.
        rendezvous.arrive(StreamKind::Stderr, Ok(b"err".to_vec()), &cell);

        cell.wait(|stdout, stderr| {
            assert_eq!(stdout.unwrap(), b"out");
            assert_eq!(stderr.unwrap(), b"err");
            Ok::<_, ()>(ResultModel {
                argv: vec![],
                environment: vec![],
                exit_status: crate::result::ExitStatus::Exited(0),
                stdout: Ok(Vec::new()),
                stderr: Ok(Vec::new()),
            })
        })
        .unwrap();
    }

    #[test]
    fn repeated_wait_returns_same_result_model() {
        let cell = LifecycleCell::new();
        cell.start_vacuous();
        let first = cell
            .wait(|_, _| {
                Ok::<_, ()>(ResultModel {
                    argv: vec![],
                    environment: vec![],
                    exit_status: crate::result::ExitStatus::Exited(0),
                    stdout: Ok(Vec::new()),
                    stderr: Ok(Vec::new()),
                })
            })
            .unwrap();
        let second = cell.wait(|_, _| unreachable!("must not reap twice")).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
