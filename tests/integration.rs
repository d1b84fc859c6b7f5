//! End-to-end scenarios against real child processes. POSIX-only: all use
//! `/bin/sh`/`/bin/echo`, which the Windows backend has no equivalent of.

#![cfg(unix)]

use std::sync::Arc;
use std::sync::Mutex;

use childproc::{check_nonzero_exit, popen, Error, OutputRedirection, ProcessHandle};

#[test]
fn zero_exit_capture() {
    let result = popen(vec!["/bin/echo".into(), "hello".into()], vec![]).unwrap();
    assert!(result.exit_status.success());
    assert_eq!(result.stdout_str().unwrap(), "hello\n");
    assert_eq!(result.stderr_str().unwrap(), "");
}

#[test]
fn non_zero_exit() {
    let result = popen(vec!["/bin/sh".into(), "-c".into(), "exit 7".into()], vec![]).unwrap();
    assert_eq!(result.exit_status, childproc::ExitStatus::Exited(7));

    let err = check_nonzero_exit(vec!["/bin/sh".into(), "-c".into(), "exit 7".into()], vec![]).unwrap_err();
    assert!(matches!(err, Error::NonZeroExit { .. }));
}

#[test]
fn signal_termination() {
    let result = popen(
        vec!["/bin/sh".into(), "-c".into(), "kill -9 $$".into()],
        vec![],
    )
    .unwrap();
    assert_eq!(result.exit_status, childproc::ExitStatus::Signalled(9));
}

#[test]
fn stderr_merge() {
    let handle = ProcessHandle::new(
        vec!["/bin/sh".into(), "-c".into(), "echo out; echo err 1>&2".into()],
        vec![],
        OutputRedirection::Collect { merge_stderr: true },
        false,
        false,
        None,
    );
    handle.launch().unwrap();
    let result = handle.wait().unwrap();
    assert!(result.stdout_str().unwrap().contains("out"));
    assert!(result.stdout_str().unwrap().contains("err"));
    assert_eq!(result.stderr_str().unwrap(), "");
}

#[test]
fn missing_program() {
    let handle = ProcessHandle::new(
        vec!["definitely-not-a-program-xyz".into()],
        vec![],
        OutputRedirection::None,
        false,
        false,
        None,
    );
    let err = handle.launch().unwrap_err();
    assert!(matches!(err, Error::MissingExecutableProgram(_)));
}

#[test]
#[should_panic(expected = "launch() called twice")]
fn double_launch_is_a_contract_error() {
    let handle = ProcessHandle::new(
        vec!["/bin/echo".into(), "x".into()],
        vec![],
        OutputRedirection::None,
        false,
        false,
        None,
    );
    handle.launch().unwrap();
    let _ = handle.launch();
}

#[test]
fn large_output_does_not_deadlock() {
    let handle = ProcessHandle::new(
        vec![
            "/bin/sh".into(),
            "-c".into(),
            "yes | head -c 1048576".into(),
        ],
        vec![],
        OutputRedirection::Collect { merge_stderr: false },
        false,
        false,
        None,
    );
    handle.launch().unwrap();
    let result = handle.wait().unwrap();
    assert_eq!(result.stdout.as_ref().unwrap().len(), 1_048_576);
}

#[test]
fn streaming_callback_receives_every_chunk() {
    let seen: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = Arc::clone(&seen);
    let handle = ProcessHandle::new(
        vec!["/bin/echo".into(), "streamed".into()],
        vec![],
        OutputRedirection::Stream {
            on_stdout: Some(Arc::new(move |chunk: &[u8]| {
                seen_clone.lock().unwrap().extend_from_slice(chunk);
            })),
            on_stderr: None,
            merge_stderr: false,
        },
        false,
        false,
        None,
    );
    handle.launch().unwrap();
    let result = handle.wait().unwrap();
    assert!(result.stdout.as_ref().unwrap().is_empty());
    assert_eq!(&*seen.lock().unwrap(), b"streamed\n");
}

#[test]
fn repeated_wait_is_idempotent() {
    let handle = ProcessHandle::new(
        vec!["/bin/echo".into(), "x".into()],
        vec![],
        OutputRedirection::Collect { merge_stderr: false },
        false,
        false,
        None,
    );
    handle.launch().unwrap();
    let first = handle.wait().unwrap();
    let second = handle.wait().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
}

#[test]
fn stdin_is_delivered_to_the_child() {
    let handle = ProcessHandle::new(
        vec!["/bin/sh".into(), "-c".into(), "cat".into()],
        vec![],
        OutputRedirection::Collect { merge_stderr: false },
        false,
        false,
        None,
    );
    let mut stdin = handle.launch().unwrap();
    use std::io::Write;
    stdin.write_all(b"ping").unwrap();
    drop(stdin);
    let result = handle.wait().unwrap();
    assert_eq!(result.stdout_str().unwrap(), "ping");
}

#[test]
fn working_directory_is_honored() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("marker.txt"), b"found").unwrap();
    let handle = ProcessHandle::new(
        vec!["/bin/sh".into(), "-c".into(), "cat marker.txt".into()],
        vec![],
        OutputRedirection::Collect { merge_stderr: false },
        false,
        false,
        Some(dir.path().to_path_buf()),
    );
    handle.launch().unwrap();
    let result = handle.wait().unwrap();
    assert_eq!(result.stdout_str().unwrap(), "found");
}

#[test]
fn process_group_signal_reaches_a_child_spawned_subshell() {
    let handle = ProcessHandle::new(
        vec![
            "/bin/sh".into(),
            "-c".into(),
            "sleep 30 & wait".into(),
        ],
        vec![],
        OutputRedirection::None,
        false,
        true,
        None,
    );
    handle.launch().unwrap();
    handle.signal(libc::SIGTERM);
    let result = handle.wait().unwrap();
    assert!(!result.exit_status.success());
}
