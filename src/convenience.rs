//! One-shot helpers built on top of [`ProcessHandle`](crate::handle::ProcessHandle).

use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::handle::{OutputRedirection, ProcessHandle};
use crate::result::ResultModel;

/// Launch `argv` with `env`, capturing both streams, and block for its
/// result.
pub fn popen(argv: Vec<OsString>, env: Vec<(OsString, OsString)>) -> Result<Arc<ResultModel>> {
    popen_with_cwd(argv, env, None)
}

/// As [`popen`], but spawning in `cwd`.
pub fn popen_with_cwd(
    argv: Vec<OsString>,
    env: Vec<(OsString, OsString)>,
    cwd: Option<PathBuf>,
) -> Result<Arc<ResultModel>> {
    let handle = ProcessHandle::new(
        argv,
        env,
        OutputRedirection::Collect { merge_stderr: false },
        false,
        false,
        cwd,
    );
    handle.launch()?;
    handle.wait()
}

/// As [`popen`], but fail with [`Error::NonZeroExit`] unless the child
/// exited with status 0, and decode stdout as UTF-8 on success.
pub fn check_nonzero_exit(argv: Vec<OsString>, env: Vec<(OsString, OsString)>) -> Result<String> {
    let result = popen(argv, env)?;
    if !result.exit_status.success() {
        return Err(Error::NonZeroExit {
            result: Box::new(Arc::try_unwrap(result).unwrap_or_else(|arc| clone_result(&arc))),
        });
    }
    result.stdout_str()
}

fn clone_result(r: &ResultModel) -> ResultModel {
    ResultModel {
        argv: r.argv.clone(),
        environment: r.environment.clone(),
        exit_status: r.exit_status,
        stdout: match &r.stdout {
            Ok(b) => Ok(b.clone()),
            Err(e) => Err(std::io::Error::new(e.kind(), e.to_string())),
        },
        stderr: match &r.stderr {
            Ok(b) => Ok(b.clone()),
            Err(e) => Err(std::io::Error::new(e.kind(), e.to_string())),
        },
    }
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
    use super::*;

    #[test]
    fn popen_captures_stdout() {
        let result = popen(vec!["/bin/echo".into(), "hi".into()], vec![]).unwrap();
        assert!(result.exit_status.success());
        assert_eq!(result.stdout_str().unwrap(), "hi\n");
    }

    #[test]
    fn check_nonzero_exit_fails_on_nonzero_status() {
        let err = check_nonzero_exit(vec!["/bin/sh".into(), "-c".into(), "exit 3".into()], vec![]).unwrap_err();
        assert!(matches!(err, Error::NonZeroExit { .. }));
    }

    #[test]
    fn check_nonzero_exit_returns_stdout_on_success() {
        let out = check_nonzero_exit(vec!["/bin/echo".into(), "ok".into()], vec![]).unwrap();
        assert_eq!(out, "ok\n");
    }
}
