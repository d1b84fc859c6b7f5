//! The terminal, immutable record of a finished child process.

use std::ffi::OsString;
use std::fmt;
use std::io;

/// How a child process terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// The child called `exit` (or returned from `main`) with this code.
    Exited(i32),
    /// The child was terminated by this signal. POSIX only.
    Signalled(i32),
}

impl ExitStatus {
    /// True if the child exited with code 0.
    pub fn success(&self) -> bool {
        matches!(self, ExitStatus::Exited(0))
    }

    /// Decode a raw POSIX `wait` status word.
    ///
    /// For every status word exactly one of `WIFEXITED`/`WIFSIGNALED` holds;
    /// a "stopped" status (neither holds) is a contract violation, not a
    /// representable `ExitStatus` — callers only reach this after a real
    /// `waitpid` reap, which never reports a stopped child (no `WUNTRACED`
    /// flag is ever passed).
    #[cfg(unix)]
    pub(crate) fn from_raw_posix(status: i32) -> ExitStatus {
        let low7 = status & 0x7f;
        if low7 == 0 {
            ExitStatus::Exited((status >> 8) & 0xff)
        } else if low7 != 0x7f {
            ExitStatus::Signalled(low7)
        } else {
            panic!("unexpected exit status: child reported as stopped ({status:#x})");
        }
    }

    /// On Windows the status word *is* the exit code.
    #[cfg(windows)]
    pub(crate) fn from_raw_windows(code: u32) -> ExitStatus {
        ExitStatus::Exited(code as i32)
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitStatus::Exited(code) => write!(f, "terminated({code})"),
            ExitStatus::Signalled(sig) => write!(f, "signalled({sig})"),
        }
    }
}

/// The frozen outcome of a completed launch: the argv and environment it was
/// launched with, its exit status, and whatever output was captured.
#[derive(Debug)]
pub struct ResultModel {
    /// The argv the child was launched with.
    pub argv: Vec<OsString>,
    /// The environment the child was launched with.
    pub environment: Vec<(OsString, OsString)>,
    /// How the child terminated.
    pub exit_status: ExitStatus,
    /// Captured stdout, or the read error that interrupted capture.
    pub stdout: io::Result<Vec<u8>>,
    /// Captured stderr, or the read error that interrupted capture. Empty
    /// (not absent) when output redirection merged stderr into stdout.
    pub stderr: io::Result<Vec<u8>>,
}

fn decode_utf8(bytes: &io::Result<Vec<u8>>) -> Result<String, crate::error::Error> {
    match bytes {
        Ok(b) => std::str::from_utf8(b)
            .map(str::to_owned)
            .map_err(crate::error::Error::IllegalUtf8),
        Err(e) => Err(crate::error::Error::ReadSyscall(io::Error::new(e.kind(), e.to_string()))),
    }
}

impl ResultModel {
    /// Decode captured stdout as strict UTF-8.
    pub fn stdout_str(&self) -> Result<String, crate::error::Error> {
        decode_utf8(&self.stdout)
    }

    /// Decode captured stderr as strict UTF-8.
    pub fn stderr_str(&self) -> Result<String, crate::error::Error> {
        decode_utf8(&self.stderr)
    }

    /// A human-readable rendering: `terminated(<code>):` or
    /// `signalled(<sig>):` followed by shell-escaped argv, then indented
    /// output. Strips a leading `sandbox-exec ... --` triple (the first
    /// three arguments) for tidiness, matching the source's
    /// `sandbox-exec`-aware formatting.
    pub fn description(&self) -> String {
        let mut out = format!("{}: {}", self.exit_status, shell_escape_argv(self.display_argv()));
        if let Ok(stdout) = &self.stdout {
            if !stdout.is_empty() {
                out.push_str("\n  stdout:\n");
                out.push_str(&indent(&String::from_utf8_lossy(stdout)));
            }
        }
        if let Ok(stderr) = &self.stderr {
            if !stderr.is_empty() {
                out.push_str("\n  stderr:\n");
                out.push_str(&indent(&String::from_utf8_lossy(stderr)));
            }
        }
        out
    }

    fn display_argv(&self) -> &[OsString] {
        if self.argv.len() >= 3 && self.argv[0].to_string_lossy() == "sandbox-exec" {
            &self.argv[3..]
        } else {
            &self.argv[..]
        }
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

fn indent(s: &str) -> String {
    s.lines().map(|l| format!("    {l}\n")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_exited_status() {
        // low 7 bits == 0, high byte is the exit code
        let status = 7 << 8;
        assert_eq!(ExitStatus::from_raw_posix(status), ExitStatus::Exited(7));
    }

    #[test]
    fn decodes_signalled_status() {
        // low 7 bits hold the signal number (9 == SIGKILL)
        assert_eq!(ExitStatus::from_raw_posix(9), ExitStatus::Signalled(9));
    }

    #[test]
    #[should_panic(expected = "unexpected exit status")]
    fn stopped_status_is_a_contract_violation() {
        // low 7 bits == 0x7f signals "stopped", which waitpid(..., 0) never
        // reports but which we still defend against explicitly.
        ExitStatus::from_raw_posix(0x7f);
    }

    #[test]
    fn strict_utf8_decode_round_trips_valid_bytes() {
        let model = ResultModel {
            argv: vec!["echo".into()],
            environment: vec![],
            exit_status: ExitStatus::Exited(0),
            stdout: Ok(b"hello\n".to_vec()),
            stderr: Ok(Vec::new()),
        };
        assert_eq!(model.stdout_str().unwrap(), "hello\n");
    }

    #[test]
    fn strict_utf8_decode_fails_on_invalid_bytes() {
        let model = ResultModel {
            argv: vec!["echo".into()],
            environment: vec![],
            exit_status: ExitStatus::Exited(0),
            stdout: Ok(vec![0xff, 0xfe]),
            stderr: Ok(Vec::new()),
        };
        assert!(matches!(
            model.stdout_str(),
            Err(crate::error::Error::IllegalUtf8(_))
        ));
    }
}
