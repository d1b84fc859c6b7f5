//! Resolution of `argv[0]` to an absolute executable path.
//!
//! Three cases, tried in order: an already-absolute program is returned
//! verbatim; a relative program with two or more components is combined with
//! the working directory and checked for existence; a bare name is searched
//! for along `PATH`. Successful (and unsuccessful) bare-name lookups against
//! the process's own current directory are memoized process-wide, keyed only
//! by the program name — see `resolve` for why the working directory is
//! deliberately not part of the key.

use std::collections::HashMap;
use std::env;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

#[cfg(unix)]
fn is_executable_file(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    match std::fs::metadata(path) {
        Ok(meta) => meta.is_file() && meta.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    }
}

#[cfg(windows)]
fn is_executable_file(path: &Path) -> bool {
    // Windows has no executable bit; existence of a regular file is the
    // best available proxy, matching the teacher's `locate_in_path`, which
    // only checks `Path::exists`.
    std::fs::metadata(path).map(|m| m.is_file()).unwrap_or(false)
}

fn component_count(path: &Path) -> usize {
    path.components().count()
}

fn memo() -> &'static Mutex<HashMap<OsString, Option<PathBuf>>> {
    static MEMO: OnceLock<Mutex<HashMap<OsString, Option<PathBuf>>>> = OnceLock::new();
    MEMO.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Resolve `program` to an absolute executable path.
///
/// `working_directory` is the directory relative-path lookups should be
/// combined with; `None` means the process's own current directory. Returns
/// `None` if no executable could be located; this is not treated as an
/// error (per the design, resolution failure is reported by the caller as
/// `Error::MissingExecutableProgram`, not here).
pub fn resolve(program: &OsStr, working_directory: Option<&Path>) -> Option<PathBuf> {
    let program_path = Path::new(program);

    if program_path.is_absolute() {
        return Some(program_path.to_path_buf());
    }

    if component_count(program_path) >= 2 {
        let base = match working_directory {
            Some(dir) => dir.to_path_buf(),
            None => env::current_dir().ok()?,
        };
        let candidate = base.join(program_path);
        return if is_executable_file(&candidate) {
            Some(candidate)
        } else {
            None
        };
    }

    // Bare name: the memo cache only applies when the caller's working
    // directory (if any) equals the process's own CWD, since the cache key
    // omits the working directory entirely.
    let uses_process_cwd = match (working_directory, env::current_dir()) {
        (None, _) => true,
        (Some(dir), Ok(cwd)) => dir == cwd,
        (Some(_), Err(_)) => false,
    };

    if uses_process_cwd {
        let mut table = memo().lock().unwrap();
        if let Some(cached) = table.get(program) {
            return cached.clone();
        }
        let found = search_path(program);
        table.insert(program.to_owned(), found.clone());
        found
    } else {
        search_path(program)
    }
}

fn search_path(program: &OsStr) -> Option<PathBuf> {
    let path_var = env::var_os("PATH")?;
    for dir in env::split_paths(&path_var) {
        let candidate = dir.join(program);
        if is_executable_file(&candidate) {
            return Some(candidate);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    fn make_executable(path: &Path) {
        fs::write(path, b"#!/bin/sh\nexit 0\n").unwrap();
        let mut perms = fs::metadata(path).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(path, perms).unwrap();
    }

    #[test]
    fn absolute_path_returned_verbatim_even_if_missing() {
        let p = resolve(OsStr::new("/definitely/not/a/real/path"), None);
        assert_eq!(p, Some(PathBuf::from("/definitely/not/a/real/path")));
    }

    #[test]
    fn relative_multi_component_checks_existence() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("bin")).unwrap();
        let script = dir.path().join("bin").join("myprog");
        make_executable(&script);

        let found = resolve(OsStr::new("bin/myprog"), Some(dir.path()));
        assert_eq!(found, Some(script));

        let missing = resolve(OsStr::new("bin/nope"), Some(dir.path()));
        assert_eq!(missing, None);
    }

    #[test]
    fn bare_name_searches_path_and_is_referentially_transparent() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("uniqueprogname12345");
        make_executable(&script);

        // SAFETY: tests in this crate run single-threaded per module; no
        // other thread in this process mutates PATH concurrently.
        unsafe {
            env::set_var("PATH", dir.path());
        }
        let first = resolve(OsStr::new("uniqueprogname12345"), Some(dir.path()));
        let second = resolve(OsStr::new("uniqueprogname12345"), Some(dir.path()));
        assert_eq!(first, Some(script.clone()));
        assert_eq!(first, second);
    }

    #[test]
    fn missing_bare_name_resolves_to_none() {
        unsafe {
            env::set_var("PATH", "/nonexistent-dir-xyz");
        }
        assert_eq!(resolve(OsStr::new("definitely-not-a-program-xyz"), None), None);
    }
}
