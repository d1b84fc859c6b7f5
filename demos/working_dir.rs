//! Spawn a child with a working directory other than the parent's.
//!
//! Run with: cargo run --example working_dir

use childproc::{OutputRedirection, ProcessHandle};

fn main() -> childproc::Result<()> {
    let handle = ProcessHandle::new(
        vec!["pwd".into()],
        vec![],
        OutputRedirection::Collect { merge_stderr: false },
        false,
        false,
        Some("/tmp".into()),
    );
    handle.launch()?;
    let result = handle.wait()?;
    println!("child's cwd: {}", result.stdout_str()?.trim());
    Ok(())
}
