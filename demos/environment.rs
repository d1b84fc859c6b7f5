//! Launch a child with an explicit environment.
//!
//! Run with: cargo run --example environment

use childproc::{OutputRedirection, ProcessHandle};

fn main() -> childproc::Result<()> {
    let handle = ProcessHandle::new(
        vec!["sh".into(), "-c".into(), "echo $GREETING".into()],
        vec![("GREETING".into(), "hello from childproc".into())],
        OutputRedirection::Collect { merge_stderr: false },
        false,
        false,
        None,
    );
    handle.launch()?;
    let result = handle.wait()?;
    println!("{}", result.stdout_str()?.trim());
    Ok(())
}
