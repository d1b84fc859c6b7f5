//! Capture the output of a command.
//!
//! Run with: cargo run --example capture_output

use childproc::{popen, OutputRedirection, ProcessHandle};

fn main() -> childproc::Result<()> {
    let output = popen(vec!["echo".into(), "Hello from childproc!".into()], vec![])?;
    println!("Output: {}", output.stdout_str()?.trim());
    println!("Exit status: {}", output.exit_status);

    let handle = ProcessHandle::new(
        vec!["sh".into(), "-c".into(), "echo stdout; echo stderr >&2".into()],
        vec![],
        OutputRedirection::Collect { merge_stderr: true },
        false,
        false,
        None,
    );
    handle.launch()?;
    let merged = handle.wait()?;
    println!("\nMerged output: {}", merged.stdout_str()?.trim());

    let handle = ProcessHandle::new(
        vec!["sh".into(), "-c".into(), "echo out; echo err >&2".into()],
        vec![],
        OutputRedirection::Collect { merge_stderr: false },
        false,
        false,
        None,
    );
    handle.launch()?;
    let separate = handle.wait()?;
    println!("\nSeparate streams:");
    println!("  stdout: {}", separate.stdout_str()?.trim());
    println!("  stderr: {}", separate.stderr_str()?.trim());

    Ok(())
}
